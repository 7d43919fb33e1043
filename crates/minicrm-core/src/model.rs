//! Workspace-scoped CRM records.
//! Every entity belongs to exactly one workspace; ids are opaque strings (v4 UUIDs when minted here).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Tenant boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

impl Workspace {
    pub fn new(name: &str, owner_id: &str) -> Self {
        Self {
            id: new_id(),
            name: name.to_string(),
            owner_id: owner_id.to_string(),
            created_at: Utc::now(),
            archived_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Admin,
    Member,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceMember {
    pub workspace_id: String,
    pub user_id: String,
    pub role: MemberRole,
    pub created_at: DateTime<Utc>,
}

/// Bearer credential issued to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// Ordered pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

impl PipelineStage {
    pub fn new(workspace_id: &str, name: &str, sort_order: i32) -> Self {
        Self {
            id: new_id(),
            workspace_id: workspace_id.to_string(),
            name: name.to_string(),
            sort_order,
            created_at: Utc::now(),
        }
    }
}

/// A contact moving through the pipeline. Only `name` is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub workspace_id: String,
    pub stage_id: String,
    /// Explicit campaign association. `None` and an empty list both mean "no association".
    #[serde(default)]
    pub campaign_ids: Option<Vec<String>>,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub responsible_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(workspace_id: &str, stage_id: &str, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            workspace_id: workspace_id.to_string(),
            stage_id: stage_id.to_string(),
            campaign_ids: None,
            name: name.to_string(),
            email: None,
            phone: None,
            company: None,
            job_title: None,
            source: None,
            notes: None,
            responsible_user_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Associated campaign ids with blank entries removed.
    pub fn associated_campaign_ids(&self) -> Vec<&str> {
        self.campaign_ids
            .iter()
            .flatten()
            .map(|id| id.as_str())
            .filter(|id| !id.trim().is_empty())
            .collect()
    }
}

/// Outreach template, optionally fired when a lead enters `trigger_stage_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    pub active: bool,
    #[serde(default)]
    pub trigger_stage_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(workspace_id: &str, name: &str) -> Self {
        Self {
            id: new_id(),
            workspace_id: workspace_id.to_string(),
            name: name.to_string(),
            context: None,
            prompt: None,
            active: true,
            trigger_stage_id: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Date,
    Select,
}

/// Workspace-scoped schema extension for leads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadCustomField {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub field_type: FieldType,
    pub created_at: DateTime<Utc>,
}

impl LeadCustomField {
    pub fn new(workspace_id: &str, name: &str, field_type: FieldType) -> Self {
        Self {
            id: new_id(),
            workspace_id: workspace_id.to_string(),
            name: name.to_string(),
            field_type,
            created_at: Utc::now(),
        }
    }
}

/// At most one row per (lead_id, field_id); the store upserts on that pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadCustomValue {
    pub id: String,
    pub lead_id: String,
    pub field_id: String,
    #[serde(default)]
    pub value: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LeadCustomValue {
    pub fn new(lead_id: &str, field_id: &str, value: Option<&str>) -> Self {
        Self {
            id: new_id(),
            lead_id: lead_id.to_string(),
            field_id: field_id.to_string(),
            value: value.map(str::to_string),
            created_at: Utc::now(),
        }
    }
}

/// Stored outreach text. Editable afterwards; no link back to the prompt that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedMessage {
    pub id: String,
    pub workspace_id: String,
    pub lead_id: String,
    #[serde(default)]
    pub campaign_id: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl GeneratedMessage {
    pub fn new(workspace_id: &str, lead_id: &str, campaign_id: Option<&str>, content: &str) -> Self {
        Self {
            id: new_id(),
            workspace_id: workspace_id.to_string(),
            lead_id: lead_id.to_string(),
            campaign_id: campaign_id.map(str::to_string),
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Declares that `field_key` must be non-empty for a lead to be saved into `stage_id`.
/// Standard keys are lead attribute names; custom keys use `custom:<field_id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRequiredField {
    pub id: String,
    pub workspace_id: String,
    pub stage_id: String,
    pub field_key: String,
    pub created_at: DateTime<Utc>,
}

impl StageRequiredField {
    pub fn new(workspace_id: &str, stage_id: &str, field_key: &str) -> Self {
        Self {
            id: new_id(),
            workspace_id: workspace_id.to_string(),
            stage_id: stage_id.to_string(),
            field_key: field_key.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn associated_campaign_ids_skips_blank_entries() {
        let mut lead = Lead::new("w1", "s1", "Ana");
        lead.campaign_ids = Some(vec!["A".into(), "".into(), "  ".into(), "B".into()]);
        assert_eq!(lead.associated_campaign_ids(), vec!["A", "B"]);

        lead.campaign_ids = None;
        assert!(lead.associated_campaign_ids().is_empty());
    }

    #[test]
    fn lead_deserializes_with_missing_optionals() {
        let json = r#"{
            "id": "l1", "workspace_id": "w1", "stage_id": "s1", "name": "Ana",
            "created_at": "2024-01-01T00:00:00Z", "updated_at": "2024-01-01T00:00:00Z"
        }"#;
        let lead: Lead = serde_json::from_str(json).unwrap();
        assert_eq!(lead.company, None);
        assert_eq!(lead.campaign_ids, None);
    }

    #[test]
    fn field_type_is_snake_case() {
        assert_eq!(serde_json::to_string(&FieldType::Select).unwrap(), "\"select\"");
    }
}
