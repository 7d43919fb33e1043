//! Sled-backed record store. One tree per entity; values are JSON.
//!
//! Composite keys join their parts with `\u{1f}` (unit separator, shown as `␟`); ids containing
//! it are rejected.
//!
//! | Tree | Key |
//! |------|-----|
//! | workspaces, leads, campaigns, stages, custom_fields | `{id}` |
//! | custom_values | `{lead_id}␟{field_id}` (upsert on conflict) |
//! | generated_messages | `{lead_id}␟{batch:020}␟{position:03}` |
//! | generated_message_keys | `{message_id}` → generated_messages key |
//! | stage_required_fields | `{stage_id}␟{field_key}` |
//! | workspace_members | `{workspace_id}␟{user_id}` |
//! | sessions | `{token}` |

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;

use crate::model::{
    Campaign, GeneratedMessage, Lead, LeadCustomField, LeadCustomValue, PipelineStage, Session,
    StageRequiredField, Workspace, WorkspaceMember,
};

const DEFAULT_PATH: &str = "./data/minicrm";
const KEY_SEP: char = '\u{1f}';

const WORKSPACES: &str = "workspaces";
const LEADS: &str = "leads";
const CAMPAIGNS: &str = "campaigns";
const STAGES: &str = "stages";
const CUSTOM_FIELDS: &str = "custom_fields";
const CUSTOM_VALUES: &str = "custom_values";
const MESSAGES: &str = "generated_messages";
const MESSAGE_KEYS: &str = "generated_message_keys";
const REQUIRED_FIELDS: &str = "stage_required_fields";
const MEMBERS: &str = "workspace_members";
const SESSIONS: &str = "sessions";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled: {0}")]
    Sled(#[from] sled::Error),
    #[error("record encoding: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("id contains a reserved separator: {0:?}")]
    InvalidKey(String),
    #[error("{0}")]
    Other(String),
}

impl From<TransactionError<()>> for StoreError {
    fn from(err: TransactionError<()>) -> Self {
        match err {
            TransactionError::Storage(e) => Self::Sled(e),
            TransactionError::Abort(()) => Self::Other("transaction aborted".into()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

type TxResult<T> = Result<T, ConflictableTransactionError<()>>;

/// What the generation pipeline reads and writes. Everything else on [`SledStore`] is plain CRUD.
pub trait CrmStore: Send + Sync {
    fn get_lead(&self, id: &str) -> StoreResult<Option<Lead>>;
    fn get_campaign(&self, id: &str) -> StoreResult<Option<Campaign>>;
    fn list_custom_fields(&self, workspace_id: &str) -> StoreResult<Vec<LeadCustomField>>;
    fn list_custom_values(&self, lead_id: &str) -> StoreResult<Vec<LeadCustomValue>>;
    /// All rows land together or none do. Listing returns them in the given order.
    fn insert_messages(&self, messages: &[GeneratedMessage]) -> StoreResult<()>;
    fn resolve_session(&self, token: &str) -> StoreResult<Option<String>>;
    fn is_member(&self, workspace_id: &str, user_id: &str) -> StoreResult<bool>;
}

fn composite_key(parts: &[&str]) -> StoreResult<String> {
    if let Some(bad) = parts.iter().find(|p| p.contains(KEY_SEP)) {
        return Err(StoreError::InvalidKey(bad.to_string()));
    }
    Ok(parts.join(&KEY_SEP.to_string()))
}

/// Scan prefix for every composite key whose first part is `head`.
fn key_prefix(head: &str) -> StoreResult<String> {
    composite_key(&[head, ""])
}

/// `{lead_id}␟{batch}` portion of a generated_messages key.
fn batch_part(key: &[u8]) -> &[u8] {
    let sep = KEY_SEP as u8;
    match key.iter().rposition(|b| *b == sep) {
        Some(at) => &key[..at],
        None => key,
    }
}

pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Open at the given path, or `./data/minicrm` when `None`.
    pub fn open(path: Option<impl AsRef<Path>>) -> StoreResult<Self> {
        let p = path
            .map(|x| x.as_ref().to_path_buf())
            .unwrap_or_else(|| Path::new(DEFAULT_PATH).to_path_buf());
        let db = sled::open(p)?;
        Ok(Self { db })
    }

    pub fn open_path(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open(Some(path))
    }

    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn tree(&self, name: &str) -> StoreResult<sled::Tree> {
        Ok(self.db.open_tree(name)?)
    }

    fn put<T: Serialize>(&self, tree: &str, key: &str, value: &T) -> StoreResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.tree(tree)?.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, tree: &str, key: &str) -> StoreResult<Option<T>> {
        match self.tree(tree)?.get(key.as_bytes())? {
            Some(v) => Ok(Some(serde_json::from_slice(&v)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, tree: &str, prefix: &str) -> StoreResult<Vec<T>> {
        self.tree(tree)?
            .scan_prefix(prefix.as_bytes())
            .values()
            .map(|v| -> StoreResult<T> {
                let v = v?;
                Ok(serde_json::from_slice(&v)?)
            })
            .collect()
    }

    // -- workspaces & membership ------------------------------------------------

    pub fn put_workspace(&self, workspace: &Workspace) -> StoreResult<()> {
        self.put(WORKSPACES, &workspace.id, workspace)
    }

    pub fn get_workspace(&self, id: &str) -> StoreResult<Option<Workspace>> {
        self.get(WORKSPACES, id)
    }

    pub fn add_member(&self, member: &WorkspaceMember) -> StoreResult<()> {
        let key = composite_key(&[&member.workspace_id, &member.user_id])?;
        self.put(MEMBERS, &key, member)
    }

    pub fn list_members(&self, workspace_id: &str) -> StoreResult<Vec<WorkspaceMember>> {
        self.scan(MEMBERS, &key_prefix(workspace_id)?)
    }

    pub fn put_session(&self, session: &Session) -> StoreResult<()> {
        self.put(SESSIONS, &session.token, session)
    }

    // -- leads ---------------------------------------------------------------

    pub fn put_lead(&self, lead: &Lead) -> StoreResult<()> {
        self.put(LEADS, &lead.id, lead)
    }

    /// Lead row plus upserts of its custom values, in one transaction.
    pub fn put_lead_with_values(&self, lead: &Lead, values: &[LeadCustomValue]) -> StoreResult<()> {
        let lead_bytes = serde_json::to_vec(lead)?;
        let mut rows = Vec::with_capacity(values.len());
        for value in values {
            if value.lead_id != lead.id {
                return Err(StoreError::Other(format!(
                    "custom value {} belongs to another lead",
                    value.id
                )));
            }
            let key = composite_key(&[&value.lead_id, &value.field_id])?;
            rows.push((key, serde_json::to_vec(value)?));
        }

        let leads = self.tree(LEADS)?;
        let custom_values = self.tree(CUSTOM_VALUES)?;
        (&leads, &custom_values).transaction(|(leads, custom_values)| -> TxResult<()> {
            leads.insert(lead.id.as_bytes(), lead_bytes.as_slice())?;
            for (key, bytes) in &rows {
                custom_values.insert(key.as_bytes(), bytes.as_slice())?;
            }
            Ok(())
        })?;
        Ok(())
    }

    pub fn list_leads(&self, workspace_id: &str) -> StoreResult<Vec<Lead>> {
        let mut leads: Vec<Lead> = self.scan(LEADS, "")?;
        leads.retain(|l| l.workspace_id == workspace_id);
        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(leads)
    }

    /// Insert or replace the value for (lead_id, field_id).
    pub fn upsert_custom_value(&self, value: &LeadCustomValue) -> StoreResult<()> {
        let key = composite_key(&[&value.lead_id, &value.field_id])?;
        self.put(CUSTOM_VALUES, &key, value)
    }

    // -- pipeline ------------------------------------------------------------

    pub fn put_stage(&self, stage: &PipelineStage) -> StoreResult<()> {
        self.put(STAGES, &stage.id, stage)
    }

    pub fn get_stage(&self, id: &str) -> StoreResult<Option<PipelineStage>> {
        self.get(STAGES, id)
    }

    /// Stages of a workspace by `sort_order`.
    pub fn list_stages(&self, workspace_id: &str) -> StoreResult<Vec<PipelineStage>> {
        let mut stages: Vec<PipelineStage> = self.scan(STAGES, "")?;
        stages.retain(|s| s.workspace_id == workspace_id);
        stages.sort_by_key(|s| s.sort_order);
        Ok(stages)
    }

    pub fn put_required_field(&self, required: &StageRequiredField) -> StoreResult<()> {
        let key = composite_key(&[&required.stage_id, &required.field_key])?;
        self.put(REQUIRED_FIELDS, &key, required)
    }

    pub fn list_required_fields(&self, stage_id: &str) -> StoreResult<Vec<StageRequiredField>> {
        self.scan(REQUIRED_FIELDS, &key_prefix(stage_id)?)
    }

    // -- campaigns & custom fields ------------------------------------------------

    pub fn put_campaign(&self, campaign: &Campaign) -> StoreResult<()> {
        self.put(CAMPAIGNS, &campaign.id, campaign)
    }

    /// True when a campaign was removed. Generated messages keep their `campaign_id`.
    pub fn delete_campaign(&self, id: &str) -> StoreResult<bool> {
        Ok(self.tree(CAMPAIGNS)?.remove(id.as_bytes())?.is_some())
    }

    pub fn list_campaigns(&self, workspace_id: &str) -> StoreResult<Vec<Campaign>> {
        let mut campaigns: Vec<Campaign> = self.scan(CAMPAIGNS, "")?;
        campaigns.retain(|c| c.workspace_id == workspace_id);
        campaigns.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(campaigns)
    }

    /// Active campaigns of a workspace, oldest first. This is the trigger candidate set.
    pub fn list_active_campaigns(&self, workspace_id: &str) -> StoreResult<Vec<Campaign>> {
        let mut campaigns = self.list_campaigns(workspace_id)?;
        campaigns.retain(|c| c.active);
        Ok(campaigns)
    }

    pub fn put_custom_field(&self, field: &LeadCustomField) -> StoreResult<()> {
        self.put(CUSTOM_FIELDS, &field.id, field)
    }

    pub fn get_custom_field(&self, id: &str) -> StoreResult<Option<LeadCustomField>> {
        self.get(CUSTOM_FIELDS, id)
    }

    // -- generated messages ------------------------------------------------------

    /// Messages of a lead: newest batch first, each batch in the order it was generated.
    pub fn list_messages(&self, lead_id: &str) -> StoreResult<Vec<GeneratedMessage>> {
        let prefix = key_prefix(lead_id)?;
        let mut batches: Vec<(Vec<u8>, Vec<GeneratedMessage>)> = Vec::new();
        for entry in self.tree(MESSAGES)?.scan_prefix(prefix.as_bytes()) {
            let (key, value) = entry?;
            let message: GeneratedMessage = serde_json::from_slice(&value)?;
            let batch = batch_part(&key);
            let same_batch = batches
                .last()
                .map(|(last, _)| last.as_slice() == batch)
                .unwrap_or(false);
            match batches.last_mut() {
                Some((_, rows)) if same_batch => rows.push(message),
                _ => batches.push((batch.to_vec(), vec![message])),
            }
        }
        Ok(batches.into_iter().rev().flat_map(|(_, rows)| rows).collect())
    }

    pub fn get_message(&self, id: &str) -> StoreResult<Option<GeneratedMessage>> {
        let Some(key) = self.tree(MESSAGE_KEYS)?.get(id.as_bytes())? else {
            return Ok(None);
        };
        match self.tree(MESSAGES)?.get(&key)? {
            Some(v) => Ok(Some(serde_json::from_slice(&v)?)),
            None => Ok(None),
        }
    }

    /// Replace a message's content in place. `None` when the id is unknown.
    pub fn update_message_content(
        &self,
        id: &str,
        content: &str,
    ) -> StoreResult<Option<GeneratedMessage>> {
        let Some(key) = self.tree(MESSAGE_KEYS)?.get(id.as_bytes())? else {
            return Ok(None);
        };
        let messages = self.tree(MESSAGES)?;
        let Some(v) = messages.get(&key)? else {
            return Ok(None);
        };
        let mut message: GeneratedMessage = serde_json::from_slice(&v)?;
        message.content = content.to_string();
        messages.insert(key, serde_json::to_vec(&message)?)?;
        Ok(Some(message))
    }

    /// True when a message was removed.
    pub fn delete_message(&self, id: &str) -> StoreResult<bool> {
        let messages = self.tree(MESSAGES)?;
        let keys = self.tree(MESSAGE_KEYS)?;
        let removed = (&messages, &keys).transaction(|(messages, keys)| -> TxResult<bool> {
            match keys.remove(id.as_bytes())? {
                Some(key) => {
                    messages.remove(key)?;
                    Ok(true)
                }
                None => Ok(false),
            }
        })?;
        Ok(removed)
    }
}

impl CrmStore for SledStore {
    fn get_lead(&self, id: &str) -> StoreResult<Option<Lead>> {
        self.get(LEADS, id)
    }

    fn get_campaign(&self, id: &str) -> StoreResult<Option<Campaign>> {
        self.get(CAMPAIGNS, id)
    }

    fn list_custom_fields(&self, workspace_id: &str) -> StoreResult<Vec<LeadCustomField>> {
        let mut fields: Vec<LeadCustomField> = self.scan(CUSTOM_FIELDS, "")?;
        fields.retain(|f| f.workspace_id == workspace_id);
        fields.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(fields)
    }

    fn list_custom_values(&self, lead_id: &str) -> StoreResult<Vec<LeadCustomValue>> {
        self.scan(CUSTOM_VALUES, &key_prefix(lead_id)?)
    }

    fn insert_messages(&self, messages: &[GeneratedMessage]) -> StoreResult<()> {
        if messages.is_empty() {
            return Ok(());
        }
        // generate_id is monotonic, so later batches sort after earlier ones.
        let batch = format!("{:020}", self.db.generate_id()?);
        let mut rows = Vec::with_capacity(messages.len());
        for (position, message) in messages.iter().enumerate() {
            let position = format!("{:03}", position);
            let key = composite_key(&[&message.lead_id, &batch, &position])?;
            rows.push((key, message.id.as_str(), serde_json::to_vec(message)?));
        }

        let tree = self.tree(MESSAGES)?;
        let keys = self.tree(MESSAGE_KEYS)?;
        (&tree, &keys).transaction(|(tree, keys)| -> TxResult<()> {
            for (key, id, bytes) in &rows {
                tree.insert(key.as_bytes(), bytes.as_slice())?;
                keys.insert(id.as_bytes(), key.as_bytes())?;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn resolve_session(&self, token: &str) -> StoreResult<Option<String>> {
        Ok(self.get::<Session>(SESSIONS, token)?.map(|s| s.user_id))
    }

    fn is_member(&self, workspace_id: &str, user_id: &str) -> StoreResult<bool> {
        let key = composite_key(&[workspace_id, user_id])?;
        Ok(self.tree(MEMBERS)?.contains_key(key.as_bytes())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldType, MemberRole};
    use chrono::Utc;
    use tempfile::tempdir;

    fn member(workspace_id: &str, user_id: &str) -> WorkspaceMember {
        WorkspaceMember {
            workspace_id: workspace_id.into(),
            user_id: user_id.into(),
            role: MemberRole::Member,
            created_at: Utc::now(),
        }
    }

    fn contents(messages: Vec<GeneratedMessage>) -> Vec<String> {
        messages.into_iter().map(|m| m.content).collect()
    }

    #[test]
    fn custom_values_upsert_on_lead_and_field() {
        let dir = tempdir().unwrap();
        let store = SledStore::open_path(dir.path()).unwrap();

        store
            .upsert_custom_value(&LeadCustomValue::new("l1", "f1", Some("first")))
            .unwrap();
        store
            .upsert_custom_value(&LeadCustomValue::new("l1", "f1", Some("second")))
            .unwrap();
        store
            .upsert_custom_value(&LeadCustomValue::new("l1", "f2", Some("other")))
            .unwrap();
        store
            .upsert_custom_value(&LeadCustomValue::new("l10", "f1", Some("not mine")))
            .unwrap();

        let values = store.list_custom_values("l1").unwrap();
        assert_eq!(values.len(), 2);
        let f1 = values.iter().find(|v| v.field_id == "f1").unwrap();
        assert_eq!(f1.value.as_deref(), Some("second"));
    }

    #[test]
    fn batch_keeps_generation_order_and_newest_batch_leads() {
        let dir = tempdir().unwrap();
        let store = SledStore::open_path(dir.path()).unwrap();
        let now = Utc::now();

        for round in 0..20 {
            let batch: Vec<GeneratedMessage> = ["m1", "m2", "m3"]
                .iter()
                .map(|c| {
                    let mut m = GeneratedMessage::new("w1", "l1", Some("c1"), c);
                    m.created_at = now;
                    m
                })
                .collect();
            store.insert_messages(&batch).unwrap();
            let listed = contents(store.list_messages("l1").unwrap());
            assert_eq!(&listed[..3], ["m1", "m2", "m3"], "round {}", round);
        }

        store
            .insert_messages(&[
                GeneratedMessage::new("w1", "l1", None, "n1"),
                GeneratedMessage::new("w1", "l1", None, "n2"),
            ])
            .unwrap();
        store
            .insert_messages(&[GeneratedMessage::new("w1", "l2", None, "elsewhere")])
            .unwrap();

        let listed = contents(store.list_messages("l1").unwrap());
        assert_eq!(listed.len(), 62);
        assert_eq!(&listed[..5], ["n1", "n2", "m1", "m2", "m3"]);
        assert_eq!(contents(store.list_messages("l2").unwrap()), vec!["elsewhere"]);
    }

    #[test]
    fn messages_can_be_edited_and_deleted_by_id() {
        let dir = tempdir().unwrap();
        let store = SledStore::open_path(dir.path()).unwrap();
        let first = GeneratedMessage::new("w1", "l1", Some("c1"), "Ola Ana");
        let second = GeneratedMessage::new("w1", "l1", Some("c1"), "Oi");
        store.insert_messages(&[first.clone(), second.clone()]).unwrap();

        let edited = store
            .update_message_content(&first.id, "Ola Ana, tudo bem?")
            .unwrap()
            .unwrap();
        assert_eq!(edited.id, first.id);
        assert_eq!(
            store.get_message(&first.id).unwrap().unwrap().content,
            "Ola Ana, tudo bem?"
        );
        assert_eq!(
            contents(store.list_messages("l1").unwrap()),
            vec!["Ola Ana, tudo bem?", "Oi"]
        );

        assert!(store.delete_message(&second.id).unwrap());
        assert!(!store.delete_message(&second.id).unwrap());
        assert_eq!(store.get_message(&second.id).unwrap(), None);
        assert_eq!(store.update_message_content(&second.id, "x").unwrap(), None);
        assert_eq!(store.list_messages("l1").unwrap().len(), 1);
    }

    #[test]
    fn lead_and_values_are_written_together() {
        let dir = tempdir().unwrap();
        let store = SledStore::open_path(dir.path()).unwrap();
        let lead = Lead::new("w1", "s1", "Ana");
        let values = vec![
            LeadCustomValue::new(&lead.id, "f1", Some("Retail")),
            LeadCustomValue::new(&lead.id, "f2", Some("50k")),
        ];
        store.put_lead_with_values(&lead, &values).unwrap();
        assert_eq!(store.get_lead(&lead.id).unwrap(), Some(lead.clone()));
        assert_eq!(store.list_custom_values(&lead.id).unwrap().len(), 2);

        let other = Lead::new("w1", "s1", "Bob");
        let foreign = vec![LeadCustomValue::new(&lead.id, "f1", Some("v"))];
        assert!(store.put_lead_with_values(&other, &foreign).is_err());
        let bad_field = vec![LeadCustomValue::new(&other.id, "f\u{1f}x", Some("v"))];
        assert!(matches!(
            store.put_lead_with_values(&other, &bad_field),
            Err(StoreError::InvalidKey(_))
        ));
        assert_eq!(store.get_lead(&other.id).unwrap(), None);
    }

    #[test]
    fn composite_keys_do_not_collide_on_slashes() {
        let dir = tempdir().unwrap();
        let store = SledStore::open_path(dir.path()).unwrap();

        store.add_member(&member("a", "b/c")).unwrap();
        assert!(store.is_member("a", "b/c").unwrap());
        assert!(!store.is_member("a/b", "c").unwrap());
        assert!(store.list_members("a/b").unwrap().is_empty());

        assert!(matches!(
            store.add_member(&member("a\u{1f}b", "c")),
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[test]
    fn workspace_listings_are_scoped_and_ordered() {
        let dir = tempdir().unwrap();
        let store = SledStore::open_path(dir.path()).unwrap();

        store.put_stage(&PipelineStage::new("w1", "Won", 3)).unwrap();
        store.put_stage(&PipelineStage::new("w1", "New", 1)).unwrap();
        store.put_stage(&PipelineStage::new("w2", "Other", 0)).unwrap();
        let names: Vec<String> = store
            .list_stages("w1")
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["New", "Won"]);

        let mut inactive = Campaign::new("w1", "Paused");
        inactive.active = false;
        store.put_campaign(&inactive).unwrap();
        let live = Campaign::new("w1", "Live");
        store.put_campaign(&live).unwrap();
        store.put_campaign(&Campaign::new("w2", "Foreign")).unwrap();
        let active = store.list_active_campaigns("w1").unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "Live");

        assert!(store.delete_campaign(&live.id).unwrap());
        assert!(!store.delete_campaign(&live.id).unwrap());
        assert!(store.list_active_campaigns("w1").unwrap().is_empty());

        let segment = LeadCustomField::new("w1", "Segment", FieldType::Select);
        store.put_custom_field(&segment).unwrap();
        assert_eq!(store.get_custom_field(&segment.id).unwrap(), Some(segment));
        assert_eq!(store.list_custom_fields("w1").unwrap().len(), 1);
        assert!(store.list_custom_fields("w2").unwrap().is_empty());
    }

    #[test]
    fn sessions_and_membership() {
        let dir = tempdir().unwrap();
        let store = SledStore::open_path(dir.path()).unwrap();

        store
            .put_session(&Session {
                token: "tok".into(),
                user_id: "u1".into(),
                created_at: Utc::now(),
            })
            .unwrap();
        store.add_member(&member("w1", "u1")).unwrap();

        assert_eq!(store.resolve_session("tok").unwrap().as_deref(), Some("u1"));
        assert_eq!(store.resolve_session("nope").unwrap(), None);
        assert!(store.is_member("w1", "u1").unwrap());
        assert!(!store.is_member("w2", "u1").unwrap());
        assert_eq!(store.list_members("w1").unwrap().len(), 1);
    }
}
