//! Stage-entry campaign triggers.
//!
//! A campaign fires for a stage when it is active and its `trigger_stage_id` is that stage.
//! A lead with an explicit campaign association only fires campaigns inside that association.
//! A lead without one picks up the matched campaigns as its association (first assignment sticks).

use crate::model::{Campaign, Lead};

/// Campaigns that fire when a lead enters `stage_id`, in input order.
pub fn match_campaigns<'a>(
    stage_id: &str,
    campaigns: &'a [Campaign],
    lead_campaign_ids: &[&str],
) -> Vec<&'a Campaign> {
    campaigns
        .iter()
        .filter(|c| c.active && c.trigger_stage_id.as_deref() == Some(stage_id))
        .filter(|c| lead_campaign_ids.is_empty() || lead_campaign_ids.contains(&c.id.as_str()))
        .collect()
}

/// What a stage transition (or lead creation) should do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerPlan {
    /// Campaigns to generate messages for.
    pub campaigns: Vec<Campaign>,
    /// New campaign association to record on the lead. `None` leaves it unchanged.
    pub assign_campaign_ids: Option<Vec<String>>,
}

impl TriggerPlan {
    pub fn is_empty(&self) -> bool {
        self.campaigns.is_empty() && self.assign_campaign_ids.is_none()
    }
}

/// Plan for moving `lead` into `target_stage_id`. Moving into the current stage does nothing.
pub fn plan_stage_move(lead: &Lead, target_stage_id: &str, campaigns: &[Campaign]) -> TriggerPlan {
    if lead.stage_id == target_stage_id {
        return TriggerPlan::default();
    }

    let associated = lead.associated_campaign_ids();
    let fired: Vec<Campaign> = match_campaigns(target_stage_id, campaigns, &associated)
        .into_iter()
        .cloned()
        .collect();

    let assign_campaign_ids = if associated.is_empty() && !fired.is_empty() {
        Some(fired.iter().map(|c| c.id.clone()).collect())
    } else {
        None
    };

    TriggerPlan {
        campaigns: fired,
        assign_campaign_ids,
    }
}

/// Plan for a freshly created lead: trigger matches for its initial stage plus an explicitly
/// selected campaign. The selection must be active and in the lead's workspace; duplicates collapse.
/// Only trigger matches are recorded as the lead's association; the selection fires once.
pub fn plan_lead_creation(
    lead: &Lead,
    campaigns: &[Campaign],
    selected_campaign_id: Option<&str>,
) -> TriggerPlan {
    let associated = lead.associated_campaign_ids();
    let mut fired: Vec<Campaign> = match_campaigns(&lead.stage_id, campaigns, &associated)
        .into_iter()
        .cloned()
        .collect();

    let assign_campaign_ids = if associated.is_empty() && !fired.is_empty() {
        Some(fired.iter().map(|c| c.id.clone()).collect())
    } else {
        None
    };

    if let Some(selected) = selected_campaign_id.map(str::trim).filter(|s| !s.is_empty()) {
        let already = fired.iter().any(|c| c.id == selected);
        let chosen = campaigns
            .iter()
            .find(|c| c.id == selected && c.active && c.workspace_id == lead.workspace_id);
        if let (false, Some(c)) = (already, chosen) {
            fired.push(c.clone());
        }
    }

    TriggerPlan {
        campaigns: fired,
        assign_campaign_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign(id: &str, active: bool, trigger: Option<&str>) -> Campaign {
        let mut c = Campaign::new("w1", id);
        c.id = id.to_string();
        c.active = active;
        c.trigger_stage_id = trigger.map(str::to_string);
        c
    }

    fn ids(campaigns: &[&Campaign]) -> Vec<String> {
        campaigns.iter().map(|c| c.id.clone()).collect()
    }

    #[test]
    fn inactive_or_untriggered_campaigns_never_match() {
        let campaigns = vec![
            campaign("off", false, Some("s2")),
            campaign("manual", true, None),
            campaign("on", true, Some("s2")),
        ];
        assert_eq!(ids(&match_campaigns("s2", &campaigns, &[])), vec!["on"]);
        assert!(match_campaigns("s3", &campaigns, &[]).is_empty());
    }

    #[test]
    fn lead_association_narrows_matches() {
        let campaigns = vec![campaign("A", true, Some("s2")), campaign("B", true, Some("s2"))];
        assert_eq!(ids(&match_campaigns("s2", &campaigns, &["A"])), vec!["A"]);
        assert_eq!(ids(&match_campaigns("s2", &campaigns, &[])), vec!["A", "B"]);
        assert!(match_campaigns("s2", &campaigns, &["C"]).is_empty());
    }

    #[test]
    fn first_move_assigns_association_once() {
        let campaigns = vec![campaign("A", true, Some("s2")), campaign("B", true, Some("s2"))];
        let mut lead = Lead::new("w1", "s1", "Ana");

        let plan = plan_stage_move(&lead, "s2", &campaigns);
        assert_eq!(plan.campaigns.len(), 2);
        assert_eq!(plan.assign_campaign_ids, Some(vec!["A".to_string(), "B".to_string()]));

        lead.campaign_ids = plan.assign_campaign_ids;
        lead.stage_id = "s1".into();
        let again = plan_stage_move(&lead, "s2", &campaigns);
        assert_eq!(again.campaigns.len(), 2);
        assert_eq!(again.assign_campaign_ids, None);
    }

    #[test]
    fn explicit_association_is_respected_on_move() {
        let campaigns = vec![campaign("A", true, Some("s2")), campaign("B", true, Some("s2"))];
        let mut lead = Lead::new("w1", "s1", "Ana");
        lead.campaign_ids = Some(vec!["A".into()]);

        let plan = plan_stage_move(&lead, "s2", &campaigns);
        assert_eq!(plan.campaigns.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["A"]);
        assert_eq!(plan.assign_campaign_ids, None);
    }

    #[test]
    fn no_match_leaves_association_untouched() {
        let campaigns = vec![campaign("A", true, Some("s3"))];
        let lead = Lead::new("w1", "s1", "Ana");
        assert!(plan_stage_move(&lead, "s2", &campaigns).is_empty());
    }

    #[test]
    fn same_stage_move_is_a_no_op() {
        let campaigns = vec![campaign("A", true, Some("s1"))];
        let lead = Lead::new("w1", "s1", "Ana");
        assert!(plan_stage_move(&lead, "s1", &campaigns).is_empty());
    }

    #[test]
    fn creation_adds_selected_campaign_without_duplicates() {
        let campaigns = vec![
            campaign("A", true, Some("s1")),
            campaign("M", true, None),
            campaign("Off", false, None),
        ];
        let lead = Lead::new("w1", "s1", "Ana");

        let plan = plan_lead_creation(&lead, &campaigns, Some("M"));
        let fired: Vec<&str> = plan.campaigns.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(fired, vec!["A", "M"]);

        let plan = plan_lead_creation(&lead, &campaigns, Some("A"));
        assert_eq!(plan.campaigns.len(), 1);

        let plan = plan_lead_creation(&lead, &campaigns, Some("Off"));
        assert_eq!(plan.campaigns.len(), 1);
    }

    #[test]
    fn selected_campaign_is_not_recorded_as_association() {
        let campaigns = vec![campaign("M", true, None), campaign("A", true, Some("s2"))];
        let mut lead = Lead::new("w1", "s1", "Ana");

        let created = plan_lead_creation(&lead, &campaigns, Some("M"));
        let fired: Vec<&str> = created.campaigns.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(fired, vec!["M"]);
        assert_eq!(created.assign_campaign_ids, None);

        if let Some(ids) = created.assign_campaign_ids {
            lead.campaign_ids = Some(ids);
        }
        let moved = plan_stage_move(&lead, "s2", &campaigns);
        let fired: Vec<&str> = moved.campaigns.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(fired, vec!["A"]);
        assert_eq!(moved.assign_campaign_ids, Some(vec!["A".to_string()]));
    }

    #[test]
    fn creation_records_trigger_matches_only() {
        let campaigns = vec![campaign("A", true, Some("s1")), campaign("M", true, None)];
        let lead = Lead::new("w1", "s1", "Ana");
        let plan = plan_lead_creation(&lead, &campaigns, Some("M"));
        assert_eq!(plan.campaigns.len(), 2);
        assert_eq!(plan.assign_campaign_ids, Some(vec!["A".to_string()]));
    }
}
