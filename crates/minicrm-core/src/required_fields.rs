//! Per-stage required fields. Checked by the gateway before a lead is saved into a stage;
//! generation never checks them.

use std::collections::HashMap;

use crate::model::{Lead, LeadCustomField, LeadCustomValue, StageRequiredField};

pub const CUSTOM_KEY_PREFIX: &str = "custom:";

fn standard_value<'a>(lead: &'a Lead, key: &str) -> Option<Option<&'a str>> {
    let value = match key {
        "name" => Some(lead.name.as_str()),
        "email" => lead.email.as_deref(),
        "phone" => lead.phone.as_deref(),
        "company" => lead.company.as_deref(),
        "job_title" => lead.job_title.as_deref(),
        "source" => lead.source.as_deref(),
        "notes" => lead.notes.as_deref(),
        "responsible_user_id" => lead.responsible_user_id.as_deref(),
        _ => return None,
    };
    Some(value)
}

fn standard_label(key: &str) -> &str {
    match key {
        "name" => "Name",
        "email" => "Email",
        "phone" => "Phone",
        "company" => "Company",
        "job_title" => "Job title",
        "source" => "Source",
        "notes" => "Notes",
        "responsible_user_id" => "Responsible user",
        other => other,
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

/// Labels of required fields that are empty for `lead` in `stage_id`, in requirement order.
/// Unknown standard keys are treated as missing.
pub fn missing_required_fields(
    lead: &Lead,
    stage_id: &str,
    requirements: &[StageRequiredField],
    custom_fields: &[LeadCustomField],
    custom_values: &[LeadCustomValue],
) -> Vec<String> {
    let values: HashMap<&str, Option<&str>> = custom_values
        .iter()
        .filter(|v| v.lead_id == lead.id)
        .map(|v| (v.field_id.as_str(), v.value.as_deref()))
        .collect();

    let mut missing = Vec::new();
    for req in requirements.iter().filter(|r| r.stage_id == stage_id) {
        let key = req.field_key.trim();
        if let Some(field_id) = key.strip_prefix(CUSTOM_KEY_PREFIX) {
            if is_blank(values.get(field_id).copied().flatten()) {
                let label = match custom_fields.iter().find(|f| f.id == field_id) {
                    Some(f) => format!("{} (custom)", f.name),
                    None => format!("Field {}", field_id),
                };
                missing.push(label);
            }
            continue;
        }

        let value = standard_value(lead, key).flatten();
        if is_blank(value) {
            missing.push(standard_label(key).to_string());
        }
    }
    missing
}
