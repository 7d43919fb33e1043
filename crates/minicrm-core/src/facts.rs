//! Lead facts: the descriptive context handed to the model.
//! Standard attributes first (fixed order), then custom fields in definition order.

use std::collections::{HashMap, HashSet};

use crate::model::{Lead, LeadCustomField, LeadCustomValue};

pub const FACT_SEPARATOR: &str = " | ";

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Labeled facts for every non-empty attribute. Blank values are omitted, never rendered empty.
pub fn lead_facts(
    lead: &Lead,
    fields: &[LeadCustomField],
    values: &[LeadCustomValue],
) -> Vec<String> {
    let standard = [
        ("Name", Some(lead.name.as_str())),
        ("Company", lead.company.as_deref()),
        ("Job title", lead.job_title.as_deref()),
        ("Email", lead.email.as_deref()),
        ("Phone", lead.phone.as_deref()),
        ("Source", lead.source.as_deref()),
    ];
    let mut facts: Vec<String> = standard
        .into_iter()
        .filter_map(|(label, value)| non_empty(value).map(|v| format!("{}: {}", label, v)))
        .collect();

    let by_field: HashMap<&str, &str> = values
        .iter()
        .filter(|v| v.lead_id == lead.id)
        .filter_map(|v| non_empty(v.value.as_deref()).map(|value| (v.field_id.as_str(), value)))
        .collect();

    let mut seen = HashSet::new();
    for field in fields {
        if !seen.insert(field.id.as_str()) {
            continue;
        }
        if let Some(value) = by_field.get(field.id.as_str()) {
            facts.push(format!("{}: {}", field.name.trim(), value));
        }
    }
    facts
}

/// Facts joined into the single "lead facts" line. Empty when the lead has nothing to say.
pub fn lead_facts_line(
    lead: &Lead,
    fields: &[LeadCustomField],
    values: &[LeadCustomValue],
) -> String {
    lead_facts(lead, fields, values).join(FACT_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldType;

    fn field(id: &str, name: &str) -> LeadCustomField {
        let mut f = LeadCustomField::new("w1", name, FieldType::Text);
        f.id = id.to_string();
        f
    }

    #[test]
    fn standard_facts_follow_fixed_order() {
        let mut lead = Lead::new("w1", "s1", "Ana");
        lead.source = Some("LinkedIn".into());
        lead.email = Some("ana@acme.io".into());
        lead.company = Some("Acme".into());
        lead.job_title = Some("CTO".into());
        lead.phone = Some("  ".into());

        assert_eq!(
            lead_facts_line(&lead, &[], &[]),
            "Name: Ana | Company: Acme | Job title: CTO | Email: ana@acme.io | Source: LinkedIn"
        );
    }

    #[test]
    fn custom_facts_come_after_standard_and_skip_blanks() {
        let mut lead = Lead::new("w1", "s1", "Ana");
        lead.id = "l1".into();
        let fields = vec![field("f1", "Segment"), field("f2", "Budget"), field("f3", "Region")];
        let values = vec![
            LeadCustomValue::new("l1", "f2", Some("50k")),
            LeadCustomValue::new("l1", "f1", Some("Retail")),
            LeadCustomValue::new("l1", "f3", None),
            LeadCustomValue::new("other", "f3", Some("South")),
        ];

        assert_eq!(
            lead_facts(&lead, &fields, &values),
            vec!["Name: Ana", "Segment: Retail", "Budget: 50k"]
        );
    }

    #[test]
    fn duplicate_field_definitions_emit_once() {
        let mut lead = Lead::new("w1", "s1", "Ana");
        lead.id = "l1".into();
        let fields = vec![field("f1", "Segment"), field("f1", "Segment")];
        let values = vec![LeadCustomValue::new("l1", "f1", Some("Retail"))];
        assert_eq!(lead_facts(&lead, &fields, &values).len(), 2);
    }

    #[test]
    fn lead_without_attributes_has_no_facts() {
        let lead = Lead::new("w1", "s1", "");
        assert_eq!(lead_facts_line(&lead, &[], &[]), "");
    }
}
