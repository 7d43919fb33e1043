//! Outreach prompt: fixed instructions followed by the campaign/lead context.

use crate::model::Campaign;

pub const DEFAULT_LANGUAGE: &str = "Brazilian Portuguese";

const OUTPUT_EXAMPLE: &str = r#"{"messages": ["Hi! I noticed your team is growing fast and wanted to share how we help companies like yours.", "Hello, quick question: is improving outreach response rates a priority for your team this quarter?", "Hi there, would a 15-minute call next week be useful to see if this fits your goals?"]}"#;

fn instructions(language: &str) -> String {
    format!(
        "You are a sales development assistant. Write 2 to 3 short outreach messages in {language} for the lead described below.\n\
Rules:\n\
- Use only the facts given in the context. Never invent facts about the lead, the company or the offer.\n\
- Never use placeholders or bracketed tokens such as [Your Name], [Company], {{{{name}}}} or {{company}}.\n\
- Never mention the sender's own name and do not sign the messages.\n\
- If the lead's name is not provided, do not address the lead by name; open with a generic greeting instead.\n\
- Keep every message short, friendly and ready to send as is.\n\
- Reply with valid JSON only, exactly in the shape {{\"messages\": [string, string, string]}}, with no extra text.\n\
Example reply:\n\
{example}",
        language = language,
        example = OUTPUT_EXAMPLE,
    )
}

fn context_line(label: &str, value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| format!("{}: {}", label, v))
}

/// Assemble the full prompt. The campaign line is always present so the model stays instructable
/// even when context, template and facts are all empty.
pub fn build_prompt(campaign: &Campaign, lead_facts: &str, language: &str) -> String {
    let language = match language.trim() {
        "" => DEFAULT_LANGUAGE,
        l => l,
    };
    let campaign_name = match campaign.name.trim() {
        "" => "(unnamed campaign)",
        n => n,
    };

    let mut context = vec![format!("Campaign: {}", campaign_name)];
    context.extend(context_line("Campaign context", campaign.context.as_deref()));
    context.extend(context_line("Campaign instructions", campaign.prompt.as_deref()));
    context.extend(context_line("Lead facts", Some(lead_facts)));

    format!("{}\n\nContext:\n{}", instructions(language), context.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign() -> Campaign {
        let mut c = Campaign::new("w1", "Intro");
        c.context = Some("B2B SaaS outreach".into());
        c.prompt = Some("Mention the free trial".into());
        c
    }

    #[test]
    fn prompt_contains_instructions_then_context() {
        let prompt = build_prompt(&campaign(), "Name: Ana | Company: Acme", "English");

        assert!(prompt.contains("in English"));
        assert!(prompt.contains("[Your Name]"));
        assert!(prompt.contains("{{name}}"));
        assert!(prompt.contains(r#"{"messages": [string, string, string]}"#));
        assert!(prompt.contains("generic greeting"));

        let instructions_at = prompt.find("Rules:").unwrap();
        let context_at = prompt.find("Context:").unwrap();
        assert!(instructions_at < context_at);

        let tail = &prompt[context_at..];
        let campaign_at = tail.find("Campaign: Intro").unwrap();
        let ctx_at = tail.find("Campaign context: B2B SaaS outreach").unwrap();
        let tpl_at = tail.find("Campaign instructions: Mention the free trial").unwrap();
        let facts_at = tail.find("Lead facts: Name: Ana | Company: Acme").unwrap();
        assert!(campaign_at < ctx_at && ctx_at < tpl_at && tpl_at < facts_at);
    }

    #[test]
    fn empty_inputs_keep_campaign_line_only() {
        let mut c = Campaign::new("w1", "Intro");
        c.context = Some("   ".into());
        let prompt = build_prompt(&c, "", "English");

        let context = &prompt[prompt.find("Context:").unwrap()..];
        assert_eq!(context, "Context:\nCampaign: Intro");
    }

    #[test]
    fn blank_language_falls_back_to_default() {
        let prompt = build_prompt(&campaign(), "", " ");
        assert!(prompt.contains(DEFAULT_LANGUAGE));
    }
}
