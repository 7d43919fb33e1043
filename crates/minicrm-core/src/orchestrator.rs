//! Message generation: authenticate, load, extract facts, prompt, complete, sanitize, persist.
//!
//! Stateless per call. Retrying a call generates fresh rows; nothing is deduplicated.

use std::sync::Arc;

use crate::auth::{bearer_token, AuthContext, Authenticator};
use crate::completion::CompletionProvider;
use crate::error::{GenerationError, GenerationResult};
use crate::facts::{lead_facts, FACT_SEPARATOR};
use crate::model::{Campaign, GeneratedMessage, Lead};
use crate::prompt::{build_prompt, DEFAULT_LANGUAGE};
use crate::response::extract_messages;
use crate::store::CrmStore;

pub struct MessageGenerator {
    store: Arc<dyn CrmStore>,
    provider: Arc<dyn CompletionProvider>,
    auth: Authenticator,
    language: String,
}

impl MessageGenerator {
    pub fn new(store: Arc<dyn CrmStore>, provider: Arc<dyn CompletionProvider>) -> Self {
        let auth = Authenticator::new(Arc::clone(&store));
        Self {
            store,
            provider,
            auth,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    /// Full request: `authorization` is the raw `Authorization` header value.
    ///
    /// Order: credential → lead → campaign → workspace match → membership → generation → storage.
    pub async fn generate(
        &self,
        authorization: Option<&str>,
        lead_id: &str,
        campaign_id: &str,
    ) -> GenerationResult<Vec<String>> {
        let token = bearer_token(authorization)?;
        let user_id = self.auth.authenticate(token)?;
        let (lead_id, campaign_id) = validate_ids(lead_id, campaign_id)?;
        self.ensure_provider()?;

        let (lead, campaign) = self.load_pair(lead_id, campaign_id)?;
        let ctx = self.auth.authorize(&user_id, &lead.workspace_id)?;
        self.run(&ctx, &lead, &campaign).await
    }

    /// Same pipeline for a caller already authorized for `ctx.workspace_id`.
    pub async fn generate_in_context(
        &self,
        ctx: &AuthContext,
        lead_id: &str,
        campaign_id: &str,
    ) -> GenerationResult<Vec<String>> {
        let (lead_id, campaign_id) = validate_ids(lead_id, campaign_id)?;
        self.ensure_provider()?;

        let (lead, campaign) = self.load_pair(lead_id, campaign_id)?;
        if lead.workspace_id != ctx.workspace_id {
            return Err(GenerationError::Forbidden(
                "lead is outside the authorized workspace".into(),
            ));
        }
        self.run(ctx, &lead, &campaign).await
    }

    fn ensure_provider(&self) -> GenerationResult<()> {
        if self.provider.is_configured() {
            Ok(())
        } else {
            Err(GenerationError::Config(
                "completion provider credential is missing".into(),
            ))
        }
    }

    fn load_pair(&self, lead_id: &str, campaign_id: &str) -> GenerationResult<(Lead, Campaign)> {
        let lead = self
            .store
            .get_lead(lead_id)?
            .ok_or_else(|| GenerationError::NotFound("Lead not found".into()))?;
        let campaign = self
            .store
            .get_campaign(campaign_id)?
            .ok_or_else(|| GenerationError::NotFound("Campaign not found".into()))?;

        if campaign.workspace_id != lead.workspace_id {
            tracing::warn!(
                lead_id,
                campaign_id,
                "campaign and lead belong to different workspaces"
            );
            return Err(GenerationError::Validation(
                "campaign and lead belong to different workspaces".into(),
            ));
        }
        Ok((lead, campaign))
    }

    async fn run(
        &self,
        ctx: &AuthContext,
        lead: &Lead,
        campaign: &Campaign,
    ) -> GenerationResult<Vec<String>> {
        let fields = self.store.list_custom_fields(&lead.workspace_id)?;
        let values = self.store.list_custom_values(&lead.id)?;
        let facts = lead_facts(lead, &fields, &values);
        let prompt = build_prompt(campaign, &facts.join(FACT_SEPARATOR), &self.language);

        tracing::info!(
            lead_id = %lead.id,
            campaign_id = %campaign.id,
            user_id = %ctx.user_id,
            fact_count = facts.len(),
            "generating outreach messages"
        );

        let raw = self.provider.generate(&prompt).await.map_err(|e| {
            tracing::warn!(lead_id = %lead.id, campaign_id = %campaign.id, error = %e, "completion failed");
            GenerationError::from(e)
        })?;

        let messages = extract_messages(&raw);
        if messages.is_empty() {
            tracing::warn!(
                lead_id = %lead.id,
                campaign_id = %campaign.id,
                raw_len = raw.len(),
                "completion had no usable messages"
            );
            return Err(GenerationError::EmptyResult);
        }

        let rows: Vec<GeneratedMessage> = messages
            .iter()
            .map(|content| {
                GeneratedMessage::new(&lead.workspace_id, &lead.id, Some(&campaign.id), content)
            })
            .collect();

        if let Err(source) = self.store.insert_messages(&rows) {
            tracing::warn!(lead_id = %lead.id, campaign_id = %campaign.id, error = %source, "saving generated messages failed");
            return Err(GenerationError::Storage { messages, source });
        }

        tracing::info!(
            lead_id = %lead.id,
            campaign_id = %campaign.id,
            count = messages.len(),
            "generated messages saved"
        );
        Ok(messages)
    }
}

fn validate_ids<'a>(lead_id: &'a str, campaign_id: &'a str) -> GenerationResult<(&'a str, &'a str)> {
    let lead_id = lead_id.trim();
    let campaign_id = campaign_id.trim();
    if lead_id.is_empty() || campaign_id.is_empty() {
        return Err(GenerationError::Validation(
            "lead_id and campaign_id are required".into(),
        ));
    }
    Ok((lead_id, campaign_id))
}
