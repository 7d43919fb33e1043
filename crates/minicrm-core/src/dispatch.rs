//! Fan-out of one lead event to every fired campaign.
//!
//! All generations run concurrently and all outcomes are collected; one failure never cancels
//! or hides the others.

use futures_util::future::join_all;
use serde::Serialize;

use crate::auth::AuthContext;
use crate::error::GenerationError;
use crate::model::Campaign;
use crate::orchestrator::MessageGenerator;

#[derive(Debug)]
pub struct CampaignOutcome {
    pub campaign_id: String,
    pub campaign_name: String,
    pub result: Result<Vec<String>, GenerationError>,
}

/// Wire form of one outcome.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CampaignOutcomeView {
    pub campaign_id: String,
    pub campaign_name: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    pub retryable: bool,
}

impl CampaignOutcome {
    pub fn view(&self) -> CampaignOutcomeView {
        let (status, messages, error, kind, retryable) = match &self.result {
            Ok(messages) => ("generated", messages.clone(), None, None, false),
            Err(e) => (
                "failed",
                e.unsaved_messages().map(<[String]>::to_vec).unwrap_or_default(),
                Some(e.to_string()),
                Some(e.kind()),
                e.is_retryable(),
            ),
        };
        CampaignOutcomeView {
            campaign_id: self.campaign_id.clone(),
            campaign_name: self.campaign_name.clone(),
            status,
            messages,
            error,
            kind,
            retryable,
        }
    }
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<CampaignOutcome>,
}

impl DispatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &CampaignOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    /// e.g. `1 of 2 campaigns generated messages; campaign Follow-up failed: ...`
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} of {} campaigns generated messages",
            self.succeeded(),
            self.outcomes.len()
        );
        for failed in self.failures() {
            if let Err(e) = &failed.result {
                line.push_str(&format!("; campaign {} failed: {}", failed.campaign_name, e));
            }
        }
        line
    }

    pub fn views(&self) -> Vec<CampaignOutcomeView> {
        self.outcomes.iter().map(CampaignOutcome::view).collect()
    }
}

/// Generate for every campaign concurrently under one authorization context.
pub async fn dispatch_campaigns(
    generator: &MessageGenerator,
    ctx: &AuthContext,
    lead_id: &str,
    campaigns: &[Campaign],
) -> DispatchReport {
    let runs = campaigns.iter().map(|campaign| async move {
        let result = generator
            .generate_in_context(ctx, lead_id, &campaign.id)
            .await;
        CampaignOutcome {
            campaign_id: campaign.id.clone(),
            campaign_name: campaign.name.clone(),
            result,
        }
    });

    let report = DispatchReport {
        outcomes: join_all(runs).await,
    };
    if !report.outcomes.is_empty() {
        tracing::info!(lead_id, summary = %report.summary(), "campaign dispatch finished");
    }
    report
}
