//! Mini CRM core library.
//! Workspace-scoped records, stage-triggered campaigns and the outreach message pipeline.

pub mod auth;
pub mod completion;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod facts;
pub mod model;
pub mod orchestrator;
pub mod prompt;
pub mod required_fields;
pub mod response;
pub mod store;
pub mod triggers;

pub use auth::{bearer_token, AuthContext, Authenticator};
pub use completion::{ChatCompletionsProvider, CompletionProvider, ProviderError};
pub use config::{CrmConfig, GenerationSettings, ProviderSettings};
pub use dispatch::{dispatch_campaigns, CampaignOutcome, CampaignOutcomeView, DispatchReport};
pub use error::{GenerationError, GenerationResult};
pub use facts::{lead_facts, lead_facts_line};
pub use model::{
    Campaign, FieldType, GeneratedMessage, Lead, LeadCustomField, LeadCustomValue, MemberRole,
    PipelineStage, Session, StageRequiredField, Workspace, WorkspaceMember,
};
pub use orchestrator::MessageGenerator;
pub use prompt::build_prompt;
pub use required_fields::missing_required_fields;
pub use response::{extract_messages, sanitize_message, MAX_MESSAGES};
pub use store::{CrmStore, SledStore, StoreError, StoreResult};
pub use triggers::{match_campaigns, plan_lead_creation, plan_stage_move, TriggerPlan};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
