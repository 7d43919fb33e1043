//! HTTP surface: message generation, lead events, campaign CRUD and message edits.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, ConnectInfo, Path, State},
    http::{header::AUTHORIZATION, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};
use chrono::Utc;
use minicrm_core::{
    bearer_token, dispatch_campaigns, missing_required_fields, plan_lead_creation,
    plan_stage_move, AuthContext, Campaign, CampaignOutcomeView, CrmStore, DispatchReport,
    GeneratedMessage, GenerationError, Lead, LeadCustomField, LeadCustomValue, MessageGenerator,
    SledStore, StoreError,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SledStore>,
    pub generator: Arc<MessageGenerator>,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/generate-messages", post(generate_messages))
        .route("/leads", post(create_lead))
        .route("/leads/:id", put(update_lead))
        .route("/leads/:id/stage", post(move_lead))
        .route("/leads/:id/messages", get(list_messages))
        .route("/messages/:id", patch(edit_message).delete(delete_message))
        .route("/campaigns", post(create_campaign))
        .route("/campaigns/:id", put(update_campaign).delete(delete_campaign))
        .with_state(state)
        .layer(axum::middleware::from_fn(log_request))
}

async fn log_request(request: Request<Body>, next: Next) -> Response {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    tracing::info!(%method, path = %path, remote = %remote, status = response.status().as_u16(), "request");
    response
}

async fn health() -> &'static str {
    "OK"
}

// -- errors ------------------------------------------------------------------

/// JSON error body: `{"error", "kind", "retryable"}` plus variant extras.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: serde_json::Value,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!({ "error": message.into(), "kind": "validation", "retryable": false }),
        }
    }

    fn missing_fields(missing: Vec<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!({
                "error": format!("required fields are empty: {}", missing.join(", ")),
                "kind": "validation",
                "retryable": false,
                "missing": missing,
            }),
        }
    }
}

fn status_for(err: &GenerationError) -> StatusCode {
    match err {
        GenerationError::Validation(_) => StatusCode::BAD_REQUEST,
        GenerationError::Auth(_) => StatusCode::UNAUTHORIZED,
        GenerationError::Forbidden(_) => StatusCode::FORBIDDEN,
        GenerationError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        let mut body = json!({
            "error": err.to_string(),
            "kind": err.kind(),
            "retryable": err.is_retryable(),
        });
        if let Some(messages) = err.unsaved_messages() {
            body["messages"] = json!(messages);
        }
        Self {
            status: status_for(&err),
            body,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        if let StoreError::InvalidKey(_) = err {
            return Self::bad_request(err.to_string());
        }
        tracing::warn!(error = %err, "store failure");
        GenerationError::Lookup(err).into()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

fn caller_id(state: &AppState, headers: &HeaderMap) -> ApiResult<String> {
    let auth = state.generator.authenticator();
    Ok(auth.authenticate(bearer_token(authorization(headers))?)?)
}

/// Authenticate, load the record (404 when absent), then check membership of its workspace.
fn load_for_caller<T>(
    state: &AppState,
    headers: &HeaderMap,
    what: &str,
    load: impl FnOnce(&SledStore) -> Result<Option<T>, StoreError>,
    workspace_of: impl FnOnce(&T) -> &str,
) -> ApiResult<(T, AuthContext)> {
    let user_id = caller_id(state, headers)?;
    let record = load(state.store.as_ref())?
        .ok_or_else(|| GenerationError::NotFound(format!("{} not found", what)))?;
    let ctx = state
        .generator
        .authenticator()
        .authorize(&user_id, workspace_of(&record))?;
    Ok((record, ctx))
}

fn lead_for_caller(state: &AppState, headers: &HeaderMap, lead_id: &str) -> ApiResult<(Lead, AuthContext)> {
    load_for_caller(
        state,
        headers,
        "Lead",
        |store| store.get_lead(lead_id.trim()),
        |lead| lead.workspace_id.as_str(),
    )
}

fn ensure_stage_in_workspace(store: &SledStore, stage_id: &str, workspace_id: &str) -> ApiResult<()> {
    match store.get_stage(stage_id)? {
        Some(stage) if stage.workspace_id == workspace_id => Ok(()),
        _ => Err(ApiError::bad_request("stage does not belong to this workspace")),
    }
}

fn check_required_fields(
    store: &SledStore,
    lead: &Lead,
    stage_id: &str,
    values: &[LeadCustomValue],
) -> ApiResult<()> {
    let requirements = store.list_required_fields(stage_id)?;
    if requirements.is_empty() {
        return Ok(());
    }
    let fields = store.list_custom_fields(&lead.workspace_id)?;
    let missing = missing_required_fields(lead, stage_id, &requirements, &fields, values);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ApiError::missing_fields(missing))
    }
}

// -- generation --------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    lead_id: String,
    #[serde(default)]
    campaign_id: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    messages: Vec<String>,
}

async fn generate_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> ApiResult<Json<GenerateResponse>> {
    let Json(req) = body?;
    let messages = state
        .generator
        .generate(authorization(&headers), &req.lead_id, &req.campaign_id)
        .await?;
    Ok(Json(GenerateResponse { messages }))
}

// -- lead events -------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct DispatchView {
    summary: String,
    succeeded: usize,
    outcomes: Vec<CampaignOutcomeView>,
}

impl From<&DispatchReport> for DispatchView {
    fn from(report: &DispatchReport) -> Self {
        Self {
            summary: report.summary(),
            succeeded: report.succeeded(),
            outcomes: report.views(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LeadEventResponse {
    lead: Lead,
    dispatch: DispatchView,
}

#[derive(Debug, Deserialize)]
pub struct CustomValueInput {
    field_id: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLeadRequest {
    workspace_id: String,
    stage_id: String,
    name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    job_title: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    responsible_user_id: Option<String>,
    #[serde(default)]
    campaign_id: Option<String>,
    #[serde(default)]
    custom_values: Vec<CustomValueInput>,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn ensure_known_field(fields: &[LeadCustomField], field_id: &str) -> ApiResult<()> {
    if fields.iter().any(|f| f.id == field_id) {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!("unknown custom field {}", field_id)))
    }
}

async fn create_lead(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<CreateLeadRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<LeadEventResponse>)> {
    let Json(req) = body?;
    let ctx = state
        .generator
        .authenticator()
        .context_for(authorization(&headers), req.workspace_id.trim())?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    ensure_stage_in_workspace(&state.store, req.stage_id.trim(), &ctx.workspace_id)?;

    let mut lead = Lead::new(&ctx.workspace_id, req.stage_id.trim(), name);
    lead.email = trimmed(req.email);
    lead.phone = trimmed(req.phone);
    lead.company = trimmed(req.company);
    lead.job_title = trimmed(req.job_title);
    lead.source = trimmed(req.source);
    lead.notes = trimmed(req.notes);
    lead.responsible_user_id = trimmed(req.responsible_user_id);

    let fields = state.store.list_custom_fields(&ctx.workspace_id)?;
    let mut values = Vec::new();
    for input in req.custom_values {
        ensure_known_field(&fields, &input.field_id)?;
        if let Some(value) = trimmed(input.value) {
            values.push(LeadCustomValue::new(&lead.id, &input.field_id, Some(&value)));
        }
    }
    check_required_fields(&state.store, &lead, &lead.stage_id, &values)?;

    let campaigns = state.store.list_active_campaigns(&ctx.workspace_id)?;
    let plan = plan_lead_creation(&lead, &campaigns, req.campaign_id.as_deref());
    if let Some(ids) = plan.assign_campaign_ids {
        lead.campaign_ids = Some(ids);
    }

    state.store.put_lead_with_values(&lead, &values)?;
    tracing::info!(lead_id = %lead.id, workspace_id = %ctx.workspace_id, campaigns = plan.campaigns.len(), "lead created");

    let report = dispatch_campaigns(&state.generator, &ctx, &lead.id, &plan.campaigns).await;
    Ok((
        StatusCode::CREATED,
        Json(LeadEventResponse {
            dispatch: DispatchView::from(&report),
            lead,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct MoveLeadRequest {
    stage_id: String,
}

async fn move_lead(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<MoveLeadRequest>, JsonRejection>,
) -> ApiResult<Json<LeadEventResponse>> {
    let Json(req) = body?;
    let (mut lead, ctx) = lead_for_caller(&state, &headers, &lead_id)?;
    let target = req.stage_id.trim();

    ensure_stage_in_workspace(&state.store, target, &lead.workspace_id)?;
    if lead.stage_id == target {
        return Ok(Json(LeadEventResponse {
            lead,
            dispatch: DispatchView::from(&DispatchReport::default()),
        }));
    }

    let values = state.store.list_custom_values(&lead.id)?;
    check_required_fields(&state.store, &lead, target, &values)?;

    let campaigns = state.store.list_active_campaigns(&lead.workspace_id)?;
    let plan = plan_stage_move(&lead, target, &campaigns);
    if let Some(ids) = plan.assign_campaign_ids {
        lead.campaign_ids = Some(ids);
    }
    lead.stage_id = target.to_string();
    lead.updated_at = Utc::now();
    state.store.put_lead(&lead)?;
    tracing::info!(lead_id = %lead.id, stage_id = target, campaigns = plan.campaigns.len(), "lead moved");

    let report = dispatch_campaigns(&state.generator, &ctx, &lead.id, &plan.campaigns).await;
    Ok(Json(LeadEventResponse {
        dispatch: DispatchView::from(&report),
        lead,
    }))
}

/// Absent attributes are left alone; a blank string clears one.
#[derive(Debug, Deserialize)]
pub struct UpdateLeadRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    job_title: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    responsible_user_id: Option<String>,
    #[serde(default)]
    custom_values: Vec<CustomValueInput>,
}

fn apply(slot: &mut Option<String>, update: Option<String>) {
    if update.is_some() {
        *slot = trimmed(update);
    }
}

/// Edit attributes and upsert custom values. Stage changes go through `/leads/:id/stage`.
async fn update_lead(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<UpdateLeadRequest>, JsonRejection>,
) -> ApiResult<Json<Lead>> {
    let Json(req) = body?;
    let (mut lead, ctx) = lead_for_caller(&state, &headers, &lead_id)?;

    if let Some(name) = req.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::bad_request("name is required"));
        }
        lead.name = name.to_string();
    }
    apply(&mut lead.email, req.email);
    apply(&mut lead.phone, req.phone);
    apply(&mut lead.company, req.company);
    apply(&mut lead.job_title, req.job_title);
    apply(&mut lead.source, req.source);
    apply(&mut lead.notes, req.notes);
    apply(&mut lead.responsible_user_id, req.responsible_user_id);

    let fields = state.store.list_custom_fields(&lead.workspace_id)?;
    let mut values = state.store.list_custom_values(&lead.id)?;
    let mut changed = Vec::new();
    for input in req.custom_values {
        ensure_known_field(&fields, &input.field_id)?;
        let value = trimmed(input.value);
        let row = match values.iter_mut().find(|v| v.field_id == input.field_id) {
            Some(existing) => {
                existing.value = value;
                existing.clone()
            }
            None => {
                let row = LeadCustomValue::new(&lead.id, &input.field_id, value.as_deref());
                values.push(row.clone());
                row
            }
        };
        changed.push(row);
    }
    check_required_fields(&state.store, &lead, &lead.stage_id, &values)?;

    lead.updated_at = Utc::now();
    state.store.put_lead_with_values(&lead, &changed)?;
    tracing::info!(lead_id = %lead.id, user_id = %ctx.user_id, values = changed.len(), "lead updated");
    Ok(Json(lead))
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    messages: Vec<GeneratedMessage>,
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<MessagesResponse>> {
    let (lead, _ctx) = lead_for_caller(&state, &headers, &lead_id)?;
    let messages = state.store.list_messages(&lead.id)?;
    Ok(Json(MessagesResponse { messages }))
}

// -- message edits -----------------------------------------------------------

fn message_for_caller(
    state: &AppState,
    headers: &HeaderMap,
    message_id: &str,
) -> ApiResult<(GeneratedMessage, AuthContext)> {
    load_for_caller(
        state,
        headers,
        "Message",
        |store| store.get_message(message_id.trim()),
        |message| message.workspace_id.as_str(),
    )
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    #[serde(default)]
    content: String,
}

async fn edit_message(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<EditMessageRequest>, JsonRejection>,
) -> ApiResult<Json<GeneratedMessage>> {
    let Json(req) = body?;
    let (message, ctx) = message_for_caller(&state, &headers, &message_id)?;
    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::bad_request("content is required"));
    }
    let updated = state
        .store
        .update_message_content(&message.id, content)?
        .ok_or_else(|| GenerationError::NotFound("Message not found".into()))?;
    tracing::info!(message_id = %updated.id, user_id = %ctx.user_id, "message edited");
    Ok(Json(updated))
}

async fn delete_message(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let (message, ctx) = message_for_caller(&state, &headers, &message_id)?;
    state.store.delete_message(&message.id)?;
    tracing::info!(message_id = %message.id, user_id = %ctx.user_id, "message deleted");
    Ok(StatusCode::NO_CONTENT)
}

// -- campaigns ---------------------------------------------------------------

fn campaign_for_caller(
    state: &AppState,
    headers: &HeaderMap,
    campaign_id: &str,
) -> ApiResult<(Campaign, AuthContext)> {
    load_for_caller(
        state,
        headers,
        "Campaign",
        |store| store.get_campaign(campaign_id.trim()),
        |campaign| campaign.workspace_id.as_str(),
    )
}

#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    workspace_id: String,
    name: String,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    active: Option<bool>,
    #[serde(default)]
    trigger_stage_id: Option<String>,
}

async fn create_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<CreateCampaignRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Campaign>)> {
    let Json(req) = body?;
    let ctx = state
        .generator
        .authenticator()
        .context_for(authorization(&headers), req.workspace_id.trim())?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    let mut campaign = Campaign::new(&ctx.workspace_id, name);
    campaign.context = trimmed(req.context);
    campaign.prompt = trimmed(req.prompt);
    campaign.active = req.active.unwrap_or(true);
    campaign.trigger_stage_id = trimmed(req.trigger_stage_id);
    if let Some(stage_id) = &campaign.trigger_stage_id {
        ensure_stage_in_workspace(&state.store, stage_id, &ctx.workspace_id)?;
    }

    state.store.put_campaign(&campaign)?;
    tracing::info!(campaign_id = %campaign.id, workspace_id = %ctx.workspace_id, "campaign created");
    Ok((StatusCode::CREATED, Json(campaign)))
}

/// Absent fields are left alone; a blank string clears an optional one.
#[derive(Debug, Deserialize)]
pub struct UpdateCampaignRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    active: Option<bool>,
    #[serde(default)]
    trigger_stage_id: Option<String>,
}

async fn update_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<UpdateCampaignRequest>, JsonRejection>,
) -> ApiResult<Json<Campaign>> {
    let Json(req) = body?;
    let (mut campaign, ctx) = campaign_for_caller(&state, &headers, &campaign_id)?;

    if let Some(name) = req.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::bad_request("name is required"));
        }
        campaign.name = name.to_string();
    }
    apply(&mut campaign.context, req.context);
    apply(&mut campaign.prompt, req.prompt);
    apply(&mut campaign.trigger_stage_id, req.trigger_stage_id);
    if let Some(active) = req.active {
        campaign.active = active;
    }
    if let Some(stage_id) = &campaign.trigger_stage_id {
        ensure_stage_in_workspace(&state.store, stage_id, &campaign.workspace_id)?;
    }

    state.store.put_campaign(&campaign)?;
    tracing::info!(campaign_id = %campaign.id, user_id = %ctx.user_id, "campaign updated");
    Ok(Json(campaign))
}

async fn delete_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let (campaign, ctx) = campaign_for_caller(&state, &headers, &campaign_id)?;
    state.store.delete_campaign(&campaign.id)?;
    tracing::info!(campaign_id = %campaign.id, user_id = %ctx.user_id, "campaign deleted");
    Ok(StatusCode::NO_CONTENT)
}
