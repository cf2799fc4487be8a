//! Axum REST handlers for the roster management API.

use crate::auth::AdminAuth;
use crate::campaigns::CampaignService;
use crate::dispatch::DispatchEngine;
use crate::event_log::EventLog;
use crate::ingest::DeliveryIngestor;
use crate::mailer::RegistrationMailer;
use crate::models::*;
use crate::registrations::{NewRegistration, RegistrationStore};
use crate::store::CampaignStore;
use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use roster_channels::{BrevoWebhookPayload, DocumentInfo, DocumentLibrary, EmailSender};
use roster_core::templates::RenderedEmail;
use roster_core::types::*;
use roster_core::{AppConfig, RosterError};
use roster_import::{Importer, RemapResult, UploadAnalysis, UploadCache};
use std::sync::Arc;
use tracing::{info, warn};

/// Default and maximum page sizes for the raw event listing.
const EVENTS_DEFAULT_LIMIT: usize = 100;
const EVENTS_MAX_LIMIT: usize = 1000;

/// Shared management state.
#[derive(Clone)]
pub struct ManagementState {
    pub importer: Arc<Importer>,
    pub campaigns: Arc<CampaignService>,
    pub dispatch: DispatchEngine,
    pub ingestor: Arc<DeliveryIngestor>,
    pub events: Arc<EventLog>,
    pub registrations: Arc<RegistrationStore>,
    pub mailer: Arc<RegistrationMailer>,
    pub documents: Arc<DocumentLibrary>,
    pub auth: Arc<AdminAuth>,
    pub webhook_secret: Option<String>,
}

impl ManagementState {
    /// Wire every service from configuration around the given email sender
    /// and document library.
    pub fn new(config: &AppConfig, sender: Arc<dyn EmailSender>, documents: Arc<DocumentLibrary>) -> Self {
        let admin_email = config.email.admin_email.clone();
        let store = Arc::new(CampaignStore::new());
        let registrations = Arc::new(RegistrationStore::new());
        let events = Arc::new(EventLog::new());
        let importer = Arc::new(Importer::new(
            Arc::new(UploadCache::new(config.uploads.ttl_secs)),
            &config.uploads,
        ));

        Self {
            campaigns: Arc::new(CampaignService::new(store.clone(), importer.clone(), admin_email.clone())),
            dispatch: DispatchEngine::new(
                store.clone(),
                sender.clone(),
                documents.clone(),
                config.dispatch.clone(),
                admin_email.clone(),
            ),
            ingestor: Arc::new(DeliveryIngestor::new(store, registrations.clone(), events.clone())),
            mailer: Arc::new(RegistrationMailer::new(registrations.clone(), sender, admin_email)),
            auth: Arc::new(AdminAuth::new(&config.admin)),
            webhook_secret: config.webhook.secret.clone().filter(|s| !s.is_empty()),
            importer,
            events,
            registrations,
            documents,
        }
    }
}

fn forbidden() -> HandlerError {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorResponse {
            error: "forbidden".to_string(),
            message: "Incorrect admin password".to_string(),
        }),
    )
}

// ─── Auth ──────────────────────────────────────────────────────────────────

#[utoipa::path(
    post,
    path = "/api/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session opened", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
    )
)]
pub async fn handle_login(
    State(state): State<ManagementState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, HandlerError> {
    state.auth.login(&req).map(Json).map_err(error_response)
}

#[utoipa::path(
    post,
    path = "/api/logout",
    tag = "Auth",
    responses((status = 204, description = "Session closed"))
)]
pub async fn handle_logout(State(state): State<ManagementState>, headers: HeaderMap) -> StatusCode {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        state.auth.logout(token);
    }
    StatusCode::NO_CONTENT
}

// ─── Imports ───────────────────────────────────────────────────────────────

#[utoipa::path(
    post,
    path = "/api/campaigns/upload",
    tag = "Imports",
    request_body(content = Vec<u8>, content_type = "multipart/form-data", description = "Spreadsheet in the `file` field"),
    responses(
        (status = 200, description = "Upload analysed", body = UploadAnalysis),
        (status = 400, description = "Unreadable or empty spreadsheet", body = ErrorResponse),
    )
)]
pub async fn upload_recipients(
    State(state): State<ManagementState>,
    mut multipart: Multipart,
) -> Result<Json<UploadAnalysis>, HandlerError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| error_response(RosterError::Validation(format!("invalid multipart body: {e}"))))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload.xlsx").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| error_response(RosterError::Validation(format!("upload interrupted: {e}"))))?;
        return state
            .importer
            .analyze(&file_name, &bytes)
            .map(Json)
            .map_err(error_response);
    }
    Err(error_response(RosterError::Validation("no file provided".to_string())))
}

#[utoipa::path(
    post,
    path = "/api/campaigns/remap",
    tag = "Imports",
    request_body = RemapRequest,
    responses(
        (status = 200, description = "Stats recomputed", body = RemapResult),
        (status = 404, description = "Upload expired, re-upload required", body = ErrorResponse),
    )
)]
pub async fn remap_upload(
    State(state): State<ManagementState>,
    Json(req): Json<RemapRequest>,
) -> Result<Json<RemapResult>, HandlerError> {
    state
        .importer
        .remap(&req.upload_id, req.mapping)
        .map(Json)
        .map_err(error_response)
}

// ─── Campaigns ─────────────────────────────────────────────────────────────

#[utoipa::path(
    get,
    path = "/api/campaigns",
    tag = "Campaigns",
    responses((status = 200, description = "Campaigns, newest first", body = Vec<Campaign>))
)]
pub async fn list_campaigns(State(state): State<ManagementState>) -> Json<Vec<Campaign>> {
    Json(state.campaigns.list())
}

#[utoipa::path(
    post,
    path = "/api/campaigns",
    tag = "Campaigns",
    request_body = CreateCampaignRequest,
    responses(
        (status = 201, description = "Draft campaign created", body = Campaign),
        (status = 404, description = "Upload expired, re-upload required", body = ErrorResponse),
    )
)]
pub async fn create_campaign(
    State(state): State<ManagementState>,
    Json(req): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<Campaign>), HandlerError> {
    let campaign = state.campaigns.create(req).map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

#[utoipa::path(
    get,
    path = "/api/campaigns/{id}",
    tag = "Campaigns",
    params(("id" = u64, Path, description = "Campaign identifier")),
    responses(
        (status = 200, description = "Campaign with per-status counts", body = CampaignDetail),
        (status = 404, description = "Unknown campaign", body = ErrorResponse),
    )
)]
pub async fn get_campaign(
    State(state): State<ManagementState>,
    Path(id): Path<CampaignId>,
) -> Result<Json<CampaignDetail>, HandlerError> {
    let (campaign, status_counts) = state.campaigns.detail(id).map_err(error_response)?;
    Ok(Json(CampaignDetail {
        campaign,
        status_counts,
        running: state.dispatch.is_running(id),
    }))
}

#[utoipa::path(
    put,
    path = "/api/campaigns/{id}",
    tag = "Campaigns",
    params(("id" = u64, Path, description = "Campaign identifier")),
    request_body = UpdateCampaignRequest,
    responses(
        (status = 200, description = "Draft updated", body = Campaign),
        (status = 409, description = "Campaign is no longer a draft", body = ErrorResponse),
    )
)]
pub async fn update_campaign(
    State(state): State<ManagementState>,
    Path(id): Path<CampaignId>,
    Json(req): Json<UpdateCampaignRequest>,
) -> Result<Json<Campaign>, HandlerError> {
    state.campaigns.update(id, req).map(Json).map_err(error_response)
}

#[utoipa::path(
    delete,
    path = "/api/campaigns/{id}",
    tag = "Campaigns",
    params(("id" = u64, Path, description = "Campaign identifier")),
    responses(
        (status = 200, description = "Draft and recipients deleted", body = DeleteResponse),
        (status = 409, description = "Campaign is no longer a draft", body = ErrorResponse),
    )
)]
pub async fn delete_campaign(
    State(state): State<ManagementState>,
    Path(id): Path<CampaignId>,
) -> Result<Json<DeleteResponse>, HandlerError> {
    let recipients_removed = state.campaigns.delete(id).map_err(error_response)?;
    Ok(Json(DeleteResponse {
        deleted: true,
        recipients_removed,
    }))
}

#[utoipa::path(
    get,
    path = "/api/campaigns/{id}/recipients",
    tag = "Campaigns",
    params(("id" = u64, Path, description = "Campaign identifier"), RecipientQuery),
    responses(
        (status = 200, description = "At most 200 recipients, by name", body = Vec<CampaignRecipient>),
        (status = 400, description = "Unknown filter", body = ErrorResponse),
    )
)]
pub async fn list_recipients(
    State(state): State<ManagementState>,
    Path(id): Path<CampaignId>,
    Query(query): Query<RecipientQuery>,
) -> Result<Json<Vec<CampaignRecipient>>, HandlerError> {
    let filter: RecipientFilter = query
        .filter
        .as_deref()
        .unwrap_or("all")
        .parse()
        .map_err(|e: String| error_response(RosterError::Validation(e)))?;
    state
        .campaigns
        .recipients(id, filter)
        .map(Json)
        .map_err(error_response)
}

#[utoipa::path(
    post,
    path = "/api/campaigns/{id}/preview",
    tag = "Campaigns",
    params(("id" = u64, Path, description = "Campaign identifier")),
    responses((status = 200, description = "Email rendered for a sample recipient", body = RenderedEmail))
)]
pub async fn preview_campaign(
    State(state): State<ManagementState>,
    Path(id): Path<CampaignId>,
) -> Result<Json<RenderedEmail>, HandlerError> {
    state.campaigns.preview(id).map(Json).map_err(error_response)
}

// ─── Dispatch ──────────────────────────────────────────────────────────────

#[utoipa::path(
    post,
    path = "/api/campaigns/{id}/launch",
    tag = "Dispatch",
    params(("id" = u64, Path, description = "Campaign identifier")),
    request_body = LaunchRequest,
    responses(
        (status = 202, description = "Dispatch started in the background", body = LaunchResponse),
        (status = 403, description = "Incorrect admin password", body = ErrorResponse),
        (status = 409, description = "Campaign is not a draft or already running", body = ErrorResponse),
    )
)]
pub async fn launch_campaign(
    State(state): State<ManagementState>,
    Path(id): Path<CampaignId>,
    Json(req): Json<LaunchRequest>,
) -> Result<(StatusCode, Json<LaunchResponse>), HandlerError> {
    if !state.auth.verify_password(&req.password) {
        warn!(campaign_id = id, "Launch rejected: step-up password mismatch");
        return Err(forbidden());
    }
    let pending = state.dispatch.launch(id, req.mode).map_err(error_response)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(LaunchResponse {
            campaign_id: id,
            status: CampaignStatus::Running,
            mode: req.mode,
            pending,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/campaigns/{id}/relaunch",
    tag = "Dispatch",
    params(("id" = u64, Path, description = "Campaign identifier")),
    request_body = RelaunchRequest,
    responses(
        (status = 202, description = "Targeted recipients re-queued", body = RelaunchResponse),
        (status = 400, description = "Missing subject or body", body = ErrorResponse),
        (status = 403, description = "Incorrect admin password", body = ErrorResponse),
        (status = 409, description = "Campaign is not completed", body = ErrorResponse),
    )
)]
pub async fn relaunch_campaign(
    State(state): State<ManagementState>,
    Path(id): Path<CampaignId>,
    Json(req): Json<RelaunchRequest>,
) -> Result<(StatusCode, Json<RelaunchResponse>), HandlerError> {
    if !state.auth.verify_password(&req.password) {
        warn!(campaign_id = id, "Relaunch rejected: step-up password mismatch");
        return Err(forbidden());
    }
    let relaunched = state
        .dispatch
        .relaunch(id, req.target, &req.subject, &req.body_html)
        .map_err(error_response)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(RelaunchResponse {
            campaign_id: id,
            target: req.target,
            relaunched,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/campaigns/{id}/relaunch-stats",
    tag = "Dispatch",
    params(("id" = u64, Path, description = "Campaign identifier")),
    responses((status = 200, description = "Relaunch target sizes", body = RelaunchStats))
)]
pub async fn relaunch_stats(
    State(state): State<ManagementState>,
    Path(id): Path<CampaignId>,
) -> Result<Json<RelaunchStats>, HandlerError> {
    state.campaigns.relaunch_stats(id).map(Json).map_err(error_response)
}

#[utoipa::path(
    get,
    path = "/api/campaigns/{id}/run",
    tag = "Dispatch",
    params(("id" = u64, Path, description = "Campaign identifier")),
    responses((status = 200, description = "Dispatch run liveness", body = RunStatus))
)]
pub async fn run_status(
    State(state): State<ManagementState>,
    Path(id): Path<CampaignId>,
) -> Result<Json<RunStatus>, HandlerError> {
    let campaign = state.campaigns.get(id).map_err(error_response)?;
    Ok(Json(RunStatus {
        campaign_id: id,
        status: campaign.status,
        running: state.dispatch.is_running(id),
    }))
}

// ─── Webhook ───────────────────────────────────────────────────────────────

#[utoipa::path(
    post,
    path = "/api/webhook/brevo",
    tag = "Webhook",
    params(WebhookQuery),
    request_body = BrevoWebhookPayload,
    responses(
        (status = 200, description = "Event accepted", body = WebhookAck),
        (status = 401, description = "Shared secret mismatch", body = ErrorResponse),
    )
)]
pub async fn brevo_webhook(
    State(state): State<ManagementState>,
    Query(query): Query<WebhookQuery>,
    body: Bytes,
) -> Result<Json<WebhookAck>, HandlerError> {
    if let Some(expected) = &state.webhook_secret {
        if query.secret.as_deref() != Some(expected.as_str()) {
            metrics::counter!("webhook.unauthorized").increment(1);
            warn!("Webhook rejected: shared secret mismatch");
            return Err(error_response(RosterError::Unauthorized(
                "invalid webhook secret".to_string(),
            )));
        }
    }

    let raw: serde_json::Value = serde_json::from_slice(&body).unwrap_or_else(|e| {
        warn!(error = %e, "Webhook body is not JSON");
        serde_json::Value::String(String::from_utf8_lossy(&body).into_owned())
    });
    let payload: BrevoWebhookPayload = serde_json::from_value(raw.clone()).unwrap_or_else(|e| {
        warn!(error = %e, "Webhook body does not match the provider schema");
        BrevoWebhookPayload::default()
    });

    state.ingestor.ingest(&payload, raw);
    Ok(Json(WebhookAck { received: true }))
}

#[utoipa::path(
    get,
    path = "/api/email-events",
    tag = "Webhook",
    params(EventsQuery),
    responses((status = 200, description = "Most recent raw events first", body = Vec<DeliveryEvent>))
)]
pub async fn list_email_events(
    State(state): State<ManagementState>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<DeliveryEvent>> {
    let limit = query.limit.unwrap_or(EVENTS_DEFAULT_LIMIT).min(EVENTS_MAX_LIMIT);
    Json(state.events.recent(limit))
}

// ─── Registrations ─────────────────────────────────────────────────────────

#[utoipa::path(
    post,
    path = "/api/registrations",
    tag = "Registrations",
    request_body = NewRegistration,
    responses(
        (status = 201, description = "Registration recorded, confirmation sent", body = Registration),
        (status = 400, description = "Invalid registration", body = ErrorResponse),
        (status = 409, description = "Date full or already registered", body = ErrorResponse),
    )
)]
pub async fn create_registration(
    State(state): State<ManagementState>,
    Json(req): Json<NewRegistration>,
) -> Result<(StatusCode, Json<Registration>), HandlerError> {
    let registration = state.registrations.create(req).map_err(error_response)?;
    info!(
        registration_id = registration.id,
        duty_date = %registration.duty_date,
        "Duty registration recorded"
    );

    // A failed confirmation is recorded on the slot and can be resent.
    let _ = state
        .mailer
        .send(registration.id, RegistrationEmailKind::Confirmation)
        .await;
    let registration = state
        .registrations
        .get(registration.id)
        .unwrap_or(registration);
    Ok((StatusCode::CREATED, Json(registration)))
}

#[utoipa::path(
    get,
    path = "/api/registrations",
    tag = "Registrations",
    responses((status = 200, description = "Registrations by duty date", body = Vec<Registration>))
)]
pub async fn list_registrations(State(state): State<ManagementState>) -> Json<Vec<Registration>> {
    Json(state.registrations.list())
}

#[utoipa::path(
    post,
    path = "/api/registrations/{id}/emails/{kind}",
    tag = "Registrations",
    params(
        ("id" = u64, Path, description = "Registration identifier"),
        ("kind" = String, Path, description = "confirmation, reminder_j7 or reminder_j1"),
    ),
    responses(
        (status = 200, description = "Email sent and slot updated", body = RegistrationEmailResponse),
        (status = 404, description = "Unknown registration", body = ErrorResponse),
        (status = 500, description = "Provider rejected the email", body = ErrorResponse),
    )
)]
pub async fn send_registration_email(
    State(state): State<ManagementState>,
    Path((id, kind)): Path<(RegistrationId, String)>,
) -> Result<Json<RegistrationEmailResponse>, HandlerError> {
    let kind: RegistrationEmailKind = kind
        .parse()
        .map_err(|e: String| error_response(RosterError::Validation(e)))?;
    let slot = state.mailer.send(id, kind).await.map_err(error_response)?;
    Ok(Json(RegistrationEmailResponse {
        registration_id: id,
        kind,
        slot,
    }))
}

#[utoipa::path(
    post,
    path = "/api/reminders/run",
    tag = "Registrations",
    responses((status = 200, description = "Reminder sweep report", body = ReminderReport))
)]
pub async fn run_reminders(State(state): State<ManagementState>) -> Json<ReminderReport> {
    Json(state.mailer.run_reminders(Utc::now().date_naive()).await)
}

// ─── Documents ─────────────────────────────────────────────────────────────

#[utoipa::path(
    get,
    path = "/api/documents",
    tag = "Documents",
    responses((status = 200, description = "Attachable documents", body = Vec<DocumentInfo>))
)]
pub async fn list_documents(State(state): State<ManagementState>) -> Json<Vec<DocumentInfo>> {
    Json(state.documents.list())
}
