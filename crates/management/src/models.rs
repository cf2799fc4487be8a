//! Request and response models for the roster management API.

use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use roster_core::types::*;
use roster_core::RosterError;
use roster_import::ColumnMapping;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::{IntoParams, ToSchema};

// ─── Auth ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: String,
    pub expires_at: DateTime<Utc>,
}

// ─── Errors ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub type HandlerError = (StatusCode, Json<ErrorResponse>);

/// Map a domain error onto its HTTP status and JSON body.
pub fn error_response(err: RosterError) -> HandlerError {
    let status = match &err {
        RosterError::Validation(_) | RosterError::Spreadsheet(_) => StatusCode::BAD_REQUEST,
        RosterError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        RosterError::NotFound(_) | RosterError::UploadExpired(_) => StatusCode::NOT_FOUND,
        RosterError::Conflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.code().to_string(),
            message: err.to_string(),
        }),
    )
}

// ─── Imports ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct RemapRequest {
    pub upload_id: String,
    pub mapping: ColumnMapping,
}

// ─── Campaigns ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCampaignRequest {
    pub upload_id: String,
    /// Falls back to the mapping cached with the upload.
    pub mapping: Option<ColumnMapping>,
    pub name: Option<String>,
    pub target_year: i32,
    #[serde(default)]
    pub signer: String,
    #[serde(default)]
    pub registration_link: String,
    pub subject: Option<String>,
    pub header_title: Option<String>,
    pub header_subtitle: Option<String>,
    pub color_primary: Option<String>,
    pub color_secondary: Option<String>,
    #[serde(default)]
    pub body_html: String,
    #[serde(default)]
    pub attachment_ids: Vec<DocumentId>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateCampaignRequest {
    pub name: Option<String>,
    pub target_year: Option<i32>,
    pub signer: Option<String>,
    pub registration_link: Option<String>,
    pub subject: Option<String>,
    pub header_title: Option<String>,
    pub header_subtitle: Option<String>,
    pub color_primary: Option<String>,
    pub color_secondary: Option<String>,
    pub body_html: Option<String>,
    pub attachment_ids: Option<Vec<DocumentId>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CampaignDetail {
    pub campaign: Campaign,
    /// Recipient count per delivery status.
    pub status_counts: BTreeMap<String, u64>,
    pub running: bool,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecipientQuery {
    /// `all`, `non_opened`, `opened_not_clicked` or a status name.
    pub filter: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteResponse {
    pub deleted: bool,
    pub recipients_removed: usize,
}

// ─── Dispatch ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct LaunchRequest {
    /// Admin password, re-checked before any email goes out.
    pub password: String,
    #[serde(default)]
    pub mode: SendMode,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LaunchResponse {
    pub campaign_id: CampaignId,
    pub status: CampaignStatus,
    pub mode: SendMode,
    pub pending: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RelaunchRequest {
    pub password: String,
    pub target: RelaunchTarget,
    pub subject: String,
    pub body_html: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RelaunchResponse {
    pub campaign_id: CampaignId,
    pub target: RelaunchTarget,
    pub relaunched: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RelaunchStats {
    pub non_opened: usize,
    pub opened_not_clicked: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RunStatus {
    pub campaign_id: CampaignId,
    pub status: CampaignStatus,
    pub running: bool,
}

// ─── Webhook ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WebhookQuery {
    pub secret: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

// ─── Registrations ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize, ToSchema)]
pub struct RegistrationEmailResponse {
    pub registration_id: RegistrationId,
    pub kind: RegistrationEmailKind,
    pub slot: EmailSlot,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReminderReport {
    pub due: usize,
    pub sent: usize,
    pub failed: usize,
}
