//! OpenAPI specification and Swagger UI configuration.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Roster Portal API",
        version = "0.1.0",
        description = "On-call duty roster portal.\n\nRecipient import, email campaigns with background dispatch, delivery tracking through the Brevo webhook, and duty registrations.",
    ),
    tags(
        (name = "Auth", description = "Admin sessions"),
        (name = "Imports", description = "Spreadsheet upload and column mapping"),
        (name = "Campaigns", description = "Draft campaigns, recipients and previews"),
        (name = "Dispatch", description = "Launch, targeted relaunch and run status"),
        (name = "Webhook", description = "Provider delivery events"),
        (name = "Registrations", description = "Duty registrations and their tracked emails"),
        (name = "Documents", description = "Attachable documents"),
        (name = "Operations", description = "Health, readiness, and liveness probes"),
    ),
    paths(
        // Auth
        roster_management::handlers::handle_login,
        roster_management::handlers::handle_logout,
        // Imports
        roster_management::handlers::upload_recipients,
        roster_management::handlers::remap_upload,
        // Campaigns
        roster_management::handlers::list_campaigns,
        roster_management::handlers::create_campaign,
        roster_management::handlers::get_campaign,
        roster_management::handlers::update_campaign,
        roster_management::handlers::delete_campaign,
        roster_management::handlers::list_recipients,
        roster_management::handlers::preview_campaign,
        // Dispatch
        roster_management::handlers::launch_campaign,
        roster_management::handlers::relaunch_campaign,
        roster_management::handlers::relaunch_stats,
        roster_management::handlers::run_status,
        // Webhook
        roster_management::handlers::brevo_webhook,
        roster_management::handlers::list_email_events,
        // Registrations
        roster_management::handlers::create_registration,
        roster_management::handlers::list_registrations,
        roster_management::handlers::send_registration_email,
        roster_management::handlers::run_reminders,
        // Documents
        roster_management::handlers::list_documents,
        // Operations
        crate::rest::health_check,
        crate::rest::readiness,
        crate::rest::liveness,
    ),
    components(schemas(
        // Domain types
        roster_core::types::Campaign,
        roster_core::types::CampaignStatus,
        roster_core::types::SendMode,
        roster_core::types::CampaignRecipient,
        roster_core::types::DeliveryStatus,
        roster_core::types::RelaunchTarget,
        roster_core::types::DeliveryEvent,
        roster_core::types::Registration,
        roster_core::types::RegistrationEmailKind,
        roster_core::types::EmailSlot,
        roster_core::templates::EmailTemplate,
        roster_core::templates::RenderedEmail,
        // Imports
        roster_import::ColumnMapping,
        roster_import::ImportStats,
        roster_import::PreviewRow,
        roster_import::UploadAnalysis,
        roster_import::RemapResult,
        // Channels
        roster_channels::BrevoWebhookPayload,
        roster_channels::DocumentInfo,
        // Management API models
        roster_management::models::LoginRequest,
        roster_management::models::LoginResponse,
        roster_management::models::ErrorResponse,
        roster_management::models::RemapRequest,
        roster_management::models::CreateCampaignRequest,
        roster_management::models::UpdateCampaignRequest,
        roster_management::models::CampaignDetail,
        roster_management::models::DeleteResponse,
        roster_management::models::LaunchRequest,
        roster_management::models::LaunchResponse,
        roster_management::models::RelaunchRequest,
        roster_management::models::RelaunchResponse,
        roster_management::models::RelaunchStats,
        roster_management::models::RunStatus,
        roster_management::models::WebhookAck,
        roster_management::models::RegistrationEmailResponse,
        roster_management::models::ReminderReport,
        roster_management::registrations::NewRegistration,
        // Operations
        crate::rest::HealthResponse,
    ))
)]
pub struct ApiDoc;
