//! Management API router: admin routes behind the session middleware, plus
//! the public login, signup and provider webhook endpoints.

use crate::auth;
use crate::handlers::{self, ManagementState};
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

/// Slack on top of the spreadsheet size limit for multipart framing.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the management router. Returns a Router that should be merged
/// into the main app.
pub fn management_router(state: ManagementState) -> Router {
    let upload_limit = state.importer.max_bytes() + MULTIPART_OVERHEAD;
    let require_admin = middleware::from_fn_with_state(state.auth.clone(), auth::require_admin);

    Router::new()
        // Session
        .route("/api/logout", post(handlers::handle_logout))
        // Imports
        .route(
            "/api/campaigns/upload",
            post(handlers::upload_recipients).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/campaigns/remap", post(handlers::remap_upload))
        // Campaigns
        .route("/api/campaigns", get(handlers::list_campaigns).post(handlers::create_campaign))
        .route(
            "/api/campaigns/:id",
            get(handlers::get_campaign)
                .put(handlers::update_campaign)
                .delete(handlers::delete_campaign),
        )
        .route("/api/campaigns/:id/recipients", get(handlers::list_recipients))
        .route("/api/campaigns/:id/preview", post(handlers::preview_campaign))
        // Dispatch
        .route("/api/campaigns/:id/launch", post(handlers::launch_campaign))
        .route("/api/campaigns/:id/relaunch", post(handlers::relaunch_campaign))
        .route("/api/campaigns/:id/relaunch-stats", get(handlers::relaunch_stats))
        .route("/api/campaigns/:id/run", get(handlers::run_status))
        // Tracking
        .route("/api/email-events", get(handlers::list_email_events))
        // Registrations
        .route("/api/registrations", get(handlers::list_registrations))
        .route("/api/registrations/:id/emails/:kind", post(handlers::send_registration_email))
        .route("/api/reminders/run", post(handlers::run_reminders))
        // Documents
        .route("/api/documents", get(handlers::list_documents))
        .route_layer(require_admin)
        // Public
        .route("/api/login", post(handlers::handle_login))
        .route("/api/webhook/brevo", post(handlers::brevo_webhook))
        .route("/api/registrations", post(handlers::create_registration))
        .with_state(state)
}
