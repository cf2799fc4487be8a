//! Roster portal backend: campaign repository, dispatch engine, delivery
//! tracking, registrations and the admin REST API.
//!
//! Data stored in DashMap (development); swap to PostgreSQL for production.

#![warn(clippy::unwrap_used)]

pub mod auth;
pub mod campaigns;
pub mod dispatch;
pub mod event_log;
pub mod handlers;
pub mod ingest;
pub mod mailer;
pub mod models;
pub mod registrations;
pub mod router;
pub mod store;

pub use auth::AdminAuth;
pub use campaigns::CampaignService;
pub use dispatch::DispatchEngine;
pub use event_log::EventLog;
pub use handlers::ManagementState;
pub use ingest::{DeliveryIngestor, IngestOutcome};
pub use mailer::RegistrationMailer;
pub use registrations::{NewRegistration, RegistrationStore};
pub use router::management_router;
pub use store::CampaignStore;
