//! Outbound email and inbound provider-event plumbing.
//!
//! Email: Brevo transactional API behind the [`EmailSender`] trait.
//! Documents: attachment resolution behind [`DocumentStore`].
//! Events: Brevo webhook payloads mapped onto delivery statuses.

#![warn(clippy::unwrap_used)]

pub mod documents;
pub mod email;
pub mod events;

pub use documents::{DocumentInfo, DocumentLibrary, DocumentStore};
pub use email::{BrevoClient, CaptureSender, EmailSender, OutboundEmail, SendReceipt};
pub use events::{BrevoWebhookPayload, ProviderEvent};
