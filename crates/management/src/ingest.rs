//! Delivery-event ingestion: provider webhook → event log → registration
//! slots and campaign recipients.
//!
//! Status progress is monotonic. Once a recipient is opened or clicked, a
//! late delivered/bounce notification no longer changes its status, and a
//! clicked recipient never goes back to opened.

use crate::event_log::EventLog;
use crate::registrations::{MatchedSlot, RegistrationStore};
use crate::store::{CampaignStore, MatchedRecipient};
use chrono::{DateTime, Utc};
use roster_channels::{BrevoWebhookPayload, ProviderEvent};
use roster_core::types::{CampaignRecipient, DeliveryStatus};
use std::sync::Arc;
use tracing::{debug, info};

/// What a single webhook notification changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    pub event_id: u64,
    pub status: Option<DeliveryStatus>,
    pub registration: Option<MatchedSlot>,
    pub recipient: Option<MatchedRecipient>,
}

/// Apply a provider event to a campaign recipient. Returns false when the
/// row was left untouched.
pub fn apply_to_recipient(recipient: &mut CampaignRecipient, event: &ProviderEvent, at: DateTime<Utc>) -> bool {
    match event {
        ProviderEvent::Clicked => {
            recipient.status = DeliveryStatus::Clicked;
            recipient.click_count += 1;
        }
        ProviderEvent::Opened => {
            recipient.open_count += 1;
            if recipient.status != DeliveryStatus::Clicked {
                recipient.status = DeliveryStatus::Opened;
            }
        }
        other => {
            let Some(status) = other.status() else {
                return false;
            };
            if recipient.status.is_engaged() {
                return false;
            }
            recipient.status = status;
        }
    }
    recipient.last_activity_at = Some(at);
    true
}

pub struct DeliveryIngestor {
    store: Arc<CampaignStore>,
    registrations: Arc<RegistrationStore>,
    log: Arc<EventLog>,
}

impl DeliveryIngestor {
    pub fn new(store: Arc<CampaignStore>, registrations: Arc<RegistrationStore>, log: Arc<EventLog>) -> Self {
        Self {
            store,
            registrations,
            log,
        }
    }

    /// Record and apply one notification. Never fails: whatever cannot be
    /// matched is logged and left alone.
    pub fn ingest(&self, payload: &BrevoWebhookPayload, raw: serde_json::Value) -> IngestOutcome {
        let logged = self.log.append(payload, raw);
        let event = payload.kind();
        let status = event.status();

        metrics::counter!("webhook.events", "event" => payload.event.clone()).increment(1);

        let mut outcome = IngestOutcome {
            event_id: logged.id,
            status,
            ..IngestOutcome::default()
        };

        let Some(status) = status else {
            debug!(event = %payload.event, "Ignoring provider event without status mapping");
            return outcome;
        };
        let message_id = match payload.message_id.as_deref() {
            Some(id) if !id.is_empty() && !payload.email.is_empty() => id,
            _ => {
                debug!(event = %payload.event, "Provider event without message id or email");
                return outcome;
            }
        };

        outcome.registration = self.registrations.apply_event(message_id, status);
        outcome.recipient = self
            .store
            .update_by_message_id(message_id, |recipient| apply_to_recipient(recipient, &event, Utc::now()));

        match (&outcome.registration, &outcome.recipient) {
            (None, None) => {
                metrics::counter!("webhook.unmatched").increment(1);
                debug!(message_id, event = %payload.event, "No tracked email for message id");
            }
            (_, Some(matched)) => info!(
                message_id,
                event = %payload.event,
                campaign_id = matched.campaign_id,
                recipient_id = matched.recipient_id,
                status = %matched.status,
                changed = matched.changed,
                "Campaign recipient updated from webhook"
            ),
            (Some(slot), None) => info!(
                message_id,
                event = %payload.event,
                registration_id = slot.registration_id,
                kind = ?slot.kind,
                changed = slot.changed,
                "Registration email updated from webhook"
            ),
        }

        outcome
    }
}
