//! Brevo webhook payload and the mapping from provider event names to
//! delivery statuses.

use roster_core::types::DeliveryStatus;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Transactional webhook body. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct BrevoWebhookPayload {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "message-id", default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub ts_epoch: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl BrevoWebhookPayload {
    /// First tag, which carries the `campagne-{id}` marker for campaign mail.
    pub fn tag(&self) -> Option<&str> {
        self.tags.first().map(String::as_str)
    }

    pub fn kind(&self) -> ProviderEvent {
        ProviderEvent::parse(&self.event)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    Delivered,
    Opened,
    Clicked,
    HardBounce,
    SoftBounce,
    Blocked,
    Spam,
    Invalid,
    Error,
    Other(String),
}

impl ProviderEvent {
    pub fn parse(name: &str) -> Self {
        match name {
            "delivered" => ProviderEvent::Delivered,
            "opened" | "uniqueOpened" | "unique_opened" => ProviderEvent::Opened,
            "click" => ProviderEvent::Clicked,
            "hardBounce" | "hard_bounce" => ProviderEvent::HardBounce,
            "softBounce" | "soft_bounce" => ProviderEvent::SoftBounce,
            "blocked" => ProviderEvent::Blocked,
            "spam" => ProviderEvent::Spam,
            "invalid" | "invalid_email" => ProviderEvent::Invalid,
            "error" => ProviderEvent::Error,
            other => ProviderEvent::Other(other.to_string()),
        }
    }

    /// Internal status, or None for events that never change status.
    pub fn status(&self) -> Option<DeliveryStatus> {
        match self {
            ProviderEvent::Delivered => Some(DeliveryStatus::Delivered),
            ProviderEvent::Opened => Some(DeliveryStatus::Opened),
            ProviderEvent::Clicked => Some(DeliveryStatus::Clicked),
            ProviderEvent::HardBounce => Some(DeliveryStatus::BounceHard),
            ProviderEvent::SoftBounce => Some(DeliveryStatus::BounceSoft),
            ProviderEvent::Blocked => Some(DeliveryStatus::Blocked),
            ProviderEvent::Spam => Some(DeliveryStatus::Spam),
            ProviderEvent::Invalid => Some(DeliveryStatus::Invalid),
            ProviderEvent::Error => Some(DeliveryStatus::ProviderError),
            ProviderEvent::Other(_) => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_deserializes_dashed_message_id() {
        let payload: BrevoWebhookPayload = serde_json::from_str(
            r#"{"event":"opened","email":"a@example.fr","message-id":"<M1>","ts_epoch":1700000000000,"tags":["campagne-3"]}"#,
        )
        .unwrap();
        assert_eq!(payload.message_id.as_deref(), Some("<M1>"));
        assert_eq!(payload.tag(), Some("campagne-3"));
        assert_eq!(payload.kind(), ProviderEvent::Opened);
        assert!(payload.reason.is_none());
    }

    #[test]
    fn test_empty_payload_is_accepted() {
        let payload: BrevoWebhookPayload = serde_json::from_str("{}").unwrap();
        assert_eq!(payload.kind(), ProviderEvent::Other(String::new()));
        assert!(payload.tag().is_none());
    }

    #[test]
    fn test_vocabulary_mapping() {
        let cases = [
            ("delivered", Some(DeliveryStatus::Delivered)),
            ("uniqueOpened", Some(DeliveryStatus::Opened)),
            ("click", Some(DeliveryStatus::Clicked)),
            ("hardBounce", Some(DeliveryStatus::BounceHard)),
            ("softBounce", Some(DeliveryStatus::BounceSoft)),
            ("blocked", Some(DeliveryStatus::Blocked)),
            ("spam", Some(DeliveryStatus::Spam)),
            ("invalid", Some(DeliveryStatus::Invalid)),
            ("error", Some(DeliveryStatus::ProviderError)),
            ("unsubscribed", None),
            ("request", None),
        ];
        for (name, expected) in cases {
            assert_eq!(ProviderEvent::parse(name).status(), expected, "{name}");
        }
    }
}
