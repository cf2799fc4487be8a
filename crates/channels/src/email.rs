//! Transactional email sending through the Brevo SMTP API.
//!
//! The provider only accepts mail for delivery; delivered/opened/clicked
//! tracking comes back later through the webhook (see [`crate::events`]).

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::Mutex;
use roster_core::config::EmailConfig;
use roster_core::types::{truncate_chars, Attachment};
use roster_core::{RosterError, RosterResult};
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Provider error bodies are cut to this many characters.
const ERROR_BODY_MAX: usize = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub cc: Option<String>,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<Attachment>,
    pub tags: Vec<String>,
}

/// Provider acknowledgement. The message id is what webhook events refer to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: Option<String>,
}

/// Email-send collaborator used by dispatch runs and registration mail.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> RosterResult<SendReceipt>;
}

#[derive(Debug, Deserialize)]
struct BrevoResponse {
    #[serde(rename = "messageId")]
    message_id: Option<String>,
}

pub struct BrevoClient {
    client: reqwest::Client,
    config: EmailConfig,
}

impl BrevoClient {
    pub fn new(config: EmailConfig) -> Self {
        if config.api_key.is_empty() {
            warn!("Brevo API key not configured, every send will be rejected by the provider");
        }
        info!(
            from = %config.from_email,
            api_url = %config.api_url,
            "Brevo email client initialized"
        );
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Build the `POST /v3/smtp/email` body.
    pub fn build_payload(&self, email: &OutboundEmail) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "sender": {
                "name": self.config.from_name,
                "email": self.config.from_email,
            },
            "to": [{ "email": email.to }],
            "subject": email.subject,
            "htmlContent": email.html,
        });

        if let Some(cc) = &email.cc {
            payload["cc"] = serde_json::json!([{ "email": cc }]);
        }
        if !email.attachments.is_empty() {
            payload["attachment"] = email
                .attachments
                .iter()
                .map(|a| serde_json::json!({ "name": a.name, "content": BASE64.encode(&a.content) }))
                .collect();
        }
        if !email.tags.is_empty() {
            payload["tags"] = serde_json::json!(email.tags);
        }
        payload
    }
}

#[async_trait]
impl EmailSender for BrevoClient {
    async fn send(&self, email: &OutboundEmail) -> RosterResult<SendReceipt> {
        let start = Instant::now();
        debug!(to = %email.to, subject = %email.subject, "Sending email via Brevo");

        let resp = self
            .client
            .post(&self.config.api_url)
            .header("api-key", &self.config.api_key)
            .json(&self.build_payload(email))
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await
            .map_err(|e| RosterError::EmailProvider(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            metrics::counter!("brevo.errors").increment(1);
            return Err(RosterError::EmailProvider(format!(
                "HTTP {}: {}",
                status.as_u16(),
                truncate_chars(&body, ERROR_BODY_MAX)
            )));
        }

        let body: BrevoResponse = resp
            .json()
            .await
            .map_err(|e| RosterError::EmailProvider(format!("unreadable response: {e}")))?;

        metrics::histogram!("brevo.request_latency_ms").record(start.elapsed().as_millis() as f64);
        Ok(SendReceipt {
            message_id: body.message_id,
        })
    }
}

/// In-memory sender that records every email and replays scripted outcomes.
/// Without a script every send succeeds with a fresh `<msg-N@capture>` id.
#[derive(Default)]
pub struct CaptureSender {
    sent: Mutex<Vec<OutboundEmail>>,
    script: Mutex<VecDeque<Result<String, String>>>,
}

impl CaptureSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next outcome: `Ok(message_id)` or `Err(provider error text)`.
    pub fn push_outcome(&self, outcome: Result<String, String>) {
        self.script.lock().push_back(outcome);
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl EmailSender for CaptureSender {
    async fn send(&self, email: &OutboundEmail) -> RosterResult<SendReceipt> {
        let attempt = {
            let mut sent = self.sent.lock();
            sent.push(email.clone());
            sent.len()
        };
        match self.script.lock().pop_front() {
            Some(Ok(message_id)) => Ok(SendReceipt {
                message_id: Some(message_id),
            }),
            Some(Err(reason)) => Err(RosterError::EmailProvider(reason)),
            None => Ok(SendReceipt {
                message_id: Some(format!("<msg-{attempt}@capture>")),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> BrevoClient {
        BrevoClient::new(EmailConfig {
            api_key: "test-key".to_string(),
            from_email: "garde@example.org".to_string(),
            from_name: "Gardes".to_string(),
            ..EmailConfig::default()
        })
    }

    #[test]
    fn test_payload_shape() {
        let email = OutboundEmail {
            to: "jean@example.fr".to_string(),
            cc: Some("admin@example.org".to_string()),
            subject: "Sujet".to_string(),
            html: "<p>x</p>".to_string(),
            attachments: vec![Attachment {
                name: "fiche.pdf".to_string(),
                content: b"abc".to_vec(),
            }],
            tags: vec!["campagne-7".to_string(), "relance".to_string()],
        };
        let payload = client().build_payload(&email);

        assert_eq!(payload["sender"]["email"], "garde@example.org");
        assert_eq!(payload["sender"]["name"], "Gardes");
        assert_eq!(payload["to"][0]["email"], "jean@example.fr");
        assert_eq!(payload["cc"][0]["email"], "admin@example.org");
        assert_eq!(payload["htmlContent"], "<p>x</p>");
        assert_eq!(payload["attachment"][0]["name"], "fiche.pdf");
        assert_eq!(payload["attachment"][0]["content"], "YWJj");
        assert_eq!(payload["tags"][1], "relance");
    }

    #[test]
    fn test_payload_omits_empty_optionals() {
        let payload = client().build_payload(&OutboundEmail {
            to: "jean@example.fr".to_string(),
            ..OutboundEmail::default()
        });
        assert!(payload.get("cc").is_none());
        assert!(payload.get("attachment").is_none());
        assert!(payload.get("tags").is_none());
    }

    #[tokio::test]
    async fn test_capture_sender_replays_script() {
        let sender = CaptureSender::new();
        sender.push_outcome(Ok("<m1>".to_string()));
        sender.push_outcome(Err("quota exceeded".to_string()));
        let email = OutboundEmail::default();

        assert_eq!(
            sender.send(&email).await.unwrap().message_id.as_deref(),
            Some("<m1>")
        );
        assert!(matches!(
            sender.send(&email).await,
            Err(RosterError::EmailProvider(reason)) if reason == "quota exceeded"
        ));
        assert_eq!(
            sender.send(&email).await.unwrap().message_id.as_deref(),
            Some("<msg-3@capture>")
        );
        assert_eq!(sender.count(), 3);
    }
}
