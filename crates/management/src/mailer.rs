//! Confirmation and reminder emails for individual duty registrations.

use crate::models::ReminderReport;
use crate::registrations::RegistrationStore;
use chrono::NaiveDate;
use roster_channels::{EmailSender, OutboundEmail};
use roster_core::templates::{self, RegistrationVars};
use roster_core::types::*;
use roster_core::{RosterError, RosterResult};
use std::sync::Arc;
use tracing::{info, warn};

const RESEND_PREFIX: &str = "[RENVOI] ";

pub struct RegistrationMailer {
    registrations: Arc<RegistrationStore>,
    sender: Arc<dyn EmailSender>,
    admin_email: String,
}

impl RegistrationMailer {
    pub fn new(
        registrations: Arc<RegistrationStore>,
        sender: Arc<dyn EmailSender>,
        admin_email: impl Into<String>,
    ) -> Self {
        Self {
            registrations,
            sender,
            admin_email: admin_email.into(),
        }
    }

    /// Render and send one registration email, recording the outcome in the
    /// registration's slot for `kind`. Sending a slot that was already sent
    /// marks the subject as a resend.
    pub async fn send(&self, id: RegistrationId, kind: RegistrationEmailKind) -> RosterResult<EmailSlot> {
        let registration = self
            .registrations
            .get(id)
            .ok_or_else(|| RosterError::NotFound(format!("registration {id}")))?;

        let vars = RegistrationVars {
            last_name: registration.last_name.clone(),
            first_name: registration.first_name.clone(),
            duty_date: templates::format_date_fr(registration.duty_date),
            email: registration.email.clone(),
            phone: registration.phone.clone(),
            address: registration.address(),
            admin_email: self.admin_email.clone(),
        };
        let rendered = templates::render(&templates::default_registration_template(kind), &vars);
        let subject = if registration.slot(kind).status.is_some() {
            format!("{RESEND_PREFIX}{}", rendered.subject)
        } else {
            rendered.subject
        };

        let email = OutboundEmail {
            to: registration.email.clone(),
            cc: (!self.admin_email.is_empty()).then(|| self.admin_email.clone()),
            subject,
            html: rendered.html,
            attachments: Vec::new(),
            tags: Vec::new(),
        };

        match self.sender.send(&email).await {
            Ok(receipt) => {
                info!(registration_id = id, kind = ?kind, "Registration email sent");
                self.registrations
                    .record_email(id, kind, Ok(receipt.message_id))
                    .ok_or_else(|| RosterError::NotFound(format!("registration {id}")))
            }
            Err(e) => {
                warn!(registration_id = id, kind = ?kind, error = %e, "Registration email failed");
                self.registrations.record_email(id, kind, Err(()));
                Err(e)
            }
        }
    }

    /// Send every J-7 and J-1 reminder due on `today`.
    pub async fn run_reminders(&self, today: NaiveDate) -> ReminderReport {
        let due = self.registrations.due_reminders(today);
        let mut report = ReminderReport {
            due: due.len(),
            ..ReminderReport::default()
        };
        for (id, kind) in due {
            match self.send(id, kind).await {
                Ok(_) => report.sent += 1,
                Err(_) => report.failed += 1,
            }
        }
        info!(%today, due = report.due, sent = report.sent, failed = report.failed, "Reminder sweep finished");
        report
    }
}
