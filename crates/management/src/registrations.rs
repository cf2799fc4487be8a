//! Duty registrations and their tracked confirmation/reminder emails.

use chrono::{Duration, NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use roster_core::types::*;
use roster_core::{RosterError, RosterResult};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use utoipa::ToSchema;

/// At most this many practitioners share one duty date.
pub const MAX_PER_DUTY_DATE: usize = 2;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewRegistration {
    pub duty_date: NaiveDate,
    pub last_name: String,
    pub first_name: String,
    pub email: String,
    pub phone: String,
    pub rpps: String,
    pub street_number: String,
    pub street: String,
    pub postal_code: String,
    pub city: String,
}

impl NewRegistration {
    fn validate(&self) -> RosterResult<()> {
        if self.last_name.trim().is_empty() || self.first_name.trim().is_empty() {
            return Err(RosterError::Validation("name and first name are required".to_string()));
        }
        if !is_valid_email(self.email.trim()) {
            return Err(RosterError::Validation(format!("invalid email '{}'", self.email)));
        }
        if !is_valid_phone(&self.phone) {
            return Err(RosterError::Validation(format!("invalid phone number '{}'", self.phone)));
        }
        if !is_valid_rpps(self.rpps.trim()) {
            return Err(RosterError::Validation("RPPS must be 11 digits".to_string()));
        }
        Ok(())
    }
}

/// Registration slot touched by a webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedSlot {
    pub registration_id: RegistrationId,
    pub kind: RegistrationEmailKind,
    pub changed: bool,
}

pub struct RegistrationStore {
    registrations: DashMap<RegistrationId, Registration>,
    by_message_id: DashMap<String, (RegistrationId, RegistrationEmailKind)>,
    next_id: AtomicU64,
    /// Serialises the per-date capacity check with the insert.
    create_lock: Mutex<()>,
}

impl Default for RegistrationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistrationStore {
    pub fn new() -> Self {
        Self {
            registrations: DashMap::new(),
            by_message_id: DashMap::new(),
            next_id: AtomicU64::new(1),
            create_lock: Mutex::new(()),
        }
    }

    pub fn create(&self, new: NewRegistration) -> RosterResult<Registration> {
        new.validate()?;
        let email = new.email.trim().to_lowercase();

        let _guard = self.create_lock.lock();
        let same_date: Vec<Registration> = self
            .registrations
            .iter()
            .filter(|r| r.duty_date == new.duty_date)
            .map(|r| r.value().clone())
            .collect();
        if same_date.iter().any(|r| r.email == email) {
            return Err(RosterError::Conflict(format!(
                "{email} is already registered for {}",
                new.duty_date
            )));
        }
        if same_date.len() >= MAX_PER_DUTY_DATE {
            return Err(RosterError::Conflict(format!(
                "duty date {} is full",
                new.duty_date
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let registration = Registration {
            id,
            duty_date: new.duty_date,
            last_name: new.last_name.trim().to_uppercase(),
            first_name: new.first_name.trim().to_string(),
            email,
            phone: new.phone.trim().to_string(),
            rpps: new.rpps.trim().to_string(),
            street_number: new.street_number.trim().to_string(),
            street: new.street.trim().to_string(),
            postal_code: new.postal_code.trim().to_string(),
            city: new.city.trim().to_string(),
            confirmation: EmailSlot::default(),
            reminder_j7: EmailSlot::default(),
            reminder_j1: EmailSlot::default(),
            created_at: Utc::now(),
        };
        self.registrations.insert(id, registration.clone());
        Ok(registration)
    }

    pub fn get(&self, id: RegistrationId) -> Option<Registration> {
        self.registrations.get(&id).map(|r| r.value().clone())
    }

    /// Ordered by duty date.
    pub fn list(&self) -> Vec<Registration> {
        let mut all: Vec<Registration> = self.registrations.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.duty_date.cmp(&b.duty_date).then(a.id.cmp(&b.id)));
        all
    }

    /// Record the outcome of a send: `Ok(message id)` or `Err(())`.
    pub fn record_email(
        &self,
        id: RegistrationId,
        kind: RegistrationEmailKind,
        outcome: Result<Option<String>, ()>,
    ) -> Option<EmailSlot> {
        let (slot, previous) = {
            let mut entry = self.registrations.get_mut(&id)?;
            let slot = entry.slot_mut(kind);
            let previous = slot.message_id.take();
            slot.sent_at = Some(Utc::now());
            match &outcome {
                Ok(message_id) => {
                    slot.status = Some(DeliveryStatus::Sent);
                    slot.message_id = message_id.clone();
                }
                Err(()) => slot.status = Some(DeliveryStatus::Error),
            }
            (slot.clone(), previous)
        };
        if let Some(previous) = previous {
            self.by_message_id.remove(&previous);
        }
        if let Some(message_id) = &slot.message_id {
            self.by_message_id.insert(message_id.clone(), (id, kind));
        }
        Some(slot)
    }

    /// Reminders due on `today`: duty date exactly 7 or 1 days ahead and
    /// the reminder not sent yet.
    pub fn due_reminders(&self, today: NaiveDate) -> Vec<(RegistrationId, RegistrationEmailKind)> {
        let mut due = Vec::new();
        for entry in self.registrations.iter() {
            for kind in [RegistrationEmailKind::ReminderJ7, RegistrationEmailKind::ReminderJ1] {
                let Some(days) = kind.days_ahead() else {
                    continue;
                };
                if entry.duty_date == today + Duration::days(days) && entry.slot(kind).status.is_none() {
                    due.push((entry.id, kind));
                }
            }
        }
        due.sort();
        due
    }

    /// Set the tracked status of the slot that sent `message_id`, unless the
    /// slot already reached opened or clicked.
    pub fn apply_event(&self, message_id: &str, status: DeliveryStatus) -> Option<MatchedSlot> {
        let (id, kind) = self.by_message_id.get(message_id).map(|r| *r.value())?;
        let mut entry = self.registrations.get_mut(&id)?;
        let slot = entry.slot_mut(kind);
        let engaged = slot.status.is_some_and(|s| s.is_engaged());
        if !engaged {
            slot.status = Some(status);
        }
        Some(MatchedSlot {
            registration_id: id,
            kind,
            changed: !engaged,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample(date: NaiveDate, email: &str) -> NewRegistration {
        NewRegistration {
            duty_date: date,
            last_name: "Dupont".to_string(),
            first_name: "Jean".to_string(),
            email: email.to_string(),
            phone: "06 12 34 56 78".to_string(),
            rpps: "10001234567".to_string(),
            street_number: "12".to_string(),
            street: "rue de Paris".to_string(),
            postal_code: "94000".to_string(),
            city: "Créteil".to_string(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_create_normalizes_and_validates() {
        let store = RegistrationStore::new();
        let reg = store.create(sample(date(2027, 1, 3), "Jean@Example.fr")).unwrap();
        assert_eq!(reg.last_name, "DUPONT");
        assert_eq!(reg.email, "jean@example.fr");
        assert!(reg.confirmation.status.is_none());

        let mut bad = sample(date(2027, 1, 3), "x@example.fr");
        bad.rpps = "123".to_string();
        assert!(matches!(store.create(bad), Err(RosterError::Validation(_))));
    }

    #[test]
    fn test_duty_date_capacity() {
        let store = RegistrationStore::new();
        let day = date(2027, 1, 3);
        store.create(sample(day, "a@example.fr")).unwrap();
        assert!(matches!(
            store.create(sample(day, "a@example.fr")),
            Err(RosterError::Conflict(_))
        ));
        store.create(sample(day, "b@example.fr")).unwrap();
        assert!(matches!(
            store.create(sample(day, "c@example.fr")),
            Err(RosterError::Conflict(_))
        ));
        assert!(store.create(sample(date(2027, 1, 10), "c@example.fr")).is_ok());
    }

    #[test]
    fn test_due_reminders_selects_exact_offsets() {
        let store = RegistrationStore::new();
        let today = date(2026, 12, 27);
        let in_seven = store.create(sample(date(2027, 1, 3), "a@example.fr")).unwrap();
        let tomorrow = store.create(sample(date(2026, 12, 28), "b@example.fr")).unwrap();
        store.create(sample(date(2027, 1, 10), "c@example.fr")).unwrap();

        assert_eq!(
            store.due_reminders(today),
            vec![
                (in_seven.id, RegistrationEmailKind::ReminderJ7),
                (tomorrow.id, RegistrationEmailKind::ReminderJ1),
            ]
        );

        store.record_email(in_seven.id, RegistrationEmailKind::ReminderJ7, Ok(None));
        assert_eq!(store.due_reminders(today).len(), 1);
    }

    #[test]
    fn test_event_does_not_regress_opened_slot() {
        let store = RegistrationStore::new();
        let reg = store.create(sample(date(2027, 1, 3), "a@example.fr")).unwrap();
        store.record_email(reg.id, RegistrationEmailKind::Confirmation, Ok(Some("<c1>".to_string())));

        let matched = store.apply_event("<c1>", DeliveryStatus::Opened).unwrap();
        assert!(matched.changed);
        assert_eq!(matched.kind, RegistrationEmailKind::Confirmation);

        let matched = store.apply_event("<c1>", DeliveryStatus::Delivered).unwrap();
        assert!(!matched.changed);
        assert_eq!(
            store.get(reg.id).unwrap().confirmation.status,
            Some(DeliveryStatus::Opened)
        );
        assert!(store.apply_event("<unknown>", DeliveryStatus::Delivered).is_none());
    }

    #[test]
    fn test_resend_replaces_message_index() {
        let store = RegistrationStore::new();
        let reg = store.create(sample(date(2027, 1, 3), "a@example.fr")).unwrap();
        let kind = RegistrationEmailKind::Confirmation;
        store.record_email(reg.id, kind, Ok(Some("<old>".to_string())));
        store.record_email(reg.id, kind, Ok(Some("<new>".to_string())));

        assert!(store.apply_event("<old>", DeliveryStatus::Delivered).is_none());
        assert!(store.apply_event("<new>", DeliveryStatus::Delivered).is_some());
    }
}
