//! Append-only log of raw provider webhook notifications, kept for audit.

use chrono::Utc;
use parking_lot::RwLock;
use roster_channels::BrevoWebhookPayload;
use roster_core::types::DeliveryEvent;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Oldest entries are dropped past this many events.
const MAX_RETAINED: usize = 50_000;

pub struct EventLog {
    events: RwLock<VecDeque<DeliveryEvent>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(MAX_RETAINED)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    pub fn append(&self, payload: &BrevoWebhookPayload, raw: serde_json::Value) -> DeliveryEvent {
        let event = DeliveryEvent {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            message_id: payload.message_id.clone(),
            email: payload.email.clone(),
            event: payload.event.clone(),
            subject: payload.subject.clone(),
            reason: payload.reason.clone(),
            tag: payload.tag().map(str::to_string),
            ts_epoch: payload.ts_epoch,
            raw,
            received_at: Utc::now(),
        };
        let mut events = self.events.write();
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event.clone());
        event
    }

    /// Most recent first.
    pub fn recent(&self, limit: usize) -> Vec<DeliveryEvent> {
        self.events.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}
