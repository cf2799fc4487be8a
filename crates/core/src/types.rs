//! Domain types shared by the importer, the stores, the dispatch engine and
//! the delivery-event ingestor.

use crate::templates::EmailTemplate;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use utoipa::ToSchema;

pub type CampaignId = u64;
pub type RecipientId = u64;
pub type RegistrationId = u64;
pub type DocumentId = u64;

// ─── Campaign ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Running,
    Completed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Running => "running",
            CampaignStatus::Completed => "completed",
        }
    }
}

/// Inter-send throttling chosen by the operator at launch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SendMode {
    /// Slower and safer with respect to provider rate limits.
    #[default]
    Progressive,
    Immediate,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub target_year: i32,
    pub signer: String,
    pub registration_link: String,
    pub template: EmailTemplate,
    pub attachment_ids: Vec<DocumentId>,
    pub status: CampaignStatus,
    pub send_mode: Option<SendMode>,
    pub recipient_count: u64,
    pub sent_count: u64,
    pub error_count: u64,
    pub created_at: DateTime<Utc>,
    pub launched_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ─── Delivery status ───────────────────────────────────────────────────────

/// Per-message delivery status shared by campaign recipients and the
/// tracked registration emails.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    /// Claimed by a dispatch run, provider call in flight.
    Sending,
    Sent,
    Delivered,
    Opened,
    Clicked,
    Error,
    BounceHard,
    BounceSoft,
    Blocked,
    Spam,
    Invalid,
    ProviderError,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 13] = [
        DeliveryStatus::Pending,
        DeliveryStatus::Sending,
        DeliveryStatus::Sent,
        DeliveryStatus::Delivered,
        DeliveryStatus::Opened,
        DeliveryStatus::Clicked,
        DeliveryStatus::Error,
        DeliveryStatus::BounceHard,
        DeliveryStatus::BounceSoft,
        DeliveryStatus::Blocked,
        DeliveryStatus::Spam,
        DeliveryStatus::Invalid,
        DeliveryStatus::ProviderError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sending => "sending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Opened => "opened",
            DeliveryStatus::Clicked => "clicked",
            DeliveryStatus::Error => "error",
            DeliveryStatus::BounceHard => "bounce_hard",
            DeliveryStatus::BounceSoft => "bounce_soft",
            DeliveryStatus::Blocked => "blocked",
            DeliveryStatus::Spam => "spam",
            DeliveryStatus::Invalid => "invalid",
            DeliveryStatus::ProviderError => "provider_error",
        }
    }

    /// Opened or clicked: the recipient engaged and must not be downgraded.
    pub fn is_engaged(&self) -> bool {
        matches!(self, DeliveryStatus::Opened | DeliveryStatus::Clicked)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeliveryStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown delivery status '{s}'"))
    }
}

// ─── Recipients ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CampaignRecipient {
    pub id: RecipientId,
    pub campaign_id: CampaignId,
    pub last_name: String,
    pub first_name: String,
    pub email: String,
    pub rpps: Option<String>,
    pub age: Option<u32>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub status: DeliveryStatus,
    pub message_id: Option<String>,
    pub open_count: u32,
    pub click_count: u32,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub error_detail: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Recipient subset a targeted relaunch re-queues.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RelaunchTarget {
    /// Sent or delivered, never opened.
    NonOpened,
    /// Opened but never clicked.
    OpenedNotClicked,
}

impl RelaunchTarget {
    pub fn matches(&self, status: DeliveryStatus) -> bool {
        match self {
            RelaunchTarget::NonOpened => {
                matches!(status, DeliveryStatus::Sent | DeliveryStatus::Delivered)
            }
            RelaunchTarget::OpenedNotClicked => status == DeliveryStatus::Opened,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RelaunchTarget::NonOpened => "non-opened",
            RelaunchTarget::OpenedNotClicked => "opened not clicked",
        }
    }
}

/// Filter for the admin recipient listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientFilter {
    All,
    Target(RelaunchTarget),
    Status(DeliveryStatus),
}

impl RecipientFilter {
    pub fn matches(&self, status: DeliveryStatus) -> bool {
        match self {
            RecipientFilter::All => true,
            RecipientFilter::Target(target) => target.matches(status),
            RecipientFilter::Status(expected) => *expected == status,
        }
    }
}

impl FromStr for RecipientFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "all" => Ok(RecipientFilter::All),
            "non_opened" => Ok(RecipientFilter::Target(RelaunchTarget::NonOpened)),
            "opened_not_clicked" => Ok(RecipientFilter::Target(RelaunchTarget::OpenedNotClicked)),
            other => other.parse().map(RecipientFilter::Status),
        }
    }
}

// ─── Provider events ───────────────────────────────────────────────────────

/// Raw webhook notification kept for audit. Never read by dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeliveryEvent {
    pub id: u64,
    pub message_id: Option<String>,
    pub email: String,
    pub event: String,
    pub subject: String,
    pub reason: Option<String>,
    pub tag: Option<String>,
    pub ts_epoch: Option<i64>,
    #[schema(value_type = Object)]
    pub raw: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

// ─── Attachments ───────────────────────────────────────────────────────────

/// Binary document attached to an outgoing email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name shown to the recipient.
    pub name: String,
    pub content: Vec<u8>,
}

// ─── Registrations ─────────────────────────────────────────────────────────

/// Tracked email kinds sent to a registered practitioner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationEmailKind {
    Confirmation,
    ReminderJ7,
    ReminderJ1,
}

impl RegistrationEmailKind {
    pub const ALL: [RegistrationEmailKind; 3] = [
        RegistrationEmailKind::Confirmation,
        RegistrationEmailKind::ReminderJ7,
        RegistrationEmailKind::ReminderJ1,
    ];

    /// Days between the reminder and the duty date.
    pub fn days_ahead(&self) -> Option<i64> {
        match self {
            RegistrationEmailKind::Confirmation => None,
            RegistrationEmailKind::ReminderJ7 => Some(7),
            RegistrationEmailKind::ReminderJ1 => Some(1),
        }
    }
}

impl FromStr for RegistrationEmailKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmation" => Ok(RegistrationEmailKind::Confirmation),
            "reminder_j7" => Ok(RegistrationEmailKind::ReminderJ7),
            "reminder_j1" => Ok(RegistrationEmailKind::ReminderJ1),
            other => Err(format!("unknown email kind '{other}'")),
        }
    }
}

/// Delivery tracking for one email kind. `status == None` means not sent yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct EmailSlot {
    pub status: Option<DeliveryStatus>,
    pub message_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Registration {
    pub id: RegistrationId,
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
    pub confirmation: EmailSlot,
    pub reminder_j7: EmailSlot,
    pub reminder_j1: EmailSlot,
    pub created_at: DateTime<Utc>,
}

impl Registration {
    pub fn slot(&self, kind: RegistrationEmailKind) -> &EmailSlot {
        match kind {
            RegistrationEmailKind::Confirmation => &self.confirmation,
            RegistrationEmailKind::ReminderJ7 => &self.reminder_j7,
            RegistrationEmailKind::ReminderJ1 => &self.reminder_j1,
        }
    }

    pub fn slot_mut(&mut self, kind: RegistrationEmailKind) -> &mut EmailSlot {
        match kind {
            RegistrationEmailKind::Confirmation => &mut self.confirmation,
            RegistrationEmailKind::ReminderJ7 => &mut self.reminder_j7,
            RegistrationEmailKind::ReminderJ1 => &mut self.reminder_j1,
        }
    }

    pub fn address(&self) -> String {
        format!(
            "{} {}, {} {}",
            self.street_number, self.street, self.postal_code, self.city
        )
    }
}

// ─── Validation helpers ────────────────────────────────────────────────────

fn email_regex() -> Option<&'static Regex> {
    static EMAIL_RE: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").ok())
        .as_ref()
}

/// RFC-lite address check used for import rows and registrations.
pub fn is_valid_email(candidate: &str) -> bool {
    email_regex().is_some_and(|re| re.is_match(candidate))
}

/// French landline or mobile number, national or +33 form. Spaces, dots
/// and dashes are ignored.
pub fn is_valid_phone(candidate: &str) -> bool {
    let digits: String = candidate
        .chars()
        .filter(|c| !matches!(c, ' ' | '.' | '-'))
        .collect();
    let national = digits
        .strip_prefix("+33")
        .map(|rest| format!("0{rest}"))
        .unwrap_or(digits);
    national.len() == 10
        && national.starts_with('0')
        && !national.starts_with("00")
        && national.chars().all(|c| c.is_ascii_digit())
}

/// RPPS practitioner identifier: exactly 11 digits.
pub fn is_valid_rpps(candidate: &str) -> bool {
    candidate.len() == 11 && candidate.chars().all(|c| c.is_ascii_digit())
}

/// Truncate on a char boundary to at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
