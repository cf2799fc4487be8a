//! In-memory campaign and recipient store backed by DashMap.
//!
//! Production: replace with PostgreSQL (sqlx) or similar ACID store.
//! Every operation here is either an atomic single-row update or a filtered
//! scan, which is all the dispatch engine and the ingestor rely on.

use chrono::Utc;
use dashmap::DashMap;
use roster_core::templates::EmailTemplate;
use roster_core::types::*;
use roster_core::{RosterError, RosterResult};
use roster_import::RecipientRow;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Campaign fields supplied at creation.
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub name: String,
    pub target_year: i32,
    pub signer: String,
    pub registration_link: String,
    pub template: EmailTemplate,
    pub attachment_ids: Vec<DocumentId>,
}

/// Recipient row touched by a webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedRecipient {
    pub recipient_id: RecipientId,
    pub campaign_id: CampaignId,
    pub status: DeliveryStatus,
    /// False when the event was matched but left the row unchanged.
    pub changed: bool,
}

pub struct CampaignStore {
    campaigns: DashMap<CampaignId, Campaign>,
    recipients: DashMap<RecipientId, CampaignRecipient>,
    /// Recipient ids per campaign, in insertion order.
    by_campaign: DashMap<CampaignId, Vec<RecipientId>>,
    by_message_id: DashMap<String, RecipientId>,
    next_campaign_id: AtomicU64,
    next_recipient_id: AtomicU64,
}

impl Default for CampaignStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CampaignStore {
    pub fn new() -> Self {
        info!("Campaign store initialized (in-memory)");
        Self {
            campaigns: DashMap::new(),
            recipients: DashMap::new(),
            by_campaign: DashMap::new(),
            by_message_id: DashMap::new(),
            next_campaign_id: AtomicU64::new(1),
            next_recipient_id: AtomicU64::new(1),
        }
    }

    // ─── Campaigns ─────────────────────────────────────────────────────────

    pub fn insert_campaign(&self, new: NewCampaign) -> Campaign {
        let id = self.next_campaign_id.fetch_add(1, Ordering::SeqCst);
        let campaign = Campaign {
            id,
            name: new.name,
            target_year: new.target_year,
            signer: new.signer,
            registration_link: new.registration_link,
            template: new.template,
            attachment_ids: new.attachment_ids,
            status: CampaignStatus::Draft,
            send_mode: None,
            recipient_count: 0,
            sent_count: 0,
            error_count: 0,
            created_at: Utc::now(),
            launched_at: None,
            completed_at: None,
        };
        self.campaigns.insert(id, campaign.clone());
        self.by_campaign.insert(id, Vec::new());
        campaign
    }

    /// Materialise one `pending` recipient per row and set the campaign's
    /// recipient count to the number inserted.
    pub fn insert_recipients(&self, campaign_id: CampaignId, rows: Vec<RecipientRow>) -> RosterResult<usize> {
        if !self.campaigns.contains_key(&campaign_id) {
            return Err(RosterError::NotFound(format!("campaign {campaign_id}")));
        }

        let now = Utc::now();
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let id = self.next_recipient_id.fetch_add(1, Ordering::SeqCst);
            self.recipients.insert(
                id,
                CampaignRecipient {
                    id,
                    campaign_id,
                    last_name: row.last_name,
                    first_name: row.first_name,
                    email: row.email,
                    rpps: row.rpps,
                    age: row.age,
                    city: row.city,
                    postal_code: row.postal_code,
                    status: DeliveryStatus::Pending,
                    message_id: None,
                    open_count: 0,
                    click_count: 0,
                    last_activity_at: None,
                    error_detail: None,
                    sent_at: None,
                    created_at: now,
                },
            );
            ids.push(id);
        }

        let inserted = ids.len();
        self.by_campaign.entry(campaign_id).or_default().extend(ids);
        if let Some(mut campaign) = self.campaigns.get_mut(&campaign_id) {
            campaign.recipient_count = inserted as u64;
        }
        Ok(inserted)
    }

    pub fn get_campaign(&self, id: CampaignId) -> Option<Campaign> {
        self.campaigns.get(&id).map(|r| r.value().clone())
    }

    /// Newest first.
    pub fn list_campaigns(&self) -> Vec<Campaign> {
        let mut campaigns: Vec<Campaign> = self.campaigns.iter().map(|r| r.value().clone()).collect();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        campaigns
    }

    /// Apply `f` only if the campaign is still a draft.
    pub fn update_draft<F>(&self, id: CampaignId, f: F) -> RosterResult<Campaign>
    where
        F: FnOnce(&mut Campaign),
    {
        let mut entry = self
            .campaigns
            .get_mut(&id)
            .ok_or_else(|| RosterError::NotFound(format!("campaign {id}")))?;
        if entry.status != CampaignStatus::Draft {
            return Err(RosterError::Conflict(format!(
                "campaign {id} is {} and can no longer be edited",
                entry.status.as_str()
            )));
        }
        f(entry.value_mut());
        Ok(entry.value().clone())
    }

    /// Delete a draft campaign and all its recipients. Returns the number of
    /// recipients removed.
    pub fn delete_draft(&self, id: CampaignId) -> RosterResult<usize> {
        let status = self
            .campaigns
            .get(&id)
            .map(|c| c.status)
            .ok_or_else(|| RosterError::NotFound(format!("campaign {id}")))?;
        let conflict = |status: CampaignStatus| {
            RosterError::Conflict(format!(
                "campaign {id} is {} and can no longer be deleted",
                status.as_str()
            ))
        };
        if status != CampaignStatus::Draft {
            return Err(conflict(status));
        }
        if self
            .campaigns
            .remove_if(&id, |_, c| c.status == CampaignStatus::Draft)
            .is_none()
        {
            return Err(conflict(CampaignStatus::Running));
        }

        let mut removed = 0;
        if let Some((_, ids)) = self.by_campaign.remove(&id) {
            for rid in ids {
                if let Some((_, recipient)) = self.recipients.remove(&rid) {
                    if let Some(message_id) = recipient.message_id {
                        self.by_message_id.remove(&message_id);
                    }
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Compare-and-set `expected → running`, stamping a fresh launch time.
    pub fn begin_run(&self, id: CampaignId, expected: CampaignStatus, mode: SendMode) -> RosterResult<Campaign> {
        let mut entry = self
            .campaigns
            .get_mut(&id)
            .ok_or_else(|| RosterError::NotFound(format!("campaign {id}")))?;
        if entry.status != expected {
            return Err(RosterError::Conflict(format!(
                "campaign {id} is {}, expected {}",
                entry.status.as_str(),
                expected.as_str()
            )));
        }
        let campaign = entry.value_mut();
        campaign.status = CampaignStatus::Running;
        campaign.send_mode = Some(mode);
        campaign.launched_at = Some(Utc::now());
        campaign.completed_at = None;
        Ok(campaign.clone())
    }

    pub fn complete_run(&self, id: CampaignId) -> Option<Campaign> {
        let mut entry = self.campaigns.get_mut(&id)?;
        let campaign = entry.value_mut();
        campaign.status = CampaignStatus::Completed;
        campaign.completed_at = Some(Utc::now());
        Some(campaign.clone())
    }

    // ─── Recipients ────────────────────────────────────────────────────────

    pub fn recipient(&self, id: RecipientId) -> Option<CampaignRecipient> {
        self.recipients.get(&id).map(|r| r.value().clone())
    }

    fn recipient_ids(&self, campaign_id: CampaignId) -> Vec<RecipientId> {
        self.by_campaign
            .get(&campaign_id)
            .map(|ids| ids.value().clone())
            .unwrap_or_default()
    }

    /// Pending recipient ids in ascending insertion order.
    pub fn pending_recipients(&self, campaign_id: CampaignId) -> Vec<RecipientId> {
        self.recipient_ids(campaign_id)
            .into_iter()
            .filter(|id| {
                self.recipients
                    .get(id)
                    .is_some_and(|r| r.status == DeliveryStatus::Pending)
            })
            .collect()
    }

    /// Move a recipient `pending → sending`. None if it is no longer pending.
    pub fn claim_recipient(&self, id: RecipientId) -> Option<CampaignRecipient> {
        let mut entry = self.recipients.get_mut(&id)?;
        if entry.status != DeliveryStatus::Pending {
            return None;
        }
        entry.status = DeliveryStatus::Sending;
        Some(entry.value().clone())
    }

    /// `sending → sent`, indexes the message id and bumps the campaign's
    /// sent counter.
    pub fn record_sent(&self, id: RecipientId, message_id: Option<String>) -> bool {
        let campaign_id = {
            let Some(mut entry) = self.recipients.get_mut(&id) else {
                return false;
            };
            if entry.status != DeliveryStatus::Sending {
                return false;
            }
            let recipient = entry.value_mut();
            recipient.status = DeliveryStatus::Sent;
            recipient.sent_at = Some(Utc::now());
            recipient.error_detail = None;
            recipient.message_id = message_id.clone();
            recipient.campaign_id
        };
        if let Some(message_id) = message_id {
            self.by_message_id.insert(message_id, id);
        }
        if let Some(mut campaign) = self.campaigns.get_mut(&campaign_id) {
            campaign.sent_count += 1;
        }
        true
    }

    /// `sending → error` with the failure detail, bumping the error counter.
    pub fn record_error(&self, id: RecipientId, detail: String) -> bool {
        let campaign_id = {
            let Some(mut entry) = self.recipients.get_mut(&id) else {
                return false;
            };
            if entry.status != DeliveryStatus::Sending {
                return false;
            }
            let recipient = entry.value_mut();
            recipient.status = DeliveryStatus::Error;
            recipient.sent_at = Some(Utc::now());
            recipient.error_detail = Some(detail);
            recipient.campaign_id
        };
        if let Some(mut campaign) = self.campaigns.get_mut(&campaign_id) {
            campaign.error_count += 1;
        }
        true
    }

    /// Recipients matching `filter`, ordered by name then first name.
    pub fn recipients(&self, campaign_id: CampaignId, filter: RecipientFilter, limit: usize) -> Vec<CampaignRecipient> {
        let mut rows: Vec<CampaignRecipient> = self
            .recipient_ids(campaign_id)
            .into_iter()
            .filter_map(|id| self.recipient(id))
            .filter(|r| filter.matches(r.status))
            .collect();
        rows.sort_by(|a, b| {
            a.last_name
                .cmp(&b.last_name)
                .then_with(|| a.first_name.cmp(&b.first_name))
                .then(a.id.cmp(&b.id))
        });
        rows.truncate(limit);
        rows
    }

    /// Recipient count per status, keyed by wire name.
    pub fn status_counts(&self, campaign_id: CampaignId) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for id in self.recipient_ids(campaign_id) {
            if let Some(r) = self.recipients.get(&id) {
                *counts.entry(r.status.as_str().to_string()).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn count_matching(&self, campaign_id: CampaignId, target: RelaunchTarget) -> usize {
        self.recipient_ids(campaign_id)
            .into_iter()
            .filter(|id| self.recipients.get(id).is_some_and(|r| target.matches(r.status)))
            .count()
    }

    /// Reset the targeted recipients to `pending` (message id and send time
    /// cleared) and take them off the campaign's sent counter.
    pub fn reset_for_relaunch(&self, campaign_id: CampaignId, target: RelaunchTarget) -> usize {
        let mut reset = 0u64;
        for id in self.recipient_ids(campaign_id) {
            let old_message_id = {
                let Some(mut entry) = self.recipients.get_mut(&id) else {
                    continue;
                };
                if !target.matches(entry.status) {
                    continue;
                }
                let recipient = entry.value_mut();
                recipient.status = DeliveryStatus::Pending;
                recipient.sent_at = None;
                recipient.error_detail = None;
                recipient.message_id.take()
            };
            if let Some(message_id) = old_message_id {
                self.by_message_id.remove(&message_id);
            }
            reset += 1;
        }
        if let Some(mut campaign) = self.campaigns.get_mut(&campaign_id) {
            campaign.sent_count = campaign.sent_count.saturating_sub(reset);
        }
        reset as usize
    }

    /// Apply `f` to the recipient that was sent `message_id`.
    pub fn update_by_message_id<F>(&self, message_id: &str, f: F) -> Option<MatchedRecipient>
    where
        F: FnOnce(&mut CampaignRecipient) -> bool,
    {
        let id = self.by_message_id.get(message_id).map(|r| *r.value())?;
        let mut entry = self.recipients.get_mut(&id)?;
        let changed = f(entry.value_mut());
        Some(MatchedRecipient {
            recipient_id: id,
            campaign_id: entry.campaign_id,
            status: entry.status,
            changed,
        })
    }

    pub fn recipient_total(&self) -> usize {
        self.recipients.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row(last_name: &str, email: &str) -> RecipientRow {
        RecipientRow {
            last_name: last_name.to_string(),
            first_name: "Jean".to_string(),
            email: email.to_string(),
            rpps: None,
            age: None,
            city: None,
            postal_code: None,
        }
    }

    fn new_campaign() -> NewCampaign {
        NewCampaign {
            name: "Campagne 2027".to_string(),
            target_year: 2027,
            signer: "Dr Martin".to_string(),
            registration_link: "https://example.org".to_string(),
            template: EmailTemplate::default(),
            attachment_ids: Vec::new(),
        }
    }

    fn seeded(store: &CampaignStore) -> CampaignId {
        let campaign = store.insert_campaign(new_campaign());
        store
            .insert_recipients(
                campaign.id,
                vec![row("MARTIN", "m@example.fr"), row("DUPONT", "d@example.fr")],
            )
            .unwrap();
        campaign.id
    }

    #[test]
    fn test_insert_sets_recipient_count() {
        let store = CampaignStore::new();
        let id = seeded(&store);
        assert_eq!(store.get_campaign(id).unwrap().recipient_count, 2);
        assert_eq!(store.pending_recipients(id).len(), 2);
    }

    #[test]
    fn test_pending_order_is_insertion_order() {
        let store = CampaignStore::new();
        let id = seeded(&store);
        let pending = store.pending_recipients(id);
        assert!(pending[0] < pending[1]);
        assert_eq!(store.recipient(pending[0]).unwrap().last_name, "MARTIN");
    }

    #[test]
    fn test_listing_orders_by_name() {
        let store = CampaignStore::new();
        let id = seeded(&store);
        let rows = store.recipients(id, RecipientFilter::All, 200);
        assert_eq!(rows[0].last_name, "DUPONT");
        assert_eq!(store.recipients(id, RecipientFilter::All, 1).len(), 1);
    }

    #[test]
    fn test_claim_is_exclusive() {
        let store = CampaignStore::new();
        let id = seeded(&store);
        let rid = store.pending_recipients(id)[0];
        assert!(store.claim_recipient(rid).is_some());
        assert!(store.claim_recipient(rid).is_none());
        assert!(!store.pending_recipients(id).contains(&rid));
    }

    #[test]
    fn test_record_sent_requires_claim() {
        let store = CampaignStore::new();
        let id = seeded(&store);
        let rid = store.pending_recipients(id)[0];
        assert!(!store.record_sent(rid, Some("<m1>".to_string())));

        store.claim_recipient(rid).unwrap();
        assert!(store.record_sent(rid, Some("<m1>".to_string())));
        assert_eq!(store.get_campaign(id).unwrap().sent_count, 1);
        let matched = store.update_by_message_id("<m1>", |_| false).unwrap();
        assert_eq!(matched.recipient_id, rid);
        assert!(!matched.changed);
    }

    #[test]
    fn test_draft_only_mutation() {
        let store = CampaignStore::new();
        let id = seeded(&store);
        store.begin_run(id, CampaignStatus::Draft, SendMode::Immediate).unwrap();

        let err = store.update_draft(id, |c| c.name = "x".to_string()).unwrap_err();
        assert!(matches!(err, RosterError::Conflict(_)));
        assert!(matches!(store.delete_draft(id), Err(RosterError::Conflict(_))));
        assert_eq!(store.get_campaign(id).unwrap().name, "Campagne 2027");
    }

    #[test]
    fn test_begin_run_is_compare_and_set() {
        let store = CampaignStore::new();
        let id = seeded(&store);
        assert!(store.begin_run(id, CampaignStatus::Draft, SendMode::Progressive).is_ok());
        assert!(matches!(
            store.begin_run(id, CampaignStatus::Draft, SendMode::Progressive),
            Err(RosterError::Conflict(_))
        ));
        assert!(matches!(
            store.begin_run(999, CampaignStatus::Draft, SendMode::Progressive),
            Err(RosterError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_cascades_recipients() {
        let store = CampaignStore::new();
        let keep = seeded(&store);
        let drop_id = seeded(&store);
        assert_eq!(store.recipient_total(), 4);

        assert_eq!(store.delete_draft(drop_id).unwrap(), 2);
        assert_eq!(store.recipient_total(), 2);
        assert!(store.get_campaign(drop_id).is_none());
        assert!(store.recipients(drop_id, RecipientFilter::All, 200).is_empty());
        assert_eq!(store.recipients(keep, RecipientFilter::All, 200).len(), 2);
    }

    #[test]
    fn test_reset_for_relaunch_clears_message_index() {
        let store = CampaignStore::new();
        let id = seeded(&store);
        for rid in store.pending_recipients(id) {
            store.claim_recipient(rid).unwrap();
            store.record_sent(rid, Some(format!("<m{rid}>")));
        }
        assert_eq!(store.count_matching(id, RelaunchTarget::NonOpened), 2);

        assert_eq!(store.reset_for_relaunch(id, RelaunchTarget::NonOpened), 2);
        assert_eq!(store.get_campaign(id).unwrap().sent_count, 0);
        assert_eq!(store.pending_recipients(id).len(), 2);
        assert!(store.update_by_message_id("<m1>", |_| true).is_none());
    }
}
