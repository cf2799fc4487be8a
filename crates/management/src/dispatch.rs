//! Background dispatch of campaign emails.
//!
//! A run walks the campaign's `pending` recipients in insertion order, one
//! at a time, with a fixed pause between sends. Each recipient is claimed
//! (`pending → sending`) before the provider call and settled
//! (`sending → sent | error`) after it, so a row can never be sent twice by
//! overlapping work. At most one run per campaign is alive at any time; the
//! engine keeps a registry of live runs that callers can query or await.

use crate::store::CampaignStore;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use roster_channels::{DocumentStore, EmailSender, OutboundEmail};
use roster_core::config::DispatchConfig;
use roster_core::templates::{self, CampaignVars, EmailTemplate};
use roster_core::types::*;
use roster_core::{RosterError, RosterResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Removes the campaign from the live-run registry when the run ends,
/// however it ends, and wakes anyone waiting on it.
struct RunGuard {
    campaign_id: CampaignId,
    runs: Arc<DashMap<CampaignId, watch::Receiver<bool>>>,
    done: watch::Sender<bool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.runs.remove(&self.campaign_id);
        self.done.send_replace(true);
    }
}

/// Everything a run needs that differs between a launch and a relaunch.
struct RunPlan {
    campaign: Campaign,
    template: EmailTemplate,
    tags: Vec<String>,
    delay: Duration,
    kind: &'static str,
}

#[derive(Clone)]
pub struct DispatchEngine {
    store: Arc<CampaignStore>,
    sender: Arc<dyn EmailSender>,
    documents: Arc<dyn DocumentStore>,
    config: DispatchConfig,
    admin_email: String,
    runs: Arc<DashMap<CampaignId, watch::Receiver<bool>>>,
}

impl DispatchEngine {
    pub fn new(
        store: Arc<CampaignStore>,
        sender: Arc<dyn EmailSender>,
        documents: Arc<dyn DocumentStore>,
        config: DispatchConfig,
        admin_email: impl Into<String>,
    ) -> Self {
        Self {
            store,
            sender,
            documents,
            config,
            admin_email: admin_email.into(),
            runs: Arc::new(DashMap::new()),
        }
    }

    fn delay_for(&self, mode: SendMode) -> Duration {
        Duration::from_millis(match mode {
            SendMode::Progressive => self.config.progressive_delay_ms,
            SendMode::Immediate => self.config.immediate_delay_ms,
        })
    }

    fn reserve(&self, campaign_id: CampaignId) -> RosterResult<RunGuard> {
        match self.runs.entry(campaign_id) {
            Entry::Occupied(_) => Err(RosterError::Conflict(format!(
                "campaign {campaign_id} already has a dispatch run in progress"
            ))),
            Entry::Vacant(slot) => {
                let (done, rx) = watch::channel(false);
                slot.insert(rx);
                Ok(RunGuard {
                    campaign_id,
                    runs: self.runs.clone(),
                    done,
                })
            }
        }
    }

    /// Flip a draft campaign to `running` and start sending in the
    /// background. Returns the number of recipients queued.
    pub fn launch(&self, campaign_id: CampaignId, mode: SendMode) -> RosterResult<usize> {
        let guard = self.reserve(campaign_id)?;
        let campaign = self.store.begin_run(campaign_id, CampaignStatus::Draft, mode)?;
        let pending = self.store.pending_recipients(campaign_id).len();

        info!(campaign_id, mode = ?mode, pending, "Campaign launched");
        let plan = RunPlan {
            template: campaign.template.clone(),
            tags: vec![format!("campagne-{campaign_id}")],
            delay: self.delay_for(mode),
            kind: "launch",
            campaign,
        };
        self.spawn(plan, guard);
        Ok(pending)
    }

    /// Re-queue the targeted recipients of a completed campaign and send
    /// them a follow-up with `subject` and `body_html` in place of the
    /// stored template. Returns the number of recipients re-queued; zero
    /// leaves the campaign untouched.
    pub fn relaunch(
        &self,
        campaign_id: CampaignId,
        target: RelaunchTarget,
        subject: &str,
        body_html: &str,
    ) -> RosterResult<usize> {
        if subject.trim().is_empty() || body_html.trim().is_empty() {
            return Err(RosterError::Validation(
                "relaunch subject and body are required".to_string(),
            ));
        }
        let campaign = self
            .store
            .get_campaign(campaign_id)
            .ok_or_else(|| RosterError::NotFound(format!("campaign {campaign_id}")))?;
        if campaign.status != CampaignStatus::Completed {
            return Err(RosterError::Conflict(format!(
                "campaign {campaign_id} is {}, only completed campaigns can be relaunched",
                campaign.status.as_str()
            )));
        }

        let guard = self.reserve(campaign_id)?;
        if self.store.count_matching(campaign_id, target) == 0 {
            info!(campaign_id, target = target.label(), "Relaunch matched no recipient");
            return Ok(0);
        }

        let mode = campaign.send_mode.unwrap_or_default();
        let campaign = self.store.begin_run(campaign_id, CampaignStatus::Completed, mode)?;
        let reset = self.store.reset_for_relaunch(campaign_id, target);

        info!(campaign_id, target = target.label(), reset, "Campaign relaunched");
        let template = EmailTemplate {
            subject: subject.to_string(),
            body_html: body_html.to_string(),
            ..campaign.template.clone()
        };
        let plan = RunPlan {
            template,
            tags: vec![format!("campagne-{campaign_id}"), "relance".to_string()],
            delay: Duration::from_millis(self.config.relaunch_delay_ms),
            kind: "relaunch",
            campaign,
        };
        self.spawn(plan, guard);
        Ok(reset)
    }

    pub fn is_running(&self, campaign_id: CampaignId) -> bool {
        self.runs.contains_key(&campaign_id)
    }

    /// Resolve once the campaign has no live run.
    pub async fn wait_for_run(&self, campaign_id: CampaignId) {
        let rx = self.runs.get(&campaign_id).map(|r| r.value().clone());
        if let Some(mut rx) = rx {
            let _ = rx.wait_for(|done| *done).await;
        }
    }

    fn spawn(&self, plan: RunPlan, guard: RunGuard) {
        let engine = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            engine.run(plan).await;
        });
    }

    async fn run(&self, plan: RunPlan) {
        let campaign_id = plan.campaign.id;
        metrics::counter!("dispatch.runs_started", "kind" => plan.kind).increment(1);

        let attachments = if plan.campaign.attachment_ids.is_empty() {
            Vec::new()
        } else {
            match self.documents.fetch(&plan.campaign.attachment_ids).await {
                Ok(attachments) => attachments,
                Err(e) => {
                    warn!(campaign_id, error = %e, "Attachments unavailable, sending without them");
                    Vec::new()
                }
            }
        };

        let pending = self.store.pending_recipients(campaign_id);
        info!(
            campaign_id,
            kind = plan.kind,
            recipients = pending.len(),
            attachments = attachments.len(),
            delay_ms = plan.delay.as_millis() as u64,
            "Dispatch run started"
        );

        let mut queue = pending.into_iter().peekable();
        while let Some(recipient_id) = queue.next() {
            self.send_one(&plan, &attachments, recipient_id).await;
            if queue.peek().is_some() && !plan.delay.is_zero() {
                tokio::time::sleep(plan.delay).await;
            }
        }

        metrics::counter!("dispatch.runs_completed", "kind" => plan.kind).increment(1);
        match self.store.complete_run(campaign_id) {
            Some(campaign) => info!(
                campaign_id,
                kind = plan.kind,
                sent = campaign.sent_count,
                errors = campaign.error_count,
                "Dispatch run completed"
            ),
            None => warn!(campaign_id, "Campaign vanished during dispatch"),
        }
    }

    async fn send_one(&self, plan: &RunPlan, attachments: &[Attachment], recipient_id: RecipientId) {
        let campaign_id = plan.campaign.id;
        let Some(recipient) = self.store.claim_recipient(recipient_id) else {
            debug!(campaign_id, recipient_id, "Recipient no longer pending, skipped");
            return;
        };

        let vars = CampaignVars {
            last_name: recipient.last_name.clone(),
            first_name: recipient.first_name.clone(),
            year: plan.campaign.target_year.to_string(),
            registration_link: plan.campaign.registration_link.clone(),
            signer: plan.campaign.signer.clone(),
            admin_email: self.admin_email.clone(),
        };
        let rendered = templates::render(&plan.template, &vars);
        let email = OutboundEmail {
            to: recipient.email.clone(),
            cc: None,
            subject: rendered.subject,
            html: rendered.html,
            attachments: attachments.to_vec(),
            tags: plan.tags.clone(),
        };

        let start = Instant::now();
        let outcome = self.sender.send(&email).await;
        metrics::histogram!("dispatch.send_latency_ms").record(start.elapsed().as_secs_f64() * 1000.0);

        match outcome {
            Ok(receipt) => {
                metrics::counter!("dispatch.sent").increment(1);
                debug!(
                    campaign_id,
                    recipient_id,
                    message_id = receipt.message_id.as_deref().unwrap_or_default(),
                    "Campaign email sent"
                );
                self.store.record_sent(recipient_id, receipt.message_id);
            }
            Err(e) => {
                metrics::counter!("dispatch.errors").increment(1);
                warn!(campaign_id, recipient_id, email = %recipient.email, error = %e, "Campaign email failed");
                let detail = truncate_chars(&e.to_string(), self.config.error_detail_max);
                self.store.record_error(recipient_id, detail);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::NewCampaign;
    use roster_channels::{CaptureSender, DocumentLibrary};
    use roster_import::RecipientRow;

    fn zero_delay() -> DispatchConfig {
        DispatchConfig {
            progressive_delay_ms: 0,
            immediate_delay_ms: 0,
            relaunch_delay_ms: 0,
            error_detail_max: 20,
        }
    }

    fn row(last_name: &str) -> RecipientRow {
        RecipientRow {
            last_name: last_name.to_string(),
            first_name: "Jean".to_string(),
            email: format!("{}@example.fr", last_name.to_lowercase()),
            rpps: None,
            age: None,
            city: None,
            postal_code: None,
        }
    }

    fn setup(names: &[&str]) -> (DispatchEngine, Arc<CampaignStore>, Arc<CaptureSender>, CampaignId) {
        let store = Arc::new(CampaignStore::new());
        let campaign = store.insert_campaign(NewCampaign {
            name: "Campagne 2027".to_string(),
            target_year: 2027,
            signer: "Dr Martin".to_string(),
            registration_link: "https://example.org/inscription".to_string(),
            template: EmailTemplate {
                body_html: "<p>Bonjour Dr {{NOM}} {{PRENOM}}</p>".to_string(),
                ..EmailTemplate::default()
            },
            attachment_ids: Vec::new(),
        });
        store
            .insert_recipients(campaign.id, names.iter().map(|n| row(n)).collect())
            .unwrap();
        let sender = Arc::new(CaptureSender::new());
        let engine = DispatchEngine::new(
            store.clone(),
            sender.clone(),
            Arc::new(DocumentLibrary::new()),
            zero_delay(),
            "admin@example.fr",
        );
        (engine, store, sender, campaign.id)
    }

    #[tokio::test]
    async fn test_launch_sends_in_order_and_completes() {
        let (engine, store, sender, id) = setup(&["MARTIN", "DUPONT"]);
        assert_eq!(engine.launch(id, SendMode::Immediate).unwrap(), 2);
        engine.wait_for_run(id).await;

        let sent = sender.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "martin@example.fr");
        assert!(sent[0].html.contains("MARTIN"));
        assert!(sent[0].subject.contains("2027"));
        assert_eq!(sent[0].tags, vec![format!("campagne-{id}")]);

        let campaign = store.get_campaign(id).unwrap();
        assert_eq!(campaign.status, CampaignStatus::Completed);
        assert_eq!(campaign.sent_count, 2);
        assert!(campaign.completed_at.is_some());
        assert!(!engine.is_running(id));
    }

    #[tokio::test]
    async fn test_failure_is_isolated_and_truncated() {
        let (engine, store, sender, id) = setup(&["MARTIN", "DUPONT"]);
        sender.push_outcome(Ok("<m1>".to_string()));
        sender.push_outcome(Err("x".repeat(100)));

        engine.launch(id, SendMode::Progressive).unwrap();
        engine.wait_for_run(id).await;

        let campaign = store.get_campaign(id).unwrap();
        assert_eq!(campaign.sent_count, 1);
        assert_eq!(campaign.error_count, 1);
        let failed = store.recipients(id, RecipientFilter::Status(DeliveryStatus::Error), 10);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error_detail.as_ref().unwrap().chars().count(), 20);
    }

    #[tokio::test]
    async fn test_second_launch_is_rejected() {
        let (engine, _store, _sender, id) = setup(&["MARTIN"]);
        engine.launch(id, SendMode::Immediate).unwrap();
        let err = engine.launch(id, SendMode::Immediate).unwrap_err();
        assert!(matches!(err, RosterError::Conflict(_)));
        engine.wait_for_run(id).await;
    }

    #[tokio::test]
    async fn test_relaunch_requires_completed_campaign() {
        let (engine, _store, _sender, id) = setup(&["MARTIN"]);
        let err = engine
            .relaunch(id, RelaunchTarget::NonOpened, "Relance", "<p>x</p>")
            .unwrap_err();
        assert!(matches!(err, RosterError::Conflict(_)));

        let err = engine.relaunch(id, RelaunchTarget::NonOpened, " ", "").unwrap_err();
        assert!(matches!(err, RosterError::Validation(_)));
        assert!(!engine.is_running(id));
    }

    #[tokio::test]
    async fn test_relaunch_uses_new_content_and_tags() {
        let (engine, store, sender, id) = setup(&["MARTIN", "DUPONT"]);
        engine.launch(id, SendMode::Immediate).unwrap();
        engine.wait_for_run(id).await;

        let relaunched = engine
            .relaunch(id, RelaunchTarget::NonOpened, "Relance {{ANNEE}}", "<p>Rappel Dr {{NOM}}</p>")
            .unwrap();
        assert_eq!(relaunched, 2);
        engine.wait_for_run(id).await;

        let sent = sender.sent();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[2].subject, "Relance 2027");
        assert!(sent[2].html.contains("Rappel Dr MARTIN"));
        assert_eq!(sent[2].tags, vec![format!("campagne-{id}"), "relance".to_string()]);

        let campaign = store.get_campaign(id).unwrap();
        assert_eq!(campaign.status, CampaignStatus::Completed);
        assert_eq!(campaign.sent_count, 2);
        assert_eq!(campaign.template.subject, templates::DEFAULT_CAMPAIGN_SUBJECT);
    }

    #[tokio::test]
    async fn test_empty_relaunch_changes_nothing() {
        let (engine, store, sender, id) = setup(&["MARTIN"]);
        engine.launch(id, SendMode::Immediate).unwrap();
        engine.wait_for_run(id).await;
        let before = store.get_campaign(id).unwrap();

        let relaunched = engine
            .relaunch(id, RelaunchTarget::OpenedNotClicked, "Relance", "<p>x</p>")
            .unwrap();
        assert_eq!(relaunched, 0);
        assert!(!engine.is_running(id));

        let after = store.get_campaign(id).unwrap();
        assert_eq!(after.status, CampaignStatus::Completed);
        assert_eq!(after.launched_at, before.launched_at);
        assert_eq!(sender.count(), 1);
    }

    #[tokio::test]
    async fn test_missing_attachments_do_not_abort_run() {
        let store = Arc::new(CampaignStore::new());
        let campaign = store.insert_campaign(NewCampaign {
            name: "c".to_string(),
            target_year: 2027,
            signer: String::new(),
            registration_link: String::new(),
            template: EmailTemplate::default(),
            attachment_ids: vec![77],
        });
        store.insert_recipients(campaign.id, vec![row("MARTIN")]).unwrap();
        let sender = Arc::new(CaptureSender::new());
        let engine = DispatchEngine::new(
            store.clone(),
            sender.clone(),
            Arc::new(DocumentLibrary::new()),
            zero_delay(),
            "admin@example.fr",
        );

        engine.launch(campaign.id, SendMode::Immediate).unwrap();
        engine.wait_for_run(campaign.id).await;
        assert_eq!(sender.count(), 1);
        assert!(sender.sent()[0].attachments.is_empty());
    }
}
