//! Campaign lifecycle outside of dispatch: creation from an upload, draft
//! edits, deletion, listing, previews and relaunch counters.

use crate::models::{CreateCampaignRequest, RelaunchStats, UpdateCampaignRequest};
use crate::store::{CampaignStore, NewCampaign};
use roster_core::templates::{self, CampaignVars, EmailTemplate, RenderedEmail};
use roster_core::types::*;
use roster_core::{RosterError, RosterResult};
use roster_import::Importer;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Recipient listings never return more rows than this.
pub const RECIPIENT_LIST_LIMIT: usize = 200;

/// Year substituted in previews of campaigns without a target year.
const PREVIEW_FALLBACK_YEAR: i32 = 2027;

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub struct CampaignService {
    store: Arc<CampaignStore>,
    importer: Arc<Importer>,
    admin_email: String,
}

impl CampaignService {
    pub fn new(store: Arc<CampaignStore>, importer: Arc<Importer>, admin_email: impl Into<String>) -> Self {
        Self {
            store,
            importer,
            admin_email: admin_email.into(),
        }
    }

    pub fn store(&self) -> &Arc<CampaignStore> {
        &self.store
    }

    /// Materialise a draft campaign from a cached upload. Rows without a
    /// usable email are dropped; the upload is consumed.
    pub fn create(&self, req: CreateCampaignRequest) -> RosterResult<Campaign> {
        let rows = self.importer.take_recipients(&req.upload_id, req.mapping)?;

        let defaults = EmailTemplate::default();
        let template = EmailTemplate {
            subject: non_empty(req.subject).unwrap_or(defaults.subject),
            header_title: non_empty(req.header_title).unwrap_or(defaults.header_title),
            header_subtitle: req.header_subtitle.unwrap_or_default(),
            color_primary: non_empty(req.color_primary).unwrap_or(defaults.color_primary),
            color_secondary: non_empty(req.color_secondary).unwrap_or(defaults.color_secondary),
            body_html: req.body_html,
        };

        let campaign = self.store.insert_campaign(NewCampaign {
            name: non_empty(req.name).unwrap_or_else(|| format!("Campagne {}", req.target_year)),
            target_year: req.target_year,
            signer: req.signer,
            registration_link: req.registration_link,
            template,
            attachment_ids: req.attachment_ids,
        });
        let inserted = self.store.insert_recipients(campaign.id, rows)?;

        metrics::counter!("campaigns.created").increment(1);
        info!(
            campaign_id = campaign.id,
            upload_id = %req.upload_id,
            recipients = inserted,
            "Campaign created"
        );

        self.store
            .get_campaign(campaign.id)
            .ok_or_else(|| RosterError::NotFound(format!("campaign {}", campaign.id)))
    }

    pub fn update(&self, id: CampaignId, req: UpdateCampaignRequest) -> RosterResult<Campaign> {
        let campaign = self.store.update_draft(id, |c| {
            if let Some(name) = req.name {
                c.name = name;
            }
            if let Some(year) = req.target_year {
                c.target_year = year;
            }
            if let Some(signer) = req.signer {
                c.signer = signer;
            }
            if let Some(link) = req.registration_link {
                c.registration_link = link;
            }
            if let Some(subject) = req.subject {
                c.template.subject = subject;
            }
            if let Some(title) = req.header_title {
                c.template.header_title = title;
            }
            if let Some(subtitle) = req.header_subtitle {
                c.template.header_subtitle = subtitle;
            }
            if let Some(color) = req.color_primary {
                c.template.color_primary = color;
            }
            if let Some(color) = req.color_secondary {
                c.template.color_secondary = color;
            }
            if let Some(body) = req.body_html {
                c.template.body_html = body;
            }
            if let Some(ids) = req.attachment_ids {
                c.attachment_ids = ids;
            }
        })?;
        info!(campaign_id = id, "Draft campaign updated");
        Ok(campaign)
    }

    /// Delete a draft and its recipients.
    pub fn delete(&self, id: CampaignId) -> RosterResult<usize> {
        let removed = self.store.delete_draft(id)?;
        metrics::counter!("campaigns.deleted").increment(1);
        info!(campaign_id = id, recipients_removed = removed, "Draft campaign deleted");
        Ok(removed)
    }

    pub fn list(&self) -> Vec<Campaign> {
        self.store.list_campaigns()
    }

    pub fn detail(&self, id: CampaignId) -> RosterResult<(Campaign, BTreeMap<String, u64>)> {
        let campaign = self.get(id)?;
        Ok((campaign, self.store.status_counts(id)))
    }

    pub fn get(&self, id: CampaignId) -> RosterResult<Campaign> {
        self.store
            .get_campaign(id)
            .ok_or_else(|| RosterError::NotFound(format!("campaign {id}")))
    }

    pub fn recipients(&self, id: CampaignId, filter: RecipientFilter) -> RosterResult<Vec<CampaignRecipient>> {
        self.get(id)?;
        Ok(self.store.recipients(id, filter, RECIPIENT_LIST_LIMIT))
    }

    /// Render the campaign with placeholder recipient data.
    pub fn preview(&self, id: CampaignId) -> RosterResult<RenderedEmail> {
        let campaign = self.get(id)?;
        let year = if campaign.target_year > 0 {
            campaign.target_year
        } else {
            PREVIEW_FALLBACK_YEAR
        };
        let link = if campaign.registration_link.is_empty() {
            "#".to_string()
        } else {
            campaign.registration_link.clone()
        };
        let vars = CampaignVars {
            last_name: "DUPONT".to_string(),
            first_name: "Jean".to_string(),
            year: year.to_string(),
            registration_link: link,
            signer: campaign.signer.clone(),
            admin_email: self.admin_email.clone(),
        };
        Ok(templates::render(&campaign.template, &vars))
    }

    pub fn relaunch_stats(&self, id: CampaignId) -> RosterResult<RelaunchStats> {
        self.get(id)?;
        Ok(RelaunchStats {
            non_opened: self.store.count_matching(id, RelaunchTarget::NonOpened),
            opened_not_clicked: self.store.count_matching(id, RelaunchTarget::OpenedNotClicked),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use roster_core::config::UploadConfig;
    use roster_import::UploadCache;

    const SHEET: &str = "Nom,Prénom,Email Pro,Email Perso\n\
DUPONT,Jean,jean.dupont@example.fr,\n\
MARTIN,Anne,,\n\
DURAND,Luc,luc@cabinet.fr,luc@perso.fr\n";

    fn service() -> CampaignService {
        let importer = Importer::new(Arc::new(UploadCache::new(60)), &UploadConfig::default());
        CampaignService::new(Arc::new(CampaignStore::new()), Arc::new(importer), "admin@example.fr")
    }

    fn create_request(upload_id: String) -> CreateCampaignRequest {
        CreateCampaignRequest {
            upload_id,
            mapping: None,
            name: None,
            target_year: 2027,
            signer: "Dr Martin".to_string(),
            registration_link: String::new(),
            subject: None,
            header_title: Some(" ".to_string()),
            header_subtitle: None,
            color_primary: None,
            color_secondary: None,
            body_html: "<p>Bonjour Dr {{NOM}}</p>".to_string(),
            attachment_ids: Vec::new(),
        }
    }

    fn created(service: &CampaignService) -> Campaign {
        let upload = service.importer.analyze("liste.csv", SHEET.as_bytes()).unwrap();
        service.create(create_request(upload.upload_id)).unwrap()
    }

    #[test]
    fn test_create_applies_defaults_and_drops_rows_without_email() {
        let service = service();
        let campaign = created(&service);

        assert_eq!(campaign.name, "Campagne 2027");
        assert_eq!(campaign.status, CampaignStatus::Draft);
        assert_eq!(campaign.recipient_count, 2);
        assert_eq!(campaign.template.subject, templates::DEFAULT_CAMPAIGN_SUBJECT);
        assert_eq!(campaign.template.header_title, templates::DEFAULT_CAMPAIGN_HEADER);
        assert_eq!(campaign.template.color_primary, templates::DEFAULT_COLOR_PRIMARY);
    }

    #[test]
    fn test_create_consumes_upload() {
        let service = service();
        let upload = service.importer.analyze("liste.csv", SHEET.as_bytes()).unwrap();
        service.create(create_request(upload.upload_id.clone())).unwrap();

        let err = service.create(create_request(upload.upload_id)).unwrap_err();
        assert!(matches!(err, RosterError::UploadExpired(_)));
    }

    #[test]
    fn test_update_keeps_absent_fields() {
        let service = service();
        let campaign = created(&service);
        let updated = service
            .update(
                campaign.id,
                UpdateCampaignRequest {
                    subject: Some("Nouveau sujet".to_string()),
                    ..UpdateCampaignRequest::default()
                },
            )
            .unwrap();

        assert_eq!(updated.template.subject, "Nouveau sujet");
        assert_eq!(updated.template.body_html, campaign.template.body_html);
        assert_eq!(updated.signer, "Dr Martin");
    }

    #[test]
    fn test_preview_uses_sample_recipient() {
        let service = service();
        let campaign = created(&service);
        let rendered = service.preview(campaign.id).unwrap();

        assert!(rendered.subject.contains("2027"));
        assert!(rendered.html.contains("DUPONT"));
        assert!(matches!(service.preview(999), Err(RosterError::NotFound(_))));
    }

    #[test]
    fn test_recipients_listing_requires_campaign() {
        let service = service();
        let campaign = created(&service);
        assert_eq!(service.recipients(campaign.id, RecipientFilter::All).unwrap().len(), 2);
        assert!(service.recipients(42, RecipientFilter::All).is_err());

        let stats = service.relaunch_stats(campaign.id).unwrap();
        assert_eq!(stats, RelaunchStats { non_opened: 0, opened_not_clicked: 0 });
    }
}
