#![warn(clippy::unwrap_used)]

pub mod analysis;
pub mod cache;
pub mod mapping;
pub mod sheet;

pub use analysis::{ImportStats, PreviewRow, RecipientRow};
pub use cache::{CachedUpload, UploadCache};
pub use mapping::ColumnMapping;

use roster_core::config::UploadConfig;
use roster_core::{RosterError, RosterResult};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

/// Result of analysing a fresh upload.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UploadAnalysis {
    pub upload_id: String,
    pub file_name: String,
    pub headers: Vec<String>,
    pub mapping: ColumnMapping,
    pub stats: ImportStats,
    pub preview: Vec<PreviewRow>,
    pub total_rows: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RemapResult {
    pub stats: ImportStats,
    pub preview: Vec<PreviewRow>,
}

/// Spreadsheet import front door: parse, map, cache, and hand rows to
/// campaign creation.
pub struct Importer {
    cache: Arc<UploadCache>,
    max_bytes: usize,
    preview_rows: usize,
}

impl Importer {
    pub fn new(cache: Arc<UploadCache>, config: &UploadConfig) -> Self {
        Self {
            cache,
            max_bytes: config.max_bytes,
            preview_rows: config.preview_rows,
        }
    }

    pub fn cache(&self) -> &Arc<UploadCache> {
        &self.cache
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn analyze(&self, file_name: &str, bytes: &[u8]) -> RosterResult<UploadAnalysis> {
        if bytes.len() > self.max_bytes {
            return Err(RosterError::Validation(format!(
                "file too large ({} bytes, limit {})",
                bytes.len(),
                self.max_bytes
            )));
        }

        let sheet = sheet::parse(file_name, bytes)?;
        let mapping = mapping::auto_detect(&sheet.headers);
        let stats = analysis::compute_stats(&sheet.rows, &mapping);
        let preview = analysis::build_preview(&sheet.rows, &mapping, self.preview_rows);
        let headers = sheet.headers.clone();
        let total_rows = sheet.rows.len();

        let upload_id = self.cache.insert(CachedUpload {
            file_name: file_name.to_string(),
            sheet,
            mapping: mapping.clone(),
        });

        metrics::counter!("imports.uploaded").increment(1);
        info!(
            upload_id = %upload_id,
            file_name,
            total_rows,
            with_email = stats.with_email,
            "Spreadsheet analysed"
        );

        Ok(UploadAnalysis {
            upload_id,
            file_name: file_name.to_string(),
            headers,
            mapping,
            stats,
            preview,
            total_rows,
        })
    }

    /// Recompute stats and preview for an edited mapping without re-parsing.
    pub fn remap(&self, upload_id: &str, mapping: ColumnMapping) -> RosterResult<RemapResult> {
        let upload = self
            .cache
            .get(upload_id)
            .ok_or_else(|| RosterError::UploadExpired(upload_id.to_string()))?;
        mapping.validate(upload.sheet.headers.len())?;

        let stats = analysis::compute_stats(&upload.sheet.rows, &mapping);
        let preview = analysis::build_preview(&upload.sheet.rows, &mapping, self.preview_rows);
        self.cache.set_mapping(upload_id, mapping);

        Ok(RemapResult { stats, preview })
    }

    /// Consume an upload and return its recipient rows under `mapping`, or
    /// under the last cached mapping when none is given. The entry is only
    /// consumed once the mapping is known to be valid.
    pub fn take_recipients(
        &self,
        upload_id: &str,
        mapping: Option<ColumnMapping>,
    ) -> RosterResult<Vec<RecipientRow>> {
        let upload = self
            .cache
            .get(upload_id)
            .ok_or_else(|| RosterError::UploadExpired(upload_id.to_string()))?;
        let mapping = mapping.unwrap_or_else(|| upload.mapping.clone());
        mapping.validate(upload.sheet.headers.len())?;

        let upload = self
            .cache
            .take(upload_id)
            .ok_or_else(|| RosterError::UploadExpired(upload_id.to_string()))?;
        Ok(analysis::extract_recipients(&upload.sheet.rows, &mapping))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn importer() -> Importer {
        Importer::new(Arc::new(UploadCache::new(60)), &UploadConfig::default())
    }

    const ROSTER_CSV: &str = "Nom,Prénom,Email Pro,Email Perso\n\
DUPONT,Jean,jean.dupont@example.fr,\n\
MARTIN,Anne,,\n\
DURAND,Luc,luc@cabinet.fr,luc@perso.fr\n";

    #[test]
    fn test_upload_stats_for_three_row_sheet() {
        let analysis = importer().analyze("liste.csv", ROSTER_CSV.as_bytes()).unwrap();

        assert_eq!(analysis.total_rows, 3);
        assert_eq!(analysis.stats.total, 3);
        assert_eq!(analysis.stats.with_email, 2);
        assert_eq!(analysis.stats.without_email, 1);
        assert_eq!(analysis.stats.with_primary_email, 2);
        assert_eq!(analysis.mapping.email, Some(2));
        assert_eq!(analysis.mapping.email2, Some(3));
        assert_eq!(analysis.preview.len(), 3);
    }

    #[test]
    fn test_remap_recomputes_without_reparse() {
        let importer = importer();
        let analysis = importer.analyze("liste.csv", ROSTER_CSV.as_bytes()).unwrap();
        let mapping = ColumnMapping {
            email: Some(3),
            ..analysis.mapping.clone()
        };

        let remapped = importer.remap(&analysis.upload_id, mapping).unwrap();
        assert_eq!(remapped.stats.with_primary_email, 1);
        assert_eq!(remapped.stats.with_email, 1);
    }

    #[test]
    fn test_remap_unknown_upload_requires_reupload() {
        let err = importer()
            .remap("missing", ColumnMapping::default())
            .unwrap_err();
        assert!(matches!(err, RosterError::UploadExpired(_)));
    }

    #[test]
    fn test_invalid_mapping_does_not_consume_upload() {
        let importer = importer();
        let analysis = importer.analyze("liste.csv", ROSTER_CSV.as_bytes()).unwrap();
        let bad = ColumnMapping {
            email: Some(12),
            ..ColumnMapping::default()
        };

        assert!(importer.take_recipients(&analysis.upload_id, Some(bad)).is_err());
        let rows = importer.take_recipients(&analysis.upload_id, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(importer.take_recipients(&analysis.upload_id, None).is_err());
    }

    #[test]
    fn test_oversized_upload_rejected() {
        let config = UploadConfig {
            max_bytes: 8,
            ..UploadConfig::default()
        };
        let importer = Importer::new(Arc::new(UploadCache::new(60)), &config);
        let err = importer.analyze("liste.csv", ROSTER_CSV.as_bytes()).unwrap_err();
        assert!(matches!(err, RosterError::Validation(_)));
    }
}
