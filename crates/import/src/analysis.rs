//! Import statistics, preview rows and recipient extraction for a mapping.

use crate::mapping::ColumnMapping;
use roster_core::types::is_valid_email;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ImportStats {
    pub total: usize,
    /// Rows with at least one usable email.
    pub with_email: usize,
    pub without_email: usize,
    /// Rows whose primary email column is usable.
    pub with_primary_email: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PreviewRow {
    pub last_name: String,
    pub first_name: String,
    pub email: String,
    pub rpps: String,
    pub city: String,
    pub postal_code: String,
}

/// A row that qualifies as a campaign recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientRow {
    pub last_name: String,
    pub first_name: String,
    pub email: String,
    pub rpps: Option<String>,
    pub age: Option<u32>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
}

fn cell(row: &[String], column: Option<usize>) -> &str {
    column
        .and_then(|i| row.get(i))
        .map(|value| value.trim())
        .unwrap_or("")
}

fn optional_cell(row: &[String], column: Option<usize>) -> Option<String> {
    let value = cell(row, column);
    (!value.is_empty()).then(|| value.to_string())
}

/// The usable email of a row: the primary address when it passes the format
/// check, else the secondary one under the same check.
pub fn resolve_email(row: &[String], mapping: &ColumnMapping) -> Option<String> {
    [mapping.email, mapping.email2]
        .into_iter()
        .map(|column| cell(row, column))
        .find(|value| !value.is_empty() && is_valid_email(value))
        .map(str::to_string)
}

/// Email shown in the preview: the usable one, otherwise whatever raw text
/// the email columns hold so the operator can spot malformed values.
fn display_email(row: &[String], mapping: &ColumnMapping) -> String {
    resolve_email(row, mapping).unwrap_or_else(|| {
        let primary = cell(row, mapping.email);
        if primary.is_empty() {
            cell(row, mapping.email2).to_string()
        } else {
            primary.to_string()
        }
    })
}

pub fn compute_stats(rows: &[Vec<String>], mapping: &ColumnMapping) -> ImportStats {
    let mut stats = ImportStats {
        total: rows.len(),
        ..ImportStats::default()
    };
    for row in rows {
        let primary = cell(row, mapping.email);
        let primary_ok = !primary.is_empty() && is_valid_email(primary);
        if resolve_email(row, mapping).is_some() {
            stats.with_email += 1;
        } else {
            stats.without_email += 1;
        }
        if primary_ok {
            stats.with_primary_email += 1;
        }
    }
    stats
}

pub fn build_preview(rows: &[Vec<String>], mapping: &ColumnMapping, limit: usize) -> Vec<PreviewRow> {
    rows.iter()
        .take(limit)
        .map(|row| PreviewRow {
            last_name: cell(row, mapping.last_name).to_string(),
            first_name: cell(row, mapping.first_name).to_string(),
            email: display_email(row, mapping),
            rpps: cell(row, mapping.rpps).to_string(),
            city: cell(row, mapping.city).to_string(),
            postal_code: cell(row, mapping.postal_code).to_string(),
        })
        .collect()
}

/// Rows with a usable email, in sheet order. Rows without one are dropped.
pub fn extract_recipients(rows: &[Vec<String>], mapping: &ColumnMapping) -> Vec<RecipientRow> {
    rows.iter()
        .filter_map(|row| {
            let email = resolve_email(row, mapping)?;
            Some(RecipientRow {
                last_name: cell(row, mapping.last_name).to_string(),
                first_name: cell(row, mapping.first_name).to_string(),
                email,
                rpps: optional_cell(row, mapping.rpps),
                age: cell(row, mapping.age).parse().ok(),
                city: optional_cell(row, mapping.city),
                postal_code: optional_cell(row, mapping.postal_code),
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn two_email_mapping() -> ColumnMapping {
        ColumnMapping {
            last_name: Some(0),
            first_name: Some(1),
            email: Some(2),
            email2: Some(3),
            age: Some(4),
            ..ColumnMapping::default()
        }
    }

    #[test]
    fn test_primary_email_wins_when_both_valid() {
        let r = row(&["DUPONT", "Jean", "pro@example.fr", "perso@example.fr", ""]);
        assert_eq!(
            resolve_email(&r, &two_email_mapping()).as_deref(),
            Some("pro@example.fr")
        );
    }

    #[test]
    fn test_secondary_used_when_primary_malformed() {
        let r = row(&["DUPONT", "Jean", "pro@", "perso@example.fr", ""]);
        assert_eq!(
            resolve_email(&r, &two_email_mapping()).as_deref(),
            Some("perso@example.fr")
        );
    }

    #[test]
    fn test_stats_count_usable_and_primary() {
        let rows = vec![
            row(&["A", "a", "a@example.fr", "", ""]),
            row(&["B", "b", "", "", ""]),
            row(&["C", "c", "bad", "c@example.fr", ""]),
        ];
        let stats = compute_stats(&rows, &two_email_mapping());
        assert_eq!(
            stats,
            ImportStats {
                total: 3,
                with_email: 2,
                without_email: 1,
                with_primary_email: 1,
            }
        );
    }

    #[test]
    fn test_preview_shows_raw_email_when_unusable() {
        let rows = vec![row(&["C", "c", "bad", "", ""])];
        let preview = build_preview(&rows, &two_email_mapping(), 10);
        assert_eq!(preview[0].email, "bad");
        assert_eq!(preview[0].rpps, "");
    }

    #[test]
    fn test_preview_is_capped() {
        let rows: Vec<_> = (0..25)
            .map(|i| row(&[format!("N{i}").as_str(), "", "", "", ""]))
            .collect();
        assert_eq!(build_preview(&rows, &two_email_mapping(), 10).len(), 10);
    }

    #[test]
    fn test_extract_skips_rows_without_email_and_parses_age() {
        let rows = vec![
            row(&["A", "a", "a@example.fr", "", "42"]),
            row(&["B", "b", "", "", "50"]),
            row(&["C", "c", "", "c@example.fr", "n/a"]),
        ];
        let recipients = extract_recipients(&rows, &two_email_mapping());
        assert_eq!(recipients.len(), 2);
        assert_eq!(recipients[0].age, Some(42));
        assert_eq!(recipients[1].email, "c@example.fr");
        assert_eq!(recipients[1].age, None);
        assert_eq!(recipients[1].city, None);
    }

    #[test]
    fn test_unmapped_email_columns_yield_no_recipients() {
        let rows = vec![row(&["A", "a", "a@example.fr"])];
        let mapping = ColumnMapping {
            last_name: Some(0),
            ..ColumnMapping::default()
        };
        assert!(extract_recipients(&rows, &mapping).is_empty());
        assert_eq!(compute_stats(&rows, &mapping).without_email, 1);
    }
}
