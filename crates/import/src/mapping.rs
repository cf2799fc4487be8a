//! Column-role detection from spreadsheet header text.

use roster_core::{RosterError, RosterResult};
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use utoipa::ToSchema;

/// Column index assigned to each recipient field, `None` when unmapped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ColumnMapping {
    #[serde(default)]
    pub last_name: Option<usize>,
    #[serde(default)]
    pub first_name: Option<usize>,
    /// Primary email column, preferred whenever its value is usable.
    #[serde(default)]
    pub email: Option<usize>,
    #[serde(default)]
    pub email2: Option<usize>,
    #[serde(default)]
    pub age: Option<usize>,
    #[serde(default)]
    pub rpps: Option<usize>,
    #[serde(default)]
    pub city: Option<usize>,
    #[serde(default)]
    pub postal_code: Option<usize>,
    #[serde(default)]
    pub phone: Option<usize>,
}

impl ColumnMapping {
    fn columns(&self) -> [(&'static str, Option<usize>); 9] {
        [
            ("last_name", self.last_name),
            ("first_name", self.first_name),
            ("email", self.email),
            ("email2", self.email2),
            ("age", self.age),
            ("rpps", self.rpps),
            ("city", self.city),
            ("postal_code", self.postal_code),
            ("phone", self.phone),
        ]
    }

    /// Reject indexes that point past the header row.
    pub fn validate(&self, header_count: usize) -> RosterResult<()> {
        for (field, column) in self.columns() {
            if let Some(index) = column {
                if index >= header_count {
                    return Err(RosterError::Validation(format!(
                        "column {index} mapped to '{field}' does not exist ({header_count} columns)"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Lowercase and strip diacritics so `Prénom` and `PRENOM` compare equal.
pub fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

fn assign_email(mapping: &mut ColumnMapping, index: usize) {
    if mapping.email.is_none() {
        mapping.email = Some(index);
    } else if mapping.email2.is_none() {
        mapping.email2 = Some(index);
    }
}

/// Detect column roles from header text.
///
/// Each header is tested against the precise rules in priority order and
/// the first matching rule wins. Fields still unassigned afterwards get a
/// looser pass keyed on the bare keyword.
pub fn auto_detect(headers: &[String]) -> ColumnMapping {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    let mut mapping = ColumnMapping::default();

    for (i, h) in normalized.iter().enumerate() {
        let h = h.as_str();
        if h.is_empty() {
            continue;
        }
        if h.contains("nom") && !h.contains("prenom") && mapping.last_name.is_none() {
            mapping.last_name = Some(i);
        } else if h.contains("prenom") {
            if mapping.first_name.is_none() {
                mapping.first_name = Some(i);
            }
        } else if h.contains("email pro")
            || matches!(h, "email" | "e-mail" | "mail" | "courriel")
            || h.contains("email contact")
            || h.contains("email oncd")
            || h.contains("email priv")
        {
            assign_email(&mut mapping, i);
        } else if h == "age" {
            mapping.age = Some(i);
        } else if h.contains("rpps") {
            mapping.rpps = Some(i);
        } else if h.contains("localite") || h.contains("ville") || h.contains("commune") {
            mapping.city = Some(i);
        } else if h.contains("cp ")
            || h == "cp"
            || h == "bdi"
            || h.contains("code postal")
            || h.contains("pro cp")
        {
            mapping.postal_code = Some(i);
        } else if (h.contains("tel") || h.contains("mobile") || h.contains("portable"))
            && mapping.phone.is_none()
        {
            mapping.phone = Some(i);
        }
    }

    if mapping.last_name.is_none() {
        mapping.last_name = normalized.iter().position(|h| h.contains("nom"));
    }
    if mapping.email.is_none() {
        mapping.email = normalized.iter().position(|h| h.contains("email"));
    }
    if mapping.email2.is_none() {
        mapping.email2 = normalized
            .iter()
            .enumerate()
            .position(|(i, h)| h.contains("email") && Some(i) != mapping.email);
    }

    mapping
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_strips_accents_and_case() {
        assert_eq!(normalize_header("  Prénom (usuel) "), "prenom (usuel)");
        assert_eq!(normalize_header("LOCALITÉ"), "localite");
        assert_eq!(normalize_header("Âge"), "age");
    }

    #[test]
    fn test_detects_standard_roster_headers() {
        let mapping = auto_detect(&headers(&[
            "Nom",
            "Prénom",
            "Email Pro",
            "Email Perso",
            "N° RPPS",
            "Ville",
            "Code Postal",
            "Téléphone",
            "Âge",
        ]));
        assert_eq!(mapping.last_name, Some(0));
        assert_eq!(mapping.first_name, Some(1));
        assert_eq!(mapping.email, Some(2));
        assert_eq!(mapping.email2, Some(3));
        assert_eq!(mapping.rpps, Some(4));
        assert_eq!(mapping.city, Some(5));
        assert_eq!(mapping.postal_code, Some(6));
        assert_eq!(mapping.phone, Some(7));
        assert_eq!(mapping.age, Some(8));
    }

    #[test]
    fn test_first_email_hit_wins_and_second_becomes_secondary() {
        let mapping = auto_detect(&headers(&["Courriel", "Email contact", "Email privé"]));
        assert_eq!(mapping.email, Some(0));
        assert_eq!(mapping.email2, Some(1));
    }

    #[test]
    fn test_fallback_pass_uses_keyword_containment() {
        let mapping = auto_detect(&headers(&["Nom d'exercice", "Adresse email du cabinet"]));
        assert_eq!(mapping.last_name, Some(0));
        assert_eq!(mapping.email, Some(1));
        assert_eq!(mapping.email2, None);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let input = headers(&["Email", "NOM", "Prenom", "CP", "Commune", "Mobile"]);
        let first = auto_detect(&input);
        for _ in 0..10 {
            assert_eq!(auto_detect(&input), first);
        }
        assert_eq!(first.email, Some(0));
        assert_eq!(first.last_name, Some(1));
        assert_eq!(first.postal_code, Some(3));
        assert_eq!(first.city, Some(4));
        assert_eq!(first.phone, Some(5));
    }

    #[test]
    fn test_validate_rejects_out_of_range_column() {
        let mapping = ColumnMapping {
            email: Some(4),
            ..ColumnMapping::default()
        };
        assert!(mapping.validate(5).is_ok());
        assert!(matches!(
            mapping.validate(4),
            Err(RosterError::Validation(_))
        ));
    }
}
