//! Spreadsheet decoding: first worksheet of an xlsx/xls/ods workbook, or a
//! delimited text file.

use calamine::{open_workbook_auto_from_rs, Reader};
use roster_core::{RosterError, RosterResult};
use std::io::Cursor;

/// Header row plus data rows, every cell stringified and trimmed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

fn is_delimited(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    lower.ends_with(".csv") || lower.ends_with(".txt")
}

/// Decode an uploaded spreadsheet. Fails when there is no data row below
/// the header row.
pub fn parse(file_name: &str, bytes: &[u8]) -> RosterResult<ParsedSheet> {
    let table = if is_delimited(file_name) {
        read_delimited(bytes)?
    } else {
        read_workbook(bytes)?
    };
    into_sheet(table)
}

fn read_workbook(bytes: &[u8]) -> RosterResult<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| RosterError::Spreadsheet(format!("unreadable workbook: {e}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| RosterError::Spreadsheet("workbook has no worksheet".to_string()))?
        .map_err(|e| RosterError::Spreadsheet(format!("unreadable worksheet: {e}")))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string().trim().to_string()).collect())
        .collect())
}

fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let first_line = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
    let semicolons = first_line.iter().filter(|b| **b == b';').count();
    let commas = first_line.iter().filter(|b| **b == b',').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

fn read_delimited(bytes: &[u8]) -> RosterResult<Vec<Vec<String>>> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(sniff_delimiter(bytes))
        .from_reader(bytes);

    let mut table = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| RosterError::Spreadsheet(format!("malformed CSV: {e}")))?;
        table.push(record.iter().map(|cell| cell.trim().to_string()).collect());
    }
    Ok(table)
}

fn into_sheet(table: Vec<Vec<String>>) -> RosterResult<ParsedSheet> {
    let mut lines = table.into_iter();
    let headers = lines
        .next()
        .ok_or_else(|| RosterError::Spreadsheet("empty file or no data".to_string()))?;

    let width = headers.len();
    let rows: Vec<Vec<String>> = lines
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .map(|mut row| {
            if row.len() < width {
                row.resize(width, String::new());
            }
            row
        })
        .collect();

    if rows.is_empty() {
        return Err(RosterError::Spreadsheet("empty file or no data".to_string()));
    }

    Ok(ParsedSheet { headers, rows })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv_with_semicolons_and_bom() {
        let data = "\u{feff}Nom;Prénom;Email\nDUPONT;Jean;jean@example.fr\n;;\nMARTIN;Anne\n";
        let sheet = parse("liste.csv", data.as_bytes()).unwrap();

        assert_eq!(sheet.headers, vec!["Nom", "Prénom", "Email"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0], vec!["DUPONT", "Jean", "jean@example.fr"]);
        // short rows are padded to the header width
        assert_eq!(sheet.rows[1], vec!["MARTIN", "Anne", ""]);
    }

    #[test]
    fn test_parse_csv_trims_cells() {
        let data = "Nom , Email\n  DUPONT , jean@example.fr  \n";
        let sheet = parse("LISTE.CSV", data.as_bytes()).unwrap();
        assert_eq!(sheet.headers, vec!["Nom", "Email"]);
        assert_eq!(sheet.rows[0], vec!["DUPONT", "jean@example.fr"]);
    }

    #[test]
    fn test_header_only_sheet_is_rejected() {
        let err = parse("liste.csv", b"Nom,Email\n").unwrap_err();
        assert!(matches!(err, RosterError::Spreadsheet(_)));
    }

    #[test]
    fn test_empty_file_is_rejected() {
        assert!(parse("liste.csv", b"").is_err());
    }

    #[test]
    fn test_garbage_workbook_is_rejected() {
        let err = parse("liste.xlsx", b"not a zip archive").unwrap_err();
        assert!(matches!(err, RosterError::Spreadsheet(_)));
    }
}
