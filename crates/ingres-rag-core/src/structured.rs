//! Lexical matching over structured groundwater records.
//!
//! A record matches a query when either
//!
//! 1. its district name (case-insensitive) occurs inside the query, or
//! 2. the query carries a year and that year occurs inside the record's
//!    season label.
//!
//! The year is the first whitespace-delimited token that is exactly four
//! ASCII digits. Later four-digit tokens are ignored. Matching is a linear
//! scan in collection order; the first `limit` matches are returned.

use std::fmt::Display;

use crate::models::StructuredRecord;

/// Default maximum number of record matches returned per query.
pub const DEFAULT_RECORD_LIMIT: usize = 5;

/// Returns the first token of `query` that is exactly four ASCII digits.
pub fn extract_year(query: &str) -> Option<&str> {
    query
        .split_whitespace()
        .find(|token| token.len() == 4 && token.bytes().all(|b| b.is_ascii_digit()))
}

/// Tests one record against a lower-cased query and an optional year.
///
/// Records without a district never match on rule 1. A plain substring test
/// would let an empty district match every query; this is deliberately not
/// carried over.
pub fn record_matches(record: &StructuredRecord, query_lower: &str, year: Option<&str>) -> bool {
    let district = record.district.trim().to_lowercase();
    if !district.is_empty() && query_lower.contains(&district) {
        return true;
    }
    match year {
        Some(y) => record.season.to_lowercase().contains(y),
        None => false,
    }
}

/// Renders a record as one line of context.
pub fn format_record(record: &StructuredRecord) -> String {
    format!(
        "In {} ({}): GWL={} m, pH={}, TDS={} mg/L, Classification={}.",
        record.district,
        record.season,
        display_or_na(record.groundwater_level),
        display_or_na(record.ph),
        display_or_na(record.total_dissolved_solids),
        record.classification,
    )
}

fn display_or_na<T: Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "n/a".to_string())
}

/// Scans `records` in order and returns at most `limit` formatted matches.
pub fn search_records(query: &str, records: &[StructuredRecord], limit: usize) -> Vec<String> {
    let query_lower = query.to_lowercase();
    let year = extract_year(query);

    records
        .iter()
        .filter(|r| record_matches(r, &query_lower, year))
        .take(limit)
        .map(format_record)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(district: &str, season: &str) -> StructuredRecord {
        StructuredRecord {
            district: district.to_string(),
            season: season.to_string(),
            groundwater_level: Some(5.5),
            ph: Some(7.2),
            total_dissolved_solids: Some(410.0),
            classification: "Safe".to_string(),
        }
    }

    #[test]
    fn year_is_first_four_digit_token() {
        assert_eq!(extract_year("levels in 2019 and 2021"), Some("2019"));
        assert_eq!(extract_year("pune 20210 321 2022"), Some("2022"));
        assert_eq!(extract_year("no year here"), None);
        assert_eq!(extract_year("year 2021?"), None);
    }

    #[test]
    fn later_years_are_ignored() {
        let records = vec![record("Satara", "Monsoon 2021")];
        assert!(search_records("compare 2019 with 2021", &records, 5).is_empty());
        assert_eq!(search_records("compare 2021 with 2019", &records, 5).len(), 1);
    }

    #[test]
    fn district_match_is_case_insensitive() {
        let records = vec![record("Pune", "Monsoon 2021"), record("Nagpur", "Rabi 2020")];
        let hits = search_records("groundwater level in PUNE", &records, 5);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].starts_with("In Pune (Monsoon 2021)"));
    }

    #[test]
    fn year_matches_season() {
        let records = vec![record("Pune", "Monsoon 2021"), record("Nagpur", "Rabi 2020")];
        let hits = search_records("what happened in 2020", &records, 5);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].contains("Nagpur"));
    }

    #[test]
    fn results_are_capped() {
        let records: Vec<_> = (0..12).map(|_| record("Pune", "Monsoon 2021")).collect();
        assert_eq!(search_records("pune", &records, DEFAULT_RECORD_LIMIT).len(), 5);
    }

    #[test]
    fn empty_district_never_matches_on_name() {
        let records = vec![record("", "Summer 2018")];
        assert!(search_records("anything at all", &records, 5).is_empty());
    }

    #[test]
    fn format_is_stable() {
        let mut r = record("Pune", "Monsoon 2021");
        r.ph = None;
        assert_eq!(
            format_record(&r),
            "In Pune (Monsoon 2021): GWL=5.5 m, pH=n/a, TDS=410 mg/L, Classification=Safe."
        );
    }

    #[test]
    fn empty_collection_yields_nothing() {
        assert!(search_records("pune 2021", &[], 5).is_empty());
    }
}
