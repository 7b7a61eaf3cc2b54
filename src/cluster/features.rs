//! Feature extraction and text normalization for edition clustering.

use lazy_static::lazy_static;
use regex::Regex;

use crate::dates::YearComponents;
use crate::record::{BibRecord, DateKind};

lazy_static! {
    static ref PUNCTUATION: Regex = Regex::new(r"[^\w\s]").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    /// Cataloging boilerplate stripped before comparison; these phrases
    /// carry no distinguishing signal between editions.
    static ref BOILERPLATE: Regex = Regex::new(
        r"\b(publisher not identified|place of publication not identified|sine nomine|sine loco|s n|s l)\b"
    )
    .unwrap();
}

/// One row of clustering features derived from an edition record.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    /// The source record's key, carried through to cluster membership.
    pub key: String,
    pub place: String,
    pub publisher: String,
    pub edition_statement: String,
    pub year_components: YearComponents,
}

/// Normalize free-text catalog fields: join list values, `&` to `and`,
/// strip punctuation, lowercase, drop boilerplate, collapse whitespace.
pub fn normalize_text(parts: &[&str]) -> String {
    let joined = parts.join(" ").to_lowercase().replace('&', " and ");
    let stripped = PUNCTUATION.replace_all(&joined, " ");
    let collapsed = WHITESPACE.replace_all(&stripped, " ").trim().to_string();
    let scrubbed = BOILERPLATE.replace_all(&collapsed, " ");
    WHITESPACE.replace_all(&scrubbed, " ").trim().to_string()
}

/// Pick the date to cluster on: a copyright date when present, otherwise a
/// publication date, otherwise any other dated statement.
fn clustering_date(record: &BibRecord) -> YearComponents {
    let by_kind = |kind: DateKind| {
        record
            .dates
            .iter()
            .filter(move |d| d.kind == kind)
            .find_map(|d| YearComponents::parse(&d.value))
    };
    by_kind(DateKind::Copyright)
        .or_else(|| by_kind(DateKind::Publication))
        .or_else(|| by_kind(DateKind::Other))
        .unwrap_or_default()
}

/// Derive the feature row for one edition record.
pub fn extract_row(record: &BibRecord) -> FeatureRow {
    let publisher: Vec<&str> = record.publisher.iter().map(String::as_str).collect();
    let edition: Vec<&str> = record.edition_statement.iter().map(String::as_str).collect();
    FeatureRow {
        key: record.key.clone(),
        place: normalize_text(&[record.spatial.as_deref().unwrap_or("")]),
        publisher: normalize_text(&publisher),
        edition_statement: normalize_text(&edition),
        year_components: clustering_date(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordDate;

    #[test]
    fn test_normalize_joins_and_lowercases() {
        assert_eq!(
            normalize_text(&["Smith & Sons,", "LONDON."]),
            "smith and sons london"
        );
    }

    #[test]
    fn test_normalize_drops_boilerplate() {
        assert_eq!(normalize_text(&["[Publisher not identified]"]), "");
        assert_eq!(
            normalize_text(&["New York : publisher not identified"]),
            "new york"
        );
    }

    #[test]
    fn test_case_punctuation_boilerplate_equivalence() {
        // Rows differing only by case, trailing punctuation or boilerplate
        // normalize to identical feature values.
        let variants = [
            "Penguin Books",
            "penguin books,",
            "PENGUIN BOOKS.",
            "Penguin Books [publisher not identified]",
        ];
        let normalized: Vec<String> = variants.iter().map(|v| normalize_text(&[v])).collect();
        assert!(normalized.iter().all(|n| n == "penguin books"));
    }

    #[test]
    fn test_extract_row_prefers_copyright_date() {
        let record = BibRecord {
            key: "rec-1".to_string(),
            dates: vec![
                RecordDate::new("1910", DateKind::Publication),
                RecordDate::new("1899", DateKind::Copyright),
            ],
            ..Default::default()
        };
        let row = extract_row(&record);
        assert_eq!(row.year_components.display(), "1899");
    }

    #[test]
    fn test_extract_row_falls_back_to_publication_date() {
        let record = BibRecord {
            key: "rec-1".to_string(),
            dates: vec![
                RecordDate::new("no date", DateKind::Copyright),
                RecordDate::new("1910", DateKind::Publication),
            ],
            ..Default::default()
        };
        let row = extract_row(&record);
        assert_eq!(row.year_components.display(), "1910");
    }

    #[test]
    fn test_extract_row_empty_fields() {
        let record = BibRecord {
            key: "rec-1".to_string(),
            ..Default::default()
        };
        let row = extract_row(&record);
        assert!(row.place.is_empty());
        assert!(row.publisher.is_empty());
        assert!(row.edition_statement.is_empty());
        assert!(row.year_components.is_empty());
    }
}
