//! Bibliographic record model and the pipe-delimited boundary adapters.
//!
//! Upstream source mappers exchange records with compound fields encoded as
//! pipe-delimited strings (`"value|authority"`, `"name|viaf|lcnaf|flag"`,
//! `"value|type"`). Everything inside this crate works on the typed values
//! defined here; (de)serialization of the delimited forms is confined to the
//! `parse`/`encode` pairs in this module.

use serde::{Deserialize, Serialize};

/// Identifier authorities the classification service can be queried with.
pub const QUERYABLE_AUTHORITIES: &[&str] = &["isbn", "issn", "oclc"];

/// A single identifier attached to a record, unique by (value, authority).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub value: String,
    pub authority: String,
}

impl Identifier {
    pub fn new(value: impl Into<String>, authority: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            authority: authority.into(),
        }
    }

    /// Parse the boundary form `"value|authority"`.
    ///
    /// Malformed input (missing delimiter, empty value or authority) yields
    /// `None` rather than an error; the caller drops it silently.
    pub fn parse(raw: &str) -> Option<Self> {
        let (value, authority) = raw.split_once('|')?;
        if value.is_empty() || authority.is_empty() {
            return None;
        }
        Some(Self::new(value, authority))
    }

    pub fn encode(&self) -> String {
        format!("{}|{}", self.value, self.authority)
    }
}

/// An author or contributor with optional authority-file links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    pub name: String,
    pub viaf: Option<String>,
    pub lcnaf: Option<String>,
    /// Primary-creator flag (`true`/`t`/`1` in the boundary form).
    pub primary: bool,
}

impl Person {
    /// Parse the boundary form `"name|viaf|lcnaf|flag"`.
    ///
    /// Trailing segments may be omitted; empty viaf/lcnaf segments become
    /// `None`. An empty name is malformed and yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split('|');
        let name = parts.next().filter(|n| !n.is_empty())?;
        let viaf = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
        let lcnaf = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
        let primary = matches!(parts.next(), Some("true") | Some("t") | Some("1"));
        Some(Self {
            name: name.to_string(),
            viaf,
            lcnaf,
            primary,
        })
    }

    pub fn encode(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.name,
            self.viaf.as_deref().unwrap_or(""),
            self.lcnaf.as_deref().unwrap_or(""),
            if self.primary { "true" } else { "false" }
        )
    }
}

/// The date types relevant to edition clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateKind {
    Publication,
    Copyright,
    Other,
}

impl DateKind {
    fn from_label(label: &str) -> Self {
        match label {
            "publication_date" => DateKind::Publication,
            "copyright_date" => DateKind::Copyright,
            _ => DateKind::Other,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            DateKind::Publication => "publication_date",
            DateKind::Copyright => "copyright_date",
            DateKind::Other => "other",
        }
    }
}

/// A dated statement on a record, e.g. a publication or copyright date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDate {
    pub value: String,
    pub kind: DateKind,
}

impl RecordDate {
    pub fn new(value: impl Into<String>, kind: DateKind) -> Self {
        Self {
            value: value.into(),
            kind,
        }
    }

    /// Parse the boundary form `"value|type"`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (value, kind) = raw.split_once('|')?;
        if value.is_empty() {
            return None;
        }
        Some(Self::new(value, DateKind::from_label(kind)))
    }

    pub fn encode(&self) -> String {
        format!("{}|{}", self.value, self.kind.label())
    }
}

/// Whether a record has been through the classify step yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FrbrStatus {
    #[default]
    #[serde(rename = "to_do")]
    ToDo,
    #[serde(rename = "complete")]
    Complete,
}

/// The flat record shape this core consumes from and emits to the per-source
/// metadata mappers.
#[derive(Debug, Clone, Default)]
pub struct BibRecord {
    /// Stable upstream key identifying this record.
    pub key: String,
    pub title: Option<String>,
    pub authors: Vec<Person>,
    pub contributors: Vec<Person>,
    pub publisher: Vec<String>,
    pub identifiers: Vec<Identifier>,
    pub dates: Vec<RecordDate>,
    pub edition_statement: Vec<String>,
    pub spatial: Option<String>,
    pub frbr_status: FrbrStatus,
}

impl BibRecord {
    /// Append an identifier, collapsing duplicates by (value, authority).
    pub fn add_identifier(&mut self, identifier: Identifier) {
        if !self.identifiers.contains(&identifier) {
            self.identifiers.push(identifier);
        }
    }

    /// Identifiers usable as classification queries.
    pub fn queryable_identifiers(&self) -> Vec<&Identifier> {
        queryable_identifiers(&self.identifiers)
    }

    /// The name of the primary author, falling back to the first listed.
    pub fn primary_author(&self) -> Option<&str> {
        self.authors
            .iter()
            .find(|p| p.primary)
            .or_else(|| self.authors.first())
            .map(|p| p.name.as_str())
    }
}

/// Filter identifiers to those whose authority the classification service
/// accepts (`isbn`, `issn`, `oclc`; case-sensitive).
pub fn queryable_identifiers(identifiers: &[Identifier]) -> Vec<&Identifier> {
    identifiers
        .iter()
        .filter(|id| QUERYABLE_AUTHORITIES.contains(&id.authority.as_str()))
        .collect()
}

/// The JSONL boundary shape: compound fields still pipe-delimited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRecord {
    pub key: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub contributors: Vec<String>,
    #[serde(default)]
    pub publisher: Vec<String>,
    #[serde(default)]
    pub identifiers: Vec<String>,
    #[serde(default)]
    pub dates: Vec<String>,
    #[serde(default)]
    pub edition_statement: Vec<String>,
    #[serde(default)]
    pub spatial: Option<String>,
    #[serde(default)]
    pub frbr_status: FrbrStatus,
}

impl RawRecord {
    /// Decode into the typed record, silently dropping malformed compound
    /// fields and duplicate identifiers.
    pub fn into_record(self) -> BibRecord {
        let mut record = BibRecord {
            key: self.key,
            title: self.title,
            authors: self.authors.iter().filter_map(|s| Person::parse(s)).collect(),
            contributors: self
                .contributors
                .iter()
                .filter_map(|s| Person::parse(s))
                .collect(),
            publisher: self.publisher,
            identifiers: Vec::new(),
            dates: self.dates.iter().filter_map(|s| RecordDate::parse(s)).collect(),
            edition_statement: self.edition_statement,
            spatial: self.spatial,
            frbr_status: self.frbr_status,
        };
        for raw in &self.identifiers {
            if let Some(id) = Identifier::parse(raw) {
                record.add_identifier(id);
            }
        }
        record
    }

    pub fn from_record(record: &BibRecord) -> Self {
        Self {
            key: record.key.clone(),
            title: record.title.clone(),
            authors: record.authors.iter().map(Person::encode).collect(),
            contributors: record.contributors.iter().map(Person::encode).collect(),
            publisher: record.publisher.clone(),
            identifiers: record.identifiers.iter().map(Identifier::encode).collect(),
            dates: record.dates.iter().map(RecordDate::encode).collect(),
            edition_statement: record.edition_statement.clone(),
            spatial: record.spatial.clone(),
            frbr_status: record.frbr_status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_parse_roundtrip() {
        let id = Identifier::parse("9780141439518|isbn").unwrap();
        assert_eq!(id.value, "9780141439518");
        assert_eq!(id.authority, "isbn");
        assert_eq!(id.encode(), "9780141439518|isbn");
    }

    #[test]
    fn test_identifier_parse_malformed() {
        assert!(Identifier::parse("no-delimiter").is_none());
        assert!(Identifier::parse("|isbn").is_none());
        assert!(Identifier::parse("123|").is_none());
    }

    #[test]
    fn test_person_parse_full() {
        let p = Person::parse("Austen, Jane|102333412|n79032879|true").unwrap();
        assert_eq!(p.name, "Austen, Jane");
        assert_eq!(p.viaf.as_deref(), Some("102333412"));
        assert_eq!(p.lcnaf.as_deref(), Some("n79032879"));
        assert!(p.primary);
    }

    #[test]
    fn test_person_parse_sparse() {
        let p = Person::parse("Anonymous|||false").unwrap();
        assert_eq!(p.name, "Anonymous");
        assert!(p.viaf.is_none());
        assert!(p.lcnaf.is_none());
        assert!(!p.primary);

        let p = Person::parse("Just A. Name").unwrap();
        assert_eq!(p.name, "Just A. Name");
        assert!(!p.primary);
    }

    #[test]
    fn test_record_date_parse() {
        let d = RecordDate::parse("1899|copyright_date").unwrap();
        assert_eq!(d.value, "1899");
        assert_eq!(d.kind, DateKind::Copyright);
        let d = RecordDate::parse("1900|publication_date").unwrap();
        assert_eq!(d.kind, DateKind::Publication);
        let d = RecordDate::parse("1900|issued").unwrap();
        assert_eq!(d.kind, DateKind::Other);
    }

    #[test]
    fn test_queryable_identifiers_subset_and_authorities() {
        let ids = vec![
            Identifier::new("9780141439518", "isbn"),
            Identifier::new("0028-0836", "issn"),
            Identifier::new("12345", "oclc"),
            Identifier::new("987", "owi"),
            Identifier::new("b1234567", "nypl"),
            Identifier::new("X", "ISBN"), // wrong case, excluded
        ];
        let queryable = queryable_identifiers(&ids);
        assert_eq!(queryable.len(), 3);
        for id in &queryable {
            assert!(QUERYABLE_AUTHORITIES.contains(&id.authority.as_str()));
            assert!(ids.contains(*id));
        }
    }

    #[test]
    fn test_add_identifier_collapses_duplicates() {
        let mut record = BibRecord::default();
        record.add_identifier(Identifier::new("123", "oclc"));
        record.add_identifier(Identifier::new("123", "oclc"));
        record.add_identifier(Identifier::new("123", "owi"));
        assert_eq!(record.identifiers.len(), 2);
    }

    #[test]
    fn test_primary_author_fallback() {
        let mut record = BibRecord::default();
        assert!(record.primary_author().is_none());
        record.authors.push(Person::parse("Second, Billing||n1|false").unwrap());
        record.authors.push(Person::parse("First, Primary||n2|true").unwrap());
        assert_eq!(record.primary_author(), Some("First, Primary"));
        record.authors.remove(1);
        assert_eq!(record.primary_author(), Some("Second, Billing"));
    }

    #[test]
    fn test_raw_record_decode() {
        let raw = RawRecord {
            key: "rec-1".to_string(),
            title: Some("Pride and Prejudice".to_string()),
            authors: vec!["Austen, Jane|102333412||true".to_string()],
            identifiers: vec![
                "9780141439518|isbn".to_string(),
                "9780141439518|isbn".to_string(),
                "garbage".to_string(),
            ],
            dates: vec!["1813|publication_date".to_string()],
            frbr_status: FrbrStatus::ToDo,
            ..Default::default()
        };
        let record = raw.into_record();
        assert_eq!(record.identifiers.len(), 1);
        assert_eq!(record.authors.len(), 1);
        assert_eq!(record.dates.len(), 1);
        assert_eq!(record.frbr_status, FrbrStatus::ToDo);
    }
}
