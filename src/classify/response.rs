//! XML response parsing for the classification service.
//!
//! A response carries zero or more `work` fragments, each with an OWI, an
//! edition count, member edition catalog numbers and candidate author and
//! subject headings. Multi-work responses list bare `work` elements with an
//! `oclc` attribute and no nested editions.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::ClassifyError;

/// An author heading attached to a candidate work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateAuthor {
    pub name: String,
    pub lcnaf: Option<String>,
    pub viaf: Option<String>,
}

/// One candidate work parsed out of a classification response.
#[derive(Debug, Clone, Default)]
pub struct ClassifyCandidate {
    /// The work identifier assigned by the classification service.
    pub owi: String,
    pub title: Option<String>,
    pub author: Option<String>,
    /// Catalog numbers of the editions grouped under this work.
    pub oclc_numbers: Vec<String>,
    pub authors: Vec<CandidateAuthor>,
    pub subjects: Vec<String>,
    /// Total editions the service reports for this work, which may exceed
    /// the numbers present on this page.
    pub total_editions: usize,
}

impl ClassifyCandidate {
    /// Append a catalog number unless already present.
    pub fn add_oclc(&mut self, oclc: impl Into<String>) {
        let oclc = oclc.into();
        if !self.oclc_numbers.contains(&oclc) {
            self.oclc_numbers.push(oclc);
        }
    }
}

fn attr(start: &BytesStart, name: &str) -> Result<Option<String>, ClassifyError> {
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| ClassifyError::Parse(e.to_string()))?;
        if attribute.key.as_ref() == name.as_bytes() {
            let value = attribute
                .unescape_value()
                .map_err(|e| ClassifyError::Parse(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Parse a classification response body into candidate works.
pub fn parse_response(xml: &str) -> Result<Vec<ClassifyCandidate>, ClassifyError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut candidates: Vec<ClassifyCandidate> = Vec::new();
    let mut current: Option<ClassifyCandidate> = None;
    let mut pending_author: Option<CandidateAuthor> = None;
    let mut in_subject = false;
    let mut buffer = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buffer)
            .map_err(|e| ClassifyError::Parse(e.to_string()))?;
        match event {
            Event::Start(ref start) | Event::Empty(ref start) => {
                let empty = matches!(event, Event::Empty(_));
                match start.name().as_ref() {
                    b"work" => {
                        let owi = match attr(start, "owi")? {
                            Some(owi) => owi,
                            // A work without an OWI cannot be linked; skip it.
                            None => continue,
                        };
                        let mut candidate = ClassifyCandidate {
                            owi,
                            title: attr(start, "title")?,
                            author: attr(start, "author")?,
                            total_editions: attr(start, "editions")?
                                .and_then(|e| e.parse().ok())
                                .unwrap_or(0),
                            ..Default::default()
                        };
                        if let Some(oclc) = attr(start, "oclc")? {
                            candidate.add_oclc(oclc);
                        }
                        if empty {
                            candidates.push(candidate);
                        } else {
                            current = Some(candidate);
                        }
                    }
                    b"edition" => {
                        if let (Some(candidate), Some(oclc)) =
                            (current.as_mut(), attr(start, "oclc")?)
                        {
                            candidate.add_oclc(oclc);
                        }
                    }
                    b"author" => {
                        if current.is_some() {
                            pending_author = Some(CandidateAuthor {
                                name: String::new(),
                                lcnaf: attr(start, "lc")?,
                                viaf: attr(start, "viaf")?,
                            });
                            if empty {
                                pending_author = None;
                            }
                        }
                    }
                    b"subject" => in_subject = !empty,
                    _ => {}
                }
            }
            Event::Text(text) => {
                let content = text
                    .unescape()
                    .map_err(|e| ClassifyError::Parse(e.to_string()))?
                    .into_owned();
                if let Some(author) = pending_author.as_mut() {
                    author.name = content;
                } else if in_subject {
                    if let Some(candidate) = current.as_mut() {
                        candidate.subjects.push(content);
                    }
                }
            }
            Event::End(end) => match end.name().as_ref() {
                b"work" => {
                    if let Some(candidate) = current.take() {
                        candidates.push(candidate);
                    }
                }
                b"author" => {
                    if let (Some(candidate), Some(author)) =
                        (current.as_mut(), pending_author.take())
                    {
                        if !author.name.is_empty() {
                            candidate.authors.push(author);
                        }
                    }
                }
                b"subject" => in_subject = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buffer.clear();
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE_WORK: &str = r#"<?xml version="1.0"?>
<classify>
  <response code="2"/>
  <work owi="123" title="Pride and Prejudice" author="Austen, Jane" editions="2">
    <editions>
      <edition oclc="456"/>
      <edition oclc="789"/>
    </editions>
    <authors>
      <author lc="n79032879" viaf="102333412">Austen, Jane</author>
    </authors>
    <subjects>
      <subject>Courtship -- Fiction</subject>
    </subjects>
  </work>
</classify>"#;

    const MULTI_WORK: &str = r#"<?xml version="1.0"?>
<classify>
  <response code="4"/>
  <works>
    <work owi="1" oclc="10" title="First" editions="1"/>
    <work owi="2" oclc="20" title="Second" editions="1"/>
  </works>
</classify>"#;

    #[test]
    fn test_parse_single_work() {
        let candidates = parse_response(SINGLE_WORK).unwrap();
        assert_eq!(candidates.len(), 1);
        let candidate = &candidates[0];
        assert_eq!(candidate.owi, "123");
        assert_eq!(candidate.title.as_deref(), Some("Pride and Prejudice"));
        assert_eq!(candidate.oclc_numbers, vec!["456", "789"]);
        assert_eq!(candidate.authors.len(), 1);
        assert_eq!(candidate.authors[0].name, "Austen, Jane");
        assert_eq!(candidate.authors[0].lcnaf.as_deref(), Some("n79032879"));
        assert_eq!(candidate.subjects, vec!["Courtship -- Fiction"]);
        assert_eq!(candidate.total_editions, 2);
    }

    #[test]
    fn test_parse_multi_work() {
        let candidates = parse_response(MULTI_WORK).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].owi, "1");
        assert_eq!(candidates[0].oclc_numbers, vec!["10"]);
        assert_eq!(candidates[1].owi, "2");
    }

    #[test]
    fn test_parse_empty_response() {
        let candidates =
            parse_response(r#"<classify><response code="102"/></classify>"#).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_duplicate_oclc_collapses() {
        let mut candidate = ClassifyCandidate::default();
        candidate.add_oclc("456");
        candidate.add_oclc("456");
        assert_eq!(candidate.oclc_numbers.len(), 1);
    }

    #[test]
    fn test_malformed_xml_is_parse_error() {
        let result = parse_response("<classify><work owi=");
        assert!(matches!(result, Err(ClassifyError::Parse(_))));
    }
}
