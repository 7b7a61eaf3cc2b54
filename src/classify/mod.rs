//! Client for the bibliographic classification service.
//!
//! Queries the service by identifier (preferred) or title/author, parses the
//! XML candidate works out of the response, and pages through large works to
//! accumulate all member catalog numbers.

mod process;
mod response;
mod title_match;

pub use process::{
    BatchOutcome, ClassifyPipeline, InMemoryRecordStore, RecordStore, CLASSIFY_SERVICE,
};
pub use response::{CandidateAuthor, ClassifyCandidate};
pub use title_match::{check_title, ANTHOLOGY_TOKENS};

use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::transport::{Transport, TransportError};

/// Fixed timeout for classification requests.
pub const CLASSIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Works reporting at least this many editions are paged through by
/// advancing the `start` offset in steps of the same size.
const EDITION_PAGE_SIZE: usize = 500;

#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Neither an identifier nor a title/author pair was available. A
    /// configuration-style error: raised immediately, never retried.
    #[error("no identifier or title/author pair available for classify query")]
    InvalidQuery,
    #[error("classify request failed: {0}")]
    Transport(#[from] TransportError),
    #[error("classify service returned status {0}")]
    Http(u16),
    #[error("unparseable classify response: {0}")]
    Parse(String),
}

/// How a classification lookup is keyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifyQuery {
    Identifier { value: String, id_type: String },
    TitleAuthor { title: String, author: String },
}

impl ClassifyQuery {
    /// Build a query preferring an identifier over a title/author pair.
    pub fn from_parts(
        identifier: Option<(&str, &str)>,
        title: Option<&str>,
        author: Option<&str>,
    ) -> Result<Self, ClassifyError> {
        if let Some((value, id_type)) = identifier {
            return Ok(ClassifyQuery::Identifier {
                value: value.to_string(),
                id_type: id_type.to_string(),
            });
        }
        if let (Some(title), Some(author)) = (title, author) {
            return Ok(ClassifyQuery::TitleAuthor {
                title: title.to_string(),
                author: author.to_string(),
            });
        }
        Err(ClassifyError::InvalidQuery)
    }

    fn query_string(&self, start: usize) -> String {
        let mut params = match self {
            ClassifyQuery::Identifier { value, id_type } => format!(
                "identifier={}&identifierType={}",
                urlencoding::encode(value),
                urlencoding::encode(id_type)
            ),
            ClassifyQuery::TitleAuthor { title, author } => format!(
                "title={}&author={}",
                urlencoding::encode(title),
                urlencoding::encode(author)
            ),
        };
        if start > 0 {
            params.push_str(&format!("&start={}", start));
        }
        params
    }
}

/// HTTP client for the classification endpoint.
pub struct ClassifyClient<'a> {
    transport: &'a dyn Transport,
    base_url: String,
    api_key: String,
}

impl<'a> ClassifyClient<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Run a classification query, paging through oversized works until a
    /// page yields no further catalog numbers.
    pub fn classify(&self, query: &ClassifyQuery) -> Result<Vec<ClassifyCandidate>, ClassifyError> {
        let mut candidates = self.fetch_page(query, 0)?;

        let needs_paging = candidates
            .first()
            .map(|c| candidates.len() == 1 && c.total_editions >= EDITION_PAGE_SIZE)
            .unwrap_or(false);
        if needs_paging {
            let mut start = EDITION_PAGE_SIZE;
            loop {
                let page = self.fetch_page(query, start)?;
                let numbers: Vec<String> = page
                    .into_iter()
                    .flat_map(|c| c.oclc_numbers)
                    .collect();
                if numbers.is_empty() {
                    break;
                }
                debug!(start, count = numbers.len(), "classify pagination step");
                for oclc in numbers {
                    candidates[0].add_oclc(oclc);
                }
                start += EDITION_PAGE_SIZE;
            }
        }

        Ok(candidates)
    }

    fn fetch_page(
        &self,
        query: &ClassifyQuery,
        start: usize,
    ) -> Result<Vec<ClassifyCandidate>, ClassifyError> {
        let url = format!("{}?{}", self.base_url, query.query_string(start));
        let response = self
            .transport
            .get(&url, &[("X-API-Key", &self.api_key)])?;
        if !response.is_success() {
            return Err(ClassifyError::Http(response.status));
        }
        response::parse_response(&response.body)
    }
}
