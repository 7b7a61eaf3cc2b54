//! Catalog lookup client: single-bib fetch, discovery search and related
//! editions.
//!
//! Bib fetches use the metadata-scope token and are retried; discovery
//! searches use the search-scope token, page in steps of 50 up to a hard cap
//! of 100 records, and skip failed pages without retrying them.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::oauth::{TokenCache, TokenScope};
use crate::transport::{Transport, TransportError};

const PAGE_SIZE: usize = 50;
/// Hard cap on records fetched per logical search call.
const MAX_RECORDS: usize = 100;
/// Total attempts for a single-bib fetch.
const FETCH_ATTEMPTS: usize = 3;
/// Physical item types included in discovery searches.
const ITEM_TYPES: &[&str] = &["book-printbook", "book-digital", "book-mic"];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("no token available for catalog call")]
    Unauthenticated,
    #[error("catalog request failed: {0}")]
    Transport(#[from] TransportError),
    #[error("catalog returned status {0}")]
    Http(u16),
    #[error("unparseable catalog response: {0}")]
    Parse(String),
}

/// A bib record as returned by the catalog APIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogBib {
    #[serde(rename = "oclcNumber")]
    pub oclc_number: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(rename = "itemType", default)]
    pub item_type: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(rename = "numberOfRecords", default)]
    number_of_records: usize,
    #[serde(rename = "bibRecords", default)]
    bib_records: Vec<CatalogBib>,
}

pub struct CatalogClient<'a> {
    transport: &'a dyn Transport,
    tokens: &'a TokenCache<'a>,
    /// Base URL for single-bib fetches (metadata scope).
    bib_base_url: String,
    /// Base URL for discovery search (search scope).
    search_base_url: String,
}

impl<'a> CatalogClient<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        tokens: &'a TokenCache<'a>,
        bib_base_url: impl Into<String>,
        search_base_url: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            tokens,
            bib_base_url: bib_base_url.into().trim_end_matches('/').to_string(),
            search_base_url: search_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch one bib record by catalog number.
    ///
    /// Up to three attempts, fetching the metadata token anew each time.
    /// Returns `None` on persistent failure; never raises to the caller.
    pub fn query_catalog(&self, oclc_number: &str) -> Option<CatalogBib> {
        for attempt in 1..=FETCH_ATTEMPTS {
            match self.fetch_bib(oclc_number) {
                Ok(bib) => return Some(bib),
                Err(err) => {
                    warn!(
                        oclc = oclc_number,
                        attempt, "catalog bib fetch failed: {err}"
                    );
                }
            }
        }
        None
    }

    fn fetch_bib(&self, oclc_number: &str) -> Result<CatalogBib, CatalogError> {
        let token = self
            .tokens
            .token(TokenScope::Metadata)
            .ok_or(CatalogError::Unauthenticated)?;
        let url = format!("{}/{}", self.bib_base_url, oclc_number);
        let response = self
            .transport
            .get(&url, &[("Authorization", &format!("Bearer {}", token))])?;
        if !response.is_success() {
            return Err(CatalogError::Http(response.status));
        }
        serde_json::from_str(&response.body).map_err(|e| CatalogError::Parse(e.to_string()))
    }

    /// Discovery search ordered by best match, filtered to physical item
    /// types, capped at 100 records.
    pub fn search_bibs(&self, query: &str) -> Vec<CatalogBib> {
        let encoded = urlencoding::encode(query).into_owned();
        self.paged_search(|offset| {
            format!(
                "{}/bibs?q={}&offset={}&limit={}&orderBy=bestMatch&itemTypes={}",
                self.search_base_url,
                encoded,
                offset,
                PAGE_SIZE,
                ITEM_TYPES.join(",")
            )
        })
    }

    /// Other editions related to a catalog number, same pagination rules as
    /// `search_bibs`.
    pub fn related_editions(&self, oclc_number: &str) -> Vec<CatalogBib> {
        self.paged_search(|offset| {
            format!(
                "{}/bibs/{}/other-editions?offset={}&limit={}&orderBy=bestMatch&itemTypes={}",
                self.search_base_url,
                oclc_number,
                offset,
                PAGE_SIZE,
                ITEM_TYPES.join(",")
            )
        })
    }

    fn paged_search(&self, make_url: impl Fn(usize) -> String) -> Vec<CatalogBib> {
        let mut records = Vec::new();
        let mut offset = 0;
        while offset < MAX_RECORDS {
            let token = match self.tokens.token(TokenScope::Search) {
                Some(token) => token,
                None => {
                    warn!("no search token, aborting catalog search");
                    break;
                }
            };
            let url = make_url(offset);
            match self.fetch_search_page(&token, &url) {
                Ok(page) => {
                    if page.bib_records.is_empty() {
                        break;
                    }
                    debug!(
                        offset,
                        fetched = page.bib_records.len(),
                        total = page.number_of_records,
                        "catalog search page"
                    );
                    records.extend(page.bib_records);
                    if offset + PAGE_SIZE >= page.number_of_records {
                        break;
                    }
                }
                Err(err) => {
                    // Page skipped without retry; later pages still run.
                    warn!(offset, "catalog search page failed: {err}");
                }
            }
            offset += PAGE_SIZE;
        }
        records.truncate(MAX_RECORDS);
        records
    }

    fn fetch_search_page(&self, token: &str, url: &str) -> Result<SearchResponse, CatalogError> {
        let response = self
            .transport
            .get(url, &[("Authorization", &format!("Bearer {}", token))])?;
        if !response.is_success() {
            return Err(CatalogError::Http(response.status));
        }
        serde_json::from_str(&response.body).map_err(|e| CatalogError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::ManualClock;
    use crate::oauth::ScopeCredentials;
    use crate::transport::HttpResponse;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    const TOKEN_BODY: &str =
        r#"{"access_token":"tok","expires_at":"2030-01-01T00:00:00Z"}"#;

    /// Stub catalog service: canned GET responses consumed in order, token
    /// POSTs always succeed.
    struct StubCatalog {
        responses: Mutex<Vec<Result<HttpResponse, ()>>>,
        gets: Mutex<Vec<String>>,
    }

    impl StubCatalog {
        fn new(responses: Vec<Result<HttpResponse, ()>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                gets: Mutex::new(Vec::new()),
            }
        }

        fn ok(body: &str) -> Result<HttpResponse, ()> {
            Ok(HttpResponse {
                status: 200,
                body: body.to_string(),
            })
        }

        fn get_urls(&self) -> Vec<String> {
            self.gets.lock().unwrap().clone()
        }
    }

    impl Transport for StubCatalog {
        fn get(&self, url: &str, _: &[(&str, &str)]) -> Result<HttpResponse, TransportError> {
            self.gets.lock().unwrap().push(url.to_string());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(TransportError::Connection(url.to_string(), "closed".into()));
            }
            responses
                .remove(0)
                .map_err(|()| TransportError::Connection(url.to_string(), "refused".into()))
        }

        fn post_form(
            &self,
            _: &str,
            _: Option<(&str, &str)>,
            _: &[(&str, &str)],
        ) -> Result<HttpResponse, TransportError> {
            Ok(HttpResponse {
                status: 200,
                body: TOKEN_BODY.to_string(),
            })
        }
    }

    fn credentials(url: &str) -> ScopeCredentials {
        ScopeCredentials {
            token_url: url.to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
        }
    }

    fn run_with<'a, R>(
        transport: &'a StubCatalog,
        clock: &'a ManualClock,
        run: impl FnOnce(&CatalogClient) -> R,
    ) -> R {
        let tokens = TokenCache::new(
            transport,
            clock,
            credentials("http://auth/search"),
            credentials("http://auth/metadata"),
        );
        let client = CatalogClient::new(
            transport,
            &tokens,
            "http://catalog/manage/bibs",
            "http://catalog/search",
        );
        run(&client)
    }

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap())
    }

    #[test]
    fn test_query_catalog_success() {
        let transport = StubCatalog::new(vec![StubCatalog::ok(
            r#"{"oclcNumber":"456","title":"Pride and Prejudice"}"#,
        )]);
        let clock = clock();
        let bib = run_with(&transport, &clock, |client| client.query_catalog("456"));
        let bib = bib.unwrap();
        assert_eq!(bib.oclc_number, "456");
        assert_eq!(bib.title.as_deref(), Some("Pride and Prejudice"));
        assert_eq!(
            transport.get_urls(),
            vec!["http://catalog/manage/bibs/456".to_string()]
        );
    }

    #[test]
    fn test_query_catalog_exhausts_retries_and_returns_none() {
        let transport = StubCatalog::new(vec![Err(()), Err(()), Err(())]);
        let clock = clock();
        let bib = run_with(&transport, &clock, |client| client.query_catalog("456"));
        assert!(bib.is_none());
        assert_eq!(transport.get_urls().len(), 3);
    }

    #[test]
    fn test_query_catalog_non_200_returns_none() {
        let transport = StubCatalog::new(vec![
            Ok(HttpResponse {
                status: 404,
                body: String::new(),
            }),
            Ok(HttpResponse {
                status: 404,
                body: String::new(),
            }),
            Ok(HttpResponse {
                status: 404,
                body: String::new(),
            }),
        ]);
        let clock = clock();
        let bib = run_with(&transport, &clock, |client| client.query_catalog("456"));
        assert!(bib.is_none());
    }

    fn page_body(total: usize, numbers: &[&str]) -> String {
        let bibs: Vec<String> = numbers
            .iter()
            .map(|n| format!(r#"{{"oclcNumber":"{}"}}"#, n))
            .collect();
        format!(
            r#"{{"numberOfRecords":{},"bibRecords":[{}]}}"#,
            total,
            bibs.join(",")
        )
    }

    #[test]
    fn test_search_bibs_single_page() {
        let transport =
            StubCatalog::new(vec![StubCatalog::ok(&page_body(2, &["1", "2"]))]);
        let clock = clock();
        let records =
            run_with(&transport, &clock, |client| client.search_bibs("austen pride"));
        assert_eq!(records.len(), 2);

        let urls = transport.get_urls();
        assert_eq!(urls.len(), 1);
        assert!(urls[0].contains("q=austen%20pride"));
        assert!(urls[0].contains("orderBy=bestMatch"));
        assert!(urls[0].contains("limit=50"));
        assert!(urls[0].contains("itemTypes=book-printbook,book-digital,book-mic"));
    }

    #[test]
    fn test_search_caps_at_100_records() {
        let first: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        let second: Vec<String> = (50..100).map(|i| i.to_string()).collect();
        let first_refs: Vec<&str> = first.iter().map(String::as_str).collect();
        let second_refs: Vec<&str> = second.iter().map(String::as_str).collect();
        let transport = StubCatalog::new(vec![
            StubCatalog::ok(&page_body(5000, &first_refs)),
            StubCatalog::ok(&page_body(5000, &second_refs)),
        ]);
        let clock = clock();
        let records = run_with(&transport, &clock, |client| client.search_bibs("popular"));
        assert_eq!(records.len(), 100);
        // Two pages of 50; the cap stops a third request.
        assert_eq!(transport.get_urls().len(), 2);
    }

    #[test]
    fn test_failed_page_is_skipped_and_pagination_continues() {
        let transport = StubCatalog::new(vec![
            Err(()),
            StubCatalog::ok(&page_body(60, &["51", "52"])),
        ]);
        let clock = clock();
        let records = run_with(&transport, &clock, |client| client.related_editions("456"));
        assert_eq!(records.len(), 2);

        let urls = transport.get_urls();
        assert_eq!(urls.len(), 2);
        assert!(urls[0].contains("/bibs/456/other-editions?offset=0"));
        assert!(urls[1].contains("offset=50"));
    }
}
