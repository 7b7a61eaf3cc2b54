//! OAuth client-credentials tokens for the catalog APIs.
//!
//! The catalog exposes two independent scopes (discovery search and bib
//! metadata), each with its own token endpoint and client credentials. One
//! `TokenCache` is constructed per process and passed by reference into the
//! protocol clients; tokens are refreshed lazily when they come within the
//! refresh window of expiry.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

use crate::clock::Clock;
use crate::transport::Transport;

/// Seconds of remaining validity below which a cached token is refreshed.
const REFRESH_WINDOW_SECS: i64 = 60;

/// The two OAuth scopes the catalog APIs require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenScope {
    /// Discovery search and related-editions endpoints.
    Search,
    /// Single-bib metadata fetch endpoint.
    Metadata,
}

/// Endpoint and client credentials for one scope.
#[derive(Debug, Clone)]
pub struct ScopeCredentials {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_at: String,
}

/// Process-wide token cache for both scopes.
pub struct TokenCache<'a> {
    transport: &'a dyn Transport,
    clock: &'a dyn Clock,
    credentials: HashMap<TokenScope, ScopeCredentials>,
    tokens: Mutex<HashMap<TokenScope, CachedToken>>,
}

impl<'a> TokenCache<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        clock: &'a dyn Clock,
        search: ScopeCredentials,
        metadata: ScopeCredentials,
    ) -> Self {
        let mut credentials = HashMap::new();
        credentials.insert(TokenScope::Search, search);
        credentials.insert(TokenScope::Metadata, metadata);
        Self {
            transport,
            clock,
            credentials,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Return a valid access token for the scope, refreshing if the cached
    /// token is within the refresh window of expiry.
    ///
    /// Returns `None` on any transport failure or non-200 token response;
    /// the caller must treat that as "unauthenticated, abort this call".
    pub fn token(&self, scope: TokenScope) -> Option<String> {
        let now = self.clock.now();
        {
            let tokens = self.tokens.lock().unwrap();
            if let Some(cached) = tokens.get(&scope) {
                if cached.expires_at - now > ChronoDuration::seconds(REFRESH_WINDOW_SECS) {
                    return Some(cached.access_token.clone());
                }
            }
        }
        self.refresh(scope)
    }

    fn refresh(&self, scope: TokenScope) -> Option<String> {
        let creds = self.credentials.get(&scope)?;
        let response = match self.transport.post_form(
            &creds.token_url,
            Some((&creds.client_id, &creds.client_secret)),
            &[("grant_type", "client_credentials")],
        ) {
            Ok(response) => response,
            Err(err) => {
                warn!(scope = ?scope, "token request failed: {err}");
                return None;
            }
        };
        if response.status != 200 {
            warn!(
                scope = ?scope,
                status = response.status,
                "token endpoint returned non-200"
            );
            return None;
        }
        let parsed: TokenResponse = match serde_json::from_str(&response.body) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(scope = ?scope, "unparseable token response: {err}");
                return None;
            }
        };
        let expires_at = match parse_expiry(&parsed.expires_at) {
            Some(expires_at) => expires_at,
            None => {
                warn!(
                    scope = ?scope,
                    expires_at = %parsed.expires_at,
                    "unparseable token expiry"
                );
                return None;
            }
        };
        let mut tokens = self.tokens.lock().unwrap();
        tokens.insert(
            scope,
            CachedToken {
                access_token: parsed.access_token.clone(),
                expires_at,
            },
        );
        Some(parsed.access_token)
    }
}

/// The token endpoints report expiry as a string timestamp: either RFC 3339
/// or epoch seconds.
fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) =
        chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%SZ")
    {
        return Some(Utc.from_utc_datetime(&parsed));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::ManualClock;
    use crate::transport::{HttpResponse, TransportError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubTokenEndpoint {
        posts: AtomicUsize,
        response: Result<HttpResponse, ()>,
    }

    impl StubTokenEndpoint {
        fn ok(body: &str) -> Self {
            Self {
                posts: AtomicUsize::new(0),
                response: Ok(HttpResponse {
                    status: 200,
                    body: body.to_string(),
                }),
            }
        }

        fn failing() -> Self {
            Self {
                posts: AtomicUsize::new(0),
                response: Err(()),
            }
        }

        fn post_count(&self) -> usize {
            self.posts.load(Ordering::SeqCst)
        }
    }

    impl Transport for StubTokenEndpoint {
        fn get(&self, url: &str, _: &[(&str, &str)]) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Connection(url.to_string(), "no GET".into()))
        }

        fn post_form(
            &self,
            url: &str,
            _: Option<(&str, &str)>,
            _: &[(&str, &str)],
        ) -> Result<HttpResponse, TransportError> {
            self.posts.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Ok(response) => Ok(response.clone()),
                Err(()) => Err(TransportError::Timeout(url.to_string())),
            }
        }
    }

    fn credentials(url: &str) -> ScopeCredentials {
        ScopeCredentials {
            token_url: url.to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
        }
    }

    fn cache_with_token<'a>(
        transport: &'a dyn Transport,
        clock: &'a dyn Clock,
        expires_at: DateTime<Utc>,
    ) -> TokenCache<'a> {
        let cache = TokenCache::new(
            transport,
            clock,
            credentials("http://auth/search"),
            credentials("http://auth/metadata"),
        );
        cache.tokens.lock().unwrap().insert(
            TokenScope::Search,
            CachedToken {
                access_token: "cached-token".to_string(),
                expires_at,
            },
        );
        cache
    }

    #[test]
    fn test_fresh_token_returned_without_network_call() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(now);
        let transport = StubTokenEndpoint::failing();
        let cache = cache_with_token(&transport, &clock, now + ChronoDuration::seconds(120));

        let token = cache.token(TokenScope::Search);
        assert_eq!(token.as_deref(), Some("cached-token"));
        assert_eq!(transport.post_count(), 0);
    }

    #[test]
    fn test_token_inside_refresh_window_triggers_refresh() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(now);
        let transport = StubTokenEndpoint::ok(
            r#"{"access_token":"fresh-token","expires_at":"2024-01-01T13:00:00Z"}"#,
        );
        let cache = cache_with_token(&transport, &clock, now + ChronoDuration::seconds(55));

        let token = cache.token(TokenScope::Search);
        assert_eq!(token.as_deref(), Some("fresh-token"));
        assert_eq!(transport.post_count(), 1);

        // The refreshed token is cached; no further network call.
        let token = cache.token(TokenScope::Search);
        assert_eq!(token.as_deref(), Some("fresh-token"));
        assert_eq!(transport.post_count(), 1);
    }

    #[test]
    fn test_transport_failure_yields_none() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(now);
        let transport = StubTokenEndpoint::failing();
        let cache = TokenCache::new(
            &transport,
            &clock,
            credentials("http://auth/search"),
            credentials("http://auth/metadata"),
        );

        assert!(cache.token(TokenScope::Metadata).is_none());
    }

    #[test]
    fn test_non_200_yields_none() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(now);
        let transport = StubTokenEndpoint {
            posts: AtomicUsize::new(0),
            response: Ok(HttpResponse {
                status: 403,
                body: "forbidden".to_string(),
            }),
        };
        let cache = TokenCache::new(
            &transport,
            &clock,
            credentials("http://auth/search"),
            credentials("http://auth/metadata"),
        );

        assert!(cache.token(TokenScope::Search).is_none());
    }

    #[test]
    fn test_parse_expiry_formats() {
        assert!(parse_expiry("2024-01-01T13:00:00Z").is_some());
        assert!(parse_expiry("2024-01-01 13:00:00Z").is_some());
        assert!(parse_expiry("1704114000").is_some());
        assert!(parse_expiry("soon").is_none());
    }
}
