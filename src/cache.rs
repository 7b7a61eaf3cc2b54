//! Distributed dedup cache and daily rate counters.
//!
//! Shared across concurrently scheduled process instances via Redis; the
//! backend trait seam provides an in-memory implementation for tests. This
//! is the only cross-process shared state in the core.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::clock::Clock;

/// Dedup entries default to a one week TTL.
pub const DEFAULT_ENTRY_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// An entry younger than this is "fresh": the record was handled recently
/// enough to skip.
const FRESHNESS_WINDOW_HOURS: i64 = 24;

/// Default ceiling on external queries per service, identifier and day.
pub const DEFAULT_DAILY_QUERY_CEILING: i64 = 400_000;

/// Rate counter keys linger slightly past their day.
const RATE_COUNTER_TTL: Duration = Duration::from_secs(2 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

/// Key/value operations the dedup cache needs from its store.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// One round trip for N keys, result aligned with `keys`.
    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError>;

    /// One pipelined round trip writing all entries.
    fn set_many_with_ttl(
        &self,
        entries: &[(String, String)],
        ttl: Duration,
    ) -> Result<(), CacheError>;

    fn increment(&self, key: &str, ttl: Duration) -> Result<i64, CacheError>;

    fn counter(&self, key: &str) -> Result<i64, CacheError>;
}

/// Redis-backed store used in production.
pub struct RedisBackend {
    connection: std::sync::Mutex<redis::Connection>,
}

impl RedisBackend {
    pub fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let connection = client.get_connection()?;
        Ok(Self {
            connection: std::sync::Mutex::new(connection),
        })
    }
}

impl CacheBackend for RedisBackend {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut connection = self.connection.lock().unwrap();
        Ok(redis::cmd("GET").arg(key).query(&mut connection)?)
    }

    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut connection = self.connection.lock().unwrap();
        redis::cmd("SETEX")
            .arg(key)
            .arg(ttl.as_secs())
            .arg(value)
            .query::<()>(&mut connection)?;
        Ok(())
    }

    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut connection = self.connection.lock().unwrap();
        Ok(redis::cmd("MGET").arg(keys).query(&mut connection)?)
    }

    fn set_many_with_ttl(
        &self,
        entries: &[(String, String)],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut connection = self.connection.lock().unwrap();
        let mut pipe = redis::pipe();
        for (key, value) in entries {
            pipe.cmd("SETEX")
                .arg(key)
                .arg(ttl.as_secs())
                .arg(value)
                .ignore();
        }
        pipe.query::<()>(&mut connection)?;
        Ok(())
    }

    fn increment(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
        let mut connection = self.connection.lock().unwrap();
        let count: i64 = redis::cmd("INCR").arg(key).query(&mut connection)?;
        redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs())
            .query::<()>(&mut connection)?;
        Ok(count)
    }

    fn counter(&self, key: &str) -> Result<i64, CacheError> {
        let mut connection = self.connection.lock().unwrap();
        let raw: Option<String> = redis::cmd("GET").arg(key).query(&mut connection)?;
        Ok(raw.and_then(|v| v.parse().ok()).unwrap_or(0))
    }
}

/// In-memory store for tests.
pub struct InMemoryBackend {
    entries: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            entries: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBackend for InMemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set_with_ttl(&self, key: &str, value: &str, _ttl: Duration) -> Result<(), CacheError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        let entries = self.entries.lock().unwrap();
        Ok(keys.iter().map(|k| entries.get(k).cloned()).collect())
    }

    fn set_many_with_ttl(
        &self,
        new_entries: &[(String, String)],
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap();
        for (key, value) in new_entries {
            entries.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn increment(&self, key: &str, _ttl: Duration) -> Result<i64, CacheError> {
        let mut entries = self.entries.lock().unwrap();
        let next = entries
            .get(key)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0)
            + 1;
        entries.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    fn counter(&self, key: &str) -> Result<i64, CacheError> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }
}

/// Dedup cache over recently processed identifiers plus per-day query
/// counters.
pub struct DedupCache<'a> {
    backend: &'a dyn CacheBackend,
    clock: &'a dyn Clock,
    environment: String,
    daily_ceiling: i64,
}

impl<'a> DedupCache<'a> {
    pub fn new(
        backend: &'a dyn CacheBackend,
        clock: &'a dyn Clock,
        environment: impl Into<String>,
        daily_ceiling: i64,
    ) -> Self {
        Self {
            backend,
            clock,
            environment: environment.into(),
            daily_ceiling,
        }
    }

    fn entry_key(&self, service: &str, identifier: &str, id_type: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.environment, service, identifier, id_type
        )
    }

    fn rate_key(&self, service: &str, identifier: &str) -> String {
        format!(
            "{}/{}/{}",
            service,
            self.clock.now().format("%Y-%m-%d"),
            identifier
        )
    }

    fn is_fresh(&self, raw: &str, now: DateTime<Utc>) -> bool {
        match DateTime::parse_from_rfc3339(raw) {
            Ok(seen) => {
                seen.with_timezone(&Utc)
                    >= now - ChronoDuration::hours(FRESHNESS_WINDOW_HOURS)
            }
            Err(_) => false,
        }
    }

    /// Check whether the identifier was handled within the last 24 hours;
    /// stamp it with the current time otherwise.
    ///
    /// Returns `true` for "already handled, skip" (no mutation) and `false`
    /// for "proceed" (timestamp written with `ttl`). The check and the set
    /// are two separate round trips: two instances racing on the same
    /// identifier can both observe a stale entry and both proceed. Accepted
    /// limitation under the single-writer-per-source batch model.
    pub fn check_or_set(
        &self,
        service: &str,
        identifier: &str,
        id_type: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let now = self.clock.now();
        let key = self.entry_key(service, identifier, id_type);
        if let Some(raw) = self.backend.get(&key)? {
            if self.is_fresh(&raw, now) {
                debug!(key = %key, "identifier recently processed, skipping");
                return Ok(true);
            }
        }
        self.backend.set_with_ttl(&key, &now.to_rfc3339(), ttl)?;
        Ok(false)
    }

    /// Batched `check_or_set`: one multi-get across all identifiers, then
    /// one pipelined multi-set for the stale ones. Reduces round trips but
    /// is no more atomic than the single-key form.
    ///
    /// The result is aligned with `identifiers`; `true` means skip.
    pub fn check_or_set_batch(
        &self,
        service: &str,
        identifiers: &[(String, String)],
        ttl: Duration,
    ) -> Result<Vec<bool>, CacheError> {
        let now = self.clock.now();
        let keys: Vec<String> = identifiers
            .iter()
            .map(|(id, id_type)| self.entry_key(service, id, id_type))
            .collect();
        let values = self.backend.get_many(&keys)?;

        let mut fresh_flags = Vec::with_capacity(keys.len());
        let mut stale = Vec::new();
        for (key, value) in keys.into_iter().zip(values) {
            let fresh = value.map(|raw| self.is_fresh(&raw, now)).unwrap_or(false);
            if !fresh {
                stale.push((key, now.to_rfc3339()));
            }
            fresh_flags.push(fresh);
        }
        self.backend.set_many_with_ttl(&stale, ttl)?;
        Ok(fresh_flags)
    }

    /// True once today's counter for this service/identifier has reached the
    /// configured ceiling; callers stop issuing external queries for the
    /// rest of the day.
    pub fn rate_limit_reached(&self, service: &str, identifier: &str) -> Result<bool, CacheError> {
        let count = self.backend.counter(&self.rate_key(service, identifier))?;
        Ok(count >= self.daily_ceiling)
    }

    pub fn increment_rate_limit(&self, service: &str, identifier: &str) -> Result<i64, CacheError> {
        self.backend
            .increment(&self.rate_key(service, identifier), RATE_COUNTER_TTL)
    }
}
