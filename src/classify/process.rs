//! Orchestration of one classify batch.
//!
//! Pulls not-yet-classified records from the store, short-circuits recently
//! handled identifiers through the dedup cache, queries the classification
//! service, folds accepted candidates back into the record and enqueues
//! newly discovered catalog numbers for asynchronous fetch.
//!
//! Error policy: a record with neither identifier nor title/author is a
//! configuration-style failure and aborts the batch; classify protocol
//! failures log and skip the record; cache failures propagate.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::title_match::check_title;
use super::{ClassifyCandidate, ClassifyClient, ClassifyQuery};
use crate::cache::{DedupCache, DEFAULT_ENTRY_TTL};
use crate::queue::{OclcFetchMessage, QueuePublisher};
use crate::record::{BibRecord, FrbrStatus, Identifier};

/// Service segment used in dedup-cache and rate-counter keys.
pub const CLASSIFY_SERVICE: &str = "classify";

/// Source of pending records and sink for classified ones. The relational
/// persistence layer implements this outside the core.
pub trait RecordStore {
    fn pending_records(&self, limit: usize) -> Result<Vec<BibRecord>>;

    fn save(&self, record: &BibRecord) -> Result<()>;
}

/// Record store over a plain vector, used by the CLI boundary and tests.
pub struct InMemoryRecordStore {
    records: std::sync::Mutex<Vec<BibRecord>>,
}

impl InMemoryRecordStore {
    pub fn new(records: Vec<BibRecord>) -> Self {
        Self {
            records: std::sync::Mutex::new(records),
        }
    }

    pub fn records(&self) -> Vec<BibRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn pending_records(&self, limit: usize) -> Result<Vec<BibRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.frbr_status == FrbrStatus::ToDo)
            .take(limit)
            .cloned()
            .collect())
    }

    fn save(&self, record: &BibRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.key == record.key) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }
}

/// Counters summarizing one batch run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub rate_limited: bool,
}

/// One classify pass over pending records.
pub struct ClassifyPipeline<'a> {
    client: &'a ClassifyClient<'a>,
    cache: &'a DedupCache<'a>,
    queue: &'a dyn QueuePublisher,
    /// Identifier under which this process's query volume is counted,
    /// typically a label for the API key in use.
    rate_identifier: String,
    entry_ttl: Duration,
    /// Candidate acceptance gate, `check_title` by default.
    title_gate: fn(&str, &str) -> bool,
}

impl<'a> ClassifyPipeline<'a> {
    pub fn new(
        client: &'a ClassifyClient<'a>,
        cache: &'a DedupCache<'a>,
        queue: &'a dyn QueuePublisher,
        rate_identifier: impl Into<String>,
    ) -> Self {
        Self {
            client,
            cache,
            queue,
            rate_identifier: rate_identifier.into(),
            entry_ttl: DEFAULT_ENTRY_TTL,
            title_gate: check_title,
        }
    }

    /// Replace the candidate acceptance gate; tests use this to force a
    /// deterministic verdict.
    pub fn with_title_gate(mut self, gate: fn(&str, &str) -> bool) -> Self {
        self.title_gate = gate;
        self
    }

    pub fn with_entry_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }

    /// Process up to `limit` pending records. Stops early when the daily
    /// query ceiling is reached.
    pub fn run_batch(&self, store: &dyn RecordStore, limit: usize) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        let records = store.pending_records(limit)?;
        info!(count = records.len(), "starting classify batch");

        for mut record in records {
            if self
                .cache
                .rate_limit_reached(CLASSIFY_SERVICE, &self.rate_identifier)?
            {
                warn!("daily query ceiling reached, stopping batch");
                outcome.rate_limited = true;
                break;
            }

            let query_identifier = record.queryable_identifiers().first().cloned().cloned();
            if let Some(identifier) = &query_identifier {
                if self.cache.check_or_set(
                    CLASSIFY_SERVICE,
                    &identifier.value,
                    &identifier.authority,
                    self.entry_ttl,
                )? {
                    outcome.skipped += 1;
                    continue;
                }
            }

            let query = ClassifyQuery::from_parts(
                query_identifier
                    .as_ref()
                    .map(|id| (id.value.as_str(), id.authority.as_str())),
                record.title.as_deref(),
                record.primary_author(),
            )
            .with_context(|| format!("record {} cannot be classified", record.key))?;

            self.cache
                .increment_rate_limit(CLASSIFY_SERVICE, &self.rate_identifier)?;

            match self.client.classify(&query) {
                Ok(candidates) => {
                    self.apply_candidates(&mut record, candidates)?;
                    store.save(&record)?;
                    outcome.processed += 1;
                }
                Err(err) => {
                    warn!(record = %record.key, "classify failed: {err}; skipping record");
                    outcome.failed += 1;
                }
            }
        }

        info!(
            processed = outcome.processed,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "classify batch finished"
        );
        Ok(outcome)
    }

    /// Fold accepted candidates into the record and enqueue newly discovered
    /// catalog numbers. Acceptance is gated on the title heuristic whenever
    /// both titles are present.
    fn apply_candidates(
        &self,
        record: &mut BibRecord,
        candidates: Vec<ClassifyCandidate>,
    ) -> Result<usize> {
        let mut discovered = 0;
        for candidate in candidates {
            if let (Some(source), Some(found)) =
                (record.title.as_deref(), candidate.title.as_deref())
            {
                if !(self.title_gate)(source, found) {
                    debug!(
                        record = %record.key,
                        candidate = %candidate.owi,
                        "candidate title rejected"
                    );
                    continue;
                }
            }

            record.add_identifier(Identifier::new(candidate.owi.clone(), "owi"));
            for oclc in candidate.oclc_numbers {
                let identifier = Identifier::new(oclc.clone(), "oclc");
                if record.identifiers.contains(&identifier) {
                    continue;
                }
                record.add_identifier(identifier);
                self.queue.publish(&OclcFetchMessage { oclc_no: oclc })?;
                discovered += 1;
            }
        }
        record.frbr_status = FrbrStatus::Complete;
        Ok(discovered)
    }
}
