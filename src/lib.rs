//! Bibliographic work classification and edition clustering core.
//!
//! This library exposes the internal modules for testing and reuse from the
//! CLI binary: the classification service client and batch pipeline, the
//! authenticated catalog lookup client, the distributed dedup cache, and the
//! unsupervised edition clustering engine.

pub mod cache;
pub mod catalog;
pub mod classify;
pub mod clock;
pub mod cluster;
pub mod config;
pub mod dates;
pub mod oauth;
pub mod queue;
pub mod record;
pub mod transport;

// Re-export commonly used types for convenience
pub use cache::{CacheBackend, DedupCache, InMemoryBackend, RedisBackend};
pub use classify::{BatchOutcome, ClassifyClient, ClassifyPipeline, RecordStore};
pub use cluster::{ClusteringEngine, EditionCluster};
pub use config::{AppConfig, CliConfig, FileConfig};
pub use record::{BibRecord, RawRecord};
