// # domainset-core
//
// Core library for the multi-source domain-set cache.
//
// ## Architecture Overview
//
// This library keeps a canonicalized in-memory set per named domain list:
// - **DomainNormalizer**: canonical lowercase-ASCII (Punycode) domain form
// - **StorageDriver**: trait for durable database files and checkpoints,
//   with filesystem and in-memory implementations
// - **DataSource**: where a database's bytes come from (URLs or a callable)
//   and how often to refresh
// - **DomainSetEngine**: orchestrates startup from cache, per-database
//   refresh tasks, the tee-while-parse persistence pipeline, and concurrent
//   membership queries
//
// ## Design Principles
//
// 1. **Offline first**: every successful fetch is persisted raw, so the next
//    startup works without the network
// 2. **Whole-set replacement**: a refresh swaps the entire set under a write
//    lock; readers never see a partial merge
// 3. **Partial availability**: steady-state refresh failures are logged and
//    retried next interval instead of killing the engine
// 4. **Single pass**: the bytes on disk are exactly the bytes that were
//    parsed, teed from one stream

pub mod config;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod storage;
pub mod traits;

mod registry;
mod source;

// Re-export core types for convenience
pub use config::{DataSource, EngineOptions, GetFn, GetFuture};
pub use engine::{DomainSetEngine, ReadyState};
pub use error::{Error, Result, DB_NAME_MAX_LEN};
pub use normalize::DomainNormalizer;
pub use storage::{FsStorageDriver, MemoryStorageDriver};
pub use traits::{AllCheckpoints, ByteStream, Checkpoint, StorageDriver};

/// Value of the `service` key on this crate's structured log records.
pub(crate) const SERVICE: &str = "domainset.engine";
