// # Storage Driver Trait
//
// Defines the interface for persisting domain databases and checkpoints.
//
// ## Purpose
//
// The storage driver keeps a durable copy of every fetched database so the
// engine can start offline, plus a single checkpoints document recording
// when each database was last refreshed.
//
// Database payloads are raw newline-delimited text exactly as fetched: a
// faithful replay of the source, written before normalization. The in-memory
// set is rebuilt from it by the same loader that parses live downloads.
//
// ## Implementations
//
// - Filesystem: one file per database plus `checkpoints.json` (see
//   `storage::FsStorageDriver`)
// - Memory: for tests and ephemeral embedding (see
//   `storage::MemoryStorageDriver`)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::io::AsyncRead;

/// A readable byte stream handed across the storage boundary.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Checkpoint for a single database: when it was last successfully refreshed.
///
/// The capitalized serde keys are the on-disk contract; do not rename them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unix timestamp (seconds) of the last successful refresh; 0 means never.
    #[serde(rename = "LastUpdatedUnix")]
    pub last_updated_unix: i64,
}

/// The full checkpoints document, persisted as one unit.
///
/// Names present on disk but no longer configured are ignored by the engine;
/// configured names missing from the document default to a zero checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllCheckpoints {
    /// Mapping from database name to its checkpoint.
    #[serde(rename = "Checkpoints")]
    pub checkpoints: HashMap<String, Checkpoint>,
}

impl AllCheckpoints {
    /// Create an empty checkpoints document.
    pub fn new() -> Self {
        Self::default()
    }

    /// The checkpoint for `name`, defaulting to zero if absent.
    pub fn get(&self, name: &str) -> Checkpoint {
        self.checkpoints.get(name).copied().unwrap_or_default()
    }

    /// Set the checkpoint timestamp for `name`, inserting if absent.
    pub fn set(&mut self, name: &str, last_updated_unix: i64) {
        self.checkpoints
            .insert(name.to_string(), Checkpoint { last_updated_unix });
    }
}

/// Trait for storage driver implementations.
///
/// Implementations must be thread-safe and usable across async tasks; the
/// engine calls them concurrently from per-database refresh tasks and from
/// the checkpoint writer.
///
/// # Not-found signaling
///
/// `read_database` and `read_checkpoints` report a missing entry with an
/// error for which [`crate::Error::is_not_found`] returns true. Callers use
/// that to fall back to downloading; any other error is a real failure.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Write the database with the given name, fully consuming `input`.
    ///
    /// If a copy already exists it must survive as a backup until the new
    /// write is complete; a stream that ends in an error must leave the
    /// previous copy in place.
    async fn write_database(&self, name: &str, input: ByteStream) -> Result<(), crate::Error>;

    /// Open the database with the given name for reading.
    async fn read_database(&self, name: &str) -> Result<ByteStream, crate::Error>;

    /// Write the full checkpoints document, replacing any previous content.
    ///
    /// The replacement must be atomic: a crash mid-write must never leave an
    /// unparseable document behind.
    async fn write_checkpoints(&self, checkpoints: &AllCheckpoints) -> Result<(), crate::Error>;

    /// Read the checkpoints document.
    async fn read_checkpoints(&self) -> Result<AllCheckpoints, crate::Error>;
}
