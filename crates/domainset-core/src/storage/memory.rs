// # Memory Storage Driver
//
// In-memory implementation of StorageDriver.
//
// ## Purpose
//
// Holds database payloads and checkpoints in process memory. Nothing
// survives a restart, so an engine over this driver re-downloads everything
// on startup.
//
// ## When to Use
//
// - Tests that exercise the full engine without touching disk
// - Ephemeral embedding where offline startup is not needed

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

use crate::error::Error;
use crate::traits::storage::{AllCheckpoints, ByteStream, StorageDriver};

#[derive(Debug, Default)]
struct MemoryInner {
    databases: HashMap<String, Vec<u8>>,
    checkpoints: Option<AllCheckpoints>,
}

/// In-memory [`StorageDriver`] implementation.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorageDriver {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStorageDriver {
    /// Create a new empty driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw persisted bytes for a database, if any.
    ///
    /// Test hook: lets callers assert on exactly what a refresh persisted.
    pub async fn database_bytes(&self, name: &str) -> Option<Vec<u8>> {
        self.inner.read().await.databases.get(name).cloned()
    }

    /// Names of all persisted databases.
    pub async fn database_names(&self) -> Vec<String> {
        self.inner.read().await.databases.keys().cloned().collect()
    }
}

#[async_trait]
impl StorageDriver for MemoryStorageDriver {
    async fn write_database(&self, name: &str, mut input: ByteStream) -> Result<(), Error> {
        let mut buf = Vec::new();
        input
            .read_to_end(&mut buf)
            .await
            .map_err(|err| Error::storage(format!("failed to read input stream: {err}")))?;

        let mut guard = self.inner.write().await;
        guard.databases.insert(name.to_string(), buf);
        Ok(())
    }

    async fn read_database(&self, name: &str) -> Result<ByteStream, Error> {
        let guard = self.inner.read().await;
        let bytes = guard
            .databases
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("no cached database \"{name}\"")))?;

        Ok(Box::new(std::io::Cursor::new(bytes)))
    }

    async fn write_checkpoints(&self, checkpoints: &AllCheckpoints) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.checkpoints = Some(checkpoints.clone());
        Ok(())
    }

    async fn read_checkpoints(&self) -> Result<AllCheckpoints, Error> {
        let guard = self.inner.read().await;
        guard
            .checkpoints
            .clone()
            .ok_or_else(|| Error::not_found("no checkpoints written yet"))
    }
}
