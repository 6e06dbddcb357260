//! Core domain-set engine
//!
//! The engine owns the full lifecycle of every configured database:
//! offline startup from cache, periodic refresh from sources, durable
//! persistence, and concurrent membership queries.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   stream    ┌──────────────┐
//! │ SourceOpener │────────────▶│     tee      │
//! └──────────────┘             └──────┬───────┘
//!                                     │ every byte, twice
//!                      ┌──────────────┴──────────────┐
//!                      ▼                             ▼
//!               ┌─────────────┐              ┌──────────────┐
//!               │   Loader    │              │ StorageDriver│
//!               │ (normalize, │              │ (raw replay  │
//!               │  set swap)  │              │  on disk)    │
//!               └──────┬──────┘              └──────────────┘
//!                      │ success
//!                      ▼
//!               ┌─────────────┐   {name, ts}  ┌────────────────┐
//!               │  Registry   │──────────────▶│ CheckpointWriter│
//!               └─────────────┘               └────────────────┘
//! ```
//!
//! ## Refresh Flow
//!
//! 1. The per-database updater wakes at `last_updated + refresh_interval`
//! 2. The source opener yields one byte stream for the database
//! 3. The stream is teed: the loader parses it while the storage driver
//!    persists the identical bytes
//! 4. On loader success the new set is swapped into the registry and the
//!    checkpoint writer is told; on failure the storage write is aborted
//!    with an error so the previous on-disk copy survives
//!
//! Steady-state refresh errors are logged and the updater keeps ticking;
//! partial availability beats engine death.

mod loader;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::io::{InspectReader, StreamReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::EngineOptions;
use crate::error::{Error, Result};
use crate::normalize::DomainNormalizer;
use crate::registry::{DbEntry, DbRegistry};
use crate::source::open_data_source;
use crate::traits::storage::{AllCheckpoints, ByteStream, StorageDriver};
use crate::SERVICE;

/// Default per-request timeout of the built-in HTTP client.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Depth of the checkpoint-update channel.
const UPDATES_CHANNEL_DEPTH: usize = 8;

/// One checkpoint-update message: database `name` refreshed at `ts`.
#[derive(Debug)]
struct CheckpointUpdate {
    name: String,
    ts: DateTime<Utc>,
}

/// Initialization state observable through [`DomainSetEngine::ready`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyState {
    /// Databases are still loading (background initialization).
    Pending,
    /// All configured databases finished their initial load.
    Ready,
    /// Background initialization failed; the reason is attached.
    ///
    /// Queries still answer from whatever did load (usually empty sets).
    Failed(String),
}

struct EngineInner {
    storage: Arc<dyn StorageDriver>,
    http_client: reqwest::Client,
    disable_download: bool,
    normalizer: DomainNormalizer,
    registry: DbRegistry,
    updates_tx: mpsc::Sender<CheckpointUpdate>,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

/// Caches named domain sets and answers membership queries.
///
/// Databases are cached on disk and updated periodically from their data
/// sources; at runtime each database is an in-memory set of canonical
/// domain names.
///
/// Caches are not aware of which data sources produced them, so changing a
/// database's URLs or get callable should be followed by clearing the cache
/// directory.
///
/// There should be only one engine per storage driver or storage location,
/// and ideally one per process. A single engine is safe to share across
/// tasks; queries take a read token on the database's lock and never block
/// each other.
///
/// The engine is single-use: after [`DomainSetEngine::close`] it rejects
/// further operations with [`Error::EngineClosed`].
pub struct DomainSetEngine {
    inner: Arc<EngineInner>,
    ready: watch::Receiver<ReadyState>,
}

impl std::fmt::Debug for DomainSetEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainSetEngine").finish_non_exhaustive()
    }
}

impl DomainSetEngine {
    /// Create an engine and load its databases.
    ///
    /// Blocks until every database has loaded (from cache or source),
    /// unless [`EngineOptions::load_in_background`] is set, in which case
    /// it returns immediately and [`DomainSetEngine::wait_ready`] reports
    /// the outcome.
    pub async fn new(options: EngineOptions) -> Result<Self> {
        options.validate()?;

        let http_client = match options.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .timeout(DEFAULT_HTTP_TIMEOUT)
                .build()
                .map_err(|err| Error::http(format!("failed to build HTTP client: {err}")))?,
        };

        let (updates_tx, updates_rx) = mpsc::channel(UPDATES_CHANNEL_DEPTH);
        let (ready_tx, ready_rx) = watch::channel(ReadyState::Pending);

        let inner = Arc::new(EngineInner {
            storage: options.storage,
            http_client,
            disable_download: options.disable_download,
            normalizer: DomainNormalizer::new(),
            registry: DbRegistry::from_sources(options.sources),
            updates_tx,
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        });

        info!(service = SERVICE, "initializing domain-set engine");

        if options.load_in_background {
            debug!(
                service = SERVICE,
                "loading databases in the background, as requested by engine options"
            );
            let inner = Arc::clone(&inner);
            tokio::spawn(async move {
                match initialize(&inner, updates_rx).await {
                    Ok(()) => {
                        let _ = ready_tx.send(ReadyState::Ready);
                    }
                    Err(err) => {
                        error!(
                            service = SERVICE,
                            error = %err,
                            "failed to initialize domain-set engine in the background"
                        );
                        let _ = ready_tx.send(ReadyState::Failed(err.to_string()));
                    }
                }
            });
        } else {
            initialize(&inner, updates_rx).await?;
            let _ = ready_tx.send(ReadyState::Ready);
        }

        Ok(Self {
            inner,
            ready: ready_rx,
        })
    }

    /// Whether the named database contains `domain`.
    ///
    /// The input is normalized first; normalization failures surface to the
    /// caller. The probe itself takes a read token on the database's lock
    /// and observes either the previous or the next full set, never a
    /// partial one.
    pub fn has_domain(&self, db_name: &str, domain: &str) -> Result<bool> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::EngineClosed);
        }
        let entry = self
            .inner
            .registry
            .get(db_name)
            .ok_or_else(|| Error::NoSuchDatabase(db_name.to_string()))?;

        let normalized = self.inner.normalizer.normalize(domain)?;
        Ok(entry.contains(&normalized))
    }

    /// Force-refresh one named database immediately.
    ///
    /// Downloads from the database's source, persists the fetched bytes,
    /// and swaps the parsed set into memory. Scheduled refreshes do this
    /// automatically; this is for callers that cannot wait.
    pub async fn download_and_load(&self, name: &str) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::EngineClosed);
        }
        refresh_by_name(&self.inner, name).await
    }

    /// Number of domains currently loaded for the named database.
    pub fn database_len(&self, name: &str) -> Result<usize> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::EngineClosed);
        }
        self.inner
            .registry
            .get(name)
            .map(DbEntry::len)
            .ok_or_else(|| Error::NoSuchDatabase(name.to_string()))
    }

    /// Names of all configured databases.
    pub fn database_names(&self) -> Vec<String> {
        self.inner.registry.names().cloned().collect()
    }

    /// Current initialization state.
    pub fn ready(&self) -> ReadyState {
        self.ready.borrow().clone()
    }

    /// Wait until initialization finished, successfully or not.
    ///
    /// Returns immediately when the engine was constructed synchronously.
    pub async fn wait_ready(&self) -> Result<()> {
        let mut rx = self.ready.clone();
        let state = rx
            .wait_for(|state| !matches!(state, ReadyState::Pending))
            .await
            .map_err(|_| Error::Init("initialization task stopped".to_string()))?;
        match &*state {
            ReadyState::Ready => Ok(()),
            ReadyState::Failed(reason) => Err(Error::Init(reason.clone())),
            ReadyState::Pending => unreachable!("wait_for filtered Pending"),
        }
    }

    /// Terminate updaters and the checkpoint writer and release the
    /// in-memory sets.
    ///
    /// Idempotent. The engine is single-use; subsequent queries return
    /// [`Error::EngineClosed`].
    pub fn close(&self) {
        info!(service = SERVICE, "closing domain-set engine");
        self.inner.closed.store(true, Ordering::Release);
        self.inner.shutdown.cancel();
        // Large sets dominate the engine's footprint; drop them eagerly
        // instead of waiting for the last Arc holder.
        self.inner.registry.clear_all();
    }

    /// Whether [`DomainSetEngine::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

/// Startup: replay caches (or download), reconcile checkpoints, then spawn
/// the checkpoint writer and one updater per database.
async fn initialize(
    inner: &Arc<EngineInner>,
    updates_rx: mpsc::Receiver<CheckpointUpdate>,
) -> Result<()> {
    let (mut checkpoints, had_checkpoints) = match inner.storage.read_checkpoints().await {
        Ok(doc) => (doc, true),
        Err(err) if err.is_not_found() => (AllCheckpoints::new(), false),
        Err(err) => return Err(err),
    };

    for (name, entry) in inner.registry.iter() {
        if inner.shutdown.is_cancelled() {
            return Ok(());
        }

        let mut cached: Option<ByteStream> = None;
        if had_checkpoints {
            debug!(
                service = SERVICE,
                database_name = %name,
                "reading database from cache"
            );
            match inner.storage.read_database(name).await {
                Ok(stream) => cached = Some(stream),
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }

        match cached {
            Some(stream) => {
                loader::load_into_entry(stream, name, &inner.normalizer, entry).await?;
            }
            None => {
                if inner.disable_download {
                    error!(
                        service = SERVICE,
                        database_name = %name,
                        "no cached database and downloading is disabled"
                    );
                    return Err(Error::NoCacheAndNoDownload);
                }
                refresh_database(inner, name, entry).await?;
                entry.set_last_updated_unix(Utc::now().timestamp());
            }
        }
    }

    if inner.shutdown.is_cancelled() {
        return Ok(());
    }

    // Reconcile: names downloaded above get the fresh timestamp, names
    // replayed from cache keep their persisted one, new names default to 0.
    for (name, entry) in inner.registry.iter() {
        let mut checkpoint = checkpoints.get(name);
        if entry.last_updated_unix() != 0 {
            checkpoint.last_updated_unix = entry.last_updated_unix();
        }
        checkpoints.set(name, checkpoint.last_updated_unix);
    }

    // Written even when nothing was fetched: first initialization must
    // leave a checkpoints document behind.
    inner.storage.write_checkpoints(&checkpoints).await?;

    if inner.shutdown.is_cancelled() {
        return Ok(());
    }

    let schedule: Vec<(String, i64, Duration)> = inner
        .registry
        .iter()
        .map(|(name, entry)| {
            (
                name.clone(),
                checkpoints.get(name).last_updated_unix,
                entry.source().refresh_interval,
            )
        })
        .collect();

    tokio::spawn(run_checkpoint_writer(
        Arc::clone(inner),
        updates_rx,
        checkpoints,
    ));

    if !inner.disable_download {
        for (name, last_updated_unix, refresh_interval) in schedule {
            tokio::spawn(run_updater(
                Arc::clone(inner),
                name,
                last_updated_unix,
                refresh_interval,
            ));
        }
    }

    info!(service = SERVICE, "finished initializing domain-set engine");
    Ok(())
}

/// Single consumer of checkpoint updates; owns the working document.
///
/// Every message rewrites the whole document on disk. Write errors are
/// logged and consumption continues; a missed checkpoint only means the
/// next startup refreshes that database a little sooner.
async fn run_checkpoint_writer(
    inner: Arc<EngineInner>,
    mut updates_rx: mpsc::Receiver<CheckpointUpdate>,
    mut checkpoints: AllCheckpoints,
) {
    loop {
        let update = tokio::select! {
            _ = inner.shutdown.cancelled() => return,
            update = updates_rx.recv() => match update {
                Some(update) => update,
                None => return,
            },
        };

        checkpoints.set(&update.name, update.ts.timestamp());
        if let Err(err) = inner.storage.write_checkpoints(&checkpoints).await {
            error!(
                service = SERVICE,
                database_name = %update.name,
                error = %err,
                "failed to save checkpoints after receiving checkpoint update"
            );
        }
    }
}

/// Per-database refresh scheduler.
///
/// First wake is `last_updated + refresh_interval` (a past instant fires
/// immediately), then one refresh per interval until shutdown.
async fn run_updater(
    inner: Arc<EngineInner>,
    name: String,
    last_updated_unix: i64,
    refresh_interval: Duration,
) {
    debug!(service = SERVICE, database_name = %name, "running updater for database");

    let elapsed = (Utc::now().timestamp().saturating_sub(last_updated_unix)).max(0) as u64;
    let initial_delay = refresh_interval.saturating_sub(Duration::from_secs(elapsed));

    tokio::select! {
        _ = inner.shutdown.cancelled() => return,
        _ = tokio::time::sleep(initial_delay) => {}
    }

    loop {
        if inner.shutdown.is_cancelled() {
            return;
        }

        match refresh_by_name(&inner, &name).await {
            Ok(()) => {
                let update = CheckpointUpdate {
                    name: name.clone(),
                    ts: Utc::now(),
                };
                tokio::select! {
                    _ = inner.shutdown.cancelled() => return,
                    sent = inner.updates_tx.send(update) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
            Err(err) => {
                error!(
                    service = SERVICE,
                    database_name = %name,
                    error = %err,
                    "failed scheduled update of database"
                );
            }
        }

        tokio::select! {
            _ = inner.shutdown.cancelled() => return,
            _ = tokio::time::sleep(refresh_interval) => {}
        }
    }
}

async fn refresh_by_name(inner: &EngineInner, name: &str) -> Result<()> {
    let entry = inner
        .registry
        .get(name)
        .ok_or_else(|| Error::NoSuchDatabase(name.to_string()))?;
    refresh_database(inner, name, entry).await
}

/// One acquire-parse-persist-swap cycle for a single database.
///
/// The source stream is teed: the loader parses exactly the bytes the
/// storage driver persists, in one pass, whatever the source size. When
/// the loader fails, the storage pipe is closed with an error so the
/// driver aborts instead of committing a half-written file.
async fn refresh_database(inner: &EngineInner, name: &str, entry: &DbEntry) -> Result<()> {
    debug!(service = SERVICE, database_name = %name, "downloading and loading database");

    let source = open_data_source(&inner.http_client, entry.source()).await?;

    let (pipe_tx, pipe_rx) = mpsc::unbounded_channel::<std::io::Result<Bytes>>();
    let store_reader: ByteStream = Box::new(StreamReader::new(UnboundedReceiverStream::new(pipe_rx)));

    let storage = Arc::clone(&inner.storage);
    let write_name = name.to_string();
    let writer =
        tokio::spawn(async move { storage.write_database(&write_name, store_reader).await });

    let chunk_tx = pipe_tx.clone();
    let tee = InspectReader::new(source, move |chunk: &[u8]| {
        if !chunk.is_empty() {
            let _ = chunk_tx.send(Ok(Bytes::copy_from_slice(chunk)));
        }
    });

    match loader::load_into_entry(tee, name, &inner.normalizer, entry).await {
        Ok(count) => {
            // Clean EOF: the tee (and its sender clone) is already gone.
            drop(pipe_tx);
            match writer.await {
                Ok(Ok(())) => {
                    debug!(
                        service = SERVICE,
                        database_name = %name,
                        domains = count,
                        "database refreshed"
                    );
                    Ok(())
                }
                Ok(Err(err)) => Err(err),
                Err(join_err) => Err(Error::storage(format!(
                    "storage writer task failed: {join_err}"
                ))),
            }
        }
        Err(err) => {
            // Close the pipe with the loader error so the storage write
            // aborts consistently.
            let _ = pipe_tx.send(Err(std::io::Error::other(err.to_string())));
            drop(pipe_tx);
            let _ = writer.await;
            Err(err)
        }
    }
}
