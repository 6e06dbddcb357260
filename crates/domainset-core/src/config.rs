//! Configuration types for the domain-set engine
//!
//! A [`DataSource`] describes where one database's bytes come from (an
//! ordered list of URLs, or a user callable) and how often to refresh.
//! [`EngineOptions`] bundles the sources with the storage driver and the
//! engine-level switches.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::error::{Error, Result, DB_NAME_MAX_LEN};
use crate::traits::storage::{ByteStream, StorageDriver};

/// Future returned by a source's get callable.
pub type GetFuture = Pin<Box<dyn Future<Output = Result<ByteStream>> + Send>>;

/// A user callable producing one readable stream of domain-list bytes.
pub type GetFn = Arc<dyn Fn() -> GetFuture + Send + Sync>;

/// Source information for one domain database.
///
/// Either `get` or `urls` must be provided; `get` takes precedence. Each URL
/// must point to a newline-separated list of domain names (`#`-prefixed
/// comment lines and blank lines are ignored).
#[derive(Clone)]
pub struct DataSource {
    /// URLs the domain data is fetched from, in order.
    ///
    /// URLs that cannot be fetched are logged and skipped; the refresh only
    /// fails when every URL fails.
    pub urls: Vec<Url>,

    /// Callable producing the domain data, overriding `urls` when set.
    pub get: Option<GetFn>,

    /// Interval between refreshes from this source. Must be positive.
    pub refresh_interval: Duration,
}

impl DataSource {
    /// Source backed by an ordered list of URLs.
    pub fn from_urls(urls: Vec<Url>, refresh_interval: Duration) -> Self {
        Self {
            urls,
            get: None,
            refresh_interval,
        }
    }

    /// Source backed by a user callable.
    pub fn from_get<F, Fut>(get: F, refresh_interval: Duration) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ByteStream>> + Send + 'static,
    {
        let get: GetFn = Arc::new(move || -> GetFuture { Box::pin(get()) });
        Self {
            urls: Vec::new(),
            get: Some(get),
            refresh_interval,
        }
    }

    /// Whether this source has anywhere to fetch from.
    pub fn has_source(&self) -> bool {
        self.get.is_some() || !self.urls.is_empty()
    }

    /// Validate the source configuration.
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval.is_zero() {
            return Err(Error::config("refresh_interval must be positive"));
        }
        Ok(())
    }
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSource")
            .field("urls", &self.urls)
            .field("get", &self.get.as_ref().map(|_| "<fn>"))
            .field("refresh_interval", &self.refresh_interval)
            .finish()
    }
}

/// Options for creating a [`crate::DomainSetEngine`].
///
/// There should be one engine per storage location; see the engine docs.
pub struct EngineOptions {
    /// Storage driver for cached databases and checkpoints. Required.
    pub storage: Arc<dyn StorageDriver>,

    /// Overrides the default HTTP client when set.
    ///
    /// The default client uses a 10-second request timeout.
    pub http_client: Option<reqwest::Client>,

    /// Disables downloading; only cached database files are used.
    ///
    /// Sources must still be provided for every database, downloads or not.
    pub disable_download: bool,

    /// Return from construction immediately and load databases in a
    /// background task.
    ///
    /// Queries against databases that have not loaded yet hit empty sets;
    /// use [`crate::DomainSetEngine::wait_ready`] to observe initialization.
    pub load_in_background: bool,

    /// Mapping of database names to their underlying sources.
    pub sources: HashMap<String, DataSource>,
}

impl EngineOptions {
    /// Options with the given storage driver and no sources.
    pub fn new(storage: Arc<dyn StorageDriver>) -> Self {
        Self {
            storage,
            http_client: None,
            disable_download: false,
            load_in_background: false,
            sources: HashMap::new(),
        }
    }

    /// Add a named source.
    pub fn with_source(mut self, name: impl Into<String>, source: DataSource) -> Self {
        self.sources.insert(name.into(), source);
        self
    }

    /// Validate names and sources.
    pub fn validate(&self) -> Result<()> {
        for (name, source) in &self.sources {
            if name.is_empty() {
                return Err(Error::config("database name must not be empty"));
            }
            if name.len() > DB_NAME_MAX_LEN {
                return Err(Error::DbNameTooLong);
            }
            source.validate()?;
        }
        Ok(())
    }
}

impl fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineOptions")
            .field("disable_download", &self.disable_download)
            .field("load_in_background", &self.load_in_background)
            .field("sources", &self.sources)
            .finish_non_exhaustive()
    }
}
