//! Error types for the domain-set cache
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Maximum length of a database name, in bytes.
pub const DB_NAME_MAX_LEN: usize = 255;

/// Result type alias for domain-set operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the domain-set cache
#[derive(Error, Debug)]
pub enum Error {
    /// A storage lookup missed; recoverable by falling back to download
    #[error("not found: {0}")]
    NotFound(String),

    /// No cached database exists and downloading is disabled
    #[error("no cached copy of database exists, and downloading is disabled")]
    NoCacheAndNoDownload,

    /// The requested database name was never configured
    #[error("domain database \"{0}\" does not exist")]
    NoSuchDatabase(String),

    /// A database name exceeded the byte limit
    #[error("database name too long, must be at most {DB_NAME_MAX_LEN} bytes")]
    DbNameTooLong,

    /// A data source has neither URLs nor a get callable
    #[error("data source has no sources: the URL list is empty and no get callable is set")]
    DataSourceNoSource,

    /// Every URL in a data source failed during one refresh
    #[error("all URLs in data source failed: {0}")]
    AllUrlsFailed(String),

    /// Too many malformed lines while loading a database
    #[error(
        "encountered {failures} parse failures while loading database \"{name}\", but only \
         {good} lines parsed successfully; file is probably not a newline-separated domain \
         list: {detail}"
    )]
    LoadParse {
        /// Database name being loaded
        name: String,
        /// Number of lines that failed normalization
        failures: usize,
        /// Number of lines that parsed successfully
        good: usize,
        /// Joined per-line failure messages
        detail: String,
    },

    /// A domain name failed canonicalization
    #[error("invalid domain name: {0}")]
    Normalize(String),

    /// Operation attempted on a closed engine
    #[error("domain-set engine is closed")]
    EngineClosed,

    /// Engine initialization failed (background mode)
    #[error("initialization failed: {0}")]
    Init(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage driver errors
    #[error("storage error: {0}")]
    Storage(String),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a normalization error
    pub fn normalize(msg: impl Into<String>) -> Self {
        Self::Normalize(msg.into())
    }

    /// Recover a crate error that was smuggled through an `std::io::Error`
    /// (pipe readers can only surface io errors).
    pub(crate) fn from_read_error(err: std::io::Error) -> Self {
        match err.get_ref().and_then(|inner| inner.downcast_ref::<Error>()) {
            Some(Error::AllUrlsFailed(msg)) => Error::AllUrlsFailed(msg.clone()),
            _ => Error::Io(err),
        }
    }

    /// Whether this error means "no such file on disk".
    ///
    /// Callers that can fall back to downloading use this to distinguish a
    /// cache miss from a real storage failure.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
