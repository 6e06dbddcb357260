//! Core traits for the domain-set cache
//!
//! This module defines the abstract interfaces implementations must follow.
//!
//! - [`StorageDriver`]: durable storage for database files and checkpoints

pub mod storage;

pub use storage::{AllCheckpoints, ByteStream, Checkpoint, StorageDriver};
