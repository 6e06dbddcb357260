// # Storage Driver Implementations
//
// This module provides implementations of the StorageDriver trait for
// different persistence strategies.

pub mod fs;
pub mod memory;

pub use fs::FsStorageDriver;
pub use memory::MemoryStorageDriver;
