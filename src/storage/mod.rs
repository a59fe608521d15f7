//! Storage module for gateway and token persistence

pub mod persistence;

pub use persistence::{DataDirLock, Storage, StorageConfig, StorageError};
