//! Persistent key-value storage for the Pulse SDK.
//!
//! This crate provides:
//! - `KeyValueStore`: the storage seam used for visitor and session state
//! - `FileKeyValueStore`: a JSON file backend under the SDK data directory
//! - `MemoryKeyValueStore`: a process-local backend for ephemeral hosts and tests
//! - `IdentityStore`: visitor id, session id rotation, and first-touch referrer

mod file;
mod identity;
mod keys;
mod memory;
mod traits;

pub use file::FileKeyValueStore;
pub use identity::IdentityStore;
pub use keys::StorageKeys;
pub use memory::MemoryKeyValueStore;
pub use traits::KeyValueStore;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
