//! Client error types.

use pulse_config_and_utils::CoreError;
use pulse_outbox::OutboxError;
use pulse_storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from constructing or administering a [`Pulse`](crate::Pulse) client.
///
/// Event intake never returns these; it reports a
/// [`DispatchOutcome`](crate::DispatchOutcome) instead.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(#[from] CoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Another live client already owns this queue directory
    #[error("A Pulse client is already configured for {}", .0.display())]
    AlreadyConfigured(PathBuf),

    /// Constructed outside a Tokio runtime
    #[error("Pulse must be created inside a Tokio runtime")]
    NoRuntime,
}

/// Result type alias using ClientError.
pub type ClientResult<T> = Result<T, ClientError>;
