//! File system paths for SDK state.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Directory name under the platform data directory.
const APP_DIR_NAME: &str = "pulse";
/// Directory holding one file per pending delivery.
const QUEUE_DIR_NAME: &str = "queue";
/// JSON-lines log file name under the logs directory.
const LOG_FILE_NAME: &str = "pulse.jsonl";

/// Resolves the application-private locations the SDK writes to.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for all SDK state (e.g. ~/.local/share/pulse)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at the platform data directory.
    pub fn new() -> CoreResult<Self> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| CoreError::Path("Could not determine data directory".to_string()))?;

        Ok(Self {
            base_dir: data_dir.join(APP_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory.
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (<base>/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the delivery queue directory (<base>/queue).
    pub fn queue_dir(&self) -> PathBuf {
        self.base_dir.join(QUEUE_DIR_NAME)
    }

    /// Get the identity key-value file (<base>/identity.json).
    pub fn identity_file(&self) -> PathBuf {
        self.base_dir.join("identity.json")
    }

    /// Get the logs directory (<base>/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the structured log file (<base>/logs/pulse.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join(LOG_FILE_NAME)
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.queue_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
