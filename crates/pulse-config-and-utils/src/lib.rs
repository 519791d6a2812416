//! Core configuration, paths, and logging utilities for the Pulse SDK.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, RateLimitConfig, DEFAULT_API_URL, DEFAULT_DEDUP_WINDOW_SECS,
    DEFAULT_FLUSH_INTERVAL_SECS, DEFAULT_MAX_QUEUE_SIZE, DEFAULT_SESSION_TIMEOUT_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level, sdk_log_level};
pub use paths::Paths;
