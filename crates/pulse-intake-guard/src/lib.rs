//! Intake guard for error and diagnostic events.
//!
//! Every error event passes two independent checks before it may enter the
//! delivery path:
//!
//! - [`RateWindow`]: at most N accepted events per sliding window
//! - [`DedupSet`]: an identical [`Fingerprint`] is suppressed until it expires
//!
//! [`IntakeGuard`] combines both. Each check holds its own lock only for the
//! check-and-update.

mod dedup;
mod fingerprint;
mod guard;
mod rate;

pub use dedup::DedupSet;
pub use fingerprint::{normalize_stack, Fingerprint, MAX_STACK_LINES};
pub use guard::{IntakeDecision, IntakeGuard, IntakeGuardConfig};
pub use rate::RateWindow;
