//! Client integration tests.
//!
//! - `harness.rs`   - test client over a temp directory and scripted transport
//! - `intake.rs`    - event intake, payloads, guard outcomes, screen timing
//! - `lifecycle.rs` - construction rules, flush, reset, connectivity
//! - `crash.rs`     - panic capture and hook chaining

pub(crate) mod harness;
