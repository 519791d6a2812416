//! Integration tests for the Pulse outbox.
//!
//! - `harness.rs`   - store, scripted transport and engine wired together
//! - `drain.rs`     - drain pass outcomes, retry cap, bounded fan-out
//! - `scheduler.rs` - interval, connectivity and single-flight behavior
//! - `http.rs`      - `HttpTransport` against a local HTTP responder

mod drain;
