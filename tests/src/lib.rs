//! # Channel Bus Test Suite
//!
//! Integration tests exercising the bus facade end to end: publish,
//! subscription, long-poll, streaming, visibility filtering, and
//! retention across module boundaries.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── choreography.rs   # Forum-shaped end-to-end scenarios
//!     ├── delivery.rs       # Ordering, long-poll, cursors, streaming
//!     ├── retention.rs      # Eviction, gap reporting, idle expiry
//!     └── visibility.rs     # user_ids / group_ids filtering
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p bus-tests
//!
//! # By category
//! cargo test -p bus-tests integration::delivery::
//! cargo test -p bus-tests integration::retention::
//! ```


/// Opt-in tracing output for test debugging (`RUST_LOG=debug cargo test`).
#[cfg(test)]
pub(crate) fn init_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}
