//! # squill-testing
//!
//! Test infrastructure for the squill data layer.
//!
//! The centerpiece is [`MemoryDriver`], an in-memory implementation of the
//! physical-driver seam: enough behavior to exercise the client and pool
//! crates end to end — storage, transactions, failure injection, connection
//! accounting — without a live database. Integration tests that need the
//! client, the pool, and the derive macro together live in this crate's
//! `tests/` directory, keeping the other crates free of circular
//! dev-dependencies.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod memory;

pub use memory::MemoryDriver;

use std::sync::Once;

static INIT: Once = Once::new();

/// Install a `tracing` subscriber once for the whole test binary.
///
/// Reads the usual `RUST_LOG` filter; repeated calls are no-ops.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
