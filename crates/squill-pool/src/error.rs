//! Pool-level error types.

use thiserror::Error;

/// Errors produced by pool construction, checkout, and resize operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A connection was released into an idle set that already equals the
    /// pool's target size — the caller released something it never acquired,
    /// or released the same connection twice.
    #[error("pool is full: idle set already holds {size} connections")]
    Capacity {
        /// Target size of the pool at the time of the release.
        size: usize,
    },

    /// A size or acquire-increment outside the allowed range.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A connection-level failure, propagated unchanged.
    #[error(transparent)]
    Client(#[from] squill_client::Error),
}
