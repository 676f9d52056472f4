//! # squill-pool
//!
//! Blocking connection pool with transactional unit-of-work execution.
//!
//! The pool owns a growable, shrinkable set of idle
//! [`Connection`](squill_client::Connection)s and serializes checkout,
//! return, and resize against concurrent callers. Most callers never touch
//! `acquire`/`release` directly: [`Pool::run`] brackets a closure with
//! checkout, optional transaction control, and a guaranteed return of the
//! connection on every exit path.
//!
//! ## Example
//!
//! ```rust,ignore
//! use squill_pool::Pool;
//!
//! let pool = Pool::builder()
//!     .driver(driver)
//!     .connection_information(info)
//!     .size(4)
//!     .acquire_increment(2)
//!     .build()?;
//!
//! let loaded = pool.run(true, |connection| {
//!     connection.persist(&person)?;
//!     connection.read::<Person>(&params![1_i64])
//! })?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod pool;

pub use error::PoolError;
pub use pool::{Pool, PoolBuilder, DEFAULT_ACQUIRE_INCREMENT, DEFAULT_SIZE};
