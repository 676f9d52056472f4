//! # squill-client
//!
//! Transactional database connection wrapper with declarative entity mapping.
//!
//! This crate is the core of the squill data layer. It wraps one physical
//! database connection behind [`Connection`], giving callers CRUD convenience
//! operations, parameterized query execution, and transaction control without
//! hand-written SQL or manual resource management. The physical driver itself
//! sits behind the object-safe traits in [`driver`], so any blocking
//! connection-oriented database protocol can be plugged in.
//!
//! ## Features
//!
//! - **Declarative mapping**: annotate a plain struct and its CRUD statements
//!   are generated once and cached per type
//! - **Metadata cache**: thread-safe, read-mostly cache of per-type column
//!   bindings and statement templates
//! - **Bound parameters**: positional `?` placeholders are always bound
//!   through the driver, never spliced into SQL text
//! - **Deterministic cleanup**: statements and cursors are released on every
//!   exit path; a failed database operation closes the owning connection and
//!   propagates
//!
//! ## Example
//!
//! ```rust,ignore
//! use squill_client::{params, Connection, ConnectionInformation, Entity};
//!
//! #[derive(Debug, Default, PartialEq, Entity)]
//! #[squill(table = "person")]
//! struct Person {
//!     #[squill(column = "person_id", primary_key)]
//!     id: i64,
//!     name: String,
//! }
//!
//! let mut connection = Connection::open(&driver, &info, metadata)?;
//! connection.persist(&Person { id: 1, name: "John".into() })?;
//! let found: Option<Person> = connection.read(&params![1_i64])?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod driver;
pub mod entity;
pub mod error;
pub mod metadata;
pub mod row;
pub mod sql;
pub mod value;

pub use config::ConnectionInformation;
pub use connection::Connection;
pub use driver::{Driver, DriverConnection, DriverRows, DriverStatement};
pub use entity::{ColumnSpec, Entity};
pub use error::{Error, MappingError, Result};
pub use metadata::{MappedTypeInfo, TypeMetadataCache};
pub use row::Row;
pub use sql::{InsertKeyPolicy, SqlBuilder};
pub use value::{FromValue, ToValue, Value};

/// Derive macro for the [`Entity`] trait, re-exported so a single
/// `use squill_client::Entity;` brings in both the trait and the derive.
#[cfg(feature = "derive")]
pub use squill_derive::Entity;
