//! Error types for connection, query, and mapping failures.

use thiserror::Error;

/// Convenience alias for results produced by this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced while opening or using a database connection.
#[derive(Debug, Error)]
pub enum Error {
    /// A physical connection could not be opened, or is no longer usable.
    #[error("connection error: {0}")]
    Connection(String),

    /// A prepared statement failed to execute or fetch. The connection that
    /// produced this error has been closed.
    #[error("query error: {0}")]
    Query(String),

    /// A mapped type lacks required metadata, or a value failed to convert.
    #[error(transparent)]
    Mapping(#[from] MappingError),
}

/// Errors produced while building type metadata or mapping rows to entities.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// The mapped type declares no columns at all.
    #[error("type `{type_name}` declares no mapped columns")]
    NoColumns {
        /// Name of the offending type.
        type_name: &'static str,
    },

    /// The mapped type declares no primary-key column.
    #[error("type `{type_name}` declares no primary-key column")]
    MissingPrimaryKey {
        /// Name of the offending type.
        type_name: &'static str,
    },

    /// A column expected by the mapped type is absent from a result row.
    #[error("column `{column}` is missing from the result row")]
    MissingColumn {
        /// Name of the missing column.
        column: String,
    },

    /// A database value could not be converted into the target field type.
    #[error("cannot convert {actual} into {expected}")]
    Conversion {
        /// The Rust type the field expected.
        expected: &'static str,
        /// The database value kind actually found.
        actual: &'static str,
    },
}
