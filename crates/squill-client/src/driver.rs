//! The physical-driver seam.
//!
//! Everything network-level lives behind these object-safe traits: opening a
//! connection from [`ConnectionInformation`], preparing statements, binding
//! positional parameters, fetching rows, and transaction control. The crate
//! itself never interprets SQL text and never talks to a socket.
//!
//! Statements and cursors are plain owned boxes: dropping them releases the
//! driver-side resources, which is what makes the connection wrapper's
//! release-on-every-exit-path guarantee hold without explicit `close` calls.

use crate::config::ConnectionInformation;
use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// Factory for physical database connections.
pub trait Driver: Send + Sync {
    /// Open a new physical connection.
    ///
    /// Fails with [`Error::Connection`](crate::Error::Connection) when the
    /// database is unreachable or rejects the credentials.
    fn open(&self, info: &ConnectionInformation) -> Result<Box<dyn DriverConnection>>;
}

/// One physical connection to the database.
///
/// Implementations release their underlying resources when dropped; `close`
/// exists for explicit, error-reporting shutdown.
pub trait DriverConnection: Send {
    /// Prepare a statement from SQL text with positional `?` placeholders.
    fn prepare(&mut self, sql: &str) -> Result<Box<dyn DriverStatement>>;

    /// Toggle auto-commit mode. Disabling it opens a transaction scope.
    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()>;

    /// Make pending work permanent.
    fn commit(&mut self) -> Result<()>;

    /// Undo pending work since the last begin or commit.
    fn rollback(&mut self) -> Result<()>;

    /// Close the physical connection.
    fn close(&mut self) -> Result<()>;

    /// Whether the physical connection has been closed.
    fn is_closed(&self) -> bool;
}

/// A prepared statement with the driver's native parameter binding.
pub trait DriverStatement: Send {
    /// Bind `params` positionally and execute a non-query statement,
    /// returning the number of affected rows.
    fn execute_update(&mut self, params: &[Value]) -> Result<u64>;

    /// Bind `params` positionally and execute a query, yielding a cursor.
    fn execute_query(&mut self, params: &[Value]) -> Result<Box<dyn DriverRows>>;
}

/// A forward-only result cursor; dropping it releases the driver resources.
pub trait DriverRows: Send {
    /// Fetch the next row, or `None` once the result set is exhausted.
    fn next_row(&mut self) -> Result<Option<Row>>;
}
