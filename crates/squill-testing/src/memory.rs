//! An in-memory implementation of the physical-driver seam.
//!
//! `MemoryDriver` stores tables as plain row maps behind a mutex and
//! recognizes exactly the statement shapes the client's `SqlBuilder` emits
//! (`INSERT INTO t (..) VALUES (..)`, `SELECT .. FROM .. [WHERE ..]`,
//! `UPDATE .. SET .. WHERE ..`, `DELETE FROM .. WHERE ..`, with `=`
//! predicates joined by `AND`). That template matcher is test harness, not a
//! SQL engine: anything else is rejected as an unsupported statement.
//!
//! Transactions are snapshot-based: disabling auto-commit snapshots the
//! whole store, rollback restores the snapshot, commit refreshes it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use squill_client::{
    ConnectionInformation, Driver, DriverConnection, DriverRows, DriverStatement, Error, Result,
    Row, Value,
};

type TableRows = Vec<HashMap<String, Value>>;
type Tables = HashMap<String, TableRows>;

#[derive(Default)]
struct SharedState {
    tables: Mutex<Tables>,
    open_connections: AtomicUsize,
    total_opened: AtomicUsize,
    fail_next_open: Mutex<Option<String>>,
    fail_next_execute: Mutex<Option<String>>,
}

/// In-memory [`Driver`] with connection accounting and one-shot failure
/// injection.
///
/// Clones share the same storage, so a test can keep one handle for
/// assertions while the pool owns another.
///
/// # Example
///
/// ```rust,ignore
/// let driver = MemoryDriver::new();
/// let pool = Pool::builder()
///     .driver(Arc::new(driver.clone()))
///     .connection_information(info)
///     .build()?;
/// assert_eq!(driver.open_connections(), 5);
/// ```
#[derive(Clone, Default)]
pub struct MemoryDriver {
    state: Arc<SharedState>,
}

impl MemoryDriver {
    /// Create a driver with empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections currently open.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.state.open_connections.load(Ordering::SeqCst)
    }

    /// Number of connections opened over the driver's lifetime.
    #[must_use]
    pub fn total_opened(&self) -> usize {
        self.state.total_opened.load(Ordering::SeqCst)
    }

    /// Make the next [`Driver::open`] call fail with `message`.
    pub fn fail_next_open(&self, message: &str) {
        *self.state.fail_next_open.lock() = Some(message.to_owned());
    }

    /// Make the next statement execution (on any connection) fail with
    /// `message`.
    pub fn fail_next_execute(&self, message: &str) {
        *self.state.fail_next_execute.lock() = Some(message.to_owned());
    }

    /// Number of rows currently stored for `table`.
    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        self.state
            .tables
            .lock()
            .get(table)
            .map_or(0, TableRows::len)
    }
}

impl Driver for MemoryDriver {
    fn open(&self, _info: &ConnectionInformation) -> Result<Box<dyn DriverConnection>> {
        if let Some(message) = self.state.fail_next_open.lock().take() {
            return Err(Error::Connection(message));
        }
        self.state.open_connections.fetch_add(1, Ordering::SeqCst);
        self.state.total_opened.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(
            open = self.state.open_connections.load(Ordering::SeqCst),
            "memory connection opened"
        );
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
            closed: false,
            snapshot: None,
        }))
    }
}

struct MemoryConnection {
    state: Arc<SharedState>,
    closed: bool,
    snapshot: Option<Tables>,
}

impl MemoryConnection {
    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.open_connections.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Connection("memory connection is closed".to_owned()));
        }
        Ok(())
    }
}

impl DriverConnection for MemoryConnection {
    fn prepare(&mut self, sql: &str) -> Result<Box<dyn DriverStatement>> {
        self.ensure_open()?;
        Ok(Box::new(MemoryStatement {
            sql: sql.to_owned(),
            state: Arc::clone(&self.state),
        }))
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        self.ensure_open()?;
        if auto_commit {
            self.snapshot = None;
        } else if self.snapshot.is_none() {
            self.snapshot = Some(self.state.tables.lock().clone());
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.snapshot.is_some() {
            // Pending work becomes the new transaction baseline.
            self.snapshot = Some(self.state.tables.lock().clone());
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        if let Some(snapshot) = &self.snapshot {
            *self.state.tables.lock() = snapshot.clone();
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.release();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.release();
    }
}

struct MemoryStatement {
    sql: String,
    state: Arc<SharedState>,
}

impl MemoryStatement {
    fn take_injected_failure(&self) -> Result<()> {
        if let Some(message) = self.state.fail_next_execute.lock().take() {
            return Err(Error::Query(message));
        }
        Ok(())
    }
}

impl DriverStatement for MemoryStatement {
    fn execute_update(&mut self, params: &[Value]) -> Result<u64> {
        self.take_injected_failure()?;
        tracing::trace!(sql = %self.sql, params = params.len(), "memory update");
        let mut tables = self.state.tables.lock();
        if let Some(rest) = self.sql.strip_prefix("INSERT INTO ") {
            insert(&mut tables, rest, params)
        } else if let Some(rest) = self.sql.strip_prefix("UPDATE ") {
            update(&mut tables, rest, params)
        } else if let Some(rest) = self.sql.strip_prefix("DELETE FROM ") {
            delete(&mut tables, rest, params)
        } else {
            Err(unsupported(&self.sql))
        }
    }

    fn execute_query(&mut self, params: &[Value]) -> Result<Box<dyn DriverRows>> {
        self.take_injected_failure()?;
        tracing::trace!(sql = %self.sql, params = params.len(), "memory query");
        let tables = self.state.tables.lock();
        let Some(rest) = self.sql.strip_prefix("SELECT ") else {
            return Err(unsupported(&self.sql));
        };
        let rows = select(&tables, rest, params)?;
        Ok(Box::new(MemoryRows { rows, next: 0 }))
    }
}

struct MemoryRows {
    rows: Vec<Row>,
    next: usize,
}

impl DriverRows for MemoryRows {
    fn next_row(&mut self) -> Result<Option<Row>> {
        let row = self.rows.get(self.next).cloned();
        if row.is_some() {
            self.next += 1;
        }
        Ok(row)
    }
}

fn insert(tables: &mut Tables, rest: &str, params: &[Value]) -> Result<u64> {
    // rest: "<table> (<columns>) VALUES (..)"
    let (table, rest) = rest.split_once(" (").ok_or_else(|| malformed(rest))?;
    let (column_list, _) = rest.split_once(')').ok_or_else(|| malformed(rest))?;
    let columns = split_columns(column_list);
    check_param_count(columns.len(), params)?;

    let row: HashMap<String, Value> = columns
        .into_iter()
        .map(str::to_owned)
        .zip(params.iter().cloned())
        .collect();
    tables.entry(table.to_owned()).or_default().push(row);
    Ok(1)
}

fn update(tables: &mut Tables, rest: &str, params: &[Value]) -> Result<u64> {
    // rest: "<table> SET <col> = ?, .. WHERE <predicates>"
    let (table, rest) = rest.split_once(" SET ").ok_or_else(|| malformed(rest))?;
    let (set_part, where_part) = rest.split_once(" WHERE ").ok_or_else(|| malformed(rest))?;
    let set_columns = assignment_columns(set_part)?;
    let predicates = predicate_columns(where_part)?;
    check_param_count(set_columns.len() + predicates.len(), params)?;
    let (set_values, key_values) = params.split_at(set_columns.len());

    let mut affected = 0;
    if let Some(rows) = tables.get_mut(table) {
        for row in rows.iter_mut() {
            if matches(row, &predicates, key_values) {
                for (column, value) in set_columns.iter().zip(set_values) {
                    row.insert((*column).to_owned(), value.clone());
                }
                affected += 1;
            }
        }
    }
    Ok(affected)
}

fn delete(tables: &mut Tables, rest: &str, params: &[Value]) -> Result<u64> {
    // rest: "<table> WHERE <predicates>"
    let (table, where_part) = rest.split_once(" WHERE ").ok_or_else(|| malformed(rest))?;
    let predicates = predicate_columns(where_part)?;
    check_param_count(predicates.len(), params)?;

    let Some(rows) = tables.get_mut(table) else {
        return Ok(0);
    };
    let before = rows.len();
    rows.retain(|row| !matches(row, &predicates, params));
    Ok((before - rows.len()) as u64)
}

fn select(tables: &Tables, rest: &str, params: &[Value]) -> Result<Vec<Row>> {
    // rest: "<columns> FROM <table> [WHERE <predicates>]"
    let (column_list, rest) = rest.split_once(" FROM ").ok_or_else(|| malformed(rest))?;
    let columns = split_columns(column_list);
    let (table, predicates) = match rest.split_once(" WHERE ") {
        Some((table, where_part)) => (table.trim(), predicate_columns(where_part)?),
        None => (rest.trim(), Vec::new()),
    };
    check_param_count(predicates.len(), params)?;

    let names: Vec<String> = columns.iter().map(|c| (*c).to_owned()).collect();
    let mut out = Vec::new();
    if let Some(rows) = tables.get(table) {
        for row in rows {
            if matches(row, &predicates, params) {
                let values = columns
                    .iter()
                    .map(|c| row.get(*c).cloned().unwrap_or(Value::Null))
                    .collect();
                out.push(Row::new(names.clone(), values));
            }
        }
    }
    Ok(out)
}

fn split_columns(list: &str) -> Vec<&str> {
    list.split(',')
        .map(str::trim)
        .filter(|column| !column.is_empty())
        .collect()
}

fn assignment_columns(part: &str) -> Result<Vec<&str>> {
    part.split(',')
        .map(str::trim)
        .map(|assignment| {
            assignment
                .strip_suffix(" = ?")
                .ok_or_else(|| malformed(assignment))
        })
        .collect()
}

fn predicate_columns(part: &str) -> Result<Vec<&str>> {
    part.split(" AND ")
        .map(str::trim)
        .map(|predicate| {
            predicate
                .strip_suffix(" = ?")
                .ok_or_else(|| malformed(predicate))
        })
        .collect()
}

fn matches(row: &HashMap<String, Value>, columns: &[&str], values: &[Value]) -> bool {
    columns
        .iter()
        .zip(values)
        .all(|(column, value)| row.get(*column) == Some(value))
}

fn check_param_count(expected: usize, params: &[Value]) -> Result<()> {
    if params.len() != expected {
        return Err(Error::Query(format!(
            "expected {expected} parameters, got {}",
            params.len()
        )));
    }
    Ok(())
}

fn malformed(fragment: &str) -> Error {
    Error::Query(format!("malformed statement near `{fragment}`"))
}

fn unsupported(sql: &str) -> Error {
    Error::Query(format!("unsupported statement: {sql}"))
}
