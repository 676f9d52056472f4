//! The transactional connection wrapper.

use std::fmt;
use std::sync::Arc;

use crate::config::ConnectionInformation;
use crate::driver::{Driver, DriverConnection};
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::metadata::TypeMetadataCache;
use crate::row::Row;
use crate::value::Value;

/// One physical database connection with transaction control, CRUD
/// convenience operations, and raw parameterized query execution.
///
/// A connection is owned exclusively by whoever holds it — the pool's idle
/// set or a single in-flight caller — and the `&mut self` receivers enforce
/// that no two callers can drive it concurrently. State machine:
/// open/auto-commit ⇄ open/in-transaction (via
/// [`begin_transaction`](Connection::begin_transaction) and
/// [`commit`](Connection::commit)), with a terminal closed state reached by
/// [`close`](Connection::close) or by any failed database operation.
///
/// Every operation releases its statement and cursor resources on every exit
/// path; when the database operation itself fails, the connection is assumed
/// corrupted, closed on the spot, and the failure propagates as
/// [`Error::Query`]. It is never converted into an empty result.
///
/// # Example
///
/// ```rust,ignore
/// let mut connection = Connection::open(&driver, &info, metadata)?;
/// connection.begin_transaction()?;
/// connection.persist(&Person { id: 1, name: "John".into() })?;
/// connection.commit()?;
/// let found: Option<Person> = connection.read(&params![1_i64])?;
/// ```
pub struct Connection {
    handle: Box<dyn DriverConnection>,
    metadata: Arc<TypeMetadataCache>,
    auto_commit: bool,
}

impl Connection {
    /// Open a new connection through `driver`.
    ///
    /// Most callers go through the pool instead; opening directly is useful
    /// for one-off work and tests.
    pub fn open(
        driver: &dyn Driver,
        info: &ConnectionInformation,
        metadata: Arc<TypeMetadataCache>,
    ) -> Result<Self> {
        let handle = driver.open(info)?;
        tracing::debug!(url = info.url(), "connection opened");
        Ok(Self {
            handle,
            metadata,
            auto_commit: true,
        })
    }

    /// The metadata cache this connection consults.
    #[must_use]
    pub fn metadata(&self) -> &TypeMetadataCache {
        &self.metadata
    }

    /// Start a transaction by disabling auto-commit.
    pub fn begin_transaction(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.handle.set_auto_commit(false)?;
        self.auto_commit = false;
        tracing::trace!("transaction started");
        Ok(())
    }

    /// Make pending work permanent and re-enable auto-commit.
    ///
    /// Call only after [`begin_transaction`](Connection::begin_transaction);
    /// committing while auto-commit is active is a caller error with
    /// driver-defined behavior.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.handle.commit()?;
        self.handle.set_auto_commit(true)?;
        self.auto_commit = true;
        tracing::trace!("transaction committed");
        Ok(())
    }

    /// Undo pending work since the last begin or commit.
    ///
    /// Safe to call from an error handler even when the triggering failure
    /// already closed the connection: that case is reported at `warn` level
    /// and returns `Ok`, so it never masks the original error.
    pub fn rollback(&mut self) -> Result<()> {
        if self.is_closed() {
            tracing::warn!("rollback skipped: connection already closed");
            return Ok(());
        }
        self.handle.rollback()?;
        tracing::trace!("transaction rolled back");
        Ok(())
    }

    /// Whether the connection is currently inside a transaction.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        !self.auto_commit
    }

    /// Insert `entity` into its mapped table.
    ///
    /// Returns the number of affected rows.
    pub fn persist<E: Entity>(&mut self, entity: &E) -> Result<u64> {
        let info = self.metadata.get_or_create::<E>()?;
        let params = info.insert_params(entity);
        self.run_update(info.insert_sql(), &params)
    }

    /// Fetch the entity of type `E` whose primary key equals `key`.
    ///
    /// Returns `Ok(None)` when no row matches; absence is not an error.
    pub fn read<E: Entity>(&mut self, key: &[Value]) -> Result<Option<E>> {
        let info = self.metadata.get_or_create::<E>()?;
        let rows = self.fetch_rows(info.select_sql(), key, Some(1))?;
        match rows.first() {
            Some(row) => Ok(Some(info.from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Update the row matching `entity`'s primary key with its current
    /// column values.
    ///
    /// Returns the number of affected rows: `1` when the row exists, `0`
    /// otherwise.
    pub fn update<E: Entity>(&mut self, entity: &E) -> Result<u64> {
        let info = self.metadata.get_or_create::<E>()?;
        let params = info.update_params(entity);
        self.run_update(info.update_sql(), &params)
    }

    /// Delete the row matching `entity`'s primary key.
    ///
    /// Returns the number of affected rows.
    pub fn delete<E: Entity>(&mut self, entity: &E) -> Result<u64> {
        let info = self.metadata.get_or_create::<E>()?;
        let params = info.key_params(entity);
        self.run_update(info.delete_sql(), &params)
    }

    /// Execute an arbitrary parameterized non-query statement.
    ///
    /// `?` placeholders in `sql` are bound positionally from `params` through
    /// the driver's native binding, never by splicing text.
    ///
    /// ```rust,ignore
    /// connection.execute_update(
    ///     "UPDATE person SET name = ? WHERE person_id = ?",
    ///     &params!["John", 1_i64],
    /// )?;
    /// ```
    pub fn execute_update(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.run_update(sql, params)
    }

    /// Execute an arbitrary parameterized query and map the first result row
    /// to an `E`.
    ///
    /// Returns `Ok(None)` when the query yields no rows.
    pub fn execute_query<E: Entity>(&mut self, sql: &str, params: &[Value]) -> Result<Option<E>> {
        let info = self.metadata.get_or_create::<E>()?;
        let rows = self.fetch_rows(sql, params, Some(1))?;
        match rows.first() {
            Some(row) => Ok(Some(info.from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Execute an arbitrary parameterized query and map every result row to
    /// an `E`, in result order.
    ///
    /// The result is materialized eagerly: the driver cursor is exhausted and
    /// released before control returns, so no open cursor ever escapes.
    pub fn execute_query_for_collection<E: Entity>(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<E>> {
        let info = self.metadata.get_or_create::<E>()?;
        let rows = self.fetch_rows(sql, params, None)?;
        let mut entities = Vec::with_capacity(rows.len());
        for row in &rows {
            entities.push(info.from_row(row)?);
        }
        Ok(entities)
    }

    /// Close the connection. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.handle.is_closed() {
            return Ok(());
        }
        self.handle.close()?;
        tracing::debug!("connection closed");
        Ok(())
    }

    /// Whether the connection has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    fn run_update(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.ensure_open()?;
        tracing::trace!(sql = sql, "executing update");
        let outcome = try_update(self.handle.as_mut(), sql, params);
        self.driver_outcome(outcome)
    }

    fn fetch_rows(&mut self, sql: &str, params: &[Value], limit: Option<usize>) -> Result<Vec<Row>> {
        self.ensure_open()?;
        tracing::trace!(sql = sql, "executing query");
        let outcome = try_fetch(self.handle.as_mut(), sql, params, limit);
        self.driver_outcome(outcome)
    }

    /// A failed database operation leaves the connection in an unknown
    /// state: close it (best-effort) and re-signal the failure as a query
    /// error. Resources held by the failed operation were already released
    /// when its scope unwound.
    fn driver_outcome<T>(&mut self, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => Ok(value),
            Err(err) => {
                self.close_quietly();
                Err(match err {
                    Error::Query(message) => Error::Query(message),
                    other => Error::Query(other.to_string()),
                })
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.handle.is_closed() {
            return Err(Error::Connection("connection is closed".to_owned()));
        }
        Ok(())
    }

    fn close_quietly(&mut self) {
        if let Err(close_err) = self.close() {
            tracing::warn!(error = %close_err, "failed to close connection after query error");
        }
    }
}

// The statement is dropped on every exit path before control returns.
fn try_update(handle: &mut dyn DriverConnection, sql: &str, params: &[Value]) -> Result<u64> {
    let mut statement = handle.prepare(sql)?;
    statement.execute_update(params)
}

// The cursor is dropped before the statement, both on every exit path.
fn try_fetch(
    handle: &mut dyn DriverConnection,
    sql: &str,
    params: &[Value],
    limit: Option<usize>,
) -> Result<Vec<Row>> {
    let mut statement = handle.prepare(sql)?;
    let mut rows = Vec::new();
    {
        let mut cursor = statement.execute_query(params)?;
        while let Some(row) = cursor.next_row()? {
            rows.push(row);
            if limit.is_some_and(|n| rows.len() >= n) {
                break;
            }
        }
    }
    Ok(rows)
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.is_closed())
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverRows, DriverStatement};
    use crate::entity::ColumnSpec;
    use crate::error::MappingError;
    use crate::params;
    use crate::value::FromValue;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Debug, Default, PartialEq)]
    struct Person {
        id: i64,
        name: String,
    }

    impl Entity for Person {
        fn table() -> &'static str {
            "person"
        }

        fn columns() -> &'static [ColumnSpec<Self>] {
            fn get_id(person: &Person) -> Value {
                Value::Int(person.id)
            }
            fn set_id(person: &mut Person, value: Value) -> Result<(), MappingError> {
                person.id = FromValue::from_value(value)?;
                Ok(())
            }
            fn get_name(person: &Person) -> Value {
                Value::Text(person.name.clone())
            }
            fn set_name(person: &mut Person, value: Value) -> Result<(), MappingError> {
                person.name = FromValue::from_value(value)?;
                Ok(())
            }
            static COLUMNS: [ColumnSpec<Person>; 2] = [
                ColumnSpec {
                    name: "person_id",
                    primary_key: true,
                    get: get_id,
                    set: set_id,
                },
                ColumnSpec {
                    name: "name",
                    primary_key: false,
                    get: get_name,
                    set: set_name,
                },
            ];
            &COLUMNS
        }
    }

    enum Reply {
        Affected(u64),
        Rows(Vec<Row>),
        Fail(String),
    }

    #[derive(Default)]
    struct Script {
        replies: VecDeque<Reply>,
        executed: Vec<(String, Vec<Value>)>,
        operations: Vec<&'static str>,
    }

    #[derive(Clone, Default)]
    struct ScriptedDriver {
        script: Arc<Mutex<Script>>,
    }

    impl ScriptedDriver {
        fn reply(&self, reply: Reply) {
            self.script.lock().replies.push_back(reply);
        }

        fn executed(&self) -> Vec<(String, Vec<Value>)> {
            self.script.lock().executed.clone()
        }

        fn operations(&self) -> Vec<&'static str> {
            self.script.lock().operations.clone()
        }
    }

    impl Driver for ScriptedDriver {
        fn open(&self, _info: &ConnectionInformation) -> Result<Box<dyn DriverConnection>> {
            Ok(Box::new(ScriptedConnection {
                script: Arc::clone(&self.script),
                closed: false,
            }))
        }
    }

    struct ScriptedConnection {
        script: Arc<Mutex<Script>>,
        closed: bool,
    }

    impl DriverConnection for ScriptedConnection {
        fn prepare(&mut self, sql: &str) -> Result<Box<dyn DriverStatement>> {
            Ok(Box::new(ScriptedStatement {
                sql: sql.to_owned(),
                script: Arc::clone(&self.script),
            }))
        }

        fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
            self.script.lock().operations.push(if auto_commit {
                "auto_commit_on"
            } else {
                "auto_commit_off"
            });
            Ok(())
        }

        fn commit(&mut self) -> Result<()> {
            self.script.lock().operations.push("commit");
            Ok(())
        }

        fn rollback(&mut self) -> Result<()> {
            self.script.lock().operations.push("rollback");
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed
        }
    }

    struct ScriptedStatement {
        sql: String,
        script: Arc<Mutex<Script>>,
    }

    impl DriverStatement for ScriptedStatement {
        fn execute_update(&mut self, params: &[Value]) -> Result<u64> {
            let mut script = self.script.lock();
            script.executed.push((self.sql.clone(), params.to_vec()));
            match script.replies.pop_front() {
                Some(Reply::Affected(n)) => Ok(n),
                Some(Reply::Fail(message)) => Err(Error::Query(message)),
                _ => Err(Error::Query("unscripted update".to_owned())),
            }
        }

        fn execute_query(&mut self, params: &[Value]) -> Result<Box<dyn DriverRows>> {
            let mut script = self.script.lock();
            script.executed.push((self.sql.clone(), params.to_vec()));
            match script.replies.pop_front() {
                Some(Reply::Rows(rows)) => Ok(Box::new(ScriptedRows {
                    rows: rows.into(),
                })),
                Some(Reply::Fail(message)) => Err(Error::Query(message)),
                _ => Err(Error::Query("unscripted query".to_owned())),
            }
        }
    }

    struct ScriptedRows {
        rows: VecDeque<Row>,
    }

    impl DriverRows for ScriptedRows {
        fn next_row(&mut self) -> Result<Option<Row>> {
            Ok(self.rows.pop_front())
        }
    }

    fn open(driver: &ScriptedDriver) -> Connection {
        let info = ConnectionInformation::new("scripted", "mem://test", "", "");
        Connection::open(driver, &info, Arc::new(TypeMetadataCache::default())).unwrap()
    }

    fn person_row(id: i64, name: &str) -> Row {
        Row::new(
            vec!["person_id".into(), "name".into()],
            vec![Value::Int(id), Value::Text(name.into())],
        )
    }

    #[test]
    fn test_persist_binds_columns_in_declared_order() {
        let driver = ScriptedDriver::default();
        driver.reply(Reply::Affected(1));
        let mut connection = open(&driver);

        let affected = connection
            .persist(&Person {
                id: 1,
                name: "John".into(),
            })
            .unwrap();

        assert_eq!(affected, 1);
        assert_eq!(
            driver.executed(),
            vec![(
                "INSERT INTO person (person_id, name) VALUES (?, ?)".to_owned(),
                vec![Value::Int(1), Value::Text("John".into())],
            )]
        );
    }

    #[test]
    fn test_read_maps_first_row() {
        let driver = ScriptedDriver::default();
        driver.reply(Reply::Rows(vec![person_row(1, "John")]));
        let mut connection = open(&driver);

        let found: Option<Person> = connection.read(&params![1_i64]).unwrap();
        assert_eq!(
            found,
            Some(Person {
                id: 1,
                name: "John".into()
            })
        );
    }

    #[test]
    fn test_read_absent_is_none_not_error() {
        let driver = ScriptedDriver::default();
        driver.reply(Reply::Rows(Vec::new()));
        let mut connection = open(&driver);

        let found: Option<Person> = connection.read(&params![404_i64]).unwrap();
        assert_eq!(found, None);
        assert!(!connection.is_closed());
    }

    #[test]
    fn test_query_failure_closes_connection_and_propagates() {
        let driver = ScriptedDriver::default();
        driver.reply(Reply::Fail("deadlock detected".to_owned()));
        let mut connection = open(&driver);

        let err = connection
            .execute_update("UPDATE person SET name = ?", &params!["x"])
            .unwrap_err();
        assert!(matches!(err, Error::Query(ref m) if m == "deadlock detected"));
        assert!(connection.is_closed());
    }

    #[test]
    fn test_mapping_failure_does_not_close_connection() {
        let driver = ScriptedDriver::default();
        // A row whose name column carries the wrong kind.
        driver.reply(Reply::Rows(vec![Row::new(
            vec!["person_id".into(), "name".into()],
            vec![Value::Int(1), Value::Int(99)],
        )]));
        let mut connection = open(&driver);

        let err = connection.read::<Person>(&params![1_i64]).unwrap_err();
        assert!(matches!(err, Error::Mapping(_)));
        assert!(!connection.is_closed());
    }

    #[test]
    fn test_collection_is_materialized_in_order() {
        let driver = ScriptedDriver::default();
        driver.reply(Reply::Rows(vec![
            person_row(1, "John"),
            person_row(2, "Jane"),
            person_row(3, "Jim"),
        ]));
        let mut connection = open(&driver);

        let people: Vec<Person> = connection
            .execute_query_for_collection("SELECT person_id, name FROM person", &params![])
            .unwrap();
        assert_eq!(
            people.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_transaction_bracket_toggles_auto_commit() {
        let driver = ScriptedDriver::default();
        let mut connection = open(&driver);

        connection.begin_transaction().unwrap();
        assert!(connection.in_transaction());
        connection.commit().unwrap();
        assert!(!connection.in_transaction());

        assert_eq!(
            driver.operations(),
            vec!["auto_commit_off", "commit", "auto_commit_on"]
        );
    }

    #[test]
    fn test_rollback_on_closed_connection_is_graceful() {
        let driver = ScriptedDriver::default();
        let mut connection = open(&driver);
        connection.close().unwrap();

        assert!(connection.rollback().is_ok());
        // The physical rollback never happened.
        assert!(driver.operations().is_empty());
    }

    #[test]
    fn test_operations_on_closed_connection_fail() {
        let driver = ScriptedDriver::default();
        let mut connection = open(&driver);
        connection.close().unwrap();

        let err = connection
            .execute_update("DELETE FROM person WHERE person_id = ?", &params![1_i64])
            .unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
        let err = connection.begin_transaction().unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[test]
    fn test_update_appends_key_parameters() {
        let driver = ScriptedDriver::default();
        driver.reply(Reply::Affected(1));
        let mut connection = open(&driver);

        connection
            .update(&Person {
                id: 5,
                name: "Jane".into(),
            })
            .unwrap();

        let executed = driver.executed();
        assert_eq!(
            executed[0].1,
            vec![Value::Int(5), Value::Text("Jane".into()), Value::Int(5)]
        );
    }

    #[test]
    fn test_delete_binds_only_key() {
        let driver = ScriptedDriver::default();
        driver.reply(Reply::Affected(1));
        let mut connection = open(&driver);

        connection
            .delete(&Person {
                id: 5,
                name: "Jane".into(),
            })
            .unwrap();

        let executed = driver.executed();
        assert_eq!(executed[0].0, "DELETE FROM person WHERE person_id = ?");
        assert_eq!(executed[0].1, vec![Value::Int(5)]);
    }
}
