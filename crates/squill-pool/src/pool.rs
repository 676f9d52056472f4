//! Connection pool implementation.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use squill_client::{
    Connection, ConnectionInformation, Driver, Error, InsertKeyPolicy, SqlBuilder,
    TypeMetadataCache,
};

use crate::error::PoolError;

/// Pool size used by [`Pool::new`].
pub const DEFAULT_SIZE: usize = 5;

/// Acquire increment used by [`Pool::new`].
pub const DEFAULT_ACQUIRE_INCREMENT: usize = 5;

struct PoolSizes {
    size: usize,
    acquire_increment: usize,
}

/// A blocking pool of [`Connection`]s.
///
/// Two independent guards protect the shared state: one mutex over the idle
/// set's membership, one over the size/increment pair, so bookkeeping reads
/// never contend with checkouts. Where both are needed they are taken in a
/// fixed order — idle set first, sizes second — everywhere, which rules out
/// deadlock between them.
///
/// New physical connections are opened while the idle-set guard is held;
/// concurrent acquirers therefore queue behind connection establishment
/// rather than racing to overshoot the target size. Operations on a
/// checked-out connection hold no pool-level lock.
pub struct Pool {
    driver: Arc<dyn Driver>,
    info: ConnectionInformation,
    metadata: Arc<TypeMetadataCache>,
    idle: Mutex<Vec<Connection>>,
    sizes: Mutex<PoolSizes>,
}

impl Pool {
    /// Create a pool with the default size and acquire increment
    /// ([`DEFAULT_SIZE`], [`DEFAULT_ACQUIRE_INCREMENT`]).
    pub fn new(driver: Arc<dyn Driver>, info: ConnectionInformation) -> Result<Self, PoolError> {
        Self::builder().driver(driver).connection_information(info).build()
    }

    /// Create a pool builder.
    #[must_use]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Check a connection out of the pool.
    ///
    /// When the idle set is empty, the pool first grows by the acquire
    /// increment: the new connections are opened synchronously, the extras
    /// join the idle set, and the target size rises by the same amount. A
    /// failure while opening propagates as
    /// [`PoolError::Client`] and leaves the pool state unchanged.
    ///
    /// The caller owns the connection exclusively until it hands it back
    /// through [`release`](Pool::release) — exactly once, on every path.
    /// Prefer [`run`](Pool::run), which enforces that obligation.
    pub fn acquire(&self) -> Result<Connection, PoolError> {
        let mut idle = self.idle.lock();
        if let Some(connection) = idle.pop() {
            tracing::trace!(idle = idle.len(), "connection checked out");
            return Ok(connection);
        }

        let increment = self.sizes.lock().acquire_increment;
        let connection = self.open_connection()?;
        let mut extra = Vec::with_capacity(increment - 1);
        for _ in 1..increment {
            extra.push(self.open_connection()?);
        }
        idle.extend(extra);
        self.sizes.lock().size += increment;
        tracing::debug!(grown_by = increment, "pool grew on empty idle set");
        Ok(connection)
    }

    /// Return a checked-out connection to the idle set.
    ///
    /// Fails with [`PoolError::Capacity`] when the idle set already equals
    /// the target size; that signals a caller bug (double release, or a
    /// connection this pool never handed out). The rejected connection is
    /// dropped, which releases its driver resources.
    pub fn release(&self, connection: Connection) -> Result<(), PoolError> {
        let mut idle = self.idle.lock();
        let size = self.sizes.lock().size;
        if idle.len() >= size {
            return Err(PoolError::Capacity { size });
        }
        idle.push(connection);
        tracing::trace!(idle = idle.len(), "connection returned");
        Ok(())
    }

    /// Run a unit of work against a pooled connection.
    ///
    /// Acquires a connection, optionally opens a transaction, and invokes
    /// `work`. On success the transaction (if any) is committed; on failure
    /// it is rolled back best-effort — a secondary rollback failure is
    /// logged, never allowed to mask the original error — and the original
    /// error is re-raised. The connection goes back to the idle set exactly
    /// once, whatever the outcome.
    ///
    /// This is the sanctioned way to use the pool: the acquire/use/release
    /// triple cannot be unbalanced by an early return.
    pub fn run<T, F>(&self, in_transaction: bool, work: F) -> Result<T, PoolError>
    where
        F: FnOnce(&mut Connection) -> Result<T, Error>,
    {
        let mut connection = self.acquire()?;
        let result = run_on(&mut connection, in_transaction, work);
        let released = self.release(connection);
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(err), _) => Err(PoolError::Client(err)),
            (Ok(_), Err(release_err)) => Err(release_err),
        }
    }

    /// Current target size (idle plus checked-out capacity).
    #[must_use]
    pub fn size(&self) -> usize {
        self.sizes.lock().size
    }

    /// Resize the pool.
    ///
    /// Growing opens the delta synchronously and adds it to the idle set;
    /// a failure mid-way leaves the pool unchanged. Shrinking closes only
    /// currently-idle connections, up to the delta, and lowers the recorded
    /// size by the number actually closed (partial shrink): the pool never
    /// blocks waiting for checked-out connections to come home, so with too
    /// few idle connections the resulting size stays above `new_size`.
    pub fn set_size(&self, new_size: usize) -> Result<(), PoolError> {
        if new_size < 1 {
            return Err(PoolError::InvalidArgument("pool size must be at least 1"));
        }

        let mut idle = self.idle.lock();
        let mut sizes = self.sizes.lock();
        if new_size >= sizes.size {
            let delta = new_size - sizes.size;
            let mut fresh = Vec::with_capacity(delta);
            for _ in 0..delta {
                fresh.push(self.open_connection()?);
            }
            idle.extend(fresh);
            sizes.size = new_size;
            tracing::debug!(size = new_size, "pool grown");
        } else {
            let mut closed = 0;
            while closed < sizes.size - new_size {
                let Some(mut connection) = idle.pop() else {
                    break;
                };
                if let Err(err) = connection.close() {
                    tracing::warn!(error = %err, "failed to close connection during shrink");
                }
                closed += 1;
            }
            sizes.size -= closed;
            tracing::debug!(closed = closed, size = sizes.size, "pool shrunk");
        }
        Ok(())
    }

    /// Number of connections added when an empty idle set is hit.
    #[must_use]
    pub fn acquire_increment(&self) -> usize {
        self.sizes.lock().acquire_increment
    }

    /// Change the acquire increment. Fails with
    /// [`PoolError::InvalidArgument`] when `value` is zero.
    pub fn set_acquire_increment(&self, value: usize) -> Result<(), PoolError> {
        if value < 1 {
            return Err(PoolError::InvalidArgument(
                "acquire increment must be at least 1",
            ));
        }
        self.sizes.lock().acquire_increment = value;
        Ok(())
    }

    /// Number of connections currently idle.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// The metadata cache shared by every connection of this pool.
    #[must_use]
    pub fn metadata(&self) -> &TypeMetadataCache {
        &self.metadata
    }

    /// Close every idle connection and empty the idle set.
    ///
    /// Connections currently checked out are not affected; they close (or
    /// are rejected with [`PoolError::Capacity`]) when their holders are done
    /// with them. The first close failure is reported after the drain
    /// completes.
    pub fn close(&self) -> Result<(), PoolError> {
        let mut idle = self.idle.lock();
        let mut first_error = None;
        for mut connection in idle.drain(..) {
            if let Err(err) = connection.close() {
                tracing::warn!(error = %err, "failed to close idle connection");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        tracing::info!("connection pool closed");
        match first_error {
            Some(err) => Err(PoolError::Client(err)),
            None => Ok(()),
        }
    }

    fn open_connection(&self) -> Result<Connection, PoolError> {
        let connection = Connection::open(
            self.driver.as_ref(),
            &self.info,
            Arc::clone(&self.metadata),
        )?;
        Ok(connection)
    }
}

fn run_on<T, F>(connection: &mut Connection, in_transaction: bool, work: F) -> Result<T, Error>
where
    F: FnOnce(&mut Connection) -> Result<T, Error>,
{
    if in_transaction {
        connection.begin_transaction()?;
    }
    match work(connection) {
        Ok(value) => {
            if in_transaction {
                connection.commit()?;
            }
            Ok(value)
        }
        Err(err) => {
            if in_transaction {
                if let Err(rollback_err) = connection.rollback() {
                    tracing::warn!(
                        error = %rollback_err,
                        "rollback failed after unit-of-work error"
                    );
                }
            }
            Err(err)
        }
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("size", &self.size())
            .field("idle", &self.idle_count())
            .field("acquire_increment", &self.acquire_increment())
            .finish()
    }
}

/// Builder for [`Pool`].
///
/// # Example
///
/// ```rust,ignore
/// let pool = Pool::builder()
///     .driver(driver)
///     .connection_information(info)
///     .size(4)
///     .acquire_increment(2)
///     .build()?;
/// ```
pub struct PoolBuilder {
    driver: Option<Arc<dyn Driver>>,
    info: Option<ConnectionInformation>,
    metadata: Option<Arc<TypeMetadataCache>>,
    size: usize,
    acquire_increment: usize,
    insert_keys: InsertKeyPolicy,
}

impl PoolBuilder {
    /// Create a builder with the default size and acquire increment.
    #[must_use]
    pub fn new() -> Self {
        Self {
            driver: None,
            info: None,
            metadata: None,
            size: DEFAULT_SIZE,
            acquire_increment: DEFAULT_ACQUIRE_INCREMENT,
            insert_keys: InsertKeyPolicy::default(),
        }
    }

    /// The driver that opens physical connections. Required.
    #[must_use]
    pub fn driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Connection parameters handed to the driver. Required.
    #[must_use]
    pub fn connection_information(mut self, info: ConnectionInformation) -> Self {
        self.info = Some(info);
        self
    }

    /// Share an existing metadata cache instead of creating one.
    ///
    /// When set, the cache's own SQL configuration wins and
    /// [`insert_key_policy`](PoolBuilder::insert_key_policy) has no effect.
    #[must_use]
    pub fn metadata(mut self, metadata: Arc<TypeMetadataCache>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Initial target size. Must be at least 1.
    #[must_use]
    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Growth batch applied when the idle set runs empty. Must be at least 1.
    #[must_use]
    pub fn acquire_increment(mut self, acquire_increment: usize) -> Self {
        self.acquire_increment = acquire_increment;
        self
    }

    /// INSERT key policy for the pool-owned metadata cache.
    #[must_use]
    pub fn insert_key_policy(mut self, policy: InsertKeyPolicy) -> Self {
        self.insert_keys = policy;
        self
    }

    /// Validate the configuration, open the initial connections, and build
    /// the pool.
    pub fn build(self) -> Result<Pool, PoolError> {
        if self.size < 1 {
            return Err(PoolError::InvalidArgument("pool size must be at least 1"));
        }
        if self.acquire_increment < 1 {
            return Err(PoolError::InvalidArgument(
                "acquire increment must be at least 1",
            ));
        }
        let Some(driver) = self.driver else {
            return Err(PoolError::InvalidArgument("a driver is required"));
        };
        let Some(info) = self.info else {
            return Err(PoolError::InvalidArgument(
                "connection information is required",
            ));
        };

        let metadata = self
            .metadata
            .unwrap_or_else(|| Arc::new(TypeMetadataCache::new(SqlBuilder::new(self.insert_keys))));
        let pool = Pool {
            driver,
            info,
            metadata,
            idle: Mutex::new(Vec::with_capacity(self.size)),
            sizes: Mutex::new(PoolSizes {
                size: self.size,
                acquire_increment: self.acquire_increment,
            }),
        };

        {
            let mut idle = pool.idle.lock();
            for _ in 0..self.size {
                idle.push(pool.open_connection()?);
            }
        }
        tracing::info!(
            size = self.size,
            acquire_increment = self.acquire_increment,
            "connection pool created"
        );
        Ok(pool)
    }
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}
