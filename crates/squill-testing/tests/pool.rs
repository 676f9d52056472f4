//! Pool behavior against the in-memory driver: unit-of-work brackets,
//! growth, shrink, and concurrent checkout.

use std::sync::Arc;

use squill_client::{params, ConnectionInformation, Entity, Error};
use squill_pool::{Pool, PoolError};
use squill_testing::{init_tracing, MemoryDriver};

#[derive(Debug, Default, PartialEq, Entity)]
#[squill(table = "person")]
struct Person {
    #[squill(column = "person_id", primary_key)]
    id: i64,
    name: String,
}

fn info() -> ConnectionInformation {
    ConnectionInformation::new("memory", "mem://pool", "tester", "")
}

fn build_pool(driver: &MemoryDriver, size: usize, increment: usize) -> Pool {
    init_tracing();
    Pool::builder()
        .driver(Arc::new(driver.clone()))
        .connection_information(info())
        .size(size)
        .acquire_increment(increment)
        .build()
        .unwrap()
}

fn person(id: i64, name: &str) -> Person {
    Person {
        id,
        name: name.into(),
    }
}

#[test]
fn test_default_pool_opens_five_connections() {
    let driver = MemoryDriver::new();
    init_tracing();
    let pool = Pool::new(Arc::new(driver.clone()), info()).unwrap();
    assert_eq!(pool.size(), 5);
    assert_eq!(pool.acquire_increment(), 5);
    assert_eq!(driver.open_connections(), 5);
}

#[test]
fn test_run_commits_and_returns_the_connection() {
    let driver = MemoryDriver::new();
    let pool = build_pool(&driver, 2, 1);

    let loaded = pool
        .run(true, |connection| {
            connection.persist(&person(1, "John"))?;
            connection.read::<Person>(&params![1_i64])
        })
        .unwrap();

    assert_eq!(loaded, Some(person(1, "John")));
    assert_eq!(driver.row_count("person"), 1);
    assert_eq!(pool.idle_count(), 2);
}

#[test]
fn test_run_rolls_back_when_work_fails_mid_way() {
    let driver = MemoryDriver::new();
    let pool = build_pool(&driver, 2, 1);

    let err = pool
        .run(true, |connection| -> Result<(), Error> {
            connection.persist(&person(1, "John"))?;
            // The unit of work fails after a successful write.
            Err(Error::Query("business rule violated".to_owned()))
        })
        .unwrap_err();

    assert!(matches!(err, PoolError::Client(Error::Query(_))));
    // The write was rolled back and the connection went back to the pool.
    assert_eq!(driver.row_count("person"), 0);
    assert_eq!(pool.idle_count(), 2);
}

#[test]
fn test_run_without_transaction_keeps_partial_work() {
    let driver = MemoryDriver::new();
    let pool = build_pool(&driver, 1, 1);

    let _ = pool.run(false, |connection| -> Result<(), Error> {
        connection.persist(&person(1, "John"))?;
        Err(Error::Query("late failure".to_owned()))
    });

    // Auto-commit mode: the successful write stays.
    assert_eq!(driver.row_count("person"), 1);
    assert_eq!(pool.idle_count(), 1);
}

#[test]
fn test_sequential_checkouts_reuse_one_connection() {
    let driver = MemoryDriver::new();
    let pool = build_pool(&driver, 1, 1);

    for i in 0..2 {
        pool.run(false, |connection| connection.persist(&person(i, "x")))
            .unwrap();
    }
    assert_eq!(driver.total_opened(), 1);
    assert_eq!(pool.size(), 1);
}

#[test]
fn test_shrink_closes_idle_connections() {
    let driver = MemoryDriver::new();
    let pool = build_pool(&driver, 4, 1);
    assert_eq!(driver.open_connections(), 4);

    pool.set_size(2).unwrap();
    assert_eq!(pool.size(), 2);
    assert_eq!(driver.open_connections(), 2);

    pool.set_size(6).unwrap();
    assert_eq!(pool.size(), 6);
    assert_eq!(driver.open_connections(), 6);
}

#[test]
fn test_close_empties_the_idle_set() {
    let driver = MemoryDriver::new();
    let pool = build_pool(&driver, 3, 1);

    pool.close().unwrap();
    assert_eq!(pool.idle_count(), 0);
    assert_eq!(driver.open_connections(), 0);
}

#[test]
fn test_acquire_failure_propagates_and_leaves_pool_intact() {
    let driver = MemoryDriver::new();
    let pool = build_pool(&driver, 1, 1);

    let checked_out = pool.acquire().unwrap();
    driver.fail_next_open("database unreachable");
    let err = pool.acquire().unwrap_err();
    assert!(matches!(err, PoolError::Client(Error::Connection(_))));
    assert_eq!(pool.size(), 1);

    pool.release(checked_out).unwrap();
    assert_eq!(pool.idle_count(), 1);
}

#[test]
fn test_metadata_cache_is_shared_across_the_pool() {
    let driver = MemoryDriver::new();
    let pool = build_pool(&driver, 2, 1);

    pool.run(false, |connection| connection.persist(&person(1, "John")))
        .unwrap();
    pool.run(false, |connection| connection.persist(&person(2, "Jane")))
        .unwrap();

    // Both connections consulted the same cache entry.
    assert_eq!(pool.metadata().len(), 1);
}

#[test]
fn test_concurrent_units_of_work() {
    let driver = MemoryDriver::new();
    let pool = Arc::new(build_pool(&driver, 4, 2));

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                for i in 0..25 {
                    let id = i64::from(worker * 100 + i);
                    pool.run(false, |connection| {
                        connection.persist(&Person {
                            id,
                            name: format!("worker-{worker}"),
                        })
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(driver.row_count("person"), 200);
    // Balanced checkouts from every worker: everything is idle again.
    assert_eq!(pool.idle_count(), pool.size());
    assert_eq!(driver.open_connections(), pool.size());
}
