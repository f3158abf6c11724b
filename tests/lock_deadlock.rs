//! Lock manager deadlock detection: two transactions cross-acquiring
//! two tables in opposite order must resolve to exactly one victim,
//! never a full hang and never both succeeding.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use small_engine::config::EngineConfig;
use small_engine::lock::{LockManager, TableLockMode};

#[test]
fn crossed_table_locks_resolve_to_one_victim() {
    let mut config = EngineConfig::default();
    config.lock_wait_timeout = Duration::from_secs(5);
    let lm = Arc::new(LockManager::new(&config));
    let barrier = Arc::new(Barrier::new(2));

    const TRX_A: u64 = 1;
    const TRX_B: u64 = 2;
    const TABLE_X: u64 = 100;
    const TABLE_Y: u64 = 200;

    let lm_a = lm.clone();
    let barrier_a = barrier.clone();
    let a = thread::spawn(move || {
        lm_a.acquire_table_lock(TRX_A, TABLE_X, TableLockMode::X).unwrap();
        barrier_a.wait();
        thread::sleep(Duration::from_millis(100));
        let result = lm_a.acquire_table_lock(TRX_A, TABLE_Y, TableLockMode::X);
        if result.is_err() {
            // What a real caller's rollback path would do on abort.
            lm_a.release_all(TRX_A);
        }
        result
    });

    let lm_b = lm.clone();
    let barrier_b = barrier.clone();
    let b = thread::spawn(move || {
        lm_b.acquire_table_lock(TRX_B, TABLE_Y, TableLockMode::X).unwrap();
        barrier_b.wait();
        thread::sleep(Duration::from_millis(100));
        let result = lm_b.acquire_table_lock(TRX_B, TABLE_X, TableLockMode::X);
        if result.is_err() {
            lm_b.release_all(TRX_B);
        }
        result
    });

    let result_a = a.join().expect("thread a panicked");
    let result_b = b.join().expect("thread b panicked");

    let failures = [&result_a, &result_b].iter().filter(|r| r.is_err()).count();
    assert_eq!(failures, 1, "exactly one side of the cycle must be chosen as deadlock victim");

    for result in [&result_a, &result_b] {
        if let Err(e) = result {
            assert!(matches!(e, small_engine::Error::Deadlock(_)));
        }
    }
}

#[test]
fn non_conflicting_table_locks_never_deadlock() {
    let config = EngineConfig::default();
    let lm = LockManager::new(&config);

    lm.acquire_table_lock(1, 1, TableLockMode::IS).unwrap();
    lm.acquire_table_lock(2, 1, TableLockMode::IS).unwrap();
    lm.acquire_table_lock(1, 1, TableLockMode::IS).unwrap();

    lm.release_all(1);
    lm.release_all(2);

    lm.acquire_table_lock(3, 1, TableLockMode::X).unwrap();
    lm.release_all(3);
}
