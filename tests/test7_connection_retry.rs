#![cfg(feature = "mysql")]
//! Worker behavior while its backend cannot be reached: tasks stay queued
//! through the reconnect-backoff loop instead of being dropped, and shutdown
//! interrupts the backoff instead of waiting it out.
//!
//! Port 1 on localhost refuses connections immediately, so every connect
//! attempt fails fast and the worker sits in its backoff wait.

use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use sql_offload::prelude::*;

fn unreachable_config(workers: usize) -> PoolConfig {
    PoolConfig::mysql(
        MySqlConfig {
            host: "127.0.0.1".into(),
            port: 1,
            user: "nobody".into(),
            password: "wrong".into(),
            database: "missing".into(),
        },
        workers,
    )
}

#[test]
fn tasks_stay_pending_while_worker_retries_connection() {
    let mut pool = WorkerPool::new(&unreachable_config(1)).expect("pool");
    pool.submit(SqlTask::select("SELECT 1", vec![]));
    pool.submit(SqlTask::select("SELECT 1", vec![]));

    // Long enough for several failed connect attempts and backoff waits.
    thread::sleep(Duration::from_millis(600));
    assert_eq!(pool.pending_tasks(0), 2);
    assert_eq!(pool.process_completions(), 0);
    assert_eq!(pool.outstanding_tasks(), 2);
    pool.shutdown();
}

#[test]
fn shutdown_interrupts_backoff_and_fails_queued_tasks() {
    let mut pool = WorkerPool::new(&unreachable_config(1)).expect("pool");
    let failures: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

    for i in 0..2 {
        let failures = Rc::clone(&failures);
        pool.submit_with(
            SqlTask::select("SELECT 1", vec![]),
            Callbacks::new().on_error(move |err| {
                assert!(matches!(err, SqlOffloadError::Shutdown));
                failures.borrow_mut().push(format!("{i}:shutdown"));
            }),
        );
    }

    // Let the backoff grow past its initial step, then stop; the worker must
    // wake from the wait rather than sleep it out.
    thread::sleep(Duration::from_millis(400));
    let start = Instant::now();
    pool.shutdown();
    assert!(
        start.elapsed() < Duration::from_secs(2),
        "shutdown waited out the backoff: {:?}",
        start.elapsed()
    );
    assert_eq!(
        *failures.borrow(),
        vec!["0:shutdown".to_string(), "1:shutdown".into()]
    );
}
