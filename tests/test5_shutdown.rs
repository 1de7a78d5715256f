#![cfg(feature = "sqlite")]
//! Shutdown semantics: finished-but-undelivered tasks are delivered, tasks
//! that never ran fail with `SqlOffloadError::Shutdown`, in queue order.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use sql_offload::prelude::*;

struct Gate {
    started: Sender<()>,
    release: Receiver<()>,
}

impl TaskPayload for Gate {
    fn run(
        self: Box<Self>,
        _conn: &mut SqlConnection,
        _table: Option<&str>,
    ) -> Result<TaskOutput, SqlOffloadError> {
        let _ = self.started.send(());
        let _ = self.release.recv();
        Ok(TaskOutput::None)
    }
}

#[test]
fn shutdown_fails_tasks_that_never_ran() {
    let mut pool = WorkerPool::new(&PoolConfig::sqlite(":memory:", 1)).expect("pool");
    let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

    // Head task blocks the worker until a helper thread releases it, so the
    // three tasks behind it are guaranteed to still be queued at shutdown.
    let (started_tx, started_rx) = mpsc::channel();
    let (tx, rx) = mpsc::channel();
    {
        let log = Rc::clone(&log);
        pool.submit_with(
            SqlTask::new(Gate {
                started: started_tx,
                release: rx,
            }),
            Callbacks::new().on_success(move |_| log.borrow_mut().push("gate:success".into())),
        );
    }
    for i in 0..3 {
        let ok_log = Rc::clone(&log);
        let err_log = Rc::clone(&log);
        pool.submit_with(
            SqlTask::select("SELECT 1", vec![]),
            Callbacks::new()
                .on_success(move |_| ok_log.borrow_mut().push(format!("{i}:success")))
                .on_error(move |err| {
                    assert!(matches!(err, SqlOffloadError::Shutdown));
                    err_log.borrow_mut().push(format!("{i}:shutdown"));
                }),
        );
    }

    // Release the gate shortly after shutdown starts waiting on the worker.
    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        let _ = tx.send(());
    });

    // Wait until the gate is mid-execution so the worker has definitely
    // dequeued it before stop is requested.
    started_rx.recv().expect("gate started");
    pool.shutdown();
    releaser.join().expect("releaser thread");

    // The gate task finished during shutdown and was delivered; the queued
    // tasks never ran and were failed, preserving queue order.
    assert_eq!(
        *log.borrow(),
        vec![
            "gate:success".to_string(),
            "0:shutdown".into(),
            "1:shutdown".into(),
            "2:shutdown".into(),
        ]
    );
}

#[test]
fn shutdown_with_empty_pool_is_clean() {
    let pool = WorkerPool::new(&PoolConfig::sqlite(":memory:", 3)).expect("pool");
    pool.shutdown();
}

#[test]
fn drop_without_shutdown_stops_workers() {
    let mut pool = WorkerPool::new(&PoolConfig::sqlite(":memory:", 2)).expect("pool");
    pool.submit(SqlTask::select("SELECT 1", vec![]));
    // Dropping joins the worker threads; no callbacks run, nothing hangs.
    drop(pool);
}
