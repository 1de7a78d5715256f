//! Worker threads: one OS thread per worker, owning one backend connection
//! and one shared task queue.
//!
//! Queue discipline: the host pushes at the tail and removes finished
//! entries; the worker never removes anything, it only marks entries
//! finished. The first unfinished entry is therefore always the next to
//! execute, which is what gives a worker strict FIFO completion order.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::bridge::CompletionSignal;
use crate::connection::{Provider, SqlConnection};
use crate::error::SqlOffloadError;
use crate::task::TaskCell;

const RECONNECT_BACKOFF_START: Duration = Duration::from_millis(250);
const RECONNECT_BACKOFF_CAP: Duration = Duration::from_secs(5);

struct QueueState {
    tasks: VecDeque<Arc<TaskCell>>,
    running: bool,
}

pub(crate) struct WorkerShared {
    queue: Mutex<QueueState>,
    work_ready: Condvar,
}

impl WorkerShared {
    fn new() -> Self {
        Self {
            queue: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                running: true,
            }),
            work_ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A panic while holding the lock leaves the state consistent enough
        // to keep draining, so poisoning is not treated as fatal.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to one worker thread, owned by the pool.
pub(crate) struct Worker {
    index: usize,
    shared: Arc<WorkerShared>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn the worker thread. The connection is established lazily on the
    /// first task, so a pool can come up while its database is still down.
    pub(crate) fn spawn(
        index: usize,
        provider: Provider,
        signal: CompletionSignal,
    ) -> Result<Self, SqlOffloadError> {
        let shared = Arc::new(WorkerShared::new());
        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("sql-worker-{index}"))
            .spawn(move || run_worker(index, &thread_shared, &provider, &signal))
            .map_err(|err| {
                SqlOffloadError::ConnectionError(format!(
                    "failed to spawn worker thread {index}: {err}"
                ))
            })?;
        Ok(Self {
            index,
            shared,
            handle: Some(handle),
        })
    }

    /// Host side: append a task and wake the worker if it is idle. Never
    /// blocks beyond the queue lock itself.
    pub(crate) fn enqueue(&self, cell: Arc<TaskCell>) {
        let mut state = self.shared.lock();
        state.tasks.push_back(cell);
        drop(state);
        self.shared.work_ready.notify_one();
    }

    /// Number of unfinished tasks (queued or executing). Finished tasks
    /// awaiting delivery do not count; this is the pool's load heuristic.
    pub(crate) fn pending_len(&self) -> usize {
        self.shared
            .lock()
            .tasks
            .iter()
            .filter(|cell| !cell.is_finished())
            .count()
    }

    /// Host side: remove and return every finished task, in queue order.
    pub(crate) fn take_finished(&self) -> Vec<Arc<TaskCell>> {
        let mut state = self.shared.lock();
        let mut finished = Vec::new();
        state.tasks.retain(|cell| {
            if cell.is_finished() {
                finished.push(Arc::clone(cell));
                false
            } else {
                true
            }
        });
        finished
    }

    /// Host side, shutdown only: remove and return everything still queued.
    pub(crate) fn take_all(&self) -> Vec<Arc<TaskCell>> {
        self.shared.lock().tasks.drain(..).collect()
    }

    /// Ask the thread to stop. It wakes from `Idle` (or from a reconnect
    /// backoff) and exits before starting another task.
    pub(crate) fn begin_stop(&self) {
        let mut state = self.shared.lock();
        state.running = false;
        drop(state);
        self.shared.work_ready.notify_all();
    }

    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(worker = self.index, "worker thread panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.begin_stop();
        self.join();
    }
}

/// Block until there is an unfinished task, or return `None` on stop.
fn next_pending(shared: &WorkerShared) -> Option<Arc<TaskCell>> {
    let mut state = shared.lock();
    loop {
        if !state.running {
            return None;
        }
        if let Some(cell) = state.tasks.iter().find(|cell| !cell.is_finished()) {
            return Some(Arc::clone(cell));
        }
        state = shared
            .work_ready
            .wait(state)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

/// Sleep for a reconnect backoff, waking early on stop. Returns whether the
/// worker should keep running.
fn backoff_wait(shared: &WorkerShared, wait: Duration) -> bool {
    let state = shared.lock();
    if !state.running {
        return false;
    }
    let (state, _timeout) = shared
        .work_ready
        .wait_timeout(state, wait)
        .unwrap_or_else(PoisonError::into_inner);
    state.running
}

/// Make sure `conn` holds a live connection, reconnecting in a retry loop if
/// necessary. Blocks the worker (never the host) until the connection is
/// restored or the pool stops; returns `false` only on stop.
fn ensure_connection(
    index: usize,
    provider: &Provider,
    shared: &WorkerShared,
    conn: &mut Option<SqlConnection>,
) -> bool {
    if let Some(existing) = conn.as_mut() {
        if provider.is_alive(existing) {
            return true;
        }
        tracing::warn!(worker = index, "backend connection lost, reconnecting");
        if let Some(dead) = conn.take() {
            provider.close(dead);
        }
    }

    let mut backoff = RECONNECT_BACKOFF_START;
    loop {
        match provider.connect() {
            Ok(fresh) => {
                tracing::trace!(worker = index, "backend connection established");
                *conn = Some(fresh);
                return true;
            }
            Err(err) => {
                tracing::warn!(
                    worker = index,
                    error = %err,
                    backoff_ms = backoff.as_millis() as u64,
                    "connection attempt failed, retrying"
                );
                if !backoff_wait(shared, backoff) {
                    return false;
                }
                backoff = (backoff * 2).min(RECONNECT_BACKOFF_CAP);
            }
        }
    }
}

fn panic_message(cause: &(dyn Any + Send)) -> String {
    if let Some(s) = cause.downcast_ref::<&str>() {
        format!("task payload panicked: {s}")
    } else if let Some(s) = cause.downcast_ref::<String>() {
        format!("task payload panicked: {s}")
    } else {
        "task payload panicked".to_owned()
    }
}

/// The worker run loop: Idle (blocked in `next_pending`) until work arrives,
/// then Busy executing tasks in FIFO order, back to Idle when the queue
/// holds nothing unfinished. Task failures are captured on the task and
/// never stop the loop; a panicking payload is caught and recorded as an
/// execution error the same way. Only `begin_stop` stops the loop.
fn run_worker(
    index: usize,
    shared: &WorkerShared,
    provider: &Provider,
    signal: &CompletionSignal,
) {
    tracing::trace!(worker = index, "worker started");
    let mut conn: Option<SqlConnection> = None;

    while let Some(cell) = next_pending(shared) {
        if !ensure_connection(index, provider, shared, &mut conn) {
            // Stopped mid-reconnect; the task stays unfinished and is
            // resolved by the pool's shutdown path.
            break;
        }
        let Some(connection) = conn.as_mut() else {
            break;
        };

        let outcome = match cell.take_payload() {
            Some(payload) => {
                panic::catch_unwind(AssertUnwindSafe(|| payload.run(connection, cell.table())))
                    .unwrap_or_else(|cause| {
                        Err(SqlOffloadError::ExecutionError(panic_message(cause.as_ref())))
                    })
            }
            None => Err(SqlOffloadError::Other(
                "task payload was already consumed".into(),
            )),
        };
        if let Err(err) = &outcome {
            tracing::debug!(worker = index, task = %cell.id(), error = %err, "task failed");
        }
        cell.complete(outcome);
        signal.ring(index);
    }

    if let Some(open) = conn.take() {
        provider.close(open);
    }
    tracing::trace!(worker = index, "worker stopped");
}
