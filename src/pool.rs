//! The worker pool: submission, least-busy selection, the callback
//! registry, and host-side completion delivery.
//!
//! A [`WorkerPool`] is an explicit handle; hold it wherever queries are
//! issued. It is deliberately not `Sync`: submission and delivery both take
//! `&mut self`, which pins the registry to the host thread without any
//! locking.

use std::collections::HashMap;
use std::sync::Arc;

use crate::bridge::{CompletionBridge, CompletionSignal, HostWakeup};
use crate::config::PoolConfig;
use crate::connection::Provider;
use crate::error::SqlOffloadError;
use crate::task::{SqlTask, TaskCell, TaskId};
use crate::types::TaskOutput;
use crate::worker::Worker;

/// Success callback, invoked on the host thread with the task's output.
pub type OnSuccess = Box<dyn FnOnce(TaskOutput)>;
/// Error callback, invoked on the host thread with the task's failure.
pub type OnError = Box<dyn FnOnce(SqlOffloadError)>;

/// Optional callbacks delivered when a task finishes.
///
/// A task may carry either, both, or neither; a finished task with no
/// matching callback is still drained, its result discarded (errors are
/// logged rather than silently dropped).
#[derive(Default)]
pub struct Callbacks {
    on_success: Option<OnSuccess>,
    on_error: Option<OnError>,
}

impl Callbacks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_success(mut self, f: impl FnOnce(TaskOutput) + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_error(mut self, f: impl FnOnce(SqlOffloadError) + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

/// Fixed set of worker threads plus the host-side delivery state.
pub struct WorkerPool {
    workers: Vec<Worker>,
    callbacks: HashMap<TaskId, Callbacks>,
    bridge: CompletionBridge,
    next_task_id: u64,
}

impl WorkerPool {
    /// Build the pool and spawn its workers.
    ///
    /// # Errors
    /// Returns [`SqlOffloadError::ConfigError`] for an inconsistent
    /// configuration or [`SqlOffloadError::ConnectionError`] when a worker
    /// thread cannot be spawned. Database connections are established lazily
    /// by the workers themselves, so an unreachable database does not fail
    /// construction.
    pub fn new(config: &PoolConfig) -> Result<Self, SqlOffloadError> {
        Self::build(config, None)
    }

    /// Like [`WorkerPool::new`], with a host wakeup hook that workers invoke
    /// whenever completions become ready to drain.
    ///
    /// # Errors
    /// Same failure modes as [`WorkerPool::new`].
    pub fn with_waker(
        config: &PoolConfig,
        waker: Arc<dyn HostWakeup>,
    ) -> Result<Self, SqlOffloadError> {
        Self::build(config, Some(waker))
    }

    fn build(
        config: &PoolConfig,
        waker: Option<Arc<dyn HostWakeup>>,
    ) -> Result<Self, SqlOffloadError> {
        let provider = Provider::from_config(config)?;
        let (signal, bridge) = CompletionBridge::channel(waker);
        let workers = (0..config.workers)
            .map(|index| Worker::spawn(index, provider.clone(), CompletionSignal::clone(&signal)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            workers,
            callbacks: HashMap::new(),
            bridge,
            next_task_id: 0,
        })
    }

    /// Submit a task with no callbacks (fire-and-forget).
    pub fn submit(&mut self, task: SqlTask) -> TaskId {
        self.submit_with(task, Callbacks::new())
    }

    /// Submit a task, registering its callbacks and handing it to the
    /// least-busy worker. Never blocks the caller; pushing onto the chosen
    /// worker's queue is the only synchronized step.
    pub fn submit_with(&mut self, task: SqlTask, callbacks: Callbacks) -> TaskId {
        let id = TaskId::new(self.next_task_id);
        self.next_task_id += 1;

        let previous = self.callbacks.insert(id, callbacks);
        debug_assert!(previous.is_none(), "task id {id} registered twice");

        let pending: Vec<usize> = self.workers.iter().map(Worker::pending_len).collect();
        let target = pick_worker(&pending);
        tracing::trace!(task = %id, worker = target, "task submitted");
        self.workers[target].enqueue(TaskCell::new(id, task));
        id
    }

    /// Number of workers, fixed at construction.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Unfinished tasks currently assigned to one worker (queued or
    /// executing); finished-but-undelivered tasks do not count.
    #[must_use]
    pub fn pending_tasks(&self, worker: usize) -> usize {
        self.workers.get(worker).map_or(0, Worker::pending_len)
    }

    /// Tasks submitted but not yet delivered; useful for leak checks and
    /// shutdown decisions.
    #[must_use]
    pub fn outstanding_tasks(&self) -> usize {
        self.callbacks.len()
    }

    /// Drain every worker that has signaled completions since the last call.
    /// Call this from the host loop's tick (or from the wakeup hook's
    /// follow-up on the host thread). Returns the number of tasks delivered.
    pub fn process_completions(&mut self) -> usize {
        let mut delivered = 0;
        for worker in self.bridge.take_signals() {
            delivered += self.drain_worker(worker);
        }
        delivered
    }

    /// Drain one worker's finished tasks and invoke their callbacks, in the
    /// order the tasks completed. A signal coalescing several completions is
    /// handled here by scanning the whole queue; a spurious signal finds
    /// nothing and delivers nothing.
    pub fn drain_worker(&mut self, worker: usize) -> usize {
        let Some(target) = self.workers.get(worker) else {
            return 0;
        };
        let finished = target.take_finished();
        let mut delivered = 0;
        for cell in finished {
            self.deliver(worker, &cell);
            delivered += 1;
        }
        delivered
    }

    fn deliver(&mut self, worker: usize, cell: &TaskCell) {
        let callbacks = self.callbacks.remove(&cell.id()).unwrap_or_default();
        let outcome = cell.take_outcome().unwrap_or_else(|| {
            Err(SqlOffloadError::Other(
                "finished task had no recorded outcome".into(),
            ))
        });
        match outcome {
            Ok(output) => {
                if let Some(on_success) = callbacks.on_success {
                    on_success(output);
                }
            }
            Err(err) => match callbacks.on_error {
                Some(on_error) => on_error(err),
                None => {
                    tracing::error!(worker, task = %cell.id(), error = %err, "task failed with no error handler");
                }
            },
        }
    }

    /// Stop every worker, then resolve everything still queued on the host
    /// thread: finished tasks are delivered normally, tasks that never ran
    /// fail with [`SqlOffloadError::Shutdown`]. Dropping the pool without
    /// calling this stops the threads but runs no callbacks.
    pub fn shutdown(mut self) {
        for worker in &self.workers {
            worker.begin_stop();
        }
        for worker in &mut self.workers {
            worker.join();
        }

        for index in 0..self.workers.len() {
            for cell in self.workers[index].take_all() {
                if cell.is_finished() {
                    self.deliver(index, &cell);
                } else {
                    let callbacks = self.callbacks.remove(&cell.id()).unwrap_or_default();
                    match callbacks.on_error {
                        Some(on_error) => on_error(SqlOffloadError::Shutdown),
                        None => {
                            tracing::warn!(worker = index, task = %cell.id(), "task dropped at shutdown");
                        }
                    }
                }
            }
        }
    }
}

/// Least-busy selection over live pending-queue lengths.
///
/// Fewer than two workers: the sole worker. Otherwise the first idle worker
/// in registration order, else the worker with the strictly smallest pending
/// count (ties go to the first encountered). Stateless; recomputed from the
/// live queues on every submission.
fn pick_worker(pending: &[usize]) -> usize {
    if pending.len() < 2 {
        return 0;
    }
    if let Some(idle) = pending.iter().position(|&count| count == 0) {
        return idle;
    }
    let mut best = 0;
    for (index, &count) in pending.iter().enumerate().skip(1) {
        if count < pending[best] {
            best = index;
        }
    }
    best
}
