//! The completion bridge: how a worker tells the host loop that results are
//! ready.
//!
//! Signals are a cross-thread doorbell, not a mailbox: a worker rings at
//! least once per finished task, but rings may coalesce while the host is
//! busy, so the host treats each one as "scan this worker's queue", never
//! "exactly one task finished". Delivery of the actual outcome happens in
//! [`WorkerPool::drain_worker`](crate::pool::WorkerPool::drain_worker).

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

/// Host-environment hook for pushing wakeups into a foreign event loop.
///
/// `wake` is called from worker threads right after a completion signal is
/// queued. Implementations typically interrupt the host loop's sleep (a tick
/// notifier, an eventfd, a channel the loop selects on); the actual drain
/// must still run on the host thread via
/// [`WorkerPool::drain_worker`](crate::pool::WorkerPool::drain_worker) or
/// [`WorkerPool::process_completions`](crate::pool::WorkerPool::process_completions).
pub trait HostWakeup: Send + Sync {
    /// Request that the host loop drain the given worker soon.
    fn wake(&self, worker: usize);
}

/// Worker-side handle: rings the doorbell for one worker index.
#[derive(Clone)]
pub(crate) struct CompletionSignal {
    sender: Sender<usize>,
    waker: Option<Arc<dyn HostWakeup>>,
}

impl CompletionSignal {
    pub(crate) fn ring(&self, worker: usize) {
        // A closed channel means the pool is gone; nothing left to notify.
        if self.sender.send(worker).is_err() {
            return;
        }
        if let Some(waker) = &self.waker {
            waker.wake(worker);
        }
    }
}

/// Host-side receiver, owned by the pool and drained on the host thread.
pub(crate) struct CompletionBridge {
    receiver: Receiver<usize>,
}

impl CompletionBridge {
    pub(crate) fn channel(
        waker: Option<Arc<dyn HostWakeup>>,
    ) -> (CompletionSignal, CompletionBridge) {
        let (sender, receiver) = mpsc::channel();
        (
            CompletionSignal { sender, waker },
            CompletionBridge { receiver },
        )
    }

    /// Take every pending signal, deduplicated in arrival order. Duplicates
    /// would only cause harmless re-scans, but there is no point scanning a
    /// worker twice in one drain pass.
    pub(crate) fn take_signals(&self) -> Vec<usize> {
        let mut workers = Vec::new();
        while let Ok(worker) = self.receiver.try_recv() {
            if !workers.contains(&worker) {
                workers.push(worker);
            }
        }
        workers
    }
}
