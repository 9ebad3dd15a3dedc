use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::debug;

use super::core::{QueueState, Shared};

/// Claim loop run by every worker thread.
///
/// A worker sleeps while it is in service and the ready queue is empty.
/// Once its logical index falls outside the pool (a shrink) or the queue
/// starts shutting down, it stops claiming work and exits; it never comes
/// back into service.
pub(super) struct ThreadWorker {
    shared: Arc<Shared>,
    index: Arc<AtomicUsize>,
}

impl ThreadWorker {
    pub(super) fn new(shared: Arc<Shared>, index: Arc<AtomicUsize>) -> Self {
        Self { shared, index }
    }

    pub(super) fn run(self) {
        let started_as = self.index();
        debug!(queue = self.shared.id, worker = started_as, "worker started");

        while self.pop() {}

        self.shared.thread_indices.lock().remove(&thread::current().id());
        debug!(queue = self.shared.id, worker = started_as, "worker exited");
    }

    /// Claim and run one task. Returns false when the worker should exit.
    fn pop(&self) -> bool {
        let mut queue = self.shared.queue.lock();
        while self.idle(&queue) {
            self.shared.work_available.wait(&mut queue);
        }
        if !self.eligible(&queue) {
            return false;
        }
        let Some(invoker) = queue.ready.pop_front() else {
            return false;
        };
        drop(queue);

        self.shared.execute(invoker);
        true
    }

    fn index(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }

    fn in_service(&self, queue: &QueueState) -> bool {
        self.index() < queue.number_of_threads && !queue.destroying
    }

    fn idle(&self, queue: &QueueState) -> bool {
        self.in_service(queue) && queue.ready.is_empty()
    }

    fn eligible(&self, queue: &QueueState) -> bool {
        self.in_service(queue) && !queue.ready.is_empty()
    }
}
