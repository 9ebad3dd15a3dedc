use std::cmp;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{debug, info, warn};

use crate::error::QueueError;

use super::core::{Pool, WorkerSlot};
use super::worker::ThreadWorker;
use super::CallbackQueue;

/// Logical index given to threads on their way out. Never in service.
const RETIRED: usize = usize::MAX;

impl CallbackQueue {
    /// Grow or shrink the worker pool to exactly `number_of_threads`.
    ///
    /// Shrinking joins the excess workers before returning; each finishes
    /// the task it is running first. Safe to call from inside a task: a
    /// worker that would retire itself takes over slot 0 instead, and the
    /// thread that held slot 0 retires in its place. A no-op once the queue
    /// is being dropped.
    pub fn set_number_of_threads(&self, number_of_threads: usize) -> Result<(), QueueError> {
        let retiring = {
            let mut pool = self.pool.lock();
            if self.shared.queue.lock().destroying {
                return Ok(());
            }
            match number_of_threads.cmp(&pool.slots.len()) {
                cmp::Ordering::Equal => return Ok(()),
                cmp::Ordering::Greater => return self.grow(&mut pool, number_of_threads),
                cmp::Ordering::Less => self.retire(&mut pool, number_of_threads),
            }
        };
        self.shared.work_available.notify_all();

        let current = thread::current().id();
        let count = retiring.len();
        for slot in retiring {
            // Only possible when shrinking to zero from a worker: detach,
            // the thread exits once its task returns.
            if slot.handle.thread().id() == current {
                continue;
            }
            if slot.handle.join().is_err() {
                warn!(queue = self.shared.id, "worker thread panicked");
            }
        }
        info!(
            queue = self.shared.id,
            threads = number_of_threads,
            retired = count,
            "worker pool shrunk"
        );
        Ok(())
    }

    fn grow(&self, pool: &mut Pool, target: usize) -> Result<(), QueueError> {
        self.shared.queue.lock().number_of_threads = target;
        while pool.slots.len() < target {
            let index = pool.slots.len();
            match self.spawn_worker(pool, index) {
                Ok(slot) => pool.slots.push(slot),
                Err(e) => {
                    self.shared.queue.lock().number_of_threads = pool.slots.len();
                    return Err(e);
                }
            }
        }
        info!(queue = self.shared.id, threads = target, "worker pool grown");
        Ok(())
    }

    /// Take the slots at `target..` out of service and hand them back for
    /// joining.
    fn retire(&self, pool: &mut Pool, target: usize) -> Vec<WorkerSlot> {
        let mut queue = self.shared.queue.lock();

        if target > 0 {
            if let Some(own) = self.shared.worker_index() {
                if own >= target && own < pool.slots.len() {
                    // We cannot join ourselves: trade places with worker 0.
                    pool.slots.swap(own, 0);
                    let previous = pool.slots[own].index.swap(own, Ordering::SeqCst);
                    pool.slots[0].index.store(previous, Ordering::SeqCst);
                    debug!(queue = self.shared.id, from = own, "resizing worker took over slot 0");
                }
            }
        }

        queue.number_of_threads = target;
        let retiring = pool.slots.split_off(target);
        for slot in &retiring {
            slot.index.store(RETIRED, Ordering::SeqCst);
        }
        retiring
    }

    fn spawn_worker(&self, pool: &mut Pool, index: usize) -> Result<WorkerSlot, QueueError> {
        let cell = Arc::new(AtomicUsize::new(index));
        let worker = ThreadWorker::new(Arc::clone(&self.shared), Arc::clone(&cell));

        let name = format!("{}-{}", self.config.thread_name_prefix, pool.spawned);
        let mut builder = thread::Builder::new().name(name);
        if let Some(size) = self.config.stack_size {
            builder = builder.stack_size(size);
        }
        let handle = builder.spawn(move || worker.run())?;
        pool.spawned += 1;

        self.shared
            .thread_indices
            .lock()
            .insert(handle.thread().id(), Arc::clone(&cell));
        Ok(WorkerSlot { handle, index: cell })
    }
}
