use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use callq_core::QueueConfig;
use parking_lot::{Condvar, Mutex};
use tracing::{info, warn};

use crate::error::QueueError;
use crate::future::FutureHandle;
use crate::on_hold::OnHoldStore;
use crate::ready_queue::ReadyQueue;
use crate::stats::{QueueCounters, QueueStats};

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(0);

/// State shared between the queue handle and its worker threads.
pub(super) struct Shared {
    pub(super) id: u64,
    /// Ready queue plus the worker eligibility flags.
    pub(super) queue: Mutex<QueueState>,
    pub(super) work_available: Condvar,
    pub(super) on_hold: OnHoldStore,
    /// Worker thread identity -> logical worker index.
    pub(super) thread_indices: Mutex<HashMap<ThreadId, Arc<AtomicUsize>>>,
    pub(super) counters: QueueCounters,
}

pub(super) struct QueueState {
    pub(super) ready: ReadyQueue,
    /// Workers whose index is below this may claim work.
    pub(super) number_of_threads: usize,
    pub(super) destroying: bool,
}

impl Shared {
    /// Logical index of the calling thread, if it is one of our workers.
    pub(super) fn worker_index(&self) -> Option<usize> {
        self.thread_indices
            .lock()
            .get(&thread::current().id())
            .map(|index| index.load(Ordering::SeqCst))
    }
}

/// One physical worker thread and the logical index it currently holds.
pub(super) struct WorkerSlot {
    pub(super) handle: JoinHandle<()>,
    pub(super) index: Arc<AtomicUsize>,
}

/// Slot `i` holds the thread whose logical index is `i`.
pub(super) struct Pool {
    pub(super) slots: Vec<WorkerSlot>,
    /// Threads ever spawned, used for thread names.
    pub(super) spawned: usize,
}

/// A thread pool that runs submitted closures in submission order, with
/// support for tasks that must wait on other tasks.
///
/// Dropping the queue joins every worker. Tasks already running finish;
/// tasks still queued or on hold are discarded without running.
pub struct CallbackQueue {
    pub(super) shared: Arc<Shared>,
    /// Administrative lock: serializes resizes against each other and
    /// against shutdown.
    pub(super) pool: Mutex<Pool>,
    pub(super) config: QueueConfig,
}

impl CallbackQueue {
    /// Create a queue with exactly `number_of_threads` workers.
    pub fn new(number_of_threads: usize) -> Result<Self, QueueError> {
        let queue = Self::idle(QueueConfig::default());
        queue.set_number_of_threads(number_of_threads)?;
        Ok(queue)
    }

    /// Create a queue from config (0 workers = available parallelism).
    pub fn with_config(config: QueueConfig) -> Result<Self, QueueError> {
        let threads = config.resolved_worker_threads();
        let queue = Self::idle(config);
        queue.set_number_of_threads(threads)?;
        Ok(queue)
    }

    fn idle(config: QueueConfig) -> Self {
        let id = NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed);
        info!(queue = id, prefix = %config.thread_name_prefix, "creating callback queue");
        Self {
            shared: Arc::new(Shared {
                id,
                queue: Mutex::new(QueueState {
                    ready: ReadyQueue::new(),
                    number_of_threads: 0,
                    destroying: false,
                }),
                work_available: Condvar::new(),
                on_hold: OnHoldStore::new(),
                thread_indices: Mutex::new(HashMap::new()),
                counters: QueueCounters::default(),
            }),
            pool: Mutex::new(Pool {
                slots: Vec::new(),
                spawned: 0,
            }),
            config,
        }
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn number_of_threads(&self) -> usize {
        self.shared.queue.lock().number_of_threads
    }

    /// Tasks sitting in the ready queue.
    pub fn queue_depth(&self) -> usize {
        self.shared.queue.lock().ready.len()
    }

    /// Tasks waiting on prior futures.
    pub fn on_hold_count(&self) -> usize {
        self.shared.on_hold.len()
    }

    /// Logical worker index of the calling thread, if it is one of this
    /// queue's workers.
    pub fn current_worker_index(&self) -> Option<usize> {
        self.shared.worker_index()
    }

    pub fn stats(&self) -> QueueStats {
        let live_workers = self.pool.lock().slots.len();
        let (number_of_threads, queue_depth) = {
            let queue = self.shared.queue.lock();
            (queue.number_of_threads, queue.ready.len())
        };
        QueueStats::from_parts(
            self.shared.id,
            number_of_threads,
            live_workers,
            queue_depth,
            self.shared.on_hold.len(),
            &self.shared.counters,
        )
    }

    pub(super) fn check_owned(&self, future: &FutureHandle) -> Result<(), QueueError> {
        if future.state().queue_id() == self.shared.id {
            Ok(())
        } else {
            Err(QueueError::ForeignFuture { task: future.id() })
        }
    }
}

impl fmt::Debug for CallbackQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackQueue")
            .field("id", &self.shared.id)
            .field("number_of_threads", &self.number_of_threads())
            .field("queue_depth", &self.queue_depth())
            .field("on_hold", &self.on_hold_count())
            .finish()
    }
}

impl Drop for CallbackQueue {
    fn drop(&mut self) {
        let slots = {
            let mut pool = self.pool.lock();
            self.shared.queue.lock().destroying = true;
            std::mem::take(&mut pool.slots)
        };
        self.shared.work_available.notify_all();

        // The last handle may be dropped by a payload running on one of our
        // own workers; that thread cannot join itself and exits on its own.
        let current = thread::current().id();
        for slot in slots {
            if slot.handle.thread().id() == current {
                continue;
            }
            if slot.handle.join().is_err() {
                warn!(queue = self.shared.id, "worker thread panicked");
            }
        }

        let ready = self.shared.queue.lock().ready.drain();
        let on_hold = self.shared.on_hold.drain();
        if !ready.is_empty() || !on_hold.is_empty() {
            warn!(
                queue = self.shared.id,
                ready = ready.len(),
                on_hold = on_hold.len(),
                "callback queue dropped with unfinished tasks; they will not run"
            );
        }
        info!(queue = self.shared.id, "callback queue stopped");
    }
}
