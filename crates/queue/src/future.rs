//! Per-task shared state and the handles callers hold onto.
//!
//! A [`SharedState`] is referenced by whichever container currently owns the
//! task's invoker, by the thread executing it, and by every [`FutureHandle`].
//! Its mutable fields sit behind a per-task lock that is independent of the
//! ready-queue lock; every status change wakes threads sleeping on the
//! task's condvar.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;

use crate::error::QueueError;

/// Lifecycle of a submitted task. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FutureStatus {
    /// Waiting on at least one prior future.
    OnHold,
    /// Sitting in the ready queue.
    Enqueued,
    /// Claimed by a thread and executing.
    Running,
    /// Finished, successfully or not.
    Done,
}

impl FutureStatus {
    /// The only status this one may advance to.
    pub fn next(self) -> Option<FutureStatus> {
        match self {
            FutureStatus::OnHold => Some(FutureStatus::Enqueued),
            FutureStatus::Enqueued => Some(FutureStatus::Running),
            FutureStatus::Running => Some(FutureStatus::Done),
            FutureStatus::Done => None,
        }
    }
}

/// Fields guarded by the per-task lock.
pub(crate) struct StateInner {
    pub(crate) status: FutureStatus,
    /// Prior futures not yet done (plus the submission guard while
    /// `push_dependent` is still registering).
    pub(crate) outstanding: usize,
    /// Tasks that wait on this one. Emptied when the task completes.
    pub(crate) dependents: Vec<Weak<SharedState>>,
    /// Set by `wait` so the thread resolving the last dependency runs the
    /// task inline instead of queueing it.
    pub(crate) high_priority: bool,
    /// Panic message if the payload panicked.
    pub(crate) failure: Option<String>,
}

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(0);

pub(crate) struct SharedState {
    id: u64,
    queue_id: u64,
    /// Logical ready-queue position. Only read or written under the queue lock.
    invoker_index: AtomicI64,
    /// Prior futures, kept so a blocked `wait` can help finish them.
    priors: Vec<Weak<SharedState>>,
    inner: Mutex<StateInner>,
    changed: Condvar,
}

impl SharedState {
    pub(crate) fn new(
        queue_id: u64,
        status: FutureStatus,
        outstanding: usize,
        priors: Vec<Weak<SharedState>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            queue_id,
            invoker_index: AtomicI64::new(0),
            priors,
            inner: Mutex::new(StateInner {
                status,
                outstanding,
                dependents: Vec::new(),
                high_priority: false,
                failure: None,
            }),
            changed: Condvar::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn queue_id(&self) -> u64 {
        self.queue_id
    }

    pub fn status(&self) -> FutureStatus {
        self.inner.lock().status
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock()
    }

    pub(crate) fn invoker_index(&self) -> i64 {
        self.invoker_index.load(Ordering::Relaxed)
    }

    pub(crate) fn set_invoker_index(&self, index: i64) {
        self.invoker_index.store(index, Ordering::Relaxed);
    }

    /// Priors that still exist and have not finished.
    pub(crate) fn pending_priors(&self) -> Vec<Arc<SharedState>> {
        self.priors
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|prior| prior.status() != FutureStatus::Done)
            .collect()
    }

    /// Move to the next status and wake everyone sleeping on this task.
    pub(crate) fn advance(&self, inner: &mut StateInner, to: FutureStatus) {
        debug_assert_eq!(
            inner.status.next(),
            Some(to),
            "task {} cannot go from {:?} to {:?}",
            self.id,
            inner.status,
            to
        );
        inner.status = to;
        self.changed.notify_all();
    }

    /// Sleep until the status differs from `status`.
    pub(crate) fn wait_while(&self, inner: &mut MutexGuard<'_, StateInner>, status: FutureStatus) {
        while inner.status == status {
            self.changed.wait(inner);
        }
    }

    /// OnHold -> Enqueued. Already-enqueued tasks are left alone.
    pub(crate) fn promote(&self) {
        let mut inner = self.inner.lock();
        if inner.status == FutureStatus::OnHold {
            self.advance(&mut inner, FutureStatus::Enqueued);
        }
    }

    pub(crate) fn mark_running(&self) {
        let mut inner = self.inner.lock();
        self.advance(&mut inner, FutureStatus::Running);
    }

    /// Running -> Done. Returns the dependents to signal; no dependent can
    /// register after this point.
    pub(crate) fn complete(&self, failure: Option<String>) -> Vec<Weak<SharedState>> {
        let mut inner = self.inner.lock();
        inner.failure = failure;
        self.advance(&mut inner, FutureStatus::Done);
        std::mem::take(&mut inner.dependents)
    }

    /// Register `dependent` to be signaled on completion. Returns false if
    /// this task is already done.
    pub(crate) fn add_dependent(&self, dependent: &Arc<SharedState>) -> bool {
        let mut inner = self.inner.lock();
        if inner.status == FutureStatus::Done {
            return false;
        }
        inner.dependents.push(Arc::downgrade(dependent));
        true
    }

    /// Consume one outstanding dependency. Returns `Some` exactly once: when
    /// the count reaches zero while the task is still on hold. The flag is
    /// the task's high-priority bit.
    pub(crate) fn release_dependency(&self) -> Option<bool> {
        let mut inner = self.inner.lock();
        debug_assert!(inner.outstanding > 0, "task {} over-released", self.id);
        inner.outstanding = inner.outstanding.saturating_sub(1);
        if inner.outstanding == 0 && inner.status == FutureStatus::OnHold {
            Some(inner.high_priority)
        } else {
            None
        }
    }

    pub(crate) fn failure(&self) -> Option<String> {
        self.inner.lock().failure.clone()
    }
}

impl fmt::Debug for SharedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SharedState")
            .field("id", &self.id)
            .field("status", &inner.status)
            .field("outstanding", &inner.outstanding)
            .field("dependents", &inner.dependents.len())
            .field("high_priority", &inner.high_priority)
            .finish()
    }
}

// ── Handles ──────────────────────────────────────────────────

/// Type-erased, cloneable reference to a submitted task.
///
/// Used to declare dependencies and to block on completion.
#[derive(Clone)]
pub struct FutureHandle {
    state: Arc<SharedState>,
}

impl FutureHandle {
    pub(crate) fn new(state: Arc<SharedState>) -> Self {
        Self { state }
    }

    pub(crate) fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    /// Unique task id (process-wide).
    pub fn id(&self) -> u64 {
        self.state.id()
    }

    pub fn status(&self) -> FutureStatus {
        self.state.status()
    }

    /// True once the task has finished running.
    pub fn is_ready(&self) -> bool {
        self.status() == FutureStatus::Done
    }

    /// Panic message of a finished task whose payload panicked.
    pub fn failure(&self) -> Option<String> {
        self.state.failure()
    }
}

impl fmt::Debug for FutureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureHandle")
            .field("id", &self.id())
            .field("status", &self.status())
            .finish()
    }
}

/// Typed future returned by `push`; carries the payload's return value.
pub struct TaskFuture<T> {
    handle: FutureHandle,
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> TaskFuture<T> {
    pub(crate) fn new(state: Arc<SharedState>, slot: Arc<Mutex<Option<T>>>) -> Self {
        Self {
            handle: FutureHandle::new(state),
            slot,
        }
    }

    pub fn handle(&self) -> &FutureHandle {
        &self.handle
    }

    pub fn into_handle(self) -> FutureHandle {
        self.handle
    }

    pub fn id(&self) -> u64 {
        self.handle.id()
    }

    pub fn status(&self) -> FutureStatus {
        self.handle.status()
    }

    pub fn is_ready(&self) -> bool {
        self.handle.is_ready()
    }

    /// Take the value of a finished task.
    pub(crate) fn into_result(self) -> Result<T, QueueError> {
        let task = self.handle.id();
        if let Some(message) = self.handle.failure() {
            return Err(QueueError::TaskPanicked { task, message });
        }
        self.slot.lock().take().ok_or(QueueError::ResultUnavailable(task))
    }
}

impl<T> From<&TaskFuture<T>> for FutureHandle {
    fn from(future: &TaskFuture<T>) -> Self {
        future.handle.clone()
    }
}

impl<T> fmt::Debug for TaskFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TaskFuture").field(&self.handle).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_advances_in_order() {
        assert_eq!(FutureStatus::OnHold.next(), Some(FutureStatus::Enqueued));
        assert_eq!(FutureStatus::Enqueued.next(), Some(FutureStatus::Running));
        assert_eq!(FutureStatus::Running.next(), Some(FutureStatus::Done));
        assert_eq!(FutureStatus::Done.next(), None);
        assert!(FutureStatus::OnHold < FutureStatus::Done);
    }

    #[test]
    fn ids_are_unique() {
        let a = SharedState::new(0, FutureStatus::Enqueued, 0, Vec::new());
        let b = SharedState::new(0, FutureStatus::Enqueued, 0, Vec::new());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn complete_hands_back_dependents_once() {
        let prior = SharedState::new(0, FutureStatus::Enqueued, 0, Vec::new());
        let dependent = SharedState::new(0, FutureStatus::OnHold, 1, Vec::new());

        assert!(prior.add_dependent(&dependent));
        prior.mark_running();
        let dependents = prior.complete(None);
        assert_eq!(dependents.len(), 1);
        assert!(Arc::ptr_eq(&dependents[0].upgrade().unwrap(), &dependent));

        // Done tasks refuse new dependents.
        assert!(!prior.add_dependent(&dependent));
        assert_eq!(prior.status(), FutureStatus::Done);
    }

    #[test]
    fn release_dependency_fires_once_at_zero() {
        let state = SharedState::new(0, FutureStatus::OnHold, 2, Vec::new());
        assert_eq!(state.release_dependency(), None);
        assert_eq!(state.release_dependency(), Some(false));
    }

    #[test]
    fn release_dependency_reports_high_priority() {
        let state = SharedState::new(0, FutureStatus::OnHold, 1, Vec::new());
        state.lock().high_priority = true;
        assert_eq!(state.release_dependency(), Some(true));
    }

    #[test]
    fn release_dependency_ignores_enqueued_tasks() {
        let state = SharedState::new(0, FutureStatus::OnHold, 1, Vec::new());
        state.promote();
        assert_eq!(state.release_dependency(), None);
    }

    #[test]
    fn promote_is_idempotent() {
        let state = SharedState::new(0, FutureStatus::OnHold, 0, Vec::new());
        state.promote();
        state.promote();
        assert_eq!(state.status(), FutureStatus::Enqueued);
    }

    #[test]
    fn pending_priors_skips_done() {
        let done = SharedState::new(0, FutureStatus::Enqueued, 0, Vec::new());
        done.mark_running();
        done.complete(None);
        let running = SharedState::new(0, FutureStatus::Enqueued, 0, Vec::new());

        let state = SharedState::new(
            0,
            FutureStatus::OnHold,
            1,
            vec![Arc::downgrade(&done), Arc::downgrade(&running)],
        );
        let pending = state.pending_priors();
        assert_eq!(pending.len(), 1);
        assert!(Arc::ptr_eq(&pending[0], &running));
    }

    #[test]
    fn task_future_reports_failure() {
        let state = SharedState::new(0, FutureStatus::Enqueued, 0, Vec::new());
        let future: TaskFuture<u32> = TaskFuture::new(Arc::clone(&state), Arc::new(Mutex::new(None)));
        state.mark_running();
        state.complete(Some("boom".into()));

        match future.into_result() {
            Err(QueueError::TaskPanicked { message, .. }) => assert_eq!(message, "boom"),
            other => panic!("expected TaskPanicked, got {other:?}"),
        }
    }

    #[test]
    fn task_future_yields_value() {
        let state = SharedState::new(0, FutureStatus::Enqueued, 0, Vec::new());
        let slot = Arc::new(Mutex::new(Some(7u32)));
        let future = TaskFuture::new(Arc::clone(&state), slot);
        state.mark_running();
        state.complete(None);
        assert!(future.is_ready());
        assert_eq!(future.into_result().unwrap(), 7);
    }
}
