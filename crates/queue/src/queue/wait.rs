use std::sync::Arc;

use crate::error::QueueError;
use crate::future::{FutureHandle, FutureStatus, SharedState, TaskFuture};

use super::core::Shared;
use super::CallbackQueue;

/// Outcome of one attempt to move a waited-on task forward.
enum Step {
    Finished,
    /// The task is on hold behind these unfinished priors.
    Help(Vec<Arc<SharedState>>),
    Retry,
}

impl CallbackQueue {
    /// Block until `future` is done.
    ///
    /// The caller does not just sleep: an enqueued task is pulled out of the
    /// ready queue and run on the calling thread, and an on-hold task is
    /// flagged high priority while the caller works through its unfinished
    /// priors the same way. This keeps `wait` from deadlocking when every
    /// worker is itself blocked in a `wait`, or when there are no workers.
    pub fn wait(&self, future: &FutureHandle) -> Result<(), QueueError> {
        self.check_owned(future)?;
        let mut stack = vec![Arc::clone(future.state())];
        while let Some(state) = stack.last().cloned() {
            match self.shared.step(&state) {
                Step::Finished => {
                    stack.pop();
                }
                Step::Help(priors) => stack.extend(priors),
                Step::Retry => {}
            }
        }
        Ok(())
    }

    /// Block until every future in `futures` is done.
    pub fn wait_all(&self, futures: &[FutureHandle]) -> Result<(), QueueError> {
        for future in futures {
            self.check_owned(future)?;
        }
        for future in futures {
            self.wait(future)?;
        }
        Ok(())
    }

    /// Wait for `future` and take its value.
    pub fn get<T>(&self, future: TaskFuture<T>) -> Result<T, QueueError> {
        self.wait(future.handle())?;
        future.into_result()
    }
}

impl Shared {
    fn step(&self, state: &Arc<SharedState>) -> Step {
        let mut inner = state.lock();
        match inner.status {
            FutureStatus::Done => Step::Finished,
            FutureStatus::Running => {
                state.wait_while(&mut inner, FutureStatus::Running);
                Step::Retry
            }
            FutureStatus::OnHold => {
                inner.high_priority = true;
                drop(inner);
                let priors = state.pending_priors();
                if !priors.is_empty() {
                    return Step::Help(priors);
                }
                // Every prior is done; the thread signaling the last one is
                // about to move this task.
                let mut inner = state.lock();
                state.wait_while(&mut inner, FutureStatus::OnHold);
                Step::Retry
            }
            FutureStatus::Enqueued => {
                drop(inner);
                if self.try_claim(state) {
                    return Step::Finished;
                }
                let mut inner = state.lock();
                state.wait_while(&mut inner, FutureStatus::Enqueued);
                Step::Retry
            }
        }
    }
}
