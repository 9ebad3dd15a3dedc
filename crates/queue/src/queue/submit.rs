use std::sync::Arc;

use tracing::trace;

use crate::error::QueueError;
use crate::future::{FutureHandle, FutureStatus, SharedState, TaskFuture};
use crate::invoker::Invoker;

use super::CallbackQueue;

impl CallbackQueue {
    /// Queue `f` behind everything already submitted.
    pub fn push<F, T>(&self, f: F) -> TaskFuture<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let state = SharedState::new(self.shared.id, FutureStatus::Enqueued, 0, Vec::new());
        let (invoker, future) = Invoker::bind(state, f);
        self.shared.enqueue_back(invoker);
        future
    }

    /// Queue `f` to run once every future in `priors` is done.
    ///
    /// When the last prior finishes, the task jumps to the front of the
    /// ready queue rather than waiting behind newer work.
    pub fn push_dependent<F, T>(
        &self,
        priors: &[FutureHandle],
        f: F,
    ) -> Result<TaskFuture<T>, QueueError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        for prior in priors {
            self.check_owned(prior)?;
        }

        let links = priors.iter().map(|prior| Arc::downgrade(prior.state())).collect();
        // The extra count is held until registration finishes so a prior
        // completing mid-way cannot release the task early.
        let state = SharedState::new(self.shared.id, FutureStatus::OnHold, 1, links);
        let (invoker, future) = Invoker::bind(Arc::clone(&state), f);
        self.shared.on_hold.insert(invoker);

        let mut pending = 0;
        for prior in priors {
            state.lock().outstanding += 1;
            if prior.state().add_dependent(&state) {
                pending += 1;
            } else {
                state.lock().outstanding -= 1;
            }
        }
        trace!(
            queue = self.shared.id,
            task = state.id(),
            priors = priors.len(),
            pending,
            "dependent task submitted"
        );

        self.shared.release_guard(&state);
        Ok(future)
    }
}
