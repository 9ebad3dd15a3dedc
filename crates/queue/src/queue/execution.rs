use std::sync::{Arc, Weak};

use tracing::{debug, trace, warn};

use crate::future::SharedState;
use crate::invoker::Invoker;

use super::core::Shared;

impl Shared {
    /// Append a task that has no unmet dependencies and wake one worker.
    pub(super) fn enqueue_back(&self, invoker: Invoker) {
        {
            let mut queue = self.queue.lock();
            invoker.state().promote();
            queue.ready.push_back(invoker);
        }
        self.work_available.notify_one();
    }

    /// Pull `state`'s invoker out of the ready queue and run it on the
    /// calling thread. Returns false if someone else already claimed it.
    pub(super) fn try_claim(&self, state: &Arc<SharedState>) -> bool {
        let claimed = self.queue.lock().ready.take(state);
        match claimed {
            Some(invoker) => {
                self.counters.record_claim();
                self.execute(invoker);
                true
            }
            None => false,
        }
    }

    /// Run a claimed invoker, then signal its dependents. High-priority
    /// dependents released along the way run here too, one after another.
    pub(super) fn execute(&self, invoker: Invoker) {
        let mut inline = vec![invoker];
        while let Some(invoker) = inline.pop() {
            let state = Arc::clone(invoker.state());
            state.mark_running();

            let outcome = invoker.invoke();
            self.counters.record_execution(outcome.is_err());
            if let Err(message) = &outcome {
                warn!(queue = self.id, task = state.id(), error = %message, "task panicked");
            }

            let dependents = state.complete(outcome.err());
            self.signal_dependents(dependents, &mut inline);
        }
    }

    fn signal_dependents(&self, dependents: Vec<Weak<SharedState>>, inline: &mut Vec<Invoker>) {
        let mut past_due = Vec::new();
        for dependent in dependents.iter().filter_map(Weak::upgrade) {
            let Some(high_priority) = dependent.release_dependency() else {
                continue;
            };
            // Gone only if the queue is shutting down and already drained.
            let Some(invoker) = self.on_hold.remove(dependent.id()) else {
                trace!(queue = self.id, task = dependent.id(), "dependent no longer on hold");
                continue;
            };
            if high_priority {
                dependent.promote();
                self.counters.record_inline();
                inline.push(invoker);
            } else {
                past_due.push(invoker);
            }
        }

        if past_due.is_empty() {
            return;
        }
        let count = past_due.len();
        {
            let mut queue = self.queue.lock();
            // Reversed so dependents keep their registration order at the front.
            for invoker in past_due.into_iter().rev() {
                invoker.state().promote();
                queue.ready.push_front(invoker);
            }
        }
        self.counters.record_past_due(count);
        debug!(queue = self.id, count, "past-due tasks moved to the front of the queue");
        for _ in 0..count {
            self.work_available.notify_one();
        }
    }

    /// Drop the submission guard of a task built by `push_dependent`. If
    /// every prior finished before registration completed, it is queued
    /// like a plain push.
    pub(super) fn release_guard(&self, state: &Arc<SharedState>) {
        if state.release_dependency().is_none() {
            return;
        }
        if let Some(invoker) = self.on_hold.remove(state.id()) {
            self.enqueue_back(invoker);
        }
    }
}
