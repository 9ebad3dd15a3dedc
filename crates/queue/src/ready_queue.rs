//! Index-addressable deque of invokers awaiting a thread.
//!
//! Every slot has a logical index: the front slot is `front_index`, the one
//! behind it `front_index + 1`, and so on. Workers pop the front; a thread
//! blocked in `wait` can take one specific task out of the middle by its
//! index, which leaves a tombstone behind. Leading tombstones are stripped
//! lazily so the front is always a live invoker.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::future::SharedState;
use crate::invoker::Invoker;

pub(crate) struct ReadyQueue {
    slots: VecDeque<Option<Invoker>>,
    front_index: i64,
    live: usize,
}

impl ReadyQueue {
    pub(crate) fn new() -> Self {
        Self {
            slots: VecDeque::new(),
            front_index: 0,
            live: 0,
        }
    }

    /// Number of invokers waiting (tombstones excluded).
    pub(crate) fn len(&self) -> usize {
        self.live
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Append in submission order.
    pub(crate) fn push_back(&mut self, invoker: Invoker) {
        let index = self.front_index + self.slots.len() as i64;
        invoker.state().set_invoker_index(index);
        self.slots.push_back(Some(invoker));
        self.live += 1;
    }

    /// Insert ahead of everything already queued (past-due reinsertion).
    pub(crate) fn push_front(&mut self, invoker: Invoker) {
        if self.slots.is_empty() {
            self.push_back(invoker);
            return;
        }
        self.front_index -= 1;
        invoker.state().set_invoker_index(self.front_index);
        self.slots.push_front(Some(invoker));
        self.live += 1;
    }

    pub(crate) fn pop_front(&mut self) -> Option<Invoker> {
        while let Some(slot) = self.slots.pop_front() {
            self.front_index += 1;
            if let Some(invoker) = slot {
                self.live -= 1;
                self.strip_front();
                return Some(invoker);
            }
        }
        self.front_index = 0;
        None
    }

    /// Take the invoker of `state` out of order, addressed by its index.
    ///
    /// Returns `None` if the slot no longer holds that task (it was already
    /// claimed, or it never sat in this queue).
    pub(crate) fn take(&mut self, state: &Arc<SharedState>) -> Option<Invoker> {
        let offset = state.invoker_index().checked_sub(self.front_index)?;
        let position = usize::try_from(offset).ok()?;
        let slot = self.slots.get_mut(position)?;
        match slot {
            Some(invoker) if Arc::ptr_eq(invoker.state(), state) => {}
            _ => return None,
        }
        let invoker = slot.take();
        self.live -= 1;
        self.strip_front();
        invoker
    }

    /// Remove everything, for shutdown.
    pub(crate) fn drain(&mut self) -> Vec<Invoker> {
        let drained: Vec<Invoker> = self.slots.drain(..).flatten().collect();
        self.front_index = 0;
        self.live = 0;
        drained
    }

    /// Drop leading tombstones. Indices restart from zero whenever the queue
    /// runs dry, which keeps them bounded by the queue's peak length.
    fn strip_front(&mut self) {
        while matches!(self.slots.front(), Some(None)) {
            self.slots.pop_front();
            self.front_index += 1;
        }
        if self.slots.is_empty() {
            self.front_index = 0;
        }
    }

    #[cfg(test)]
    pub(crate) fn front_index(&self) -> i64 {
        self.front_index
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.len()
    }
}
