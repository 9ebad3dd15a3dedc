//! Invokers whose tasks still wait on prior futures, keyed by task id.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::invoker::Invoker;

pub(crate) struct OnHoldStore {
    invokers: Mutex<HashMap<u64, Invoker>>,
}

impl OnHoldStore {
    pub(crate) fn new() -> Self {
        Self {
            invokers: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn insert(&self, invoker: Invoker) {
        let id = invoker.state().id();
        let previous = self.invokers.lock().insert(id, invoker);
        debug_assert!(previous.is_none(), "task {id} put on hold twice");
    }

    pub(crate) fn remove(&self, id: u64) -> Option<Invoker> {
        self.invokers.lock().remove(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.invokers.lock().len()
    }

    /// Remove everything, for shutdown.
    pub(crate) fn drain(&self) -> Vec<Invoker> {
        self.invokers.lock().drain().map(|(_, invoker)| invoker).collect()
    }
}
