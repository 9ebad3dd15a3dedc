//! Runnable wrapper around one submitted payload.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::future::{SharedState, TaskFuture};

type Payload = Box<dyn FnOnce() + Send + 'static>;

/// Owns a payload and the shared state it completes.
///
/// Invokers move between the ready queue, the on-hold store and an
/// executing frame; they are never shared, so taking one out of a
/// container is the claim.
pub(crate) struct Invoker {
    state: Arc<SharedState>,
    payload: Payload,
}

impl Invoker {
    /// Wrap `f` so its return value lands in the returned future.
    pub(crate) fn bind<F, T>(state: Arc<SharedState>, f: F) -> (Self, TaskFuture<T>)
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let slot = Arc::new(Mutex::new(None));
        let result = Arc::clone(&slot);
        let payload: Payload = Box::new(move || {
            let value = f();
            *result.lock() = Some(value);
        });
        let future = TaskFuture::new(Arc::clone(&state), slot);
        (Self { state, payload }, future)
    }

    pub(crate) fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    /// Run the payload, catching panics at this boundary so a failing task
    /// never takes its worker thread down.
    pub(crate) fn invoke(self) -> Result<(), String> {
        panic::catch_unwind(AssertUnwindSafe(self.payload)).map_err(panic_message)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::FutureStatus;

    fn state() -> Arc<SharedState> {
        SharedState::new(0, FutureStatus::Enqueued, 0, Vec::new())
    }

    #[test]
    fn invoke_stores_result() {
        let (invoker, future) = Invoker::bind(state(), || 6 * 7);
        let shared = Arc::clone(invoker.state());
        assert!(invoker.invoke().is_ok());

        shared.mark_running();
        shared.complete(None);
        assert_eq!(future.into_result().unwrap(), 42);
    }

    #[test]
    fn invoke_catches_str_panic() {
        let (invoker, _future) = Invoker::bind(state(), || -> u8 { panic!("boom") });
        assert_eq!(invoker.invoke().unwrap_err(), "boom");
    }

    #[test]
    fn invoke_catches_formatted_panic() {
        let (invoker, _future) = Invoker::bind(state(), || -> u8 { panic!("bad {}", 3) });
        assert_eq!(invoker.invoke().unwrap_err(), "bad 3");
    }

    #[test]
    fn invoke_catches_opaque_panic() {
        let (invoker, _future) =
            Invoker::bind(state(), || -> u8 { std::panic::panic_any(17u32) });
        assert_eq!(invoker.invoke().unwrap_err(), "unknown panic");
    }
}
