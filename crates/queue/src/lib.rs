//! Dependency-aware callback queue.
//!
//! A [`CallbackQueue`] runs submitted closures on a resizable pool of worker
//! threads in roughly submission order. A task submitted with
//! [`CallbackQueue::push_dependent`] stays on hold until all of its prior
//! futures are done, then jumps to the front of the queue.

mod invoker;
mod on_hold;
mod ready_queue;

pub mod error;
pub mod future;
pub mod queue;
pub mod stats;

pub use error::QueueError;
pub use future::{FutureHandle, FutureStatus, TaskFuture};
pub use queue::CallbackQueue;
pub use stats::QueueStats;
