//! Callback queue -- worker pool, submission and dependency signaling.
//!
//! Split into focused submodules:
//! - `core`: shared state, constructors, diagnostics and shutdown
//! - `submit`: `push` and `push_dependent`
//! - `execution`: running claimed invokers and signaling dependents
//! - `wait`: blocking waits that help finish the awaited task
//! - `resize`: growing and shrinking the worker pool
//! - `worker`: the per-thread claim loop

mod core;
mod execution;
mod resize;
mod submit;
mod wait;
mod worker;

pub use self::core::CallbackQueue;
