//! Queue error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("future {task} belongs to a different queue")]
    ForeignFuture { task: u64 },

    #[error("task {task} panicked: {message}")]
    TaskPanicked { task: u64, message: String },

    #[error("result of task {0} was already taken")]
    ResultUnavailable(u64),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}
