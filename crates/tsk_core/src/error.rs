//! Error types for tsk_core operations.

use crate::ids::TaskId;
use crate::task::TaskState;
use thiserror::Error;

/// Core error type for workflow construction and control.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A task id does not belong to the workflow.
    #[error("unknown task: {0}")]
    UnknownTask(TaskId),

    /// The task is already part of the workflow.
    #[error("task {0} already added")]
    DuplicateTask(TaskId),

    /// The same prerequisite was listed twice for one task.
    #[error("task {task} lists prerequisite {prerequisite} more than once")]
    DuplicatePrerequisite {
        /// Task being added
        task: TaskId,
        /// The repeated prerequisite
        prerequisite: TaskId,
    },

    /// The workflow graph can no longer be changed.
    #[error("workflow already started")]
    AlreadyStarted,

    /// The operation needs a started workflow.
    #[error("workflow not started")]
    NotStarted,

    /// The workflow was cancelled; nothing in it runs again.
    #[error("workflow cancelled")]
    Cancelled,

    /// Only failed tasks can be retried.
    #[error("cannot retry task {task} in state {state}")]
    InvalidRetry {
        /// Task passed to retry
        task: TaskId,
        /// Its state at the time of the call
        state: TaskState,
    },
}

/// Convenience Result type for tsk_core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
