//! Tasks: named units of work executed by a workflow.

use crate::ids::{TaskId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of a task within a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Waiting for prerequisites, or for a retry after failure was cleared.
    Pending,
    /// Operation is running on a worker thread.
    Executing,
    /// Operation returned a value.
    Finished,
    /// Operation returned an error.
    Failed,
    /// Cancelled before finishing.
    Cancelled,
}

impl TaskState {
    /// Whether the task will not run again without intervention.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Error returned by a task operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// Non-zero result code published with the failure.
    pub code: i32,
    /// Human-readable reason.
    pub message: String,
}

impl TaskError {
    /// Creates a task error. A code of 0 is bumped to 1 so failures never look successful.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: if code == 0 { 1 } else { code },
            message: message.into(),
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for TaskError {}

/// What an operation sees while it runs.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// The running task.
    pub task: TaskId,
    /// Workflow it belongs to.
    pub workflow: WorkflowId,
    /// 1 for the first run, incremented by each retry.
    pub attempt: u32,
    /// Results of the task's finished prerequisites.
    pub prerequisite_results: BTreeMap<TaskId, Value>,
}

/// Signature of a task's body.
pub type Operation = dyn Fn(&TaskContext) -> Result<Value, TaskError> + Send + Sync;

/// A named unit of work.
#[derive(Clone)]
pub struct Task {
    id: TaskId,
    name: String,
    operation: Arc<Operation>,
}

impl Task {
    /// Creates a task with a fresh identity.
    pub fn new<F>(name: impl Into<String>, operation: F) -> Self
    where
        F: Fn(&TaskContext) -> Result<Value, TaskError> + Send + Sync + 'static,
    {
        Self {
            id: TaskId::new(),
            name: name.into(),
            operation: Arc::new(operation),
        }
    }

    /// A task that finishes immediately with `null`.
    pub fn noop(name: impl Into<String>) -> Self {
        Self::new(name, |_| Ok(Value::Null))
    }

    /// A task that always fails with the given code.
    pub fn failing(name: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        let error = TaskError::new(code, message);
        Self::new(name, move |_| Err(error.clone()))
    }

    /// This task's identity.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// This task's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn run(&self, ctx: &TaskContext) -> Result<Value, TaskError> {
        (self.operation)(ctx)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
