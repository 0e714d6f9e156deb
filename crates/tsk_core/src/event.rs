//! Typed lifecycle events published by tasks and workflows.

use crate::ids::{TaskId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Names of the lifecycle events the engine publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventName {
    /// A task began executing.
    TaskStarted,
    /// A task's operation returned successfully.
    TaskFinished,
    /// A task's operation returned an error.
    TaskFailed,
    /// A task was cancelled before it could finish.
    TaskCancelled,
    /// A failed task was put back in line for execution.
    TaskRetried,
    /// A workflow began executing its graph.
    WorkflowStarted,
    /// Every task in a workflow finished.
    WorkflowCompleted,
    /// A task in a workflow failed. Posted by the workflow.
    WorkflowTaskFailed,
    /// A task in a workflow was cancelled. Posted by the workflow.
    WorkflowTaskCancelled,
}

impl EventName {
    /// All event names, in declaration order.
    pub const ALL: [EventName; 9] = [
        EventName::TaskStarted,
        EventName::TaskFinished,
        EventName::TaskFailed,
        EventName::TaskCancelled,
        EventName::TaskRetried,
        EventName::WorkflowStarted,
        EventName::WorkflowCompleted,
        EventName::WorkflowTaskFailed,
        EventName::WorkflowTaskCancelled,
    ];

    /// The kebab-case wire name, e.g. `task-finished`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskStarted => "task-started",
            Self::TaskFinished => "task-finished",
            Self::TaskFailed => "task-failed",
            Self::TaskCancelled => "task-cancelled",
            Self::TaskRetried => "task-retried",
            Self::WorkflowStarted => "workflow-started",
            Self::WorkflowCompleted => "workflow-completed",
            Self::WorkflowTaskFailed => "workflow-task-failed",
            Self::WorkflowTaskCancelled => "workflow-task-cancelled",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("unknown event name: {}", s))
    }
}

/// The object that posted an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    /// Posted by a task.
    Task(TaskId),
    /// Posted by a workflow.
    Workflow(WorkflowId),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task(id) => write!(f, "{}", id),
            Self::Workflow(id) => write!(f, "{}", id),
        }
    }
}

/// Data carried alongside an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    /// 0 on success, the task error's code on failure.
    pub result_code: Option<i32>,
    /// Value returned by a finished task.
    pub result: Option<Value>,
    /// Error message of a failed task.
    pub error: Option<String>,
    /// Task the event is about, for workflow-posted events.
    pub task: Option<TaskId>,
}

/// An event envelope delivered on an [`EventBus`](crate::EventBus).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// What happened.
    pub name: EventName,
    /// Who posted it.
    pub source: Subject,
    /// Workflow the source belongs to, if any.
    pub workflow: Option<WorkflowId>,
    /// Attached data.
    pub payload: EventPayload,
}

impl Event {
    /// Creates an event with an empty payload.
    pub fn new(name: EventName, source: Subject) -> Self {
        let workflow = match source {
            Subject::Workflow(id) => Some(id),
            Subject::Task(_) => None,
        };
        Self {
            name,
            source,
            workflow,
            payload: EventPayload::default(),
        }
    }

    /// Event posted by a task.
    pub fn task(name: EventName, task: TaskId) -> Self {
        Self::new(name, Subject::Task(task))
    }

    /// Event posted by a workflow.
    pub fn workflow(name: EventName, workflow: WorkflowId) -> Self {
        Self::new(name, Subject::Workflow(workflow))
    }

    /// Sets the owning workflow.
    pub fn in_workflow(mut self, workflow: WorkflowId) -> Self {
        self.workflow = Some(workflow);
        self
    }

    /// Replaces the payload.
    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = payload;
        self
    }

    /// Sets the result code.
    pub fn with_result_code(mut self, code: i32) -> Self {
        self.payload.result_code = Some(code);
        self
    }

    /// Returns the posting task, if a task posted this event.
    pub fn source_task(&self) -> Option<TaskId> {
        match self.source {
            Subject::Task(id) => Some(id),
            Subject::Workflow(_) => None,
        }
    }

    /// The task this event concerns: the source task, or the payload's task for
    /// workflow-posted events.
    pub fn concerned_task(&self) -> Option<TaskId> {
        self.source_task().or(self.payload.task)
    }
}
