//! Fixture construction helpers.

use crate::error::Result;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::json;
use std::sync::Arc;
use tsk_core::{EventBus, Task, TaskId, Workflow, WorkflowId};

/// The diamond-shaped workflow shared by notification tests:
///
/// ```text
///        root
///       /    \
///    left    right
///       \    /
///        sink
/// ```
#[derive(Debug, Clone)]
pub struct WorkflowFixture {
    /// The workflow, not yet started.
    pub workflow: Workflow,
    /// Fans out to `left` and `right`.
    pub root: TaskId,
    /// First branch.
    pub left: TaskId,
    /// Second branch.
    pub right: TaskId,
    /// Fans in from both branches.
    pub sink: TaskId,
}

impl WorkflowFixture {
    /// The workflow's identity.
    pub fn id(&self) -> WorkflowId {
        self.workflow.id()
    }

    /// Task ids in insertion order: root, left, right, sink.
    pub fn task_ids(&self) -> [TaskId; 4] {
        [self.root, self.left, self.right, self.sink]
    }
}

fn echo_task(name: &'static str) -> Task {
    Task::new(name, move |ctx| {
        Ok(json!({
            "task": name,
            "attempt": ctx.attempt,
            "inputs": ctx.prerequisite_results.len(),
        }))
    })
}

/// Builds the diamond fixture publishing on `bus`.
pub fn notification_test_workflow(bus: &Arc<EventBus>, name: impl Into<String>) -> Result<WorkflowFixture> {
    let workflow = Workflow::new(name, Arc::clone(bus));
    let root = workflow.add_task(echo_task("root"), &[])?;
    let left = workflow.add_task(echo_task("left"), &[root])?;
    let right = workflow.add_task(echo_task("right"), &[root])?;
    let sink = workflow.add_task(echo_task("sink"), &[left, right])?;
    Ok(WorkflowFixture {
        workflow,
        root,
        left,
        right,
        sink,
    })
}

/// Stable label for a task fixture: `<prefix>.<task name>.<short id>`.
pub fn default_fixture_name(prefix: &str, task: &Task) -> String {
    format!("{}.{}.{}", prefix, task.name(), task.id().short())
}

/// `<prefix>-` followed by eight random alphanumeric characters.
pub fn random_fixture_name<R: Rng + ?Sized>(rng: &mut R, prefix: &str) -> String {
    let suffix: String = std::iter::repeat_with(|| char::from(rng.sample(Alphanumeric)))
        .take(8)
        .collect();
    format!("{}-{}", prefix, suffix)
}

/// A randomly generated, seed-determined workflow layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowShape {
    /// Task names in insertion order.
    pub names: Vec<String>,
    /// `(prerequisite, dependent)` index pairs, always `prerequisite < dependent`.
    pub edges: Vec<(usize, usize)>,
}

impl WorkflowShape {
    /// Draws a shape with between 1 and `max_tasks` tasks.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, max_tasks: usize) -> Self {
        let count = rng.gen_range(1..=max_tasks.max(1));
        let names = (0..count)
            .map(|_| random_fixture_name(rng, "task"))
            .collect();
        let mut edges = Vec::new();
        for dependent in 1..count {
            for prerequisite in 0..dependent {
                if rng.gen_bool(0.4) {
                    edges.push((prerequisite, dependent));
                }
            }
        }
        Self { names, edges }
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the shape has no tasks.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Materializes the shape as a workflow of no-op tasks publishing on `bus`.
    pub fn build(&self, bus: &Arc<EventBus>, name: impl Into<String>) -> Result<Workflow> {
        let workflow = Workflow::new(name, Arc::clone(bus));
        let mut ids = Vec::with_capacity(self.names.len());
        for (index, task_name) in self.names.iter().enumerate() {
            let prerequisites: Vec<TaskId> = self
                .edges
                .iter()
                .filter(|(_, dependent)| *dependent == index)
                .map(|(prerequisite, _)| ids[*prerequisite])
                .collect();
            ids.push(workflow.add_task(Task::noop(task_name.clone()), &prerequisites)?);
        }
        Ok(workflow)
    }
}
