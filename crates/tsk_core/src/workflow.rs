//! Workflows: dependency graphs of tasks executed on worker threads.
//!
//! A task becomes runnable once every prerequisite has finished. Runnable tasks
//! are started on their own threads, so independent branches run concurrently
//! and publish their events from different threads. Dependents of a failed
//! task stay pending until the failure is retried. Events of one workflow are
//! published in the order its state changed, whichever thread publishes them.

use crate::bus::EventBus;
use crate::error::{CoreError, Result};
use crate::event::{Event, EventName, EventPayload};
use crate::ids::{TaskId, WorkflowId};
use crate::task::{Task, TaskContext, TaskError, TaskState};
use parking_lot::{Mutex, ReentrantMutex};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::thread;
use tracing::debug;

struct TaskNode {
    task: Task,
    prerequisites: BTreeSet<TaskId>,
    dependents: BTreeSet<TaskId>,
    state: TaskState,
    attempts: u32,
    result: Option<Value>,
}

#[derive(Default)]
struct GraphState {
    nodes: BTreeMap<TaskId, TaskNode>,
    order: Vec<TaskId>,
    started: bool,
    cancelled: bool,
    completed: bool,
}

impl GraphState {
    fn is_runnable(&self, id: &TaskId) -> bool {
        match self.nodes.get(id) {
            Some(node) => {
                node.state == TaskState::Pending
                    && node.prerequisites.iter().all(|p| {
                        self.nodes
                            .get(p)
                            .is_some_and(|n| n.state == TaskState::Finished)
                    })
            }
            None => false,
        }
    }

    /// Marks a runnable task as executing and builds its context.
    fn claim(&mut self, id: TaskId, workflow: WorkflowId) -> Option<(Task, TaskContext)> {
        if self.cancelled || !self.is_runnable(&id) {
            return None;
        }
        let prerequisite_results = self.nodes.get(&id)?.prerequisites.iter().filter_map(|p| {
            let result = self.nodes.get(p)?.result.clone()?;
            Some((*p, result))
        });
        let prerequisite_results: BTreeMap<TaskId, Value> = prerequisite_results.collect();

        let node = self.nodes.get_mut(&id)?;
        node.state = TaskState::Executing;
        node.attempts += 1;
        let ctx = TaskContext {
            task: id,
            workflow,
            attempt: node.attempts,
            prerequisite_results,
        };
        Some((node.task.clone(), ctx))
    }

    fn all_finished(&self) -> bool {
        self.nodes.values().all(|n| n.state == TaskState::Finished)
    }
}

struct WorkflowInner {
    id: WorkflowId,
    name: String,
    bus: Arc<EventBus>,
    graph: Mutex<GraphState>,
    /// Held from a state change until its events are published, so one
    /// workflow's events are observed in state order.
    sequencer: ReentrantMutex<()>,
}

/// A dependency graph of tasks publishing lifecycle events on an [`EventBus`].
///
/// Cloning a workflow yields another handle to the same graph.
#[derive(Clone)]
pub struct Workflow {
    inner: Arc<WorkflowInner>,
}

impl Workflow {
    /// Creates an empty workflow that publishes on `bus`.
    pub fn new(name: impl Into<String>, bus: Arc<EventBus>) -> Self {
        Self {
            inner: Arc::new(WorkflowInner {
                id: WorkflowId::new(),
                name: name.into(),
                bus,
                graph: Mutex::new(GraphState::default()),
                sequencer: ReentrantMutex::new(()),
            }),
        }
    }

    /// Creates an empty workflow that publishes on [`EventBus::process_default`].
    pub fn with_default_bus(name: impl Into<String>) -> Self {
        Self::new(name, EventBus::process_default())
    }

    /// This workflow's identity.
    pub fn id(&self) -> WorkflowId {
        self.inner.id
    }

    /// This workflow's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The bus events are published on.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    /// Adds a task whose prerequisites must already be part of the workflow.
    ///
    /// Because prerequisites have to exist first, the graph is acyclic by construction.
    pub fn add_task(&self, task: Task, prerequisites: &[TaskId]) -> Result<TaskId> {
        let mut graph = self.inner.graph.lock();
        if graph.started {
            return Err(CoreError::AlreadyStarted);
        }
        let id = task.id();
        if graph.nodes.contains_key(&id) {
            return Err(CoreError::DuplicateTask(id));
        }

        let mut prereq_set = BTreeSet::new();
        for prerequisite in prerequisites {
            if !graph.nodes.contains_key(prerequisite) {
                return Err(CoreError::UnknownTask(*prerequisite));
            }
            if !prereq_set.insert(*prerequisite) {
                return Err(CoreError::DuplicatePrerequisite {
                    task: id,
                    prerequisite: *prerequisite,
                });
            }
        }

        for prerequisite in &prereq_set {
            if let Some(node) = graph.nodes.get_mut(prerequisite) {
                node.dependents.insert(id);
            }
        }
        graph.nodes.insert(
            id,
            TaskNode {
                task,
                prerequisites: prereq_set,
                dependents: BTreeSet::new(),
                state: TaskState::Pending,
                attempts: 0,
                result: None,
            },
        );
        graph.order.push(id);
        Ok(id)
    }

    /// Starts every task without prerequisites.
    pub fn start(&self) -> Result<()> {
        let _seq = self.inner.sequencer.lock();
        let (runnable, empty) = {
            let mut graph = self.inner.graph.lock();
            if graph.started {
                return Err(CoreError::AlreadyStarted);
            }
            graph.started = true;
            let roots: Vec<TaskId> = graph.order.clone();
            let runnable: Vec<(Task, TaskContext)> = roots
                .into_iter()
                .filter_map(|id| graph.claim(id, self.inner.id))
                .collect();
            let empty = graph.nodes.is_empty();
            if empty {
                graph.completed = true;
            }
            (runnable, empty)
        };

        debug!(workflow = %self.inner.id, name = %self.inner.name, roots = runnable.len(), "workflow started");
        self.publish(Event::workflow(EventName::WorkflowStarted, self.inner.id));
        if empty {
            self.publish(Event::workflow(EventName::WorkflowCompleted, self.inner.id));
        }
        for (task, ctx) in runnable {
            Self::launch(Arc::clone(&self.inner), task, ctx);
        }
        Ok(())
    }

    /// Puts a failed task back in line and runs it again.
    pub fn retry_task(&self, id: TaskId) -> Result<()> {
        let _seq = self.inner.sequencer.lock();
        let claimed = {
            let mut graph = self.inner.graph.lock();
            if !graph.started {
                return Err(CoreError::NotStarted);
            }
            if graph.cancelled {
                return Err(CoreError::Cancelled);
            }
            let node = graph.nodes.get_mut(&id).ok_or(CoreError::UnknownTask(id))?;
            if node.state != TaskState::Failed {
                return Err(CoreError::InvalidRetry {
                    task: id,
                    state: node.state,
                });
            }
            node.state = TaskState::Pending;
            graph.claim(id, self.inner.id)
        };

        debug!(workflow = %self.inner.id, task = %id, "retrying task");
        self.publish(Event::task(EventName::TaskRetried, id).in_workflow(self.inner.id));
        if let Some((task, ctx)) = claimed {
            Self::launch(Arc::clone(&self.inner), task, ctx);
        }
        Ok(())
    }

    /// Cancels every task that has not settled. Results of operations already
    /// running are discarded when they return.
    pub fn cancel(&self) {
        let _seq = self.inner.sequencer.lock();
        let cancelled: Vec<TaskId> = {
            let mut graph = self.inner.graph.lock();
            graph.cancelled = true;
            let order = graph.order.clone();
            order
                .into_iter()
                .filter(|id| {
                    graph.nodes.get_mut(id).is_some_and(|node| {
                        let open = matches!(node.state, TaskState::Pending | TaskState::Executing);
                        if open {
                            node.state = TaskState::Cancelled;
                        }
                        open
                    })
                })
                .collect()
        };

        debug!(workflow = %self.inner.id, cancelled = cancelled.len(), "workflow cancelled");
        for id in cancelled {
            self.publish(Event::task(EventName::TaskCancelled, id).in_workflow(self.inner.id));
            self.publish(
                Event::workflow(EventName::WorkflowTaskCancelled, self.inner.id).with_payload(
                    EventPayload {
                        task: Some(id),
                        ..Default::default()
                    },
                ),
            );
        }
    }

    /// State of a task, or `None` if it is not part of this workflow.
    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.inner.graph.lock().nodes.get(&id).map(|n| n.state)
    }

    /// Value returned by a finished task.
    pub fn task_result(&self, id: TaskId) -> Option<Value> {
        self.inner
            .graph
            .lock()
            .nodes
            .get(&id)
            .and_then(|n| n.result.clone())
    }

    /// The task with this id.
    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.inner.graph.lock().nodes.get(&id).map(|n| n.task.clone())
    }

    /// Task ids in insertion order.
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.inner.graph.lock().order.clone()
    }

    /// Prerequisites of a task, sorted.
    pub fn prerequisites(&self, id: TaskId) -> Vec<TaskId> {
        self.inner
            .graph
            .lock()
            .nodes
            .get(&id)
            .map(|n| n.prerequisites.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Tasks that list `id` as a prerequisite, sorted.
    pub fn dependents(&self, id: TaskId) -> Vec<TaskId> {
        self.inner
            .graph
            .lock()
            .nodes
            .get(&id)
            .map(|n| n.dependents.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether every task has finished.
    pub fn is_finished(&self) -> bool {
        let graph = self.inner.graph.lock();
        graph.started && graph.all_finished()
    }

    fn publish(&self, event: Event) {
        self.inner.bus.publish(event);
    }

    fn launch(inner: Arc<WorkflowInner>, task: Task, ctx: TaskContext) {
        thread::spawn(move || Self::execute(inner, task, ctx));
    }

    fn execute(inner: Arc<WorkflowInner>, task: Task, ctx: TaskContext) {
        let id = task.id();
        {
            let _seq = inner.sequencer.lock();
            let open = inner
                .graph
                .lock()
                .nodes
                .get(&id)
                .is_some_and(|n| n.state == TaskState::Executing);
            if !open {
                return;
            }
            inner
                .bus
                .publish(Event::task(EventName::TaskStarted, id).in_workflow(inner.id));
        }

        let outcome = task.run(&ctx);

        match outcome {
            Ok(value) => Self::on_finished(&inner, id, value),
            Err(error) => Self::on_failed(&inner, id, error),
        }
    }

    fn on_finished(inner: &Arc<WorkflowInner>, id: TaskId, value: Value) {
        let _seq = inner.sequencer.lock();
        let (runnable, completed) = {
            let mut graph = inner.graph.lock();
            let dependents = match graph.nodes.get_mut(&id) {
                Some(node) if node.state == TaskState::Executing => {
                    node.state = TaskState::Finished;
                    node.result = Some(value.clone());
                    node.dependents.clone()
                }
                _ => {
                    debug!(workflow = %inner.id, task = %id, "discarding result of cancelled task");
                    return;
                }
            };
            let runnable: Vec<(Task, TaskContext)> = dependents
                .into_iter()
                .filter_map(|dep| graph.claim(dep, inner.id))
                .collect();
            let completed = !graph.completed && graph.all_finished();
            if completed {
                graph.completed = true;
            }
            (runnable, completed)
        };

        debug!(workflow = %inner.id, task = %id, unblocked = runnable.len(), "task finished");
        inner.bus.publish(
            Event::task(EventName::TaskFinished, id)
                .in_workflow(inner.id)
                .with_payload(EventPayload {
                    result_code: Some(0),
                    result: Some(value),
                    ..Default::default()
                }),
        );
        for (task, ctx) in runnable {
            Self::launch(Arc::clone(inner), task, ctx);
        }
        if completed {
            debug!(workflow = %inner.id, "workflow completed");
            inner
                .bus
                .publish(Event::workflow(EventName::WorkflowCompleted, inner.id));
        }
    }

    fn on_failed(inner: &Arc<WorkflowInner>, id: TaskId, error: TaskError) {
        let _seq = inner.sequencer.lock();
        {
            let mut graph = inner.graph.lock();
            match graph.nodes.get_mut(&id) {
                Some(node) if node.state == TaskState::Executing => {
                    node.state = TaskState::Failed;
                }
                _ => return,
            }
        }

        debug!(workflow = %inner.id, task = %id, code = error.code, "task failed");
        let payload = EventPayload {
            result_code: Some(error.code),
            error: Some(error.message),
            ..Default::default()
        };
        inner.bus.publish(
            Event::task(EventName::TaskFailed, id)
                .in_workflow(inner.id)
                .with_payload(payload.clone()),
        );
        inner.bus.publish(
            Event::workflow(EventName::WorkflowTaskFailed, inner.id).with_payload(EventPayload {
                task: Some(id),
                ..payload
            }),
        );
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("bus", &self.inner.bus.id())
            .finish_non_exhaustive()
    }
}
