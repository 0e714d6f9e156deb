//! Expectations: named events a test blocks on until they arrive or time out.
//!
//! An expectation subscribes to a bus and inspects every event synchronously on
//! the publisher's thread. Matching and verification for one expectation run
//! under that expectation's own lock, so its callback is never invoked
//! concurrently with itself, while separate expectations evaluate in parallel.
//! The first accepted event fulfills it; everything after is ignored.

use crate::error::{HarnessError, Result};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};
use tsk_core::{Event, EventBus, EventName, EventSubscriber, Subject, SubscriptionId, TaskId, WorkflowId};

/// Callback deciding whether a matching event satisfies an expectation.
///
/// Must not call back into the expectation it belongs to.
pub type Verify = Box<dyn FnMut(&Event) -> bool + Send>;

/// Which publishers an expectation listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Any publisher on the bus.
    Any,
    /// Events posted by this task.
    Task(TaskId),
    /// Events posted by this workflow itself.
    Workflow(WorkflowId),
    /// Events posted by this workflow or any of its tasks.
    InWorkflow(WorkflowId),
}

impl Scope {
    /// Whether `event` was posted inside this scope.
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Self::Any => true,
            Self::Task(id) => event.source == Subject::Task(*id),
            Self::Workflow(id) => event.source == Subject::Workflow(*id),
            Self::InWorkflow(id) => event.workflow == Some(*id),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any publisher"),
            Self::Task(id) => write!(f, "{}", id),
            Self::Workflow(id) => write!(f, "{}", id),
            Self::InWorkflow(id) => write!(f, "tasks of {}", id),
        }
    }
}

/// Fulfillment state of an expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpectationState {
    /// Still waiting for an accepted event.
    Pending,
    /// An event was accepted.
    Fulfilled,
    /// A wait's deadline passed first.
    TimedOut,
    /// Dropped at teardown while still pending.
    Discarded,
}

struct Progress {
    state: ExpectationState,
    verify: Option<Verify>,
    fulfillments: u32,
    rejections: u32,
    fulfilled_by: Option<Event>,
}

struct Shared {
    description: String,
    name: EventName,
    scope: Scope,
    progress: Mutex<Progress>,
    settled: Condvar,
}

impl Shared {
    fn offer(&self, event: &Event) -> bool {
        if event.name != self.name || !self.scope.matches(event) {
            return false;
        }

        let mut progress = self.progress.lock();
        if progress.state != ExpectationState::Pending {
            return false;
        }
        let accepted = match progress.verify.as_mut() {
            Some(verify) => verify(event),
            None => true,
        };
        if !accepted {
            progress.rejections += 1;
            trace!(expectation = %self.description, rejections = progress.rejections, "event rejected by verification");
            return false;
        }

        progress.state = ExpectationState::Fulfilled;
        progress.fulfillments += 1;
        progress.fulfilled_by = Some(event.clone());
        progress.verify = None;
        drop(progress);

        self.settled.notify_all();
        debug!(expectation = %self.description, "expectation fulfilled");
        true
    }

    /// Blocks until no longer pending or `deadline` passes. True if fulfilled.
    /// Without a deadline it blocks until the expectation settles.
    fn wait_until(&self, deadline: Option<Instant>) -> bool {
        let mut progress = self.progress.lock();
        while progress.state == ExpectationState::Pending {
            match deadline {
                Some(deadline) => {
                    if self.settled.wait_until(&mut progress, deadline).timed_out() {
                        break;
                    }
                }
                None => self.settled.wait(&mut progress),
            }
        }
        progress.state == ExpectationState::Fulfilled
    }

    /// Moves a pending expectation to `state`. False if it already settled.
    fn settle_pending(&self, state: ExpectationState) -> bool {
        let mut progress = self.progress.lock();
        if progress.state != ExpectationState::Pending {
            return false;
        }
        progress.state = state;
        progress.verify = None;
        drop(progress);
        self.settled.notify_all();
        true
    }
}

struct Listener(Arc<Shared>);

impl EventSubscriber for Listener {
    fn deliver(&self, event: &Event) {
        self.0.offer(event);
    }
}

/// A registered wait for a named event.
///
/// Cloning yields another handle to the same expectation.
#[derive(Clone)]
pub struct PendingExpectation {
    shared: Arc<Shared>,
    bus: Arc<EventBus>,
    subscription: SubscriptionId,
}

impl PendingExpectation {
    /// Subscribes a new expectation to `bus`. `verify = None` accepts any
    /// event with the right name inside `scope`.
    pub fn register(
        bus: &Arc<EventBus>,
        name: EventName,
        scope: Scope,
        verify: Option<Verify>,
        description: impl Into<String>,
    ) -> Self {
        let shared = Arc::new(Shared {
            description: description.into(),
            name,
            scope,
            progress: Mutex::new(Progress {
                state: ExpectationState::Pending,
                verify,
                fulfillments: 0,
                rejections: 0,
                fulfilled_by: None,
            }),
            settled: Condvar::new(),
        });
        let subscription = bus.subscribe(Arc::new(Listener(Arc::clone(&shared))));
        debug!(expectation = %shared.description, bus = %bus.id(), "expectation registered");
        Self {
            shared,
            bus: Arc::clone(bus),
            subscription,
        }
    }

    /// Human-readable description used in timeout failures.
    pub fn description(&self) -> &str {
        &self.shared.description
    }

    /// Event name this expectation waits for.
    pub fn name(&self) -> EventName {
        self.shared.name
    }

    /// Publishers this expectation listens to.
    pub fn scope(&self) -> Scope {
        self.shared.scope
    }

    /// Current state.
    pub fn state(&self) -> ExpectationState {
        self.shared.progress.lock().state
    }

    /// Whether an event has been accepted.
    pub fn is_fulfilled(&self) -> bool {
        self.state() == ExpectationState::Fulfilled
    }

    /// Times this expectation was fulfilled: 0 or 1.
    pub fn fulfillment_count(&self) -> u32 {
        self.shared.progress.lock().fulfillments
    }

    /// Matching events the verification callback turned down.
    pub fn rejection_count(&self) -> u32 {
        self.shared.progress.lock().rejections
    }

    /// The event that fulfilled this expectation.
    pub fn fulfilled_by(&self) -> Option<Event> {
        self.shared.progress.lock().fulfilled_by.clone()
    }

    /// Whether both handles refer to the same expectation.
    pub fn is_same(&self, other: &PendingExpectation) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Waits for this expectation alone.
    pub fn wait(&self, timeout: Duration) -> Result<()> {
        wait_for_all(std::slice::from_ref(self), timeout)
    }

    /// Stops listening. A still-pending expectation becomes `Discarded`.
    pub fn discard(&self) {
        if self.shared.settle_pending(ExpectationState::Discarded) {
            debug!(expectation = %self.shared.description, "expectation discarded");
        }
        self.bus.unsubscribe(self.subscription);
    }

    fn release(&self) {
        self.bus.unsubscribe(self.subscription);
    }
}

impl fmt::Debug for PendingExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingExpectation")
            .field("description", &self.shared.description)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Blocks until every expectation is fulfilled or `timeout` elapses.
///
/// The deadline covers the whole set. On timeout every unmet expectation moves
/// to `TimedOut` and is named in the returned error. A timeout too large to
/// represent as an instant waits without a deadline.
pub fn wait_for_all(expectations: &[PendingExpectation], timeout: Duration) -> Result<()> {
    let deadline = Instant::now().checked_add(timeout);
    let mut unmet = Vec::new();

    for expectation in expectations {
        let fulfilled = expectation.shared.wait_until(deadline);
        if !fulfilled
            && (expectation.shared.settle_pending(ExpectationState::TimedOut)
                || !expectation.is_fulfilled())
        {
            unmet.push(expectation.description().to_string());
        }
        expectation.release();
    }

    if unmet.is_empty() {
        return Ok(());
    }
    let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    warn!(timeout_ms, unmet = ?unmet, "expectations timed out");
    Err(HarnessError::ExpectationTimeout { timeout_ms, unmet })
}
