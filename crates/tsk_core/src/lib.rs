//! TSK Core Library
//!
//! A small task/workflow engine whose only contract with the outside world is
//! the lifecycle events it publishes:
//! - Task and workflow identities
//! - Typed event envelopes
//! - An injectable publish/subscribe [`EventBus`]
//! - Thread-per-task workflow execution over a dependency graph
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::mpsc;
//! use std::time::Duration;
//! use tsk_core::{Event, EventBus, EventName, Task, Workflow};
//!
//! let bus = Arc::new(EventBus::new());
//! let (tx, rx) = mpsc::channel();
//! let tx = std::sync::Mutex::new(tx);
//! bus.subscribe(Arc::new(move |event: &Event| {
//!     let _ = tx.lock().unwrap().send(event.name);
//! }));
//!
//! let workflow = Workflow::new("hello", Arc::clone(&bus));
//! let fetch = workflow.add_task(Task::noop("fetch"), &[]).unwrap();
//! workflow.add_task(Task::noop("render"), &[fetch]).unwrap();
//! workflow.start().unwrap();
//!
//! loop {
//!     let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
//!     if name == EventName::WorkflowCompleted {
//!         break;
//!     }
//! }
//! assert!(workflow.is_finished());
//! ```

mod bus;
mod error;
mod event;
mod ids;
mod task;
mod workflow;

pub use bus::{EventBus, EventSubscriber, SubscriptionId};
pub use error::{CoreError, Result};
pub use event::{Event, EventName, EventPayload, Subject};
pub use ids::{BusId, TaskId, WorkflowId};
pub use task::{Operation, Task, TaskContext, TaskError, TaskState};
pub use workflow::Workflow;
