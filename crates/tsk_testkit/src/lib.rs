//! TSK Testkit
//!
//! A test base for code driven by the `tsk_core` engine, providing:
//! - Reproducible randomness: one logged seed per test, replayable via `TSK_TEST_SEED`
//! - An isolated event bus per test
//! - Expectations that turn engine events into deadline-bounded assertions
//! - Reusable workflow fixtures
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//! use tsk_core::EventName;
//! use tsk_testkit::{Scope, TestCase};
//!
//! let case = TestCase::new("quick_start").unwrap();
//! let fixture = case.build_notification_test_workflow().unwrap();
//!
//! case.expect_event(EventName::TaskFinished, fixture.root);
//! case.expect_event_with(EventName::TaskFinished, Scope::InWorkflow(fixture.id()), |event| {
//!     event.payload.result_code == Some(0)
//! });
//! case.expect_workflow_event(EventName::WorkflowCompleted, &fixture.workflow, |_| true);
//!
//! fixture.workflow.start().unwrap();
//! case.wait_for_expectations(Duration::from_secs(5)).unwrap();
//! ```
//!
//! # Reproducing a failure
//!
//! Every case logs its seed when it is created:
//!
//! ```text
//! INFO test seed 8815359759562431246; reproduce with TSK_TEST_SEED=8815359759562431246
//! ```
//!
//! Re-running with that variable set makes the first seed of every case that
//! value, so the same random fixtures are built again.

mod bus;
mod case;
mod config;
mod error;
mod expectation;
mod fixtures;
mod logging;
mod seed;

pub use bus::TestEventBus;
pub use case::TestCase;
pub use config::{
    ExpectationConfig, HarnessConfig, LoggingConfig, SeedConfig, CONFIG_PATH_ENV, LOG_ENV,
    SEED_ENV, TIMEOUT_ENV,
};
pub use error::{HarnessError, Result};
pub use expectation::{wait_for_all, ExpectationState, PendingExpectation, Scope, Verify};
pub use fixtures::{
    default_fixture_name, notification_test_workflow, random_fixture_name, WorkflowFixture,
    WorkflowShape,
};
pub use logging::init_test_logging;
pub use seed::{ProcessEntropy, SeedManager, TestSeed};
