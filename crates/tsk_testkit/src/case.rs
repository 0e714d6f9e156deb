//! The per-test harness object.

use crate::bus::TestEventBus;
use crate::config::HarnessConfig;
use crate::error::Result;
use crate::expectation::{wait_for_all, PendingExpectation, Scope, Verify};
use crate::fixtures::{
    default_fixture_name, notification_test_workflow, random_fixture_name, WorkflowFixture,
    WorkflowShape,
};
use crate::logging::init_test_logging;
use crate::seed::{ProcessEntropy, SeedManager, TestSeed};
use parking_lot::Mutex;
use rand_chacha::ChaCha8Rng;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::debug;
use tsk_core::{Event, EventBus, EventName, Task, TaskId, Workflow};

/// Everything one randomized, event-driven test needs.
///
/// Construction logs a fresh seed. The event bus is created on first use and,
/// together with every expectation still pending, torn down when the case is
/// dropped.
///
/// ```
/// use std::time::Duration;
/// use tsk_core::EventName;
/// use tsk_testkit::TestCase;
///
/// let case = TestCase::new("doc_example").unwrap();
/// let fixture = case.build_notification_test_workflow().unwrap();
/// case.expect_event(EventName::TaskFinished, fixture.sink);
/// fixture.workflow.start().unwrap();
/// case.wait_for_expectations(Duration::from_secs(5)).unwrap();
/// ```
pub struct TestCase<'e> {
    name: String,
    config: HarnessConfig,
    seeds: SeedManager<'e>,
    bus: OnceLock<TestEventBus>,
    awaiting: Mutex<Vec<PendingExpectation>>,
    registered: Mutex<Vec<PendingExpectation>>,
    torn_down: bool,
}

impl TestCase<'static> {
    /// Sets up a case using the process-shared entropy and discovered config.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let config = HarnessConfig::discover()?;
        Ok(Self::with_entropy(name, ProcessEntropy::shared(), config))
    }
}

impl<'e> TestCase<'e> {
    /// Sets up a case drawing seeds from `entropy`.
    pub fn with_entropy(name: impl Into<String>, entropy: &'e ProcessEntropy, config: HarnessConfig) -> Self {
        init_test_logging(&config.logging.filter);
        let name = name.into();
        let mut seeds = SeedManager::new(entropy, name.clone(), config.replay_seed());
        seeds.begin_test_seed();
        Self {
            name,
            config,
            seeds,
            bus: OnceLock::new(),
            awaiting: Mutex::new(Vec::new()),
            registered: Mutex::new(Vec::new()),
            torn_down: false,
        }
    }

    /// The test's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration in effect.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    // ===== Seeds =====

    /// The seed currently applied to [`rng`](Self::rng).
    pub fn seed(&self) -> TestSeed {
        self.seeds
            .current_seed()
            .unwrap_or_else(|| TestSeed::new(0))
    }

    /// Draws, applies and logs a new seed.
    pub fn begin_test_seed(&mut self) -> TestSeed {
        self.seeds.begin_test_seed()
    }

    /// Forces the generator to a previously logged seed.
    pub fn reseed(&mut self, seed: TestSeed) {
        self.seeds.reseed(seed);
    }

    /// Every seed applied in this case, oldest first.
    pub fn seed_history(&self) -> &[TestSeed] {
        self.seeds.seed_history()
    }

    /// The test-local generator.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        self.seeds.rng()
    }

    // ===== Event bus =====

    /// The case's isolated bus, created on first access.
    pub fn event_bus(&self) -> &TestEventBus {
        self.bus.get_or_init(|| TestEventBus::new(self.name.clone()))
    }

    /// A handle to the case's bus for wiring into workflows.
    pub fn bus(&self) -> Arc<EventBus> {
        self.event_bus().shared()
    }

    // ===== Expectations =====

    /// Waits for `name` posted by `task`.
    pub fn expect_event(&self, name: EventName, task: TaskId) -> PendingExpectation {
        self.register(name, Scope::Task(task), None)
    }

    /// Waits for `name` posted by `workflow` and accepted by `verify`.
    pub fn expect_workflow_event<F>(&self, name: EventName, workflow: &Workflow, verify: F) -> PendingExpectation
    where
        F: FnMut(&Event) -> bool + Send + 'static,
    {
        self.register(name, Scope::Workflow(workflow.id()), Some(Box::new(verify)))
    }

    /// Waits for `name` from any publisher in `scope`.
    pub fn expect_event_in(&self, name: EventName, scope: Scope) -> PendingExpectation {
        self.register(name, scope, None)
    }

    /// Waits for `name` from `scope`, fulfilled by the first event `verify` accepts.
    pub fn expect_event_with<F>(&self, name: EventName, scope: Scope, verify: F) -> PendingExpectation
    where
        F: FnMut(&Event) -> bool + Send + 'static,
    {
        self.register(name, scope, Some(Box::new(verify)))
    }

    fn register(&self, name: EventName, scope: Scope, verify: Option<Verify>) -> PendingExpectation {
        let description = format!("{} from {} in {}", name, scope, self.name);
        let expectation =
            PendingExpectation::register(&self.bus(), name, scope, verify, description);
        self.awaiting.lock().push(expectation.clone());
        self.registered.lock().push(expectation.clone());
        expectation
    }

    /// Number of expectations registered since the last wait.
    pub fn awaiting_count(&self) -> usize {
        self.awaiting.lock().len()
    }

    /// Blocks until every expectation registered since the last wait is
    /// fulfilled, or fails naming those that were not.
    pub fn wait_for_expectations(&self, timeout: Duration) -> Result<()> {
        let batch = std::mem::take(&mut *self.awaiting.lock());
        wait_for_all(&batch, timeout)
    }

    /// [`wait_for_expectations`](Self::wait_for_expectations) with the configured default timeout.
    pub fn wait_for_expectations_default(&self) -> Result<()> {
        self.wait_for_expectations(self.config.expectations.default_timeout())
    }

    /// Blocks on an explicit set of expectations.
    pub fn wait_for(&self, expectations: &[PendingExpectation], timeout: Duration) -> Result<()> {
        self.awaiting
            .lock()
            .retain(|pending| !expectations.iter().any(|e| e.is_same(pending)));
        wait_for_all(expectations, timeout)
    }

    // ===== Fixtures =====

    /// The shared diamond workflow, publishing on this case's bus.
    pub fn build_notification_test_workflow(&self) -> Result<WorkflowFixture> {
        notification_test_workflow(&self.bus(), format!("{}.notifications", self.name))
    }

    /// Stable label for a task fixture created by this test.
    pub fn default_name_for_task(&self, task: &Task) -> String {
        default_fixture_name(&self.name, task)
    }

    /// A random, seed-determined fixture name.
    pub fn random_name(&mut self, prefix: &str) -> String {
        random_fixture_name(self.seeds.rng(), prefix)
    }

    /// Draws a random shape and builds it on this case's bus.
    pub fn build_random_workflow(&mut self, max_tasks: usize) -> Result<(WorkflowShape, Workflow)> {
        let shape = WorkflowShape::random(self.seeds.rng(), max_tasks);
        let name = format!("{}.random-{}", self.name, self.seed());
        let workflow = shape.build(&self.bus(), name)?;
        Ok((shape, workflow))
    }

    // ===== Teardown =====

    /// Discards pending expectations and closes the bus. Runs on drop.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.awaiting.lock().clear();
        let registered = std::mem::take(&mut *self.registered.lock());
        for expectation in &registered {
            expectation.discard();
        }
        if let Some(bus) = self.bus.get() {
            bus.teardown();
        }
        debug!(test = %self.name, expectations = registered.len(), "test case torn down");
    }
}

impl Drop for TestCase<'_> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for TestCase<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("seed", &self.seeds.current_seed())
            .field("bus", &self.bus.get().map(|b| b.id()))
            .finish_non_exhaustive()
    }
}
