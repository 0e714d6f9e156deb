//! The isolated event bus owned by one test case.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use tracing::debug;
use tsk_core::EventBus;

/// An [`EventBus`] created for, and closed with, a single test case.
///
/// Never the process default bus. Hand [`shared`](Self::shared) to the engine
/// so fixtures publish here instead of on a bus other tests can see.
pub struct TestEventBus {
    bus: Arc<EventBus>,
    owner: String,
}

impl TestEventBus {
    /// Creates a fresh bus owned by `owner` (normally the test name).
    pub fn new(owner: impl Into<String>) -> Self {
        let bus = Arc::new(EventBus::new());
        let owner = owner.into();
        debug!(test = %owner, bus = %bus.id(), "test event bus created");
        Self { bus, owner }
    }

    /// A handle to the underlying bus for wiring into workflows.
    pub fn shared(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    /// The test that owns this bus.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Closes the bus: subscribers are dropped and later events discarded.
    pub fn teardown(&self) {
        self.bus.close();
    }
}

impl Deref for TestEventBus {
    type Target = EventBus;

    fn deref(&self) -> &EventBus {
        &self.bus
    }
}

impl Drop for TestEventBus {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for TestEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestEventBus")
            .field("owner", &self.owner)
            .field("bus", &self.bus)
            .finish()
    }
}
