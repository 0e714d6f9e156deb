//! Reproducible randomness for tests.
//!
//! [`ProcessEntropy`] is established once per test process from the OS entropy
//! source. Each test case owns a [`SeedManager`] that draws a [`TestSeed`] from
//! it, seeds the test-local generator with that value and logs it. Feeding a
//! logged seed back through `TSK_TEST_SEED` (or [`SeedManager::reseed`])
//! replays the same sequence of random draws.

use crate::config::SEED_ENV;
use crate::error::HarnessError;
use crate::logging::SEED_TARGET;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tracing::{debug, info};

/// Process-wide entropy that per-test seeds are drawn from.
pub struct ProcessEntropy {
    rng: Mutex<StdRng>,
    draws: AtomicU64,
}

impl ProcessEntropy {
    /// Seeds process entropy from the operating system.
    ///
    /// Call once per process. Establishing a second instance and drawing from
    /// both defeats reproducibility; nothing here prevents it.
    pub fn establish() -> Self {
        debug!("process entropy established from OS source");
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
            draws: AtomicU64::new(0),
        }
    }

    /// Deterministic process entropy.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            draws: AtomicU64::new(0),
        }
    }

    /// The process-scoped instance, established on first use.
    pub fn shared() -> &'static ProcessEntropy {
        static SHARED: OnceLock<ProcessEntropy> = OnceLock::new();
        SHARED.get_or_init(Self::establish)
    }

    /// Draws a fresh seed value.
    pub fn draw_seed(&self) -> u64 {
        self.draws.fetch_add(1, Ordering::Relaxed);
        self.rng.lock().gen()
    }

    /// Number of seeds drawn so far.
    pub fn draws(&self) -> u64 {
        self.draws.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for ProcessEntropy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessEntropy")
            .field("draws", &self.draws())
            .finish_non_exhaustive()
    }
}

/// Seed applied to a test's local generator. Displays as a plain decimal
/// integer so it can be copied back into `TSK_TEST_SEED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestSeed(u64);

impl TestSeed {
    /// Wraps a raw seed value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TestSeed {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for TestSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TestSeed {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(TestSeed)
            .map_err(|e| HarnessError::InvalidSeed(format!("{:?}: {}", s, e)))
    }
}

/// Per-test seed state and the test-local generator.
pub struct SeedManager<'e> {
    entropy: &'e ProcessEntropy,
    test_name: String,
    replay: Option<TestSeed>,
    rng: ChaCha8Rng,
    history: Vec<TestSeed>,
}

impl<'e> SeedManager<'e> {
    /// Creates the seed state for one test. `replay` forces the first seed.
    pub fn new(entropy: &'e ProcessEntropy, test_name: impl Into<String>, replay: Option<TestSeed>) -> Self {
        Self {
            entropy,
            test_name: test_name.into(),
            replay,
            rng: ChaCha8Rng::seed_from_u64(0),
            history: Vec::new(),
        }
    }

    /// Draws a new seed, reseeds the local generator and logs the value.
    ///
    /// The first call uses the replay seed when one is configured.
    pub fn begin_test_seed(&mut self) -> TestSeed {
        let (seed, replayed) = match self.replay {
            Some(seed) if self.history.is_empty() => (seed, true),
            _ => (TestSeed::new(self.entropy.draw_seed()), false),
        };
        self.apply(seed);
        info!(
            target: SEED_TARGET,
            test = %self.test_name,
            seed = %seed,
            replayed,
            "test seed {}; reproduce with {}={}",
            seed,
            SEED_ENV,
            seed
        );
        seed
    }

    /// Forces the local generator to `seed`, e.g. one read from a failure log.
    pub fn reseed(&mut self, seed: TestSeed) {
        self.apply(seed);
        info!(target: SEED_TARGET, test = %self.test_name, seed = %seed, "test generator reseeded to {}", seed);
    }

    /// The test-local generator. Begins a seed first if none has been begun.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        if self.history.is_empty() {
            self.begin_test_seed();
        }
        &mut self.rng
    }

    /// Seed most recently applied.
    pub fn current_seed(&self) -> Option<TestSeed> {
        self.history.last().copied()
    }

    /// Every seed applied in this test, oldest first.
    pub fn seed_history(&self) -> &[TestSeed] {
        &self.history
    }

    /// Name of the test this state belongs to.
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    fn apply(&mut self, seed: TestSeed) {
        self.rng = ChaCha8Rng::seed_from_u64(seed.value());
        self.history.push(seed);
    }
}

impl fmt::Debug for SeedManager<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeedManager")
            .field("test_name", &self.test_name)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}
