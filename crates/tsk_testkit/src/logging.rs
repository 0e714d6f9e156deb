//! Test log output.

use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

/// Target of the per-test seed line. Kept at `info` whatever the filter says,
/// since a failure cannot be replayed without it.
pub(crate) const SEED_TARGET: &str = "tsk_testkit::seed";

/// Installs a fmt subscriber writing through the libtest capture.
///
/// `RUST_LOG` takes precedence over `default_filter`. Seed lines stay enabled
/// under any filter. Safe to call from every test; only the first call in a
/// process installs anything.
pub fn init_test_logging(default_filter: &str) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(harness_filter(env.as_deref(), default_filter))
        .with_test_writer()
        .with_target(false)
        .try_init();
}

/// `env` when it parses, else `default_filter`, else `info`; plus the seed directive.
pub(crate) fn harness_filter(env: Option<&str>, default_filter: &str) -> EnvFilter {
    let filter = env
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(default_filter).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    match format!("{}=info", SEED_TARGET).parse::<Directive>() {
        Ok(seed) => filter.add_directive(seed),
        Err(_) => filter,
    }
}
