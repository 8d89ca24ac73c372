#![allow(dead_code)]

use std::{sync::Once, time::Duration};

use brick_core::utils::RobotConfig;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per test binary. Filter with
/// `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Short delays so tests finish quickly, with a reply watchdog so a broken
/// actor fails the test instead of hanging it.
pub fn fast_config() -> RobotConfig {
    RobotConfig {
        idle_timeout_ms: 20,
        reply_poll_ms: 2,
        reply_timeout_ms: Some(5_000),
        settle_delay_ms: 10,
        motion_settle_timeout_ms: 500,
    }
}
