//! Timing configuration shared by every actor and proxy of a robot.
//!
//! All fields are optional when deserializing; missing ones take the values
//! from [`RobotConfig::default`].
//!
//! ```rust
//! use brick_core::utils::config::RobotConfig;
//! let cfg = RobotConfig::from_json_str(r#"{ "settle_delay_ms": 150 }"#).unwrap();
//! assert_eq!(cfg.settle_delay_ms, 150);
//! assert_eq!(cfg.idle_timeout_ms, 500);
//! ```

use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Timing knobs for actors and proxies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    /// Longest time a worker sleeps between queue drains when nothing is
    /// enqueued. Bounds how late session expiry is noticed.
    pub idle_timeout_ms: u64,
    /// Interval at which a synchronous caller re-checks its reply slot.
    pub reply_poll_ms: u64,
    /// Optional upper bound on a synchronous wait. `None` waits as long as
    /// the actor is alive.
    pub reply_timeout_ms: Option<u64>,
    /// Settle delay after a sensor mode or illumination change.
    pub settle_delay_ms: u64,
    /// How long `close()` lets in-flight motion finish before braking.
    pub motion_settle_timeout_ms: u64,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 500,
            reply_poll_ms: 10,
            reply_timeout_ms: None,
            settle_delay_ms: 300,
            motion_settle_timeout_ms: 10_000,
        }
    }
}

impl RobotConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn reply_poll(&self) -> Duration {
        Duration::from_millis(self.reply_poll_ms.max(1))
    }

    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout_ms.map(Duration::from_millis)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn motion_settle_timeout(&self) -> Duration {
        Duration::from_millis(self.motion_settle_timeout_ms)
    }
}
