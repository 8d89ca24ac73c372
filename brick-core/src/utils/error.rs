//! Error types surfaced by device proxies.

use thiserror::Error;

use crate::utils::handle::TransportError;

/// A caller passed an argument the device contract does not accept.
///
/// Raised before anything is queued, so the device never sees the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("invalid speed {0}: speed must not be negative")]
    NegativeSpeed(i32),
    #[error("invalid frequency {0} Hz: frequencies below 1 Hz are invalid")]
    Frequency(i32),
    #[error("invalid duration {0} ms: durations below 1 ms are invalid")]
    Duration(i32),
    #[error("invalid volume {value}: volume must be within {min}-{max}")]
    Volume { value: i32, min: i32, max: i32 },
}

/// Errors returned by motor and sensor proxies.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    #[error(transparent)]
    Argument(#[from] ArgumentError),

    /// The device handle could not be opened, either when the proxy was
    /// built or when the worker tried to reopen it.
    #[error("failed to open {device} on port {port}: {source}")]
    Open {
        port: String,
        device: String,
        #[source]
        source: TransportError,
    },

    /// A handle call failed mid-operation. The actor is gone after this.
    #[error("transport failure on port {port}: {source}")]
    Transport {
        port: String,
        #[source]
        source: TransportError,
    },

    #[error("device on port {0} is closed")]
    Closed(String),

    #[error("timed out waiting for a reply from port {0}")]
    Timeout(String),

    /// The worker skipped the command without touching the device. The
    /// proxy stays usable.
    #[error("command rejected on port {port}: {reason}")]
    Rejected { port: String, reason: String },
}

impl DeviceError {
    /// Whether the proxy that returned this error can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DeviceError::Open { .. } | DeviceError::Transport { .. } | DeviceError::Closed(_)
        )
    }
}

pub type Result<T, E = DeviceError> = core::result::Result<T, E>;
