//! Serialized command-queue actors.
//!
//! - `command`: queued unit of work plus its reply slot
//! - `device`: the actor, its worker thread and [`WorkerHandle`]
//! - `session`: session lifetime tokens that trigger automatic teardown
//! - `shutdown`: process-wide registry for releasing every live actor

pub mod command;
pub mod device;
pub mod session;
pub mod shutdown;

use core::fmt;

pub use command::{Command, Reply};
pub use device::{DeviceActor, WorkerHandle};
pub use session::{Session, SessionToken};
pub use shutdown::{live_actors, release_all, release_on_exit, ReleaseGuard};

use crate::utils::{config::RobotConfig, handle::TransportError};

/// Why a single command could not be applied.
#[derive(Debug)]
pub enum CommandError {
    /// The handle call failed. Fatal for the actor.
    Transport(TransportError),
    /// The command does not make sense for this device. Logged and skipped;
    /// a caller waiting on it gets [`DeviceError::Rejected`].
    ///
    /// [`DeviceError::Rejected`]: crate::utils::error::DeviceError::Rejected
    Malformed(String),
}

impl From<TransportError> for CommandError {
    fn from(e: TransportError) -> Self {
        CommandError::Transport(e)
    }
}

/// Device-family behaviour plugged into a [`DeviceActor`].
///
/// The executor is moved onto the worker thread together with the handle it
/// opens, so it is the only code that ever calls into the device.
pub trait Executor: Send + 'static {
    /// Command discriminator for this family.
    type Kind: Copy + fmt::Debug + Send + 'static;
    /// Payload and reply type carried in the command slot.
    type Value: Clone + Send + 'static;
    type Handle: Send + 'static;

    /// Port label used in logs and errors.
    fn label(&self) -> String;

    /// Device descriptor used in open errors.
    fn device(&self) -> String;

    fn open(&mut self) -> Result<Self::Handle, TransportError>;

    /// Apply one command, writing its reply or clearing its slot.
    fn execute(
        &mut self,
        handle: &mut Self::Handle,
        command: &Command<Self::Kind, Self::Value>,
    ) -> Result<(), CommandError>;

    /// Bring the device to a safe state and close the handle.
    fn release(
        &mut self,
        handle: Self::Handle,
        config: &RobotConfig,
    ) -> Result<(), TransportError>;
}
