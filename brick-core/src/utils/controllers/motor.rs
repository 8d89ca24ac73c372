//! Regulated motor proxy.
//!
//! `forward`, `backward`, `stop`, `set_speed` and `reset_tacho_count` are fire
//! and forget. Reads and the synchronous rotations block until the motor's
//! actor has answered. Every call on one motor is applied in issue order.
//!
//! ```rust
//! use std::sync::Arc;
//! use brick_core::utils::{actor::Session, controllers::*, config::RobotConfig, sim::SimBrick};
//!
//! let brick = SimBrick::new();
//! let session = Session::new();
//! let motor = Motor::open(Arc::new(brick.clone()), MotorPort::A, MotorKind::Large,
//!                         session.token(), &RobotConfig::default()).unwrap();
//! motor.set_speed(360).unwrap();
//! motor.rotate(90, false).unwrap();
//! assert_eq!(motor.tacho_count().unwrap(), 90);
//! motor.close();
//! ```

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use super::ports::{MotorKind, MotorPort};
use crate::utils::{
    actor::{Command, CommandError, DeviceActor, Executor, SessionToken, WorkerHandle},
    config::RobotConfig,
    error::{ArgumentError, DeviceError, Result},
    handle::{DeviceHandleFactory, MotorHandle, TransportError},
};

/// Motor command kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotorAction {
    Forward,
    Backward,
    Stop,
    SetSpeed,
    GetSpeed,
    GetMaxSpeed,
    IsMoving,
    IsStalled,
    Rotate,
    RotateTo,
    ResetTachoCount,
    GetTachoCount,
}

/// Motor command payloads and replies.
#[derive(Debug, Clone, PartialEq)]
pub enum MotorValue {
    Speed { deg_per_s: u32 },
    MaxSpeed { deg_per_s: f32 },
    Flag { value: bool },
    Tacho { degrees: i32 },
    Rotation { degrees: i32, immediate: bool },
    Ack,
}

pub(crate) struct MotorExecutor {
    port: MotorPort,
    kind: MotorKind,
    factory: Arc<dyn DeviceHandleFactory>,
    /// Last motion command was `forward`/`backward`, which never ends on
    /// its own.
    unbounded: bool,
}

impl Executor for MotorExecutor {
    type Kind = MotorAction;
    type Value = MotorValue;
    type Handle = Box<dyn MotorHandle>;

    fn label(&self) -> String {
        self.port.name().to_owned()
    }

    fn device(&self) -> String {
        format!("motor ({})", self.kind.code())
    }

    fn open(&mut self) -> Result<Self::Handle, TransportError> {
        self.factory.open_motor(self.port, self.kind)
    }

    fn execute(
        &mut self,
        motor: &mut Self::Handle,
        command: &Command<MotorAction, MotorValue>,
    ) -> Result<(), CommandError> {
        let Some(action) = command.kind() else {
            return Err(CommandError::Malformed("motor command without a kind".into()));
        };
        match action {
            MotorAction::Forward => {
                motor.forward()?;
                self.unbounded = true;
            }
            MotorAction::Backward => {
                motor.backward()?;
                self.unbounded = true;
            }
            MotorAction::Stop => {
                motor.stop(true)?;
                self.unbounded = false;
            }
            MotorAction::SetSpeed => match command.input() {
                Some(MotorValue::Speed { deg_per_s }) => motor.set_speed(deg_per_s)?,
                other => return Err(malformed(action, other)),
            },
            MotorAction::Rotate | MotorAction::RotateTo => match command.input() {
                Some(MotorValue::Rotation { degrees, immediate }) => {
                    if action == MotorAction::Rotate {
                        motor.rotate(degrees, immediate)?;
                    } else {
                        motor.rotate_to(degrees, immediate)?;
                    }
                    self.unbounded = false;
                }
                other => return Err(malformed(action, other)),
            },
            MotorAction::ResetTachoCount => motor.reset_tacho_count()?,
            MotorAction::GetSpeed => {
                let deg_per_s = motor.speed()?;
                command.fill(MotorValue::Speed { deg_per_s });
                return Ok(());
            }
            MotorAction::GetMaxSpeed => {
                let deg_per_s = motor.max_speed()?;
                command.fill(MotorValue::MaxSpeed { deg_per_s });
                return Ok(());
            }
            MotorAction::IsMoving => {
                let value = motor.is_moving()?;
                command.fill(MotorValue::Flag { value });
                return Ok(());
            }
            MotorAction::IsStalled => {
                let value = motor.is_stalled()?;
                command.fill(MotorValue::Flag { value });
                return Ok(());
            }
            MotorAction::GetTachoCount => {
                let degrees = motor.tacho_count()?;
                command.fill(MotorValue::Tacho { degrees });
                return Ok(());
            }
        }
        command.clear();
        Ok(())
    }

    /// Let in-flight rotations finish, brake if they run past the configured
    /// window, and only close the handle once the motor reports rest.
    /// Continuous motion is braked straight away.
    fn release(
        &mut self,
        mut motor: Self::Handle,
        config: &RobotConfig,
    ) -> Result<(), TransportError> {
        let poll = config.reply_poll();
        let window = config.motion_settle_timeout();

        if std::mem::take(&mut self.unbounded) {
            tracing::debug!(port = %self.port, "motor running without a target, braking");
            motor.stop(false)?;
        }
        if !wait_for_rest(motor.as_mut(), window, poll)? {
            tracing::warn!(port = %self.port, "motor still moving at close, braking");
            motor.stop(false)?;
            if !wait_for_rest(motor.as_mut(), window, poll)? {
                return Err(TransportError::new("motor did not come to rest"));
            }
        }

        tracing::debug!(port = %self.port, "motor at rest, closing handle");
        motor.close()
    }
}

/// Poll until the motor reports rest. False if `window` passed first.
fn wait_for_rest(
    motor: &mut dyn MotorHandle,
    window: Duration,
    poll: Duration,
) -> Result<bool, TransportError> {
    let deadline = Instant::now() + window;
    loop {
        if !motor.is_moving()? {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        thread::sleep(poll);
    }
}

fn malformed(
    action: MotorAction,
    input: Option<MotorValue>,
) -> CommandError {
    CommandError::Malformed(format!("{action:?} does not accept payload {input:?}"))
}

/// Proxy for one regulated motor.
///
/// Clones share the same actor.
#[derive(Clone)]
pub struct Motor {
    port: MotorPort,
    kind: MotorKind,
    actor: Arc<DeviceActor<MotorExecutor>>,
}

impl Motor {
    /// Open the motor on `port` and start its actor.
    pub fn open(
        factory: Arc<dyn DeviceHandleFactory>,
        port: MotorPort,
        kind: MotorKind,
        session: SessionToken,
        config: &RobotConfig,
    ) -> Result<Self> {
        let executor = MotorExecutor {
            port,
            kind,
            factory,
            unbounded: false,
        };
        let actor = DeviceActor::spawn(executor, session, config)?;
        Ok(Self { port, kind, actor })
    }

    pub fn port(&self) -> MotorPort {
        self.port
    }

    pub fn kind(&self) -> MotorKind {
        self.kind
    }

    /// Start rotating forwards.
    pub fn forward(&self) -> Result<()> {
        self.send(MotorAction::Forward)
    }

    /// Start rotating backwards.
    pub fn backward(&self) -> Result<()> {
        self.send(MotorAction::Backward)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(MotorAction::Stop)
    }

    /// Set the regulated speed in degrees per second.
    pub fn set_speed(
        &self,
        deg_per_s: i32,
    ) -> Result<()> {
        let deg_per_s = u32::try_from(deg_per_s).map_err(|_| ArgumentError::NegativeSpeed(deg_per_s))?;
        self.actor
            .enqueue(Command::with_input(Some(MotorAction::SetSpeed), MotorValue::Speed { deg_per_s }))
    }

    pub fn speed(&self) -> Result<u32> {
        match self.actor.request(Some(MotorAction::GetSpeed))? {
            MotorValue::Speed { deg_per_s } => Ok(deg_per_s),
            other => Err(self.unexpected(other)),
        }
    }

    pub fn max_speed(&self) -> Result<f32> {
        match self.actor.request(Some(MotorAction::GetMaxSpeed))? {
            MotorValue::MaxSpeed { deg_per_s } => Ok(deg_per_s),
            other => Err(self.unexpected(other)),
        }
    }

    pub fn is_moving(&self) -> Result<bool> {
        self.flag(MotorAction::IsMoving)
    }

    pub fn is_stalled(&self) -> Result<bool> {
        self.flag(MotorAction::IsStalled)
    }

    /// Rotate by `degrees`. Unless `immediate_return` is set this blocks
    /// until the motion has completed; otherwise poll [`Motor::is_moving`].
    pub fn rotate(
        &self,
        degrees: i32,
        immediate_return: bool,
    ) -> Result<()> {
        self.rotation(MotorAction::Rotate, degrees, immediate_return)
    }

    /// Rotate to the absolute tacho position `degrees`.
    pub fn rotate_to(
        &self,
        degrees: i32,
        immediate_return: bool,
    ) -> Result<()> {
        self.rotation(MotorAction::RotateTo, degrees, immediate_return)
    }

    pub fn reset_tacho_count(&self) -> Result<()> {
        self.send(MotorAction::ResetTachoCount)
    }

    pub fn tacho_count(&self) -> Result<i32> {
        match self.actor.request(Some(MotorAction::GetTachoCount))? {
            MotorValue::Tacho { degrees } => Ok(degrees),
            other => Err(self.unexpected(other)),
        }
    }

    /// Stop accepting commands, let queued ones and any rotation in flight
    /// finish, then release the motor. A motor left running by `forward` or
    /// `backward` is braked. Idempotent.
    pub fn close(&self) {
        self.actor.close();
    }

    pub fn is_open(&self) -> bool {
        self.actor.is_running()
    }

    pub fn worker(&self) -> WorkerHandle {
        self.actor.worker()
    }

    pub(crate) fn actor_id(&self) -> u64 {
        self.actor.id()
    }

    pub(crate) fn on_stop(
        &self,
        hook: impl FnOnce() + Send + 'static,
    ) {
        self.actor.on_stop(hook);
    }

    fn send(
        &self,
        action: MotorAction,
    ) -> Result<()> {
        self.actor.enqueue(Command::new(Some(action)))
    }

    fn flag(
        &self,
        action: MotorAction,
    ) -> Result<bool> {
        match self.actor.request(Some(action))? {
            MotorValue::Flag { value } => Ok(value),
            other => Err(self.unexpected(other)),
        }
    }

    fn rotation(
        &self,
        action: MotorAction,
        degrees: i32,
        immediate: bool,
    ) -> Result<()> {
        let input = MotorValue::Rotation { degrees, immediate };
        if immediate {
            self.actor.enqueue(Command::with_input(Some(action), input))
        } else {
            self.actor.perform(Some(action), input)
        }
    }

    fn unexpected(
        &self,
        reply: MotorValue,
    ) -> DeviceError {
        DeviceError::Transport {
            port: self.port.name().to_owned(),
            source: TransportError::new(format!("unexpected reply {reply:?}")),
        }
    }
}

impl std::fmt::Debug for Motor {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Motor")
            .field("port", &self.port)
            .field("kind", &self.kind)
            .field("open", &self.is_open())
            .finish()
    }
}
