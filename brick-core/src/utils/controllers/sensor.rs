//! Generic sensor proxy.
//!
//! Every sensor family shares the same actor plumbing: a command with no
//! kind reads one raw sample from whichever mode is currently selected, and
//! every other kind is handed to the family. Commands that change the
//! sensor's mode or illumination start a settle window; the worker holds
//! back the next command until it has passed, and the caller that changed the
//! mode waits it out before getting control back.

use std::{fmt, marker::PhantomData, sync::Arc, time::Duration};

use super::{
    color::ColorFamily, gyro::GyroFamily, ports::SensorPort, ports::SensorType, touch::TouchFamily,
    ultrasonic::UltrasonicFamily,
};
use crate::utils::{
    actor::{Command, CommandError, DeviceActor, Executor, SessionToken, WorkerHandle},
    clock::Clock,
    config::RobotConfig,
    error::{DeviceError, Result},
    handle::{DeviceHandleFactory, SensorHandle, TransportError},
};

/// Raw sample values as produced by the device.
pub type Sample = Vec<f32>;

/// A sensor family: its command kinds, its handle and how to execute them.
pub trait SensorFamily: Sized + Send + Sync + 'static {
    type Action: Copy + fmt::Debug + Send + Sync + 'static;
    type Handle: SensorHandle + ?Sized + 'static;

    const TYPE: SensorType;

    fn open(
        factory: &dyn DeviceHandleFactory,
        port: SensorPort,
    ) -> Result<Box<Self::Handle>, TransportError>;

    fn execute(
        handle: &mut Self::Handle,
        action: Self::Action,
        command: &Command<Self::Action, Sample>,
    ) -> Result<(), CommandError>;

    /// Whether `action` changes mode or illumination and needs a settle
    /// window afterwards.
    fn unsettles(_action: Self::Action) -> bool {
        false
    }

    /// Called once after the proxy is constructed.
    fn on_open(_sensor: &Sensor<Self>) -> Result<()> {
        Ok(())
    }

    fn into_any(sensor: Sensor<Self>) -> AnySensor;

    fn from_any(any: &AnySensor) -> Option<&Sensor<Self>>;
}

pub(crate) struct SensorExecutor<F: SensorFamily> {
    port: SensorPort,
    factory: Arc<dyn DeviceHandleFactory>,
    clock: Arc<dyn Clock>,
    settle_delay: Duration,
    settled_at: Duration,
    _family: PhantomData<fn() -> F>,
}

impl<F: SensorFamily> Executor for SensorExecutor<F> {
    type Kind = F::Action;
    type Value = Sample;
    type Handle = Box<F::Handle>;

    fn label(&self) -> String {
        self.port.name().to_owned()
    }

    fn device(&self) -> String {
        F::TYPE.descriptor().to_owned()
    }

    fn open(&mut self) -> Result<Self::Handle, TransportError> {
        F::open(self.factory.as_ref(), self.port)
    }

    fn execute(
        &mut self,
        handle: &mut Self::Handle,
        command: &Command<F::Action, Sample>,
    ) -> Result<(), CommandError> {
        self.clock.sleep_until(self.settled_at);
        match command.kind() {
            None => {
                let size = handle.sample_size()?;
                let mut sample = vec![0.0; size];
                handle.fetch_sample(&mut sample, 0)?;
                command.fill(sample);
            }
            Some(action) => {
                F::execute(handle.as_mut(), action, command)?;
                if F::unsettles(action) {
                    self.settled_at = self.clock.now() + self.settle_delay;
                }
            }
        }
        Ok(())
    }

    fn release(
        &mut self,
        mut handle: Self::Handle,
        _config: &RobotConfig,
    ) -> Result<(), TransportError> {
        handle.close()
    }
}

/// Proxy for one sensor of family `F`.
///
/// Clones share the same actor.
pub struct Sensor<F: SensorFamily> {
    port: SensorPort,
    actor: Arc<DeviceActor<SensorExecutor<F>>>,
    clock: Arc<dyn Clock>,
    settle_delay: Duration,
}

impl<F: SensorFamily> Clone for Sensor<F> {
    fn clone(&self) -> Self {
        Self {
            port: self.port,
            actor: Arc::clone(&self.actor),
            clock: Arc::clone(&self.clock),
            settle_delay: self.settle_delay,
        }
    }
}

impl<F: SensorFamily> Sensor<F> {
    /// Open the sensor on `port` and start its actor.
    pub fn open(
        factory: Arc<dyn DeviceHandleFactory>,
        port: SensorPort,
        session: SessionToken,
        config: &RobotConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let executor = SensorExecutor::<F> {
            port,
            factory,
            clock: Arc::clone(&clock),
            settle_delay: config.settle_delay(),
            settled_at: Duration::ZERO,
            _family: PhantomData,
        };
        let actor = DeviceActor::spawn(executor, session, config)?;
        let sensor = Self {
            port,
            actor,
            clock,
            settle_delay: config.settle_delay(),
        };
        if let Err(e) = F::on_open(&sensor) {
            sensor.close();
            return Err(e);
        }
        Ok(sensor)
    }

    pub fn port(&self) -> SensorPort {
        self.port
    }

    pub fn sensor_type(&self) -> SensorType {
        F::TYPE
    }

    /// Read one sample from the currently selected mode.
    pub fn raw_sample(&self) -> Result<Sample> {
        self.actor.request(None)
    }

    /// Stop accepting commands and release the sensor. Idempotent.
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

    /// Synchronous read through a family action.
    pub(crate) fn read(
        &self,
        action: F::Action,
    ) -> Result<Sample> {
        self.actor.request(Some(action))
    }

    /// Synchronous family action carrying `input`.
    pub(crate) fn apply(
        &self,
        action: F::Action,
        input: Sample,
    ) -> Result<()> {
        self.actor.perform(Some(action), input)
    }

    /// Fire-and-forget family action.
    pub(crate) fn post(
        &self,
        action: F::Action,
    ) -> Result<()> {
        self.actor.enqueue(Command::new(Some(action)))
    }

    /// Block the caller for the settle delay after a mode change.
    pub(crate) fn settle(&self) {
        self.clock.sleep(self.settle_delay);
    }

    /// First value of a sample, or a transport error if it came back empty.
    pub(crate) fn first(
        &self,
        sample: &[f32],
    ) -> Result<f32> {
        sample.first().copied().ok_or_else(|| self.short_sample(1, 0))
    }

    pub(crate) fn short_sample(
        &self,
        expected: usize,
        got: usize,
    ) -> DeviceError {
        DeviceError::Transport {
            port: self.port.name().to_owned(),
            source: TransportError::new(format!("expected {expected} sample values, got {got}")),
        }
    }
}

impl<F: SensorFamily> fmt::Debug for Sensor<F> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Sensor")
            .field("port", &self.port)
            .field("type", &F::TYPE)
            .field("open", &self.is_open())
            .finish()
    }
}

/// A sensor proxy of any family, as kept in the robot's port table.
#[derive(Debug, Clone)]
pub enum AnySensor {
    Touch(Sensor<TouchFamily>),
    Color(Sensor<ColorFamily>),
    Gyro(Sensor<GyroFamily>),
    Ultrasonic(Sensor<UltrasonicFamily>),
}

impl AnySensor {
    pub fn sensor_type(&self) -> SensorType {
        match self {
            AnySensor::Touch(_) => SensorType::Touch,
            AnySensor::Color(_) => SensorType::Color,
            AnySensor::Gyro(_) => SensorType::Gyro,
            AnySensor::Ultrasonic(_) => SensorType::Ultrasonic,
        }
    }

    pub fn close(&self) {
        match self {
            AnySensor::Touch(s) => s.close(),
            AnySensor::Color(s) => s.close(),
            AnySensor::Gyro(s) => s.close(),
            AnySensor::Ultrasonic(s) => s.close(),
        }
    }

    pub fn is_open(&self) -> bool {
        match self {
            AnySensor::Touch(s) => s.is_open(),
            AnySensor::Color(s) => s.is_open(),
            AnySensor::Gyro(s) => s.is_open(),
            AnySensor::Ultrasonic(s) => s.is_open(),
        }
    }

    pub fn worker(&self) -> WorkerHandle {
        match self {
            AnySensor::Touch(s) => s.worker(),
            AnySensor::Color(s) => s.worker(),
            AnySensor::Gyro(s) => s.worker(),
            AnySensor::Ultrasonic(s) => s.worker(),
        }
    }

    pub(crate) fn actor_id(&self) -> u64 {
        match self {
            AnySensor::Touch(s) => s.actor_id(),
            AnySensor::Color(s) => s.actor_id(),
            AnySensor::Gyro(s) => s.actor_id(),
            AnySensor::Ultrasonic(s) => s.actor_id(),
        }
    }

    pub(crate) fn on_stop(
        &self,
        hook: impl FnOnce() + Send + 'static,
    ) {
        match self {
            AnySensor::Touch(s) => s.on_stop(hook),
            AnySensor::Color(s) => s.on_stop(hook),
            AnySensor::Gyro(s) => s.on_stop(hook),
            AnySensor::Ultrasonic(s) => s.on_stop(hook),
        }
    }
}
