//! The session owner.
//!
//! A [`Robot`] owns the session every actor is tied to and keeps at most one
//! live proxy per port. Asking for a port again returns the proxy already
//! driving it; asking for a different device type on the same port closes
//! the old proxy first. Proxies that stop on their own (transport failure,
//! explicit close) remove themselves from the port table.
//!
//! ```rust
//! use std::sync::Arc;
//! use brick_core::utils::{sim::SimBrick, MotorPort, Robot, RobotConfig, SensorPort};
//!
//! let brick = SimBrick::new();
//! brick.set_sample(SensorPort::S1, 0, vec![1.0]);
//!
//! let robot = Robot::new(Arc::new(brick), RobotConfig::default());
//! let left = robot.large_motor(MotorPort::A).unwrap();
//! left.forward().unwrap();
//! assert!(robot.touch_sensor(SensorPort::S1).unwrap().is_touched().unwrap());
//! left.stop().unwrap();
//! robot.close();
//! ```

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
};

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::utils::{
    actor::{Session, SessionToken},
    clock::{Clock, SystemClock},
    config::RobotConfig,
    controllers::{
        AnySensor, Buttons, ColorSensor, GyroSensor, Motor, MotorKind, MotorPort, Sensor,
        SensorFamily, SensorPort, Speaker, TouchSensor, UltrasonicSensor,
    },
    error::{DeviceError, Result},
    handle::DeviceHandleFactory,
};

type MotorTable = Mutex<HashMap<MotorPort, Motor>>;
type SensorTable = Mutex<HashMap<SensorPort, AnySensor>>;

pub struct Robot {
    factory: Arc<dyn DeviceHandleFactory>,
    config: RobotConfig,
    clock: Arc<dyn Clock>,
    session: Session,
    motors: Arc<MotorTable>,
    sensors: Arc<SensorTable>,
    speaker: Mutex<Option<Arc<Speaker>>>,
    buttons: Mutex<Option<Arc<Buttons>>>,
    closed: AtomicBool,
}

impl Robot {
    pub fn new(
        factory: Arc<dyn DeviceHandleFactory>,
        config: RobotConfig,
    ) -> Self {
        Self::with_clock(factory, config, Arc::new(SystemClock::new()))
    }

    /// Like [`Robot::new`], with the clock sensors use for settle delays.
    pub fn with_clock(
        factory: Arc<dyn DeviceHandleFactory>,
        config: RobotConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        tracing::info!(?config, "robot session started");
        Self {
            factory,
            config,
            clock,
            session: Session::new(),
            motors: Arc::new(Mutex::new(HashMap::new())),
            sensors: Arc::new(Mutex::new(HashMap::new())),
            speaker: Mutex::new(None),
            buttons: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    pub fn device_handle_factory(&self) -> Arc<dyn DeviceHandleFactory> {
        Arc::clone(&self.factory)
    }

    /// Token for building proxies by hand that live and die with this robot.
    pub fn session_token(&self) -> SessionToken {
        self.session.token()
    }

    /// The motor on `port`, opening it as `kind` if the port has no live
    /// motor of that kind.
    pub fn motor(
        &self,
        port: MotorPort,
        kind: MotorKind,
    ) -> Result<Motor> {
        self.ensure_open()?;
        loop {
            let stale = {
                let mut motors = self.motors.lock();
                match motors.get(&port) {
                    Some(motor) if motor.is_open() && motor.kind() == kind => return Ok(motor.clone()),
                    Some(_) => {}
                    None => {
                        let motor = Motor::open(
                            Arc::clone(&self.factory),
                            port,
                            kind,
                            self.session.token(),
                            &self.config,
                        )?;
                        motors.insert(port, motor.clone());
                        drop(motors);
                        self.watch_motor(&motor);
                        return Ok(motor);
                    }
                }
                motors.remove(&port)
            };
            if let Some(stale) = stale {
                tracing::info!(%port, "replacing motor");
                stale.close();
            }
        }
    }

    pub fn large_motor(
        &self,
        port: MotorPort,
    ) -> Result<Motor> {
        self.motor(port, MotorKind::Large)
    }

    pub fn medium_motor(
        &self,
        port: MotorPort,
    ) -> Result<Motor> {
        self.motor(port, MotorKind::Medium)
    }

    pub fn touch_sensor(
        &self,
        port: SensorPort,
    ) -> Result<TouchSensor> {
        self.sensor(port)
    }

    pub fn color_sensor(
        &self,
        port: SensorPort,
    ) -> Result<ColorSensor> {
        self.sensor(port)
    }

    pub fn gyro_sensor(
        &self,
        port: SensorPort,
    ) -> Result<GyroSensor> {
        self.sensor(port)
    }

    pub fn ultrasonic_sensor(
        &self,
        port: SensorPort,
    ) -> Result<UltrasonicSensor> {
        self.sensor(port)
    }

    /// The sensor of family `F` on `port`, replacing whatever other sensor
    /// type the port was driving.
    pub fn sensor<F: SensorFamily>(
        &self,
        port: SensorPort,
    ) -> Result<Sensor<F>> {
        self.ensure_open()?;
        loop {
            let stale = {
                let mut sensors = self.sensors.lock();
                match sensors.get(&port) {
                    Some(any) if any.is_open() => {
                        if let Some(sensor) = F::from_any(any) {
                            return Ok(sensor.clone());
                        }
                    }
                    Some(_) => {}
                    None => {
                        let sensor = Sensor::<F>::open(
                            Arc::clone(&self.factory),
                            port,
                            self.session.token(),
                            &self.config,
                            Arc::clone(&self.clock),
                        )?;
                        let any = F::into_any(sensor.clone());
                        sensors.insert(port, any.clone());
                        drop(sensors);
                        self.watch_sensor(port, &any);
                        return Ok(sensor);
                    }
                }
                sensors.remove(&port)
            };
            if let Some(stale) = stale {
                let wanted = F::TYPE;
                tracing::info!(%port, from = %stale.sensor_type(), to = %wanted, "replacing sensor");
                stale.close();
            }
        }
    }

    /// Close the motor on `port`, if any. Idempotent.
    pub fn close_motor(
        &self,
        port: MotorPort,
    ) {
        let motor = self.motors.lock().remove(&port);
        if let Some(motor) = motor {
            motor.close();
        }
    }

    /// Close the sensor on `port`, if any. Idempotent.
    pub fn close_sensor(
        &self,
        port: SensorPort,
    ) {
        let sensor = self.sensors.lock().remove(&port);
        if let Some(sensor) = sensor {
            sensor.close();
        }
    }

    pub fn speaker(&self) -> Result<Arc<Speaker>> {
        self.ensure_open()?;
        let mut speaker = self.speaker.lock();
        if let Some(speaker) = speaker.as_ref() {
            return Ok(Arc::clone(speaker));
        }
        let opened = Arc::new(Speaker::open(self.factory.as_ref())?);
        *speaker = Some(Arc::clone(&opened));
        Ok(opened)
    }

    pub fn buttons(&self) -> Result<Arc<Buttons>> {
        self.ensure_open()?;
        let mut buttons = self.buttons.lock();
        if let Some(buttons) = buttons.as_ref() {
            return Ok(Arc::clone(buttons));
        }
        let opened = Arc::new(Buttons::open(self.factory.as_ref())?);
        *buttons = Some(Arc::clone(&opened));
        Ok(opened)
    }

    /// Ports with a live motor.
    pub fn motor_ports(&self) -> Vec<MotorPort> {
        let motors = self.motors.lock();
        MotorPort::ALL
            .into_iter()
            .filter(|p| motors.get(p).is_some_and(Motor::is_open))
            .collect()
    }

    /// Ports with a live sensor.
    pub fn sensor_ports(&self) -> Vec<SensorPort> {
        let sensors = self.sensors.lock();
        SensorPort::ALL
            .into_iter()
            .filter(|p| sensors.get(p).is_some_and(AnySensor::is_open))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close every proxy, wait for their workers and end the session.
    /// Idempotent; also run on drop.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let motors: Vec<Motor> = self.motors.lock().drain().map(|(_, m)| m).collect();
        for motor in &motors {
            motor.close();
        }
        let sensors: Vec<AnySensor> = self.sensors.lock().drain().map(|(_, s)| s).collect();
        for sensor in &sensors {
            sensor.close();
        }
        self.session.end();
        tracing::info!(motors = motors.len(), sensors = sensors.len(), "robot closed");
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(DeviceError::Closed("robot".into()));
        }
        Ok(())
    }

    fn watch_motor(
        &self,
        motor: &Motor,
    ) {
        let table: Weak<MotorTable> = Arc::downgrade(&self.motors);
        let port = motor.port();
        let id = motor.actor_id();
        motor.on_stop(move || {
            let Some(table) = table.upgrade() else {
                return;
            };
            let mut motors = table.lock();
            if motors.get(&port).is_some_and(|m| m.actor_id() == id) {
                motors.remove(&port);
                tracing::debug!(%port, "motor deregistered");
            }
        });
    }

    fn watch_sensor(
        &self,
        port: SensorPort,
        sensor: &AnySensor,
    ) {
        let table: Weak<SensorTable> = Arc::downgrade(&self.sensors);
        let id = sensor.actor_id();
        sensor.on_stop(move || {
            let Some(table) = table.upgrade() else {
                return;
            };
            let mut sensors = table.lock();
            if sensors.get(&port).is_some_and(|s| s.actor_id() == id) {
                sensors.remove(&port);
                tracing::debug!(%port, "sensor deregistered");
            }
        });
    }
}

impl Drop for Robot {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Robot {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Robot")
            .field("factory", &self.factory)
            .field("motors", &self.motor_ports())
            .field("sensors", &self.sensor_ports())
            .field("closed", &self.is_closed())
            .finish()
    }
}
