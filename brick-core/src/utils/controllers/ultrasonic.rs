//! Ultrasonic sensor.
//!
//! The sensor is put into distance mode when it is opened, and the open does
//! not return before the settle window has passed.

use serde::{Deserialize, Serialize};

use super::{
    ports::{SensorPort, SensorType},
    sensor::{AnySensor, Sample, Sensor, SensorFamily},
};
use crate::utils::{
    actor::{Command, CommandError},
    error::Result,
    handle::{DeviceHandleFactory, TransportError, UltrasonicSensorHandle},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UltrasonicAction {
    SetMode,
    GetDistance,
    GetListen,
    Enable,
    Disable,
    GetState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UltrasonicMode {
    Distance,
    Listen,
}

impl UltrasonicMode {
    pub fn id(self) -> u8 {
        match self {
            UltrasonicMode::Distance => 0,
            UltrasonicMode::Listen => 1,
        }
    }
}

#[derive(Debug)]
pub enum UltrasonicFamily {}

impl SensorFamily for UltrasonicFamily {
    type Action = UltrasonicAction;
    type Handle = dyn UltrasonicSensorHandle;

    const TYPE: SensorType = SensorType::Ultrasonic;

    fn open(
        factory: &dyn DeviceHandleFactory,
        port: SensorPort,
    ) -> Result<Box<Self::Handle>, TransportError> {
        factory.open_ultrasonic_sensor(port)
    }

    fn execute(
        sonar: &mut Self::Handle,
        action: UltrasonicAction,
        command: &Command<UltrasonicAction, Sample>,
    ) -> Result<(), CommandError> {
        match action {
            UltrasonicAction::SetMode => {
                let input = command.input().unwrap_or_default();
                let [mode] = input.as_slice() else {
                    return Err(CommandError::Malformed(format!("set_mode expects [mode], got {input:?}")));
                };
                sonar.set_current_mode(*mode as u8)?;
                command.clear();
            }
            UltrasonicAction::Enable => {
                sonar.enable()?;
                command.clear();
            }
            UltrasonicAction::Disable => {
                sonar.disable()?;
                command.clear();
            }
            UltrasonicAction::GetDistance => command.fill(sonar.fetch_distance()?),
            UltrasonicAction::GetListen => command.fill(sonar.fetch_listen()?),
            UltrasonicAction::GetState => {
                let enabled = sonar.is_enabled()?;
                command.fill(vec![if enabled { 1.0 } else { 0.0 }]);
            }
        }
        Ok(())
    }

    fn unsettles(action: UltrasonicAction) -> bool {
        matches!(action, UltrasonicAction::SetMode)
    }

    fn on_open(sensor: &Sensor<Self>) -> Result<()> {
        sensor.set_mode(UltrasonicMode::Distance)
    }

    fn into_any(sensor: Sensor<Self>) -> AnySensor {
        AnySensor::Ultrasonic(sensor)
    }

    fn from_any(any: &AnySensor) -> Option<&Sensor<Self>> {
        match any {
            AnySensor::Ultrasonic(sensor) => Some(sensor),
            _ => None,
        }
    }
}

pub type UltrasonicSensor = Sensor<UltrasonicFamily>;

impl Sensor<UltrasonicFamily> {
    pub fn set_mode(
        &self,
        mode: UltrasonicMode,
    ) -> Result<()> {
        tracing::debug!(port = %self.port(), ?mode, "ultrasonic sensor mode change");
        self.apply(UltrasonicAction::SetMode, vec![f32::from(mode.id())])?;
        self.settle();
        Ok(())
    }

    /// Distance to the nearest object in metres. Infinity when nothing is in
    /// range.
    pub fn distance(&self) -> Result<f32> {
        let sample = self.read(UltrasonicAction::GetDistance)?;
        self.first(&sample)
    }

    /// Whether another ultrasonic sensor is transmitting nearby.
    pub fn listen(&self) -> Result<bool> {
        let sample = self.read(UltrasonicAction::GetListen)?;
        Ok(self.first(&sample)? != 0.0)
    }

    pub fn enable(&self) -> Result<()> {
        self.post(UltrasonicAction::Enable)
    }

    pub fn disable(&self) -> Result<()> {
        self.post(UltrasonicAction::Disable)
    }

    pub fn is_enabled(&self) -> Result<bool> {
        let sample = self.read(UltrasonicAction::GetState)?;
        Ok(self.first(&sample)? != 0.0)
    }
}
