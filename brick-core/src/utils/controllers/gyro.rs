//! Gyro sensor.

use serde::{Deserialize, Serialize};

use super::{
    ports::{SensorPort, SensorType},
    sensor::{AnySensor, Sample, Sensor, SensorFamily},
};
use crate::utils::{
    actor::{Command, CommandError},
    error::Result,
    handle::{DeviceHandleFactory, GyroSensorHandle, TransportError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GyroAction {
    Reset,
    GetRate,
    GetAngle,
    GetRateAndAngle,
}

/// Angle in degrees and rate in degrees per second, read together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleAndRate {
    pub angle: f32,
    pub rate: f32,
}

#[derive(Debug)]
pub enum GyroFamily {}

impl SensorFamily for GyroFamily {
    type Action = GyroAction;
    type Handle = dyn GyroSensorHandle;

    const TYPE: SensorType = SensorType::Gyro;

    fn open(
        factory: &dyn DeviceHandleFactory,
        port: SensorPort,
    ) -> Result<Box<Self::Handle>, TransportError> {
        factory.open_gyro_sensor(port)
    }

    fn execute(
        gyro: &mut Self::Handle,
        action: GyroAction,
        command: &Command<GyroAction, Sample>,
    ) -> Result<(), CommandError> {
        match action {
            GyroAction::Reset => {
                gyro.reset()?;
                command.clear();
            }
            GyroAction::GetRate => command.fill(gyro.fetch_rate()?),
            GyroAction::GetAngle => command.fill(gyro.fetch_angle()?),
            GyroAction::GetRateAndAngle => command.fill(gyro.fetch_angle_and_rate()?),
        }
        Ok(())
    }

    fn into_any(sensor: Sensor<Self>) -> AnySensor {
        AnySensor::Gyro(sensor)
    }

    fn from_any(any: &AnySensor) -> Option<&Sensor<Self>> {
        match any {
            AnySensor::Gyro(sensor) => Some(sensor),
            _ => None,
        }
    }
}

pub type GyroSensor = Sensor<GyroFamily>;

impl Sensor<GyroFamily> {
    /// Zero the accumulated angle. Returns once the sensor has acknowledged.
    pub fn reset(&self) -> Result<()> {
        self.apply(GyroAction::Reset, Vec::new())
    }

    /// Accumulated angle in degrees.
    pub fn angle(&self) -> Result<f32> {
        let sample = self.read(GyroAction::GetAngle)?;
        self.first(&sample)
    }

    /// Rotation rate in degrees per second.
    pub fn rate(&self) -> Result<f32> {
        let sample = self.read(GyroAction::GetRate)?;
        self.first(&sample)
    }

    pub fn rate_and_angle(&self) -> Result<AngleAndRate> {
        let sample = self.read(GyroAction::GetRateAndAngle)?;
        match sample[..] {
            [angle, rate, ..] => Ok(AngleAndRate { angle, rate }),
            _ => Err(self.short_sample(2, sample.len())),
        }
    }
}
