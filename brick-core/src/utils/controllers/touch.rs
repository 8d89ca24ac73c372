//! Touch sensor.

use super::{
    ports::{SensorPort, SensorType},
    sensor::{AnySensor, Sample, Sensor, SensorFamily},
};
use crate::utils::{
    actor::{Command, CommandError},
    error::Result,
    handle::{DeviceHandleFactory, SensorHandle, TransportError},
};

/// The touch sensor only has the default read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchAction {}

#[derive(Debug)]
pub enum TouchFamily {}

impl SensorFamily for TouchFamily {
    type Action = TouchAction;
    type Handle = dyn SensorHandle;

    const TYPE: SensorType = SensorType::Touch;

    fn open(
        factory: &dyn DeviceHandleFactory,
        port: SensorPort,
    ) -> Result<Box<Self::Handle>, TransportError> {
        factory.open_touch_sensor(port)
    }

    fn execute(
        _handle: &mut Self::Handle,
        action: TouchAction,
        _command: &Command<TouchAction, Sample>,
    ) -> Result<(), CommandError> {
        match action {}
    }

    fn into_any(sensor: Sensor<Self>) -> AnySensor {
        AnySensor::Touch(sensor)
    }

    fn from_any(any: &AnySensor) -> Option<&Sensor<Self>> {
        match any {
            AnySensor::Touch(sensor) => Some(sensor),
            _ => None,
        }
    }
}

pub type TouchSensor = Sensor<TouchFamily>;

impl Sensor<TouchFamily> {
    /// Whether the button is currently pressed.
    pub fn is_touched(&self) -> Result<bool> {
        let sample = self.raw_sample()?;
        Ok(self.first(&sample)? == 1.0)
    }
}
