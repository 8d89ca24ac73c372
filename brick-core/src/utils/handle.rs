//! Device-handle capabilities consumed by the actors.
//!
//! These traits are implemented by whatever transport reaches the brick
//! (remote procedure calls, a simulator, ...). Every call may block and may
//! fail with a [`TransportError`]. Handles are never shared: each one is
//! owned by exactly one actor worker, hence `Send` but not `Sync`.

use std::fmt;

use thiserror::Error;

use crate::utils::controllers::{MotorKind, MotorPort, SensorPort};

/// A call to the remote device failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// A regulated motor.
pub trait MotorHandle: Send {
    fn forward(&mut self) -> TransportResult<()>;
    fn backward(&mut self) -> TransportResult<()>;
    /// Brake the motor. With `immediate_return` the call does not wait for
    /// the motor to come to rest.
    fn stop(
        &mut self,
        immediate_return: bool,
    ) -> TransportResult<()>;
    /// Speed in degrees per second.
    fn set_speed(
        &mut self,
        speed: u32,
    ) -> TransportResult<()>;
    fn speed(&mut self) -> TransportResult<u32>;
    fn max_speed(&mut self) -> TransportResult<f32>;
    fn is_moving(&mut self) -> TransportResult<bool>;
    fn is_stalled(&mut self) -> TransportResult<bool>;
    /// Rotate by `degrees` relative to the current position. Blocks until the
    /// motion completes unless `immediate_return` is set.
    fn rotate(
        &mut self,
        degrees: i32,
        immediate_return: bool,
    ) -> TransportResult<()>;
    /// Rotate to the absolute tacho position `degrees`.
    fn rotate_to(
        &mut self,
        degrees: i32,
        immediate_return: bool,
    ) -> TransportResult<()>;
    fn reset_tacho_count(&mut self) -> TransportResult<()>;
    fn tacho_count(&mut self) -> TransportResult<i32>;
    fn close(&mut self) -> TransportResult<()>;
}

/// Sample provider shared by every sensor family.
pub trait SensorHandle: Send {
    /// Number of values produced by the currently selected mode.
    fn sample_size(&mut self) -> TransportResult<usize>;
    fn set_current_mode(
        &mut self,
        mode: u8,
    ) -> TransportResult<()>;
    /// Fill `sample[offset..]` from the currently selected mode.
    fn fetch_sample(
        &mut self,
        sample: &mut [f32],
        offset: usize,
    ) -> TransportResult<()>;
    fn close(&mut self) -> TransportResult<()>;
}

pub trait ColorSensorHandle: SensorHandle {
    fn fetch_color_id(&mut self) -> TransportResult<Vec<f32>>;
    fn fetch_ambient(&mut self) -> TransportResult<Vec<f32>>;
    fn fetch_red(&mut self) -> TransportResult<Vec<f32>>;
    fn fetch_rgb(&mut self) -> TransportResult<Vec<f32>>;
    fn set_floodlight(
        &mut self,
        color_id: i32,
    ) -> TransportResult<()>;
    fn floodlight(&mut self) -> TransportResult<i32>;
}

pub trait GyroSensorHandle: SensorHandle {
    fn reset(&mut self) -> TransportResult<()>;
    fn fetch_rate(&mut self) -> TransportResult<Vec<f32>>;
    fn fetch_angle(&mut self) -> TransportResult<Vec<f32>>;
    fn fetch_angle_and_rate(&mut self) -> TransportResult<Vec<f32>>;
}

pub trait UltrasonicSensorHandle: SensorHandle {
    fn fetch_distance(&mut self) -> TransportResult<Vec<f32>>;
    fn fetch_listen(&mut self) -> TransportResult<Vec<f32>>;
    fn enable(&mut self) -> TransportResult<()>;
    fn disable(&mut self) -> TransportResult<()>;
    fn is_enabled(&mut self) -> TransportResult<bool>;
}

/// The brick's speaker.
pub trait AudioHandle: Send {
    fn volume(&mut self) -> TransportResult<i32>;
    fn set_volume(
        &mut self,
        volume: i32,
    ) -> TransportResult<()>;
    /// Play a tone and block until it has finished.
    fn play_tone(
        &mut self,
        frequency_hz: i32,
        duration_ms: i32,
    ) -> TransportResult<()>;
}

/// The brick's front-panel keys.
pub trait KeypadHandle: Send {
    fn discard_events(&mut self) -> TransportResult<()>;
    /// Block until the named key is pressed and released.
    fn wait_for_press_and_release(
        &mut self,
        key: &str,
    ) -> TransportResult<()>;
    /// Block until any key is pressed; returns the key id bit mask.
    fn wait_for_any_press(&mut self) -> TransportResult<i32>;
}

/// Opens handles on the brick, one per port and device type.
pub trait DeviceHandleFactory: Send + Sync + fmt::Debug {
    fn open_motor(
        &self,
        port: MotorPort,
        kind: MotorKind,
    ) -> TransportResult<Box<dyn MotorHandle>>;
    fn open_touch_sensor(
        &self,
        port: SensorPort,
    ) -> TransportResult<Box<dyn SensorHandle>>;
    fn open_color_sensor(
        &self,
        port: SensorPort,
    ) -> TransportResult<Box<dyn ColorSensorHandle>>;
    fn open_gyro_sensor(
        &self,
        port: SensorPort,
    ) -> TransportResult<Box<dyn GyroSensorHandle>>;
    fn open_ultrasonic_sensor(
        &self,
        port: SensorPort,
    ) -> TransportResult<Box<dyn UltrasonicSensorHandle>>;
    fn open_audio(&self) -> TransportResult<Box<dyn AudioHandle>>;
    fn open_keypad(&self) -> TransportResult<Box<dyn KeypadHandle>>;
}
