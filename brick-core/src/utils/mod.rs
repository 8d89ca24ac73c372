//! Utility re-exports for the brick control library.
//!
//! - `actor`: the serialized per-device command queue, sessions and shutdown
//! - `controllers`: typed motor, sensor, speaker and button proxies
//! - `handle`: the device-handle capabilities the actors drive
//! - `robot`: the session owner that hands out one proxy per port
//! - `sim`: an in-process simulated brick for running without hardware
//!   (`sim` feature, on by default)

pub mod actor;
pub mod clock;
pub mod config;
pub mod controllers;
pub mod error;
pub mod handle;
pub mod robot;
#[cfg(feature = "sim")]
pub mod sim;

pub use actor::{release_all, release_on_exit, ReleaseGuard, Session, SessionToken, WorkerHandle};
pub use clock::{Clock, SystemClock};
pub use config::RobotConfig;
pub use controllers::{
    Button, Buttons, ColorSensor, GyroSensor, Motor, MotorKind, MotorPort, SensorPort, SensorType,
    Speaker, TouchSensor, UltrasonicSensor,
};
pub use error::{ArgumentError, DeviceError};
pub use handle::{DeviceHandleFactory, TransportError};
pub use robot::Robot;
