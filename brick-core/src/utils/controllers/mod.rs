//! Device proxies.
//!
//! - `motor`: regulated motors on ports A to D
//! - `sensor`: the generic sensor proxy every sensor family builds on
//! - `touch`, `color`, `gyro`, `ultrasonic`: the sensor families
//! - `speaker`, `buttons`: brick-local audio and keypad
//! - `ports`: port and device-type enums

pub mod buttons;
pub mod color;
pub mod gyro;
pub mod motor;
pub mod ports;
pub mod sensor;
pub mod speaker;
pub mod touch;
pub mod ultrasonic;

pub use buttons::{Button, Buttons};
pub use color::{Color, ColorMode, ColorSensor, FloodlightState, Rgb};
pub use gyro::{AngleAndRate, GyroSensor};
pub use motor::Motor;
pub use ports::{MotorKind, MotorPort, SensorPort, SensorType};
pub use sensor::{AnySensor, Sensor, SensorFamily};
pub use speaker::Speaker;
pub use touch::TouchSensor;
pub use ultrasonic::{UltrasonicMode, UltrasonicSensor};
