//! Physical ports and device types of the brick.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Motor output ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotorPort {
    A,
    B,
    C,
    D,
}

impl MotorPort {
    pub const ALL: [MotorPort; 4] = [MotorPort::A, MotorPort::B, MotorPort::C, MotorPort::D];

    pub fn name(self) -> &'static str {
        match self {
            MotorPort::A => "A",
            MotorPort::B => "B",
            MotorPort::C => "C",
            MotorPort::D => "D",
        }
    }
}

impl fmt::Display for MotorPort {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Regulated motor variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorKind {
    Medium,
    Large,
}

impl MotorKind {
    /// Single-letter type code the remote side expects.
    pub fn code(self) -> char {
        match self {
            MotorKind::Medium => 'M',
            MotorKind::Large => 'L',
        }
    }
}

/// Sensor input ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorPort {
    S1,
    S2,
    S3,
    S4,
}

impl SensorPort {
    pub const ALL: [SensorPort; 4] = [SensorPort::S1, SensorPort::S2, SensorPort::S3, SensorPort::S4];

    pub fn name(self) -> &'static str {
        match self {
            SensorPort::S1 => "S1",
            SensorPort::S2 => "S2",
            SensorPort::S3 => "S3",
            SensorPort::S4 => "S4",
        }
    }
}

impl fmt::Display for SensorPort {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Supported sensor families, with the device descriptor and mode names the
/// remote side uses for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Touch,
    Ultrasonic,
    Gyro,
    Color,
}

impl SensorType {
    pub fn descriptor(self) -> &'static str {
        match self {
            SensorType::Touch => "EV3TouchSensor",
            SensorType::Ultrasonic => "EV3UltrasonicSensor",
            SensorType::Gyro => "EV3GyroSensor",
            SensorType::Color => "EV3ColorSensor",
        }
    }

    /// Mode names indexed by mode id.
    pub fn modes(self) -> &'static [&'static str] {
        match self {
            SensorType::Touch => &["Touch"],
            SensorType::Ultrasonic => &["Distance", "Listen"],
            SensorType::Gyro => &["Angle and Rate", "Angle", "Rate"],
            SensorType::Color => &["ColorID", "Red", "RGB", "Ambient"],
        }
    }

    pub fn mode_name(
        self,
        mode: u8,
    ) -> Option<&'static str> {
        self.modes().get(usize::from(mode)).copied()
    }
}

impl fmt::Display for SensorType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            SensorType::Touch => "touch sensor",
            SensorType::Ultrasonic => "ultrasonic sensor",
            SensorType::Gyro => "gyro sensor",
            SensorType::Color => "color sensor",
        };
        f.write_str(name)
    }
}
