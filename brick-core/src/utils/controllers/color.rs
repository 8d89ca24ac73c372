//! Color sensor.
//!
//! Each measuring mode comes with the floodlight it needs: color id and RGB
//! under white light, reflected red under red light, ambient with the light
//! off. Changing the mode or the floodlight starts a settle window before the
//! next reading is trustworthy.

use serde::{Deserialize, Serialize};

use super::{
    ports::{SensorPort, SensorType},
    sensor::{AnySensor, Sample, Sensor, SensorFamily},
};
use crate::utils::{
    actor::{Command, CommandError},
    error::Result,
    handle::{ColorSensorHandle, DeviceHandleFactory, TransportError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorAction {
    SetMode,
    SetFloodlight,
    GetFloodlight,
    GetColor,
    GetAmbient,
    GetRed,
    GetRgb,
}

/// Measuring modes, with their mode id and floodlight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    Color,
    Red,
    Rgb,
    Ambient,
}

impl ColorMode {
    pub fn id(self) -> u8 {
        match self {
            ColorMode::Color => 0,
            ColorMode::Red => 1,
            ColorMode::Rgb => 2,
            ColorMode::Ambient => 3,
        }
    }

    pub fn floodlight(self) -> FloodlightState {
        match self {
            ColorMode::Color | ColorMode::Rgb => FloodlightState::White,
            ColorMode::Red => FloodlightState::Red,
            ColorMode::Ambient => FloodlightState::Off,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloodlightState {
    Off,
    Red,
    Blue,
    White,
}

impl FloodlightState {
    pub fn id(self) -> i32 {
        match self {
            FloodlightState::Off => -1,
            FloodlightState::Red => 0,
            FloodlightState::Blue => 2,
            FloodlightState::White => 6,
        }
    }

    /// Unknown ids decode as `Off`.
    pub fn from_id(id: i32) -> Self {
        match id {
            0 => FloodlightState::Red,
            2 => FloodlightState::Blue,
            6 => FloodlightState::White,
            _ => FloodlightState::Off,
        }
    }
}

/// Colors reported in color id mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    None,
    Red,
    Green,
    Blue,
    Yellow,
    Magenta,
    Orange,
    White,
    Black,
    Pink,
    Gray,
    LightGray,
    DarkGray,
    Cyan,
    Brown,
}

impl Color {
    const TABLE: [Color; 14] = [
        Color::Red,
        Color::Green,
        Color::Blue,
        Color::Yellow,
        Color::Magenta,
        Color::Orange,
        Color::White,
        Color::Black,
        Color::Pink,
        Color::Gray,
        Color::LightGray,
        Color::DarkGray,
        Color::Cyan,
        Color::Brown,
    ];

    pub fn id(self) -> i32 {
        Self::TABLE
            .iter()
            .position(|c| *c == self)
            .map_or(-1, |i| i as i32)
    }

    /// Unknown ids decode as `None`.
    pub fn from_id(id: i32) -> Self {
        usize::try_from(id)
            .ok()
            .and_then(|i| Self::TABLE.get(i).copied())
            .unwrap_or(Color::None)
    }
}

/// Red, green and blue reflectance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
}

const AMBIENT_SCALE: f32 = 5.0;

#[derive(Debug)]
pub enum ColorFamily {}

impl SensorFamily for ColorFamily {
    type Action = ColorAction;
    type Handle = dyn ColorSensorHandle;

    const TYPE: SensorType = SensorType::Color;

    fn open(
        factory: &dyn DeviceHandleFactory,
        port: SensorPort,
    ) -> Result<Box<Self::Handle>, TransportError> {
        factory.open_color_sensor(port)
    }

    fn execute(
        sensor: &mut Self::Handle,
        action: ColorAction,
        command: &Command<ColorAction, Sample>,
    ) -> Result<(), CommandError> {
        let reading = match action {
            ColorAction::SetMode => {
                let input = command.input().unwrap_or_default();
                let [mode, light] = input.as_slice() else {
                    return Err(CommandError::Malformed(format!("set_mode expects [mode, light], got {input:?}")));
                };
                sensor.set_current_mode(*mode as u8)?;
                sensor.set_floodlight(*light as i32)?;
                command.clear();
                return Ok(());
            }
            ColorAction::SetFloodlight => {
                let input = command.input().unwrap_or_default();
                let [light] = input.as_slice() else {
                    return Err(CommandError::Malformed(format!("set_floodlight expects [light], got {input:?}")));
                };
                sensor.set_floodlight(*light as i32)?;
                command.clear();
                return Ok(());
            }
            ColorAction::GetFloodlight => vec![sensor.floodlight()? as f32],
            ColorAction::GetColor => sensor.fetch_color_id()?,
            ColorAction::GetAmbient => sensor.fetch_ambient()?,
            ColorAction::GetRed => sensor.fetch_red()?,
            ColorAction::GetRgb => sensor.fetch_rgb()?,
        };
        command.fill(reading);
        Ok(())
    }

    fn unsettles(action: ColorAction) -> bool {
        matches!(action, ColorAction::SetMode | ColorAction::SetFloodlight)
    }

    fn into_any(sensor: Sensor<Self>) -> AnySensor {
        AnySensor::Color(sensor)
    }

    fn from_any(any: &AnySensor) -> Option<&Sensor<Self>> {
        match any {
            AnySensor::Color(sensor) => Some(sensor),
            _ => None,
        }
    }
}

pub type ColorSensor = Sensor<ColorFamily>;

impl Sensor<ColorFamily> {
    /// Select `mode` together with its floodlight and wait for the sensor
    /// to settle.
    pub fn set_mode(
        &self,
        mode: ColorMode,
    ) -> Result<()> {
        tracing::debug!(port = %self.port(), ?mode, "color sensor mode change");
        let input = vec![f32::from(mode.id()), mode.floodlight().id() as f32];
        self.apply(ColorAction::SetMode, input)?;
        self.settle();
        Ok(())
    }

    /// Switch the floodlight and wait for the sensor to settle.
    pub fn set_floodlight(
        &self,
        state: FloodlightState,
    ) -> Result<()> {
        self.apply(ColorAction::SetFloodlight, vec![state.id() as f32])?;
        self.settle();
        Ok(())
    }

    pub fn floodlight(&self) -> Result<FloodlightState> {
        let sample = self.read(ColorAction::GetFloodlight)?;
        Ok(FloodlightState::from_id(self.first(&sample)? as i32))
    }

    pub fn color(&self) -> Result<Color> {
        let sample = self.read(ColorAction::GetColor)?;
        Ok(Color::from_id(self.first(&sample)? as i32))
    }

    /// Ambient light intensity in 0.0-1.0, measured under the blue
    /// floodlight. The raw reading tops out at a fifth of full scale there.
    pub fn ambient(&self) -> Result<f32> {
        self.set_floodlight(FloodlightState::Blue)?;
        let sample = self.read(ColorAction::GetAmbient)?;
        Ok(self.first(&sample)? * AMBIENT_SCALE)
    }

    /// Reflected red light intensity.
    pub fn red(&self) -> Result<f32> {
        let sample = self.read(ColorAction::GetRed)?;
        self.first(&sample)
    }

    pub fn rgb(&self) -> Result<Rgb> {
        let sample = self.read(ColorAction::GetRgb)?;
        match sample[..] {
            [red, green, blue, ..] => Ok(Rgb { red, green, blue }),
            _ => Err(self.short_sample(3, sample.len())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_color_ids_decode_as_none() {
        assert_eq!(Color::from_id(-1), Color::None);
        assert_eq!(Color::from_id(14), Color::None);
        assert_eq!(Color::from_id(0), Color::Red);
        assert_eq!(Color::from_id(13), Color::Brown);
        assert_eq!(Color::LightGray.id(), 10);
        assert_eq!(Color::None.id(), -1);
    }

    #[test]
    fn unknown_floodlight_ids_decode_as_off() {
        assert_eq!(FloodlightState::from_id(6), FloodlightState::White);
        assert_eq!(FloodlightState::from_id(1), FloodlightState::Off);
        assert_eq!(FloodlightState::Blue.id(), 2);
    }

    #[test]
    fn modes_carry_their_floodlight() {
        assert_eq!(ColorMode::Ambient.floodlight(), FloodlightState::Off);
        assert_eq!(ColorMode::Red.floodlight(), FloodlightState::Red);
        assert_eq!(ColorMode::Rgb.id(), 2);
        assert_eq!(SensorType::Color.mode_name(ColorMode::Ambient.id()), Some("Ambient"));
    }
}
