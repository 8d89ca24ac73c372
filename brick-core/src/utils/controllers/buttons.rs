//! Front-panel buttons.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::utils::{
    error::{DeviceError, Result},
    handle::{DeviceHandleFactory, KeypadHandle, TransportError},
};

const LABEL: &str = "keypad";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    Up,
    Down,
    Left,
    Right,
    Enter,
    Escape,
}

impl Button {
    pub const ALL: [Button; 6] = [
        Button::Up,
        Button::Down,
        Button::Left,
        Button::Right,
        Button::Enter,
        Button::Escape,
    ];

    /// Key name understood by the keypad handle.
    pub fn key_name(self) -> &'static str {
        match self {
            Button::Up => "Up",
            Button::Down => "Down",
            Button::Left => "Left",
            Button::Right => "Right",
            Button::Enter => "Enter",
            Button::Escape => "Escape",
        }
    }

    /// Bit in the key mask reported by the keypad.
    pub fn id(self) -> i32 {
        match self {
            Button::Up => 1,
            Button::Enter => 2,
            Button::Down => 4,
            Button::Right => 8,
            Button::Left => 16,
            Button::Escape => 32,
        }
    }

    /// Buttons whose bit is set in `mask`.
    pub fn from_mask(mask: i32) -> Vec<Button> {
        Self::ALL.into_iter().filter(|b| mask & b.id() != 0).collect()
    }
}

pub struct Buttons {
    keypad: Mutex<Box<dyn KeypadHandle>>,
}

impl Buttons {
    pub fn open(factory: &dyn DeviceHandleFactory) -> Result<Self> {
        let keypad = factory.open_keypad().map_err(|source| DeviceError::Open {
            port: LABEL.into(),
            device: "keypad".into(),
            source,
        })?;
        Ok(Self {
            keypad: Mutex::new(keypad),
        })
    }

    /// Block until `button` has been pressed and released. Presses made
    /// before the call are ignored.
    pub fn wait_for_button(
        &self,
        button: Button,
    ) -> Result<()> {
        let mut keypad = self.keypad.lock();
        keypad.discard_events().map_err(transport)?;
        keypad
            .wait_for_press_and_release(button.key_name())
            .map_err(transport)
    }

    /// Block until any button is pressed and return the pressed buttons.
    pub fn wait_for_any_button(&self) -> Result<Vec<Button>> {
        let mut keypad = self.keypad.lock();
        keypad.discard_events().map_err(transport)?;
        let mask = keypad.wait_for_any_press().map_err(transport)?;
        Ok(Button::from_mask(mask))
    }
}

impl fmt::Debug for Buttons {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Buttons").finish_non_exhaustive()
    }
}

fn transport(source: TransportError) -> DeviceError {
    DeviceError::Transport {
        port: LABEL.into(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_decodes_to_buttons() {
        assert_eq!(Button::from_mask(2), vec![Button::Enter]);
        assert_eq!(Button::from_mask(1 | 32), vec![Button::Up, Button::Escape]);
        assert!(Button::from_mask(0).is_empty());
    }
}
