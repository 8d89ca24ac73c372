//! The brick's speaker.
//!
//! Audio calls are not queued behind an actor: they go straight to the audio
//! handle under a lock, after argument validation.

use std::fmt;

use parking_lot::Mutex;

use crate::utils::{
    error::{ArgumentError, DeviceError, Result},
    handle::{AudioHandle, DeviceHandleFactory, TransportError},
};

pub const VOLUME_MIN: i32 = 0;
pub const VOLUME_MAX: i32 = 100;

const LABEL: &str = "audio";

pub struct Speaker {
    audio: Mutex<Box<dyn AudioHandle>>,
}

impl Speaker {
    pub fn open(factory: &dyn DeviceHandleFactory) -> Result<Self> {
        let audio = factory.open_audio().map_err(|source| DeviceError::Open {
            port: LABEL.into(),
            device: "speaker".into(),
            source,
        })?;
        tracing::info!("speaker opened");
        Ok(Self {
            audio: Mutex::new(audio),
        })
    }

    pub fn volume(&self) -> Result<i32> {
        self.audio.lock().volume().map_err(transport)
    }

    /// Set the master volume, in percent.
    pub fn set_volume(
        &self,
        volume: i32,
    ) -> Result<()> {
        if !(VOLUME_MIN..=VOLUME_MAX).contains(&volume) {
            return Err(ArgumentError::Volume {
                value: volume,
                min: VOLUME_MIN,
                max: VOLUME_MAX,
            }
            .into());
        }
        self.audio.lock().set_volume(volume).map_err(transport)
    }

    /// Play a tone and return once it has finished.
    pub fn play_tone(
        &self,
        frequency_hz: i32,
        duration_ms: i32,
    ) -> Result<()> {
        if frequency_hz < 1 {
            return Err(ArgumentError::Frequency(frequency_hz).into());
        }
        if duration_ms < 1 {
            return Err(ArgumentError::Duration(duration_ms).into());
        }
        tracing::debug!(frequency_hz, duration_ms, "play tone");
        self.audio
            .lock()
            .play_tone(frequency_hz, duration_ms)
            .map_err(transport)
    }
}

impl fmt::Debug for Speaker {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Speaker").finish_non_exhaustive()
    }
}

fn transport(source: TransportError) -> DeviceError {
    DeviceError::Transport {
        port: LABEL.into(),
        source,
    }
}
