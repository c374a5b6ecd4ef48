//! Engine configuration: sample layout, stream routing and ducking policy.

use crate::constants::{DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw PCM sample encodings accepted by the engine.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    U8,
    #[default]
    S16Le,
    S24Le,
    S32Le,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16Le => 2,
            SampleFormat::S24Le => 3,
            SampleFormat::S32Le => 4,
        }
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bytes_per_sample() as u16 * 8
    }
}

/// Output routing categories understood by the platform audio policy.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamCategory {
    #[default]
    Media,
    System,
    Notification,
    VoiceInformation,
}

/// Audio configuration, supplied once when the engine is constructed.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct AudioOptions {
    /// Output sample rate in Hz
    pub sample_rate: u32,

    /// Number of interleaved channels
    pub channels: u16,

    pub sample_format: SampleFormat,

    /// Category the speech output stream is routed as
    pub stream_category: StreamCategory,

    /// Competing category to attenuate while speech plays
    pub ducking_category: StreamCategory,

    /// Fade time for ducking activation in milliseconds
    pub ducking_duration_ms: u64,

    /// Fraction of the competing stream volume retained while ducked
    pub ducking_ratio: f64,
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            sample_format: SampleFormat::default(),
            stream_category: StreamCategory::VoiceInformation,
            ducking_category: StreamCategory::Media,
            ducking_duration_ms: 300,
            ducking_ratio: 0.2,
        }
    }
}

impl AudioOptions {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::InvalidOptions(
                "sample rate must be positive".to_string(),
            ));
        }

        if self.channels == 0 {
            return Err(Error::InvalidOptions(
                "channel count must be positive".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.ducking_ratio) {
            return Err(Error::InvalidOptions(format!(
                "ducking ratio {} is outside of 0.0..=1.0",
                self.ducking_ratio
            )));
        }

        Ok(())
    }

    /// Size of one interleaved frame in bytes.
    pub fn frame_size(&self) -> usize {
        self.channels as usize * self.sample_format.bytes_per_sample()
    }

    /// Playback rate in bytes per second.
    pub fn byte_rate(&self) -> u64 {
        self.sample_rate as u64 * self.frame_size() as u64
    }

    pub fn ducking_duration(&self) -> Duration {
        Duration::from_millis(self.ducking_duration_ms)
    }
}
