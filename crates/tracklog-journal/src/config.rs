//! RON configuration for recording and playback

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracklog_core::TimeRange;

/// Playback settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlaybackConfig {
    /// Speed multiplier: 1.0 replays recorded gaps as-is, 2.0 halves them
    #[serde(default = "default_rate")]
    pub rate: f64,
    /// Consecutive publish failures tolerated before the session stops
    #[serde(default = "default_max_failures")]
    pub max_publish_failures: u32,
    /// Only replay records inside this window
    #[serde(default)]
    pub range: TimeRange,
}

fn default_rate() -> f64 {
    1.0
}

fn default_max_failures() -> u32 {
    16
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            max_publish_failures: default_max_failures(),
            range: TimeRange::all(),
        }
    }
}

impl PlaybackConfig {
    /// Set the speed multiplier
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// Restrict playback to a time window
    pub fn with_range(mut self, range: TimeRange) -> Self {
        self.range = range;
        self
    }

    /// Check the settings are usable
    pub fn validate(&self) -> Result<()> {
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err(Error::Config(format!(
                "playback rate must be a positive number, got {}",
                self.rate
            )));
        }
        if self.max_publish_failures == 0 {
            return Err(Error::Config(
                "max_publish_failures must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate from a RON string
    pub fn from_ron_str(content: &str) -> Result<Self> {
        let config: Self = ron::from_str(content).map_err(|e| Error::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate from a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_ron_str(&fs::read_to_string(path)?)
    }
}

/// Recorder settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RecorderConfig {
    /// Consecutive append failures tolerated before recording is abandoned
    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: default_max_failures(),
        }
    }
}

impl RecorderConfig {
    /// Check the settings are usable
    pub fn validate(&self) -> Result<()> {
        if self.max_consecutive_failures == 0 {
            return Err(Error::Config(
                "max_consecutive_failures must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate from a RON string
    pub fn from_ron_str(content: &str) -> Result<Self> {
        let config: Self = ron::from_str(content).map_err(|e| Error::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate from a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_ron_str(&fs::read_to_string(path)?)
    }
}
