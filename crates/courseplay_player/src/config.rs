// SPDX-License-Identifier: MIT OR Apache-2.0
//! Player settings.
//!
//! Stored as RON next to the courseware, for example:
//!
//! ```ron
//! PlayerConfig(
//!     version: 1,
//!     frame_rate: 30.0,
//!     log_filter: "courseplay_sequencer=debug",
//!     session: (drift_tolerance: 0.5),
//! )
//! ```

use courseplay_sequencer::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Current player settings format version
pub const PLAYER_CONFIG_VERSION: u32 = 1;

/// Failure reading or writing player settings
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("Config I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid RON for these settings
    #[error("Invalid player config: {0}")]
    Parse(String),

    /// Settings could not be serialized
    #[error("Failed to serialize player config: {0}")]
    Serialize(String),

    /// File was written by a newer player
    #[error("Player config version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Newest version this build reads
        supported: u32,
    },
}

/// Headless player settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Settings format version
    pub version: u32,
    /// Simulated frames per second
    pub frame_rate: f64,
    /// Default tracing filter, overridden by `RUST_LOG`
    pub log_filter: String,
    /// Whether narration is played through the simulated audio host
    pub simulate_audio: bool,
    /// Engine policy
    pub session: SessionConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            version: PLAYER_CONFIG_VERSION,
            frame_rate: 60.0,
            log_filter: "info".to_string(),
            simulate_audio: true,
            session: SessionConfig::default(),
        }
    }
}

impl PlayerConfig {
    /// Load settings from a RON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ron(&content)
    }

    /// Load settings, falling back to defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Io(error)) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No player config found, using defaults");
                Ok(Self::default())
            }
            result => result,
        }
    }

    /// Parse settings from RON text
    pub fn from_ron(content: &str) -> Result<Self, ConfigError> {
        let config: PlayerConfig =
            ron::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        if config.version > PLAYER_CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: config.version,
                supported: PLAYER_CONFIG_VERSION,
            });
        }

        Ok(config)
    }

    /// Save settings to a RON file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let pretty = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);

        let content = ron::ser::to_string_pretty(self, pretty)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Length of one simulated frame in seconds
    pub fn frame_interval(&self) -> f64 {
        1.0 / self.frame_rate.max(1.0)
    }
}
