//! Player configuration
//!
//! Stored as YAML in the user's config directory.
//! Default location: ~/.config/handoff-player/config.yaml
//!
//! The decode core's sections (`arena`, `handoff`, `input`, `driver`) sit at
//! the top level next to `output` and `playback`.

use std::path::PathBuf;

use handoff_core::config::{default_config_path as core_config_path, CoreConfig};
use serde::{Deserialize, Serialize};

use crate::output::OutputConfig;

/// Config file name inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    #[serde(flatten)]
    pub core: CoreConfig,
    pub output: OutputConfig,
    pub playback: PlaybackConfig,
}

/// Playback section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Loop the file list forever
    pub repeat: bool,
    /// Seconds between status lines (0 disables them)
    pub status_interval_secs: f64,
    /// Sources that can wait in the stdin queue
    pub queue_capacity: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            repeat: false,
            status_interval_secs: 5.0,
            queue_capacity: 64,
        }
    }
}

/// ~/.config/handoff-player/config.yaml
pub fn default_config_path() -> PathBuf {
    core_config_path(CONFIG_FILE_NAME)
}
