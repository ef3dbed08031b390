use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{error::KomaError, preview::CompositeMode};

pub const TILE_SIZE: u32 = 128;
pub const FRAME_RATE: u32 = 24;

fn default_tile_size() -> u32 {
    TILE_SIZE
}

fn default_frame_rate() -> u32 {
    FRAME_RATE
}

fn default_load_timeout_ms() -> u64 {
    5000
}

fn default_texture_unload_delay_ms() -> u64 {
    5000
}

/// Tunables for generating and playing back animation previews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Edge length in pixels of one atlas tile.
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
    /// Playback cadence in ticks per second.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    /// How long the player waits for a load before falling back to idle.
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,
    /// Grace period before a released texture is destroyed.
    #[serde(default = "default_texture_unload_delay_ms")]
    pub texture_unload_delay_ms: u64,
    #[serde(default)]
    pub composite_mode: CompositeMode,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            tile_size: default_tile_size(),
            frame_rate: default_frame_rate(),
            load_timeout_ms: default_load_timeout_ms(),
            texture_unload_delay_ms: default_texture_unload_delay_ms(),
            composite_mode: CompositeMode::default(),
        }
    }
}

impl PreviewConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, KomaError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn texture_unload_delay(&self) -> Duration {
        Duration::from_millis(self.texture_unload_delay_ms)
    }
}
