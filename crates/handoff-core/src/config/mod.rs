//! Configuration for the decode core
//!
//! [`CoreConfig`] holds the sizing of everything the decode side allocates
//! up front. Applications embed it in their own config file and load it with
//! the generic [`load_config`]/[`save_config`] pair.
//!
//! ```yaml
//! arena:
//!   capacity_bytes: 32768
//! handoff:
//!   block_frames: 1152
//! input:
//!   buffer_bytes: 2100
//! driver:
//!   retry_delay_ms: 250
//! ```

mod io;
mod paths;

pub use io::{load_config, save_config};
pub use paths::{config_dir, default_config_path, APP_DIR_NAME};

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::arena::{Arena, DEFAULT_ARENA_CAPACITY};
use crate::decode::{DecodeDriver, Decoder, InputBuffer, DEFAULT_INPUT_BUFFER_SIZE};
use crate::handoff::{BlockProducer, MAX_BLOCK_CAPACITY};
use crate::types::MAX_BLOCK_FRAMES;

/// Smallest usable staging buffer: one maximum-size Layer III frame plus the
/// header after it
pub const MIN_INPUT_BUFFER_BYTES: usize = 1441 + 4;

/// Session arena sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Reserved region size; requests beyond it fall back to the heap
    pub capacity_bytes: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_ARENA_CAPACITY,
        }
    }
}

/// Block handoff sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffConfig {
    /// Frames per staged block; larger decoded blocks are split
    pub block_frames: usize,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            block_frames: MAX_BLOCK_FRAMES,
        }
    }
}

/// Compressed-input staging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub buffer_bytes: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            buffer_bytes: DEFAULT_INPUT_BUFFER_SIZE,
        }
    }
}

/// Decode loop behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Pause after a source fails to open
    pub retry_delay_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: crate::decode::DEFAULT_RETRY_DELAY.as_millis() as u64,
        }
    }
}

/// Everything the decode core needs to size itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub arena: ArenaConfig,
    pub handoff: HandoffConfig,
    pub input: InputConfig,
    pub driver: DriverConfig,
}

impl CoreConfig {
    pub fn with_arena_capacity(mut self, bytes: usize) -> Self {
        self.arena.capacity_bytes = bytes;
        self
    }

    pub fn with_block_frames(mut self, frames: usize) -> Self {
        self.handoff.block_frames = frames;
        self
    }

    pub fn with_input_buffer(mut self, bytes: usize) -> Self {
        self.input.buffer_bytes = bytes;
        self
    }

    pub fn with_retry_delay_ms(mut self, ms: u64) -> Self {
        self.driver.retry_delay_ms = ms;
        self
    }

    /// Block size clamped to what the handoff supports
    pub fn block_frames(&self) -> usize {
        self.handoff.block_frames.clamp(1, MAX_BLOCK_CAPACITY)
    }

    /// Staging size, raised to at least [`MIN_INPUT_BUFFER_BYTES`]
    pub fn input_buffer_bytes(&self) -> usize {
        if self.input.buffer_bytes < MIN_INPUT_BUFFER_BYTES {
            log::warn!(
                "Input buffer of {} bytes cannot hold a whole frame, using {}",
                self.input.buffer_bytes,
                MIN_INPUT_BUFFER_BYTES
            );
            return MIN_INPUT_BUFFER_BYTES;
        }
        self.input.buffer_bytes
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.driver.retry_delay_ms)
    }

    /// Build a driver sized by this config
    pub fn build_driver<D: Decoder>(&self, decoder: D, producer: BlockProducer) -> DecodeDriver<D> {
        DecodeDriver::new(decoder, producer)
            .with_arena(Arena::new(self.arena.capacity_bytes))
            .with_input(InputBuffer::new(self.input_buffer_bytes()))
            .with_retry_delay(self.retry_delay())
    }
}
