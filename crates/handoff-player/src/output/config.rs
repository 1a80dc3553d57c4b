//! Output configuration
//!
//! Selects the output backend and describes how it should run.

use std::path::PathBuf;

use handoff_core::{OutputFormat, DEFAULT_SAMPLE_RATE};
use serde::{Deserialize, Serialize};

/// Default frames per clocked tick batch (one output interrupt's worth)
pub const DEFAULT_TICK_BATCH: usize = 4;

/// Largest device buffer we ask for
pub const MAX_BUFFER_SIZE: u32 = 8192;

/// Where frames go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputBackend {
    /// A cpal output stream; the device callback drives the ticks
    #[default]
    Device,
    /// A thread that ticks at the sample rate (no sound card needed)
    Clocked,
}

/// Preferred device buffer size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferSize {
    /// Let the host decide
    #[default]
    Default,
    /// Request a fixed size in frames (the host may adjust it)
    Fixed(u32),
}

impl BufferSize {
    pub fn as_frames(&self) -> Option<u32> {
        match self {
            BufferSize::Default => None,
            BufferSize::Fixed(frames) => Some((*frames).clamp(16, MAX_BUFFER_SIZE)),
        }
    }
}

/// Audio device identifier
///
/// The host (ALSA, JACK, CoreAudio, ...) is optional; without it every host
/// is searched by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Parse `"[HOST] name"` or a bare name
    pub fn parse(label: &str) -> Self {
        let label = label.trim();
        if let Some(rest) = label.strip_prefix('[') {
            if let Some((host, name)) = rest.split_once(']') {
                return Self::with_host(name.trim(), host.trim());
            }
        }
        Self::new(label)
    }

    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Output section of the player config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub backend: OutputBackend,
    /// `None` = host default device
    pub device: Option<DeviceId>,
    pub buffer_size: BufferSize,
    /// Output rate; decoded audio is not resampled
    pub sample_rate: u32,
    /// Word layout of the clocked backend's emulated codec register
    pub word_format: OutputFormat,
    /// Frames per clocked tick batch
    pub tick_batch: usize,
    /// Record everything the clocked backend plays to this WAV file
    pub record: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            backend: OutputBackend::default(),
            device: None,
            buffer_size: BufferSize::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            word_format: OutputFormat::default(),
            tick_batch: DEFAULT_TICK_BATCH,
            record: None,
        }
    }
}

impl OutputConfig {
    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames);
        self
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Record to a WAV file; recording needs the clocked backend
    pub fn with_record(mut self, path: PathBuf) -> Self {
        if self.backend != OutputBackend::Clocked {
            log::info!("Recording requested, switching to clocked output");
            self.backend = OutputBackend::Clocked;
        }
        self.record = Some(path);
        self
    }

    /// Batch size, at least one frame
    pub fn tick_batch(&self) -> usize {
        self.tick_batch.max(1)
    }
}
