//! cpal output stream driven by the block handoff
//!
//! ```text
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │   Decode Thread  │──push_with()───────►│   Block Buffer      │
//! │  (DecodeDriver)  │   waits for drain   │  (lock-free SPSC)   │
//! └──────────────────┘                     └──────────┬──────────┘
//!                                                     │ tick() per frame
//!                                          ┌──────────▼──────────┐
//!                                          │  cpal Audio Thread  │
//!                                          │  (owns consumer)    │
//!                                          └─────────────────────┘
//! ```
//!
//! The callback only ticks the consumer and converts samples; it never
//! locks, allocates or logs.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, SizedSample, Stream, StreamConfig};

use handoff_core::handoff::BlockConsumer;
use handoff_core::StereoFrame;

use super::config::OutputConfig;
use super::device::{default_device, find_device};
use super::error::{OutputError, OutputResult};

/// Sample formats the stream can write, in order of preference
const PREFERRED_FORMATS: [SampleFormat; 3] = [SampleFormat::I16, SampleFormat::F32, SampleFormat::U16];

/// A running device stream; drop it to stop playback
pub struct DeviceOutput {
    _stream: Stream,
    device_name: String,
    sample_rate: u32,
    channels: u16,
    format: SampleFormat,
}

impl DeviceOutput {
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }
}

/// Open the configured device and start pulling frames from `consumer`
pub fn start_device_output(
    config: &OutputConfig,
    consumer: BlockConsumer,
) -> OutputResult<DeviceOutput> {
    let device = match &config.device {
        Some(id) => find_device(id)?,
        None => default_device()?,
    };
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let supported = select_config(&device, config.sample_rate)?;
    let format = supported.sample_format();
    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: match config.buffer_size.as_frames() {
            Some(frames) => CpalBufferSize::Fixed(frames),
            None => CpalBufferSize::Default,
        },
    };

    log::info!(
        "Output config: {} channels, {}Hz, {:?}, buffer {:?}",
        stream_config.channels,
        stream_config.sample_rate.0,
        format,
        stream_config.buffer_size
    );

    let stream = match format {
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, consumer, 0, |f| {
            (f.left, f.right)
        }),
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, consumer, 0.0, |f| {
            f.to_f32()
        }),
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, consumer, 0x8000, |f| {
            f.to_unsigned()
        }),
        other => return Err(OutputError::UnsupportedFormat(format!("{:?}", other))),
    }?;

    stream
        .play()
        .map_err(|e| OutputError::StreamPlayError(e.to_string()))?;
    log::info!("Audio stream started");

    Ok(DeviceOutput {
        _stream: stream,
        device_name,
        sample_rate: stream_config.sample_rate.0,
        channels: stream_config.channels,
        format,
    })
}

/// Pick a stereo config at `sample_rate` in one of the writable formats
fn select_config(
    device: &cpal::Device,
    sample_rate: u32,
) -> OutputResult<cpal::SupportedStreamConfig> {
    let configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| OutputError::ConfigError(e.to_string()))?
        .collect();

    let covers_rate =
        |c: &cpal::SupportedStreamConfigRange| (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&sample_rate);

    for format in PREFERRED_FORMATS {
        if let Some(range) = configs
            .iter()
            .find(|c| c.sample_format() == format && c.channels() >= 2 && covers_rate(c))
        {
            return Ok(range.clone().with_sample_rate(cpal::SampleRate(sample_rate)));
        }
    }

    // Playing at the wrong rate would change pitch; refuse instead
    Err(OutputError::ConfigError(format!(
        "No stereo i16/f32/u16 output config at {}Hz",
        sample_rate
    )))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut consumer: BlockConsumer,
    silence: T,
    convert: fn(&StereoFrame) -> (T, T),
) -> OutputResult<Stream>
where
    T: SizedSample + Send + 'static,
{
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let (left, right) = convert(&consumer.tick());
                    frame[0] = left;
                    if let Some(slot) = frame.get_mut(1) {
                        *slot = right;
                    }
                    for slot in frame.iter_mut().skip(2) {
                        *slot = silence;
                    }
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| OutputError::StreamBuildError(e.to_string()))
}
