//! Output side of the player
//!
//! Owns the [`BlockConsumer`] and ticks it at the output rate, either from a
//! cpal device callback or from a clocked thread.

mod clocked;
mod config;
mod device;
mod device_stream;
mod error;

use std::sync::Arc;

use handoff_core::handoff::BlockConsumer;

pub use clocked::{ClockedOutput, DacRegister, RegisterSink, WavSink};
pub use config::{DeviceId, OutputBackend, OutputConfig};
pub use device::list_output_devices;
pub use device_stream::{start_device_output, DeviceOutput};
pub use error::{OutputError, OutputResult};

/// A running output of either kind
pub enum OutputHandle {
    Device(DeviceOutput),
    Clocked {
        output: ClockedOutput,
        register: Arc<DacRegister>,
    },
}

impl OutputHandle {
    /// Rate the consumer is ticked at
    pub fn sample_rate(&self) -> u32 {
        match self {
            OutputHandle::Device(output) => output.sample_rate(),
            OutputHandle::Clocked { output, .. } => output.sample_rate(),
        }
    }

    /// Stop ticking; a recording is finalized before this returns
    pub fn stop(self) {
        match self {
            OutputHandle::Device(output) => drop(output),
            OutputHandle::Clocked { output, .. } => output.stop(),
        }
    }
}

/// Start the configured output, handing it the consumer half
pub fn start_output(config: &OutputConfig, consumer: BlockConsumer) -> OutputResult<OutputHandle> {
    if config.sample_rate == 0 {
        return Err(OutputError::ConfigError(
            "Sample rate must be non-zero".to_string(),
        ));
    }

    match config.backend {
        OutputBackend::Device => {
            if config.record.is_some() {
                log::warn!("Recording needs the clocked backend, ignoring record path");
            }
            start_device_output(config, consumer).map(OutputHandle::Device)
        }
        OutputBackend::Clocked => {
            let register = Arc::new(DacRegister::default());
            let recorder = match &config.record {
                Some(path) => Some(WavSink::create(path, config.sample_rate)?),
                None => None,
            };
            let sink = (
                RegisterSink::new(register.clone(), config.word_format),
                recorder,
            );
            let output =
                ClockedOutput::start(consumer, sink, config.sample_rate, config.tick_batch())?;
            Ok(OutputHandle::Clocked { output, register })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handoff_core::handoff::block_channel;
    use handoff_core::StereoFrame;

    #[test]
    fn test_zero_sample_rate_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.wav");
        let config: OutputConfig = serde_yaml::from_str("backend: clocked\nsample_rate: 0\n").unwrap();
        let config = config.with_record(path.clone());

        let (_producer, consumer) = block_channel(4);
        let result = start_output(&config, consumer);
        assert!(matches!(result, Err(OutputError::ConfigError(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_clocked_backend_records_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        let config = OutputConfig::default().with_record(path.clone());

        let (mut producer, consumer) = block_channel(16);
        let handle = start_output(&config, consumer).unwrap();
        assert_eq!(handle.sample_rate(), config.sample_rate);

        producer.push_with(32, |_| StereoFrame::mono(7)).unwrap();
        producer.wait_drained().unwrap();
        handle.stop();

        let reader = hound::WavReader::open(&path).unwrap();
        // Leading silence, then the frames, then repeats of the last one
        assert!(reader.len() >= 64);
    }
}
