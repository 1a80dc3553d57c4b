//! Clocked output thread and its sinks
//!
//! Without a sound card the consumer is ticked by a thread paced to the
//! sample rate, a batch of frames per wakeup, the way a codec interrupt
//! takes a few frames per FIFO refill. Frames go to a [`SampleSink`]: the
//! emulated codec data register, optionally teed into a WAV recorder.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use handoff_core::handoff::{BlockConsumer, SampleSink};
use handoff_core::{OutputFormat, StereoFrame};

use super::error::{OutputError, OutputResult};

/// Emulated codec transmit register
///
/// Holds the last packed word written, readable from any thread.
#[derive(Debug, Default)]
pub struct DacRegister {
    word: AtomicU32,
    writes: AtomicU64,
}

impl DacRegister {
    pub fn word(&self) -> u32 {
        self.word.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

/// Packs each frame into the register
pub struct RegisterSink {
    register: Arc<DacRegister>,
    format: OutputFormat,
}

impl RegisterSink {
    pub fn new(register: Arc<DacRegister>, format: OutputFormat) -> Self {
        Self { register, format }
    }
}

impl SampleSink for RegisterSink {
    #[inline]
    fn write(&mut self, frame: StereoFrame) {
        self.register
            .word
            .store(frame.pack_word(self.format), Ordering::Relaxed);
        self.register.writes.fetch_add(1, Ordering::Relaxed);
    }
}

/// Records frames as a 16-bit stereo WAV file
pub struct WavSink {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    frames: u64,
}

impl WavSink {
    pub fn create(path: &Path, sample_rate: u32) -> OutputResult<Self> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec)?;
        log::info!("Recording to {:?}", path);
        Ok(Self {
            writer: Some(writer),
            frames: 0,
        })
    }
}

impl SampleSink for WavSink {
    fn write(&mut self, frame: StereoFrame) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let result = writer
            .write_sample(frame.left)
            .and_then(|()| writer.write_sample(frame.right));
        match result {
            Ok(()) => self.frames += 1,
            Err(e) => {
                log::error!("Recording stopped: {}", e);
                self.writer = None;
            }
        }
    }

    fn finish(&mut self) {
        if let Some(writer) = self.writer.take() {
            match writer.finalize() {
                Ok(()) => log::info!("Recorded {} frames", self.frames),
                Err(e) => log::error!("Failed to finalize recording: {}", e),
            }
        }
    }
}

/// A running clocked output; call [`stop`](Self::stop) to end it
pub struct ClockedOutput {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    sample_rate: u32,
}

impl ClockedOutput {
    /// Spawn the output thread
    pub fn start<S>(
        mut consumer: BlockConsumer,
        mut sink: S,
        sample_rate: u32,
        batch: usize,
    ) -> OutputResult<Self>
    where
        S: SampleSink + Send + 'static,
    {
        if sample_rate == 0 {
            return Err(OutputError::ConfigError(
                "Sample rate must be non-zero".to_string(),
            ));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let batch = batch.max(1);
        let period = Duration::from_secs_f64(batch as f64 / sample_rate as f64);

        let thread_stop = stop.clone();
        let thread = std::thread::Builder::new()
            .name("handoff-output".to_string())
            .spawn(move || {
                let mut frames = vec![StereoFrame::silence(); batch];
                let mut deadline = Instant::now();

                while !thread_stop.load(Ordering::Relaxed) {
                    consumer.fill(&mut frames);
                    for frame in &frames {
                        sink.write(*frame);
                    }

                    deadline += period;
                    let now = Instant::now();
                    if deadline > now {
                        std::thread::sleep(deadline - now);
                    } else if now - deadline > period * 64 {
                        // Fell far behind (suspended, overloaded): do not try to catch up
                        deadline = now;
                    }
                }
                sink.finish();
            })?;

        log::info!(
            "Clocked output started: {}Hz, {} frames per tick",
            sample_rate,
            batch
        );
        Ok(Self {
            stop,
            thread: Some(thread),
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Stop ticking and wait for the sink to finish
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Output thread panicked");
            }
        }
    }
}

impl Drop for ClockedOutput {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handoff_core::handoff::{block_channel, NullSink};

    #[test]
    fn test_register_sink_packs_frames() {
        let register = Arc::new(DacRegister::default());
        let mut sink = RegisterSink::new(register.clone(), OutputFormat::Signed);
        sink.write(StereoFrame::new(1, -1));
        assert_eq!(register.word(), 0x0001_FFFF);
        assert_eq!(register.writes(), 1);
    }

    #[test]
    fn test_wav_sink_records_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");

        let mut sink = WavSink::create(&path, 44100).unwrap();
        sink.write(StereoFrame::new(100, -100));
        sink.write(StereoFrame::new(i16::MAX, i16::MIN));
        sink.finish();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 44100);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![100, -100, i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        let (_producer, consumer) = block_channel(4);
        let result = ClockedOutput::start(consumer, NullSink, 0, 4);
        assert!(matches!(result, Err(OutputError::ConfigError(_))));
    }

    #[test]
    fn test_clocked_output_drains_buffer() {
        let (mut producer, consumer) = block_channel(64);
        let register = Arc::new(DacRegister::default());
        let sink = RegisterSink::new(register.clone(), OutputFormat::Signed);

        let output = ClockedOutput::start(consumer, sink, 48000, 4).unwrap();
        producer
            .push_with(200, |i| StereoFrame::mono(i as i16))
            .unwrap();
        producer.wait_drained().unwrap();

        // Every batch after the drain is an underflow repeating the last frame
        let drained_at = register.writes();
        while register.writes() < drained_at + 8 {
            std::thread::sleep(Duration::from_millis(1));
        }
        output.stop();
        assert_eq!(register.word(), StereoFrame::mono(199).pack_word(OutputFormat::Signed));
        assert!(producer.stats().underflows() >= 4);
        assert!(producer.is_abandoned());
    }
}
