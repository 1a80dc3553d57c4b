//! MPEG audio Layer III decoder
//!
//! Frames are located in the staging buffer by [`header::scan`] and each
//! whole frame is handed to symphonia's MP3 codec as one packet. Decoded
//! samples are converted to fixed point in arena scratch and delivered as a
//! [`PcmBlock`].

pub mod header;

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Channels as CodecChannels, Signal};
use symphonia::core::codecs::{
    CodecParameters, Decoder as CodecDecoder, DecoderOptions, CODEC_TYPE_MP3,
};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;

use self::header::{FrameHeader, Scan};
use super::decoder::{DecodeCallbacks, Decoder, Flow, PcmBlock, RunOutcome};
use super::error::DecodeError;
use super::input::InputBuffer;
use crate::arena::{Arena, ArenaBlock};
use crate::types::{fixed_from_f32, Channels, Fixed, MAX_BLOCK_FRAMES};

/// Bytes of arena scratch per session: one fixed-point plane per channel
const SCRATCH_BYTES: usize = 2 * MAX_BLOCK_FRAMES * std::mem::size_of::<Fixed>();

/// Codec configuration the current instance was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StreamParams {
    sample_rate: u32,
    channels: Channels,
}

impl From<&FrameHeader> for StreamParams {
    fn from(header: &FrameHeader) -> Self {
        Self {
            sample_rate: header.sample_rate,
            channels: header.channels,
        }
    }
}

/// Layer III decoder over symphonia
pub struct MpegDecoder {
    codec: Option<Box<dyn CodecDecoder>>,
    params: Option<StreamParams>,
    /// Fixed-point output planes, allocated per session
    scratch: Option<ArenaBlock>,
    /// Tag bytes still to skip past the current window
    skip_remaining: usize,
    /// Packet timestamp in frames
    ts: u64,
}

impl MpegDecoder {
    pub fn new() -> Self {
        Self {
            codec: None,
            params: None,
            scratch: None,
            skip_remaining: 0,
            ts: 0,
        }
    }

    fn build_codec(params: StreamParams) -> Result<Box<dyn CodecDecoder>, DecodeError> {
        let layout = match params.channels {
            Channels::Mono => CodecChannels::FRONT_LEFT,
            Channels::Stereo => CodecChannels::FRONT_LEFT | CodecChannels::FRONT_RIGHT,
        };

        let mut codec_params = CodecParameters::new();
        codec_params
            .for_codec(CODEC_TYPE_MP3)
            .with_sample_rate(params.sample_rate)
            .with_channels(layout)
            .with_max_frames_per_packet(MAX_BLOCK_FRAMES as u64);

        symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Fatal(format!("Cannot create MP3 codec: {}", e)))
    }

    /// Make sure the codec matches `header`, rebuilding it on a change
    fn prepare_codec(&mut self, header: &FrameHeader) -> Result<(), DecodeError> {
        let wanted = StreamParams::from(header);
        if self.codec.is_some() && self.params == Some(wanted) {
            return Ok(());
        }

        if let Some(previous) = self.params {
            log::debug!(
                "Stream parameters changed ({} Hz {:?} -> {} Hz {:?}), rebuilding codec",
                previous.sample_rate,
                previous.channels,
                wanted.sample_rate,
                wanted.channels
            );
        }
        self.codec = Some(Self::build_codec(wanted)?);
        self.params = Some(wanted);
        Ok(())
    }

    /// Decode the frame at the front of `input` and hand it to `callbacks`
    fn decode_frame(
        &mut self,
        arena: &mut Arena,
        input: &mut InputBuffer,
        header: &FrameHeader,
        callbacks: &mut dyn DecodeCallbacks,
    ) -> Flow {
        if let Err(e) = self.prepare_codec(header) {
            return callbacks.error(&e);
        }

        let packet = Packet::new_from_slice(
            0,
            self.ts,
            header.samples_per_frame() as u64,
            &input.pending()[..header.frame_len],
        );
        input.consume(header.frame_len);
        self.ts += header.samples_per_frame() as u64;

        let Some(scratch) = self.scratch.as_mut() else {
            return callbacks.error(&DecodeError::Fatal("Decoder not started".into()));
        };
        let Some(bytes) = arena.bytes_mut(scratch) else {
            return callbacks.error(&DecodeError::Fatal("Scratch outlived its session".into()));
        };
        let planes: &mut [Fixed] = bytemuck::cast_slice_mut(bytes);
        let (left, right) = planes.split_at_mut(MAX_BLOCK_FRAMES);

        let Some(codec) = self.codec.as_mut() else {
            return Flow::Break;
        };
        let decoded = codec
            .decode(&packet)
            .map(|decoded| convert_to_fixed(&decoded, left, right));
        let (sample_rate, frames, stereo) = match decoded {
            Ok(converted) => converted,
            Err(SymphoniaError::DecodeError(msg)) => {
                return callbacks.error(&DecodeError::BadFrame(msg.to_string()));
            }
            Err(SymphoniaError::IoError(e)) => {
                // Bit reservoir not yet filled, usually right after sync loss
                return callbacks.error(&DecodeError::BadFrame(e.to_string()));
            }
            Err(SymphoniaError::ResetRequired) => {
                self.codec = None;
                return callbacks.error(&DecodeError::BadFrame("Codec reset".into()));
            }
            Err(e) => return callbacks.error(&DecodeError::Fatal(e.to_string())),
        };

        if frames == 0 {
            return Flow::Continue;
        }
        let block = if stereo {
            PcmBlock::stereo(sample_rate, &left[..frames], &right[..frames])
        } else {
            PcmBlock::mono(sample_rate, &left[..frames])
        };
        callbacks.output(&block)
    }
}

impl Default for MpegDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MpegDecoder {
    fn name(&self) -> &str {
        "mpeg-layer3"
    }

    fn start(&mut self, arena: &mut Arena) -> Result<(), DecodeError> {
        self.scratch = Some(arena.allocate(SCRATCH_BYTES));
        self.skip_remaining = 0;
        self.ts = 0;
        // Layer III carries state across frames; a new stream needs a fresh codec
        self.codec = None;
        self.params = None;
        Ok(())
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        input: &mut InputBuffer,
        callbacks: &mut dyn DecodeCallbacks,
    ) -> RunOutcome {
        loop {
            let flow = if self.skip_remaining > 0 {
                let n = self.skip_remaining.min(input.tail_len());
                input.consume(n);
                self.skip_remaining -= n;
                if self.skip_remaining > 0 {
                    None
                } else {
                    Some(Flow::Continue)
                }
            } else {
                let window_full = input.tail_len() == input.capacity();
                match header::scan(input.pending(), input.is_eof(), window_full) {
                    Scan::Frame { offset, header } => {
                        let flow = report_skipped(input, offset, callbacks);
                        if flow == Flow::Continue {
                            Some(self.decode_frame(arena, input, &header, callbacks))
                        } else {
                            Some(flow)
                        }
                    }
                    Scan::Tag { offset, len } => {
                        let flow = report_skipped(input, offset, callbacks);
                        if flow == Flow::Continue {
                            let available = input.tail_len();
                            input.consume(len);
                            self.skip_remaining = len.saturating_sub(available);
                            Some(callbacks.error(&DecodeError::Tag { len }))
                        } else {
                            Some(flow)
                        }
                    }
                    Scan::NeedMore { discard } => {
                        let flow = report_skipped(input, discard, callbacks);
                        if flow == Flow::Continue {
                            None
                        } else {
                            Some(flow)
                        }
                    }
                }
            };

            // `None` means the window is exhausted
            let flow = match flow {
                Some(flow) => flow,
                None if input.is_eof() => return RunOutcome::Finished,
                None => match callbacks.input(input) {
                    // A last pass over the tail at end of stream
                    Flow::Stop if input.is_eof() => Flow::Continue,
                    flow => flow,
                },
            };

            match flow {
                Flow::Continue => {}
                Flow::Stop => return RunOutcome::Finished,
                Flow::Break => return RunOutcome::Aborted,
            }
        }
    }

    fn finish(&mut self) {
        self.codec = None;
        self.params = None;
        self.scratch = None;
        self.skip_remaining = 0;
    }
}

/// Drop `skipped` bytes of garbage and report the lost sync
fn report_skipped(
    input: &mut InputBuffer,
    skipped: usize,
    callbacks: &mut dyn DecodeCallbacks,
) -> Flow {
    if skipped == 0 {
        return Flow::Continue;
    }
    input.consume(skipped);
    callbacks.error(&DecodeError::LostSync { skipped })
}

/// Write decoded samples into the fixed-point planes
///
/// Returns the sample rate, the frame count and whether the block is stereo.
fn convert_to_fixed(
    decoded: &AudioBufferRef<'_>,
    left: &mut [Fixed],
    right: &mut [Fixed],
) -> (u32, usize, bool) {
    match decoded {
        AudioBufferRef::F32(buf) => copy_planes(buf, left, right),
        other => {
            let mut converted: AudioBuffer<f32> = other.make_equivalent();
            other.convert(&mut converted);
            copy_planes(&converted, left, right)
        }
    }
}

fn copy_planes(buf: &AudioBuffer<f32>, left: &mut [Fixed], right: &mut [Fixed]) -> (u32, usize, bool) {
    let spec = buf.spec();
    let frames = buf.frames().min(left.len());
    let stereo = spec.channels.count() > 1;

    for (dst, &src) in left[..frames].iter_mut().zip(buf.chan(0)) {
        *dst = fixed_from_f32(src);
    }
    if stereo {
        for (dst, &src) in right[..frames].iter_mut().zip(buf.chan(1)) {
            *dst = fixed_from_f32(src);
        }
    }
    (spec.rate, frames, stereo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::input::DEFAULT_INPUT_BUFFER_SIZE;
    use std::io::Cursor;

    const HEADER_128K: [u8; 4] = [0xFF, 0xFB, 0x90, 0x64];

    /// Records what the decoder reports
    struct Recorder {
        source: Cursor<Vec<u8>>,
        errors: Vec<DecodeError>,
        blocks: usize,
        /// (sample rate, channels, frames) per delivered block
        shapes: Vec<(u32, usize, usize)>,
        /// Largest sample magnitude seen in any block
        peak: Fixed,
    }

    impl Recorder {
        fn new(bytes: Vec<u8>) -> Self {
            Self {
                source: Cursor::new(bytes),
                errors: Vec::new(),
                blocks: 0,
                shapes: Vec::new(),
                peak: 0,
            }
        }
    }

    impl DecodeCallbacks for Recorder {
        fn input(&mut self, input: &mut InputBuffer) -> Flow {
            match input.refill(&mut self.source) {
                Ok(0) | Err(_) => Flow::Stop,
                Ok(_) => Flow::Continue,
            }
        }

        fn output(&mut self, block: &PcmBlock<'_>) -> Flow {
            self.blocks += 1;
            self.shapes
                .push((block.sample_rate, block.channels().count(), block.frames()));
            let right = block.right.unwrap_or(&[]);
            for &sample in block.left.iter().chain(right) {
                self.peak = self.peak.max(sample.saturating_abs());
            }
            Flow::Continue
        }

        fn error(&mut self, error: &DecodeError) -> Flow {
            self.errors.push(error.clone());
            if error.is_recoverable() {
                Flow::Continue
            } else {
                Flow::Break
            }
        }
    }

    fn run(bytes: Vec<u8>) -> (RunOutcome, Recorder) {
        let mut arena = Arena::new(16 * 1024);
        let mut input = InputBuffer::new(DEFAULT_INPUT_BUFFER_SIZE);
        let mut decoder = MpegDecoder::new();
        let mut recorder = Recorder::new(bytes);

        decoder.start(&mut arena).unwrap();
        let outcome = decoder.run(&mut arena, &mut input, &mut recorder);
        decoder.finish();
        (outcome, recorder)
    }

    #[test]
    fn test_empty_stream_finishes() {
        let (outcome, recorder) = run(Vec::new());
        assert_eq!(outcome, RunOutcome::Finished);
        assert_eq!(recorder.blocks, 0);
        assert!(recorder.errors.is_empty());
    }

    #[test]
    fn test_garbage_reported_as_lost_sync() {
        let (outcome, recorder) = run(vec![0x55; 5000]);
        assert_eq!(outcome, RunOutcome::Finished);
        assert_eq!(recorder.blocks, 0);

        let skipped: usize = recorder
            .errors
            .iter()
            .map(|e| match e {
                DecodeError::LostSync { skipped } => *skipped,
                other => panic!("unexpected {:?}", other),
            })
            .sum();
        // Two bytes are kept back as a possible tag marker
        assert_eq!(skipped, 4998);
    }

    #[test]
    fn test_tag_longer_than_window_is_skipped() {
        // 4000-byte ID3v2 tag (syncsafe 3990 = 0x1F 0x16), then silence
        let mut bytes = vec![b'I', b'D', b'3', 4, 0, 0, 0, 0, 0x1F, 0x16];
        bytes.resize(4000, 0xAB);
        bytes.extend_from_slice(&[0u8; 64]);

        let (outcome, recorder) = run(bytes);
        assert_eq!(outcome, RunOutcome::Finished);
        assert_eq!(recorder.errors[0], DecodeError::Tag { len: 4000 });
        // The tag body is never scanned for sync
        assert!(recorder.errors[1..]
            .iter()
            .all(|e| matches!(e, DecodeError::LostSync { .. })));
        let skipped: usize = recorder.errors[1..]
            .iter()
            .map(|e| match e {
                DecodeError::LostSync { skipped } => *skipped,
                _ => 0,
            })
            .sum();
        assert_eq!(skipped, 62);
    }

    /// Whole frames with all-zero side info: valid Layer III silence
    fn silent_frames(header: [u8; 4], count: usize) -> Vec<u8> {
        let len = header::FrameHeader::parse(&header).unwrap().frame_len;
        let mut bytes = Vec::new();
        for _ in 0..count {
            let start = bytes.len();
            bytes.extend_from_slice(&header);
            bytes.resize(start + len, 0);
        }
        bytes
    }

    /// MPEG-2 Layer III, 64 kbps, 22.05 kHz, mono
    const HEADER_MPEG2_MONO: [u8; 4] = [0xFF, 0xF3, 0x80, 0xC0];

    #[test]
    fn test_silent_frames_decode() {
        let (outcome, recorder) = run(silent_frames(HEADER_128K, 4));
        assert_eq!(outcome, RunOutcome::Finished);
        assert!(recorder.errors.is_empty(), "{:?}", recorder.errors);
        assert_eq!(recorder.blocks, 4);
        assert!(recorder
            .shapes
            .iter()
            .all(|&shape| shape == (44100, 2, MAX_BLOCK_FRAMES)));
        assert_eq!(recorder.peak, 0);
    }

    #[test]
    fn test_codec_rebuilt_on_stream_change() {
        let mut bytes = silent_frames(HEADER_128K, 3);
        bytes.extend_from_slice(&silent_frames(HEADER_MPEG2_MONO, 3));

        let (outcome, recorder) = run(bytes);
        assert_eq!(outcome, RunOutcome::Finished);
        assert!(recorder.errors.iter().all(DecodeError::is_recoverable));

        // The frame right before the switch has no matching successor
        let stereo = recorder.shapes.iter().filter(|s| **s == (44100, 2, 1152)).count();
        let mono = recorder.shapes.iter().filter(|s| **s == (22050, 1, 576)).count();
        assert!(stereo >= 2, "{:?}", recorder.shapes);
        assert_eq!(mono, 3, "{:?}", recorder.shapes);
        assert_eq!(recorder.shapes.last(), Some(&(22050, 1, 576)));
    }

    #[test]
    fn test_tag_between_frames() {
        // 30-byte ID3v2 tag in the middle of the stream
        let mut bytes = silent_frames(HEADER_128K, 1);
        bytes.extend_from_slice(&[b'I', b'D', b'3', 3, 0, 0, 0, 0, 0, 20]);
        bytes.extend_from_slice(&[0x20; 20]);
        bytes.extend_from_slice(&silent_frames(HEADER_128K, 2));

        let (outcome, recorder) = run(bytes);
        assert_eq!(outcome, RunOutcome::Finished);
        assert_eq!(recorder.errors, vec![DecodeError::Tag { len: 30 }]);
        assert_eq!(recorder.blocks, 3);
    }

    #[test]
    fn test_last_frame_before_trailer_decodes() {
        let mut bytes = silent_frames(HEADER_128K, 3);
        bytes.extend_from_slice(b"LYRICSBEGIN");
        bytes.extend_from_slice(&[0x20; 24]);

        let (outcome, recorder) = run(bytes);
        assert_eq!(outcome, RunOutcome::Finished);
        assert_eq!(recorder.blocks, 3);
        assert!(recorder
            .errors
            .iter()
            .all(|e| matches!(e, DecodeError::LostSync { .. })));
    }
}
