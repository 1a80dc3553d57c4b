//! Decoder seam
//!
//! A decoder is driven through three callbacks, mirroring how block decoders
//! for embedded targets are usually wired: it pulls compressed input when it
//! runs dry, pushes each decoded block, and reports every error. The return
//! value of each callback steers the decoder.

use super::error::DecodeError;
use super::input::InputBuffer;
use crate::arena::Arena;
use crate::types::{Channels, Fixed, StereoFrame};

/// What the decoder should do after a callback returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep decoding
    Continue,
    /// Stop cleanly (end of stream or stop request)
    Stop,
    /// Abort the run
    Break,
}

/// How a decoder run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Input exhausted or a callback returned [`Flow::Stop`]
    Finished,
    /// A callback returned [`Flow::Break`]
    Aborted,
}

/// One decoded block of fixed-point PCM
#[derive(Debug, Clone, Copy)]
pub struct PcmBlock<'a> {
    pub sample_rate: u32,
    pub left: &'a [Fixed],
    /// `None` for mono blocks
    pub right: Option<&'a [Fixed]>,
}

impl<'a> PcmBlock<'a> {
    pub fn mono(sample_rate: u32, samples: &'a [Fixed]) -> Self {
        Self {
            sample_rate,
            left: samples,
            right: None,
        }
    }

    pub fn stereo(sample_rate: u32, left: &'a [Fixed], right: &'a [Fixed]) -> Self {
        debug_assert_eq!(left.len(), right.len(), "Channel lengths must match");
        Self {
            sample_rate,
            left,
            right: Some(right),
        }
    }

    pub fn channels(&self) -> Channels {
        if self.right.is_some() {
            Channels::Stereo
        } else {
            Channels::Mono
        }
    }

    /// Samples per channel
    pub fn frames(&self) -> usize {
        match self.right {
            Some(right) => self.left.len().min(right.len()),
            None => self.left.len(),
        }
    }

    /// Scaled output frame `i`; mono is duplicated into both channels
    #[inline]
    pub fn frame(&self, i: usize) -> StereoFrame {
        let left = self.left[i];
        let right = self.right.map_or(left, |right| right[i]);
        StereoFrame::from_fixed(left, right)
    }
}

/// Callbacks the decoder drives
pub trait DecodeCallbacks {
    /// Refill `input`; [`Flow::Stop`] signals end of stream
    fn input(&mut self, input: &mut InputBuffer) -> Flow;

    /// Take one decoded block
    fn output(&mut self, block: &PcmBlock<'_>) -> Flow;

    /// Decide what to do about an error
    fn error(&mut self, error: &DecodeError) -> Flow;
}

/// Block decoder driven by [`DecodeCallbacks`]
///
/// Session state that should not outlive a session belongs in the arena:
/// the driver resets it before every [`start`](Self::start).
pub trait Decoder {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Prepare a fresh session
    fn start(&mut self, arena: &mut Arena) -> Result<(), DecodeError>;

    /// Decode until input runs out or a callback stops the run
    fn run(
        &mut self,
        arena: &mut Arena,
        input: &mut InputBuffer,
        callbacks: &mut dyn DecodeCallbacks,
    ) -> RunOutcome;

    /// Release session resources that do not live in the arena
    fn finish(&mut self);
}
