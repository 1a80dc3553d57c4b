//! Common types for the handoff core
//!
//! This module contains the fundamental sample types shared by the decode
//! side and the output side: the decoder's fixed-point sample, the 16-bit
//! stereo output unit, and the scaling law between them.

use serde::{Deserialize, Serialize};

/// Maximum PCM samples per channel in one decoded MPEG audio frame (Layer III)
pub const MAX_BLOCK_FRAMES: usize = 1152;

/// Default output sample rate (44.1kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Fractional bits of the decoder's fixed-point sample format
pub const FRAC_BITS: u32 = 28;

/// Fixed-point representation of 1.0
pub const FIXED_ONE: Fixed = 1 << FRAC_BITS;

/// Output sample width in bits
pub const OUTPUT_BITS: u32 = 16;

/// High-resolution decoder sample (signed, `FRAC_BITS` fractional bits)
///
/// The representable range is roughly [-8.0, 8.0); values outside [-1.0, 1.0)
/// are legal decoder output and get clipped when quantized.
pub type Fixed = i32;

/// Convert a float sample to fixed point
///
/// Float-to-int `as` casts saturate, so out-of-range input pins to the
/// extremes instead of wrapping.
#[inline]
pub fn fixed_from_f32(sample: f32) -> Fixed {
    (sample * FIXED_ONE as f32) as Fixed
}

/// Scale one fixed-point sample down to 16 bits
///
/// Round to nearest, clip to [-1.0, 1.0), then drop the extra precision.
/// No dithering or noise shaping is applied.
#[inline]
pub fn scale(sample: Fixed) -> i16 {
    // round
    let rounded = sample.saturating_add(1 << (FRAC_BITS - OUTPUT_BITS));

    // clip
    let clipped = rounded.clamp(-FIXED_ONE, FIXED_ONE - 1);

    // quantize
    (clipped >> (FRAC_BITS + 1 - OUTPUT_BITS)) as i16
}

/// Channel layout of a decoded block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channels {
    Mono = 1,
    Stereo = 2,
}

impl Channels {
    /// Convert from a channel count
    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(Channels::Mono),
            2 => Some(Channels::Stereo),
            _ => None,
        }
    }

    /// Number of channels
    pub fn count(&self) -> usize {
        *self as usize
    }
}

/// Integer encoding expected by the output device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Two's complement, 0 is silence
    #[default]
    Signed,
    /// Offset binary, 0x8000 is silence
    Unsigned,
}

/// One stereo output unit (left and right 16-bit samples)
///
/// Uses `#[repr(C)]` to ensure predictable memory layout: [left, right].
/// This enables zero-copy conversion between `&[StereoFrame]` and `&[i16]`
/// (interleaved format) using bytemuck.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoFrame {
    pub left: i16,
    pub right: i16,
}

impl StereoFrame {
    /// Create a new stereo frame
    #[inline]
    pub const fn new(left: i16, right: i16) -> Self {
        Self { left, right }
    }

    /// Create a silent frame
    #[inline]
    pub const fn silence() -> Self {
        Self { left: 0, right: 0 }
    }

    /// Create a mono frame (same value in both channels)
    #[inline]
    pub const fn mono(value: i16) -> Self {
        Self { left: value, right: value }
    }

    /// Scale a pair of fixed-point samples into one frame
    #[inline]
    pub fn from_fixed(left: Fixed, right: Fixed) -> Self {
        Self {
            left: scale(left),
            right: scale(right),
        }
    }

    /// Left and right as offset-binary words
    #[inline]
    pub fn to_unsigned(&self) -> (u16, u16) {
        (to_offset_binary(self.left), to_offset_binary(self.right))
    }

    /// Left and right as floats in [-1.0, 1.0)
    #[inline]
    pub fn to_f32(&self) -> (f32, f32) {
        (self.left as f32 / 32768.0, self.right as f32 / 32768.0)
    }

    /// Pack into one 32-bit codec word: left in the upper half, right in the lower
    #[inline]
    pub fn pack_word(&self, format: OutputFormat) -> u32 {
        let (left, right) = match format {
            OutputFormat::Signed => (self.left as u16, self.right as u16),
            OutputFormat::Unsigned => self.to_unsigned(),
        };
        ((left as u32) << 16) | right as u32
    }
}

#[inline]
fn to_offset_binary(sample: i16) -> u16 {
    (sample as u16) ^ 0x8000
}

/// View stereo frames as interleaved samples [L, R, L, R, ...] without copying
#[inline]
pub fn as_interleaved(frames: &[StereoFrame]) -> &[i16] {
    bytemuck::cast_slice(frames)
}
