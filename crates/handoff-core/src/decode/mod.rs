//! Decode side: input staging, the decoder seam, sources and the driver loop

mod decoder;
mod driver;
mod error;
mod input;
#[cfg(feature = "mpeg")]
pub mod mpeg;
mod source;

pub use decoder::{DecodeCallbacks, Decoder, Flow, PcmBlock, RunOutcome};
pub use driver::{
    DecodeDriver, DriverState, DriverSummary, SessionOutcome, SessionReport, DEFAULT_RETRY_DELAY,
};
pub use error::{DecodeError, SessionError, SessionResult};
pub use input::{InputBuffer, DEFAULT_INPUT_BUFFER_SIZE};
#[cfg(feature = "mpeg")]
pub use mpeg::MpegDecoder;
pub use source::{
    source_queue, Chain, Playlist, QueueSource, RepeatSource, SourceKind, SourceQueue, SourceSender,
    SourceSpec,
};
