//! Decode and session error types

use thiserror::Error;

use crate::handoff::HandoffError;

/// Conditions reported by a decoder through its error callback
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Bytes that did not start a valid frame were skipped
    #[error("Lost sync, skipped {skipped} bytes")]
    LostSync { skipped: usize },

    /// A metadata tag was skipped
    #[error("Skipped {len} byte metadata tag")]
    Tag { len: usize },

    /// One frame could not be decoded; the next one may be fine
    #[error("Bad frame: {0}")]
    BadFrame(String),

    /// The stream cannot be decoded any further
    #[error("Fatal decode error: {0}")]
    Fatal(String),
}

impl DecodeError {
    /// Whether decoding can continue past this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DecodeError::Fatal(_))
    }
}

/// Errors that end a source before or outside decoding
#[derive(Error, Debug)]
pub enum SessionError {
    /// The source could not be opened; nothing was decoded
    #[error("Source unavailable: {name}")]
    SourceUnavailable {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The output side is gone; no further source can be played
    #[error(transparent)]
    Handoff(#[from] HandoffError),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(DecodeError::LostSync { skipped: 3 }.is_recoverable());
        assert!(DecodeError::Tag { len: 128 }.is_recoverable());
        assert!(DecodeError::BadFrame("crc".into()).is_recoverable());
        assert!(!DecodeError::Fatal("no codec".into()).is_recoverable());
    }
}
