//! Handoff error types

use thiserror::Error;

/// Errors that can occur on the producer side of the handoff
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandoffError {
    /// The consumer half was dropped; nothing will ever drain the buffer
    #[error("Output consumer disconnected with {pending} frames still queued")]
    ConsumerDisconnected { pending: usize },
}

/// Result type for handoff operations
pub type HandoffResult<T> = Result<T, HandoffError>;
