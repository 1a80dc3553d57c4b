//! Lock-free handoff counters
//!
//! Written by both sides with relaxed atomics; read by anyone (status line,
//! tests) without touching the audio path.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Counters shared between producer, consumer and observers
#[derive(Debug, Default)]
pub struct HandoffStats {
    /// Frames delivered to the sink from decoded data
    pub delivered: AtomicU64,
    /// Ticks that found the buffer empty
    pub underflows: AtomicU64,
    /// Flips on every underflow tick (drives an activity indicator)
    pub underflow_indicator: AtomicBool,
    /// Blocks started by the producer
    pub blocks: AtomicU64,
    /// Times the producer found the previous block still draining
    pub producer_waits: AtomicU64,
}

impl HandoffStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_underflow(&self) {
        self.underflows.fetch_add(1, Ordering::Relaxed);
        self.underflow_indicator.fetch_xor(true, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_block(&self) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_wait(&self) {
        self.producer_waits.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames delivered so far (lock-free)
    #[inline]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Underflow ticks so far (lock-free)
    #[inline]
    pub fn underflows(&self) -> u64 {
        self.underflows.load(Ordering::Relaxed)
    }

    /// Current state of the underflow indicator (lock-free)
    #[inline]
    pub fn underflow_indicator(&self) -> bool {
        self.underflow_indicator.load(Ordering::Relaxed)
    }

    /// Copy all counters at once
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            delivered: self.delivered(),
            underflows: self.underflows(),
            blocks: self.blocks.load(Ordering::Relaxed),
            producer_waits: self.producer_waits.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`HandoffStats`] for logging and comparisons
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub delivered: u64,
    pub underflows: u64,
    pub blocks: u64,
    pub producer_waits: u64,
}

impl StatsSnapshot {
    /// Counter increase since an earlier snapshot
    pub fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            delivered: self.delivered.saturating_sub(earlier.delivered),
            underflows: self.underflows.saturating_sub(earlier.underflows),
            blocks: self.blocks.saturating_sub(earlier.blocks),
            producer_waits: self.producer_waits.saturating_sub(earlier.producer_waits),
        }
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frames, {} blocks, {} underflows, {} producer waits",
            self.delivered, self.blocks, self.underflows, self.producer_waits
        )
    }
}
