//! Block handoff between the decode loop and the fixed-rate output
//!
//! One decoded block at a time is staged in a fixed buffer. The decode side
//! writes a whole block, but only into an empty buffer; the output side takes
//! one frame per tick and never blocks.
//!
//! ```text
//! ┌──────────────────┐   wait_drained()   ┌──────────────────────┐
//! │   Decode Loop    │──begin_block()────►│  rtrb ring buffer    │
//! │  (foreground)    │──append() × N─────►│  (capacity frames)   │
//! └──────────────────┘                    └──────────┬───────────┘
//!                                                    │ tick()
//!                                         ┌──────────▼───────────┐
//!                                         │  Output Callback     │
//!                                         │  (periodic, RT)      │──► SampleSink
//!                                         └──────────────────────┘
//! ```
//!
//! # Protocol
//!
//! The frames travel through an `rtrb` SPSC ring sized to one block. The
//! producer starts a block only once the ring is empty and then appends at
//! most `capacity` frames, so the ring never wraps onto unread frames and a
//! block is never interleaved with its predecessor.
//!
//! # Underflow
//!
//! When a tick finds the buffer empty the consumer repeats the last frame it
//! delivered (silence before the first one) and bumps the underflow counters
//! in [`HandoffStats`]. The audio path is otherwise unaffected.

mod buffer;
mod error;
mod sink;
mod stats;

pub use buffer::{block_channel, BlockConsumer, BlockProducer, MAX_BLOCK_CAPACITY};
pub use error::{HandoffError, HandoffResult};
pub use sink::{NullSink, SampleSink};
pub use stats::{HandoffStats, StatsSnapshot};
