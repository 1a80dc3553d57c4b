//! Single-producer single-consumer block buffer over `rtrb`

use std::sync::Arc;

use crossbeam::utils::Backoff;
use rtrb::{Consumer, Producer, PushError, RingBuffer};

use super::error::{HandoffError, HandoffResult};
use super::sink::SampleSink;
use super::stats::HandoffStats;
use crate::types::StereoFrame;

/// Largest block the handoff accepts
pub const MAX_BLOCK_CAPACITY: usize = u16::MAX as usize;

/// Create a block buffer holding up to `capacity` frames
///
/// Returns the producer half for the decode loop and the consumer half for
/// the output callback. Counters are shared through [`HandoffStats`].
///
/// # Panics
/// If `capacity` is zero or larger than [`MAX_BLOCK_CAPACITY`].
pub fn block_channel(capacity: usize) -> (BlockProducer, BlockConsumer) {
    assert!(
        capacity > 0 && capacity <= MAX_BLOCK_CAPACITY,
        "Block capacity must be in 1..={}, got {}",
        MAX_BLOCK_CAPACITY,
        capacity
    );

    let (producer, consumer) = RingBuffer::<StereoFrame>::new(capacity);
    let stats = Arc::new(HandoffStats::new());

    log::debug!("Block buffer created with capacity {} frames", capacity);

    (
        BlockProducer {
            ring: producer,
            stats: stats.clone(),
            remaining: 0,
        },
        BlockConsumer {
            ring: consumer,
            stats,
            last: StereoFrame::silence(),
        },
    )
}

/// Decode-side half: writes whole blocks into an empty buffer
pub struct BlockProducer {
    ring: Producer<StereoFrame>,
    stats: Arc<HandoffStats>,
    /// Frames the current block may still take
    remaining: usize,
}

impl BlockProducer {
    /// Maximum frames per block
    pub fn capacity(&self) -> usize {
        self.ring.buffer().capacity()
    }

    /// Shared counters
    pub fn stats(&self) -> Arc<HandoffStats> {
        self.stats.clone()
    }

    /// Frames written but not yet consumed
    pub fn pending(&self) -> usize {
        self.capacity() - self.ring.slots()
    }

    /// True once the consumer has taken every frame of the current block
    #[inline]
    pub fn is_drained(&self) -> bool {
        self.ring.slots() == self.capacity()
    }

    /// True when the consumer half no longer exists
    pub fn is_abandoned(&self) -> bool {
        self.ring.is_abandoned()
    }

    /// Spin until the consumer has drained the current block
    ///
    /// This is the only wait in the decode loop. It has no timeout: output
    /// must never run ahead of decode other than through an underflow. It
    /// only gives up when the consumer has been dropped.
    pub fn wait_drained(&self) -> HandoffResult<()> {
        if self.is_drained() {
            return Ok(());
        }

        self.stats.record_wait();
        let backoff = Backoff::new();
        loop {
            if self.is_drained() {
                return Ok(());
            }
            if self.is_abandoned() {
                return Err(HandoffError::ConsumerDisconnected {
                    pending: self.pending(),
                });
            }
            backoff.snooze();
        }
    }

    /// Start a new block in the drained buffer
    ///
    /// Returns how many frames may be appended to the new block.
    ///
    /// # Panics
    /// If the previous block has not been drained; call
    /// [`wait_drained`](Self::wait_drained) first.
    pub fn begin_block(&mut self) -> usize {
        let pending = self.pending();
        assert!(
            pending == 0,
            "begin_block called with {} frames still queued",
            pending
        );

        self.remaining = self.capacity();
        self.stats.record_block();
        self.remaining
    }

    /// Append one frame to the current block
    ///
    /// The frame is visible to the consumer as soon as this returns.
    ///
    /// # Panics
    /// If the block already holds `capacity()` frames.
    #[inline]
    pub fn append(&mut self, frame: StereoFrame) {
        if self.remaining == 0 {
            panic!("append past block capacity {}", self.capacity());
        }
        if let Err(PushError::Full(_)) = self.ring.push(frame) {
            panic!("append past block capacity {}", self.capacity());
        }
        self.remaining -= 1;
    }

    /// Hand off `count` frames produced by `frame_at`
    ///
    /// Waits for the buffer to drain before each block. Runs longer than
    /// `capacity()` are split into consecutive blocks.
    pub fn push_with<F>(&mut self, count: usize, mut frame_at: F) -> HandoffResult<()>
    where
        F: FnMut(usize) -> StereoFrame,
    {
        let mut written = 0;
        while written < count {
            self.wait_drained()?;
            let capacity = self.begin_block();
            let take = capacity.min(count - written);
            for i in written..written + take {
                self.append(frame_at(i));
            }
            written += take;
        }
        Ok(())
    }

    /// Hand off a slice of frames (see [`push_with`](Self::push_with))
    pub fn push_block(&mut self, frames: &[StereoFrame]) -> HandoffResult<()> {
        self.push_with(frames.len(), |i| frames[i])
    }
}

/// Output-side half: takes one frame per tick, never blocks
pub struct BlockConsumer {
    ring: Consumer<StereoFrame>,
    stats: Arc<HandoffStats>,
    /// Last frame delivered, repeated on underflow
    last: StereoFrame,
}

impl BlockConsumer {
    /// Take the next frame if one is queued
    #[inline]
    pub fn try_consume(&mut self) -> Option<StereoFrame> {
        let frame = self.ring.pop().ok()?;
        self.last = frame;
        self.stats.record_delivered();
        Some(frame)
    }

    /// Produce the frame for one output tick
    ///
    /// On underflow the last delivered frame is repeated and the underflow
    /// counters are bumped.
    #[inline]
    pub fn tick(&mut self) -> StereoFrame {
        match self.try_consume() {
            Some(frame) => frame,
            None => {
                self.stats.record_underflow();
                self.last
            }
        }
    }

    /// Run one tick into a sink
    #[inline]
    pub fn tick_into<S: SampleSink + ?Sized>(&mut self, sink: &mut S) {
        let frame = self.tick();
        sink.write(frame);
    }

    /// Fill a device batch, one tick per slot
    pub fn fill(&mut self, out: &mut [StereoFrame]) {
        for slot in out.iter_mut() {
            *slot = self.tick();
        }
    }

    /// Frames queued and not yet consumed
    pub fn available(&self) -> usize {
        self.ring.slots()
    }

    /// Frame that an underflow tick would repeat
    pub fn last(&self) -> StereoFrame {
        self.last
    }

    /// Shared counters
    pub fn stats(&self) -> Arc<HandoffStats> {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn frame(i: usize) -> StereoFrame {
        StereoFrame::new(i as i16, -(i as i16))
    }

    #[test]
    fn test_drain_then_repeat_last() {
        let (mut producer, mut consumer) = block_channel(4);
        let frames: Vec<_> = (1..=4).map(frame).collect();

        assert_eq!(producer.begin_block(), 4);
        for f in &frames {
            producer.append(*f);
        }

        let mut out = Vec::new();
        for _ in 0..4 {
            consumer.tick_into(&mut out);
        }
        assert_eq!(out, frames);
        assert_eq!(consumer.stats().underflows(), 0);

        // 5th tick before the next block repeats D
        assert_eq!(consumer.tick(), frame(4));
        assert_eq!(consumer.stats().underflows(), 1);
        assert!(producer.is_drained());
    }

    #[test]
    fn test_underflow_before_any_data_is_silence() {
        let (_producer, mut consumer) = block_channel(8);
        for _ in 0..5 {
            assert_eq!(consumer.tick(), StereoFrame::silence());
        }
        let stats = consumer.stats();
        assert_eq!(stats.underflows(), 5);
        assert_eq!(stats.delivered(), 0);
    }

    #[test]
    fn test_underflow_repeat_is_idempotent() {
        let (mut producer, mut consumer) = block_channel(2);
        producer.push_block(&[frame(7), frame(9)]).unwrap();
        consumer.tick();
        consumer.tick();
        for _ in 0..100 {
            assert_eq!(consumer.tick(), frame(9));
        }
        assert_eq!(consumer.last(), frame(9));
    }

    #[test]
    fn test_fill_batch_repeats_within_batch() {
        let (mut producer, mut consumer) = block_channel(4);
        producer.push_block(&[frame(1), frame(2)]).unwrap();

        let mut batch = [StereoFrame::silence(); 4];
        consumer.fill(&mut batch);
        assert_eq!(batch, [frame(1), frame(2), frame(2), frame(2)]);

        // Next batch carries the last frame of the previous one
        consumer.fill(&mut batch);
        assert_eq!(batch, [frame(2); 4]);
    }

    #[test]
    #[should_panic(expected = "append past block capacity")]
    fn test_append_past_capacity_panics() {
        let (mut producer, _consumer) = block_channel(2);
        producer.begin_block();
        producer.append(frame(1));
        producer.append(frame(2));
        producer.append(frame(3));
    }

    #[test]
    #[should_panic(expected = "still queued")]
    fn test_begin_block_requires_drained() {
        let (mut producer, _consumer) = block_channel(2);
        producer.begin_block();
        producer.append(frame(1));
        producer.begin_block();
    }

    #[test]
    fn test_appended_frames_visible_before_block_completes() {
        let (mut producer, mut consumer) = block_channel(4);
        assert_eq!(producer.begin_block(), 4);
        producer.append(frame(1));
        assert_eq!(consumer.try_consume(), Some(frame(1)));

        // The block budget is still three frames even though one was drained
        producer.append(frame(2));
        producer.append(frame(3));
        producer.append(frame(4));
        assert_eq!(producer.pending(), 3);
    }

    #[test]
    #[should_panic(expected = "append past block capacity")]
    fn test_append_without_begin_block_panics() {
        let (mut producer, _consumer) = block_channel(2);
        producer.append(frame(1));
    }

    #[test]
    fn test_pending_tracks_consumer() {
        let (mut producer, mut consumer) = block_channel(4);
        producer.begin_block();
        producer.append(frame(1));
        producer.append(frame(2));
        assert_eq!(producer.pending(), 2);
        assert_eq!(consumer.available(), 2);
        consumer.try_consume();
        assert_eq!(producer.pending(), 1);
        consumer.try_consume();
        assert!(producer.is_drained());
        assert_eq!(consumer.try_consume(), None);
    }

    #[test]
    fn test_wait_reports_dropped_consumer() {
        let (mut producer, consumer) = block_channel(4);
        producer.push_block(&[frame(1)]).unwrap();
        drop(consumer);
        assert!(producer.is_abandoned());
        assert_eq!(
            producer.wait_drained(),
            Err(HandoffError::ConsumerDisconnected { pending: 1 })
        );
    }

    #[test]
    fn test_oversized_run_split_across_blocks() {
        let (mut producer, mut consumer) = block_channel(4);
        let total = 10;

        let reader = thread::spawn(move || {
            let mut received = Vec::new();
            while received.len() < total {
                match consumer.try_consume() {
                    Some(f) => received.push(f),
                    None => std::hint::spin_loop(),
                }
            }
            (received, consumer)
        });

        producer.push_with(total, frame).unwrap();
        let (received, _consumer) = reader.join().unwrap();

        assert_eq!(received, (0..total).map(frame).collect::<Vec<_>>());
        assert_eq!(producer.stats().snapshot().blocks, 3);
    }

    #[test]
    fn test_concurrent_handoff_preserves_order() {
        let (mut producer, mut consumer) = block_channel(16);
        let total = 20_000;

        let reader = thread::spawn(move || {
            let mut received = Vec::with_capacity(total);
            let mut underflows = 0u64;
            while received.len() < total {
                match consumer.try_consume() {
                    Some(f) => received.push(f),
                    None => underflows += 1,
                }
            }
            (received, underflows)
        });

        // Mixed block sizes, some larger than the buffer
        let sizes = [1, 5, 16, 3, 40, 7];
        let mut next = 0;
        let mut i = 0;
        while next < total {
            let size = sizes[i % sizes.len()].min(total - next);
            let base = next;
            producer.push_with(size, |k| frame((base + k) % 30_000)).unwrap();
            next += size;
            i += 1;
        }

        let (received, _) = reader.join().unwrap();
        let expected: Vec<_> = (0..total).map(|k| frame(k % 30_000)).collect();
        assert_eq!(received, expected);
        assert_eq!(producer.stats().delivered(), total as u64);
    }
}
