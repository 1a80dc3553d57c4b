//! Byte sources and the queues that hand them to the driver
//!
//! A [`SourceSpec`] names something that can be opened as a plain
//! [`std::io::Read`]. A read of zero bytes is the end of stream.

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rtrb::{Consumer, Producer, PushError, RingBuffer};

/// Where a source's bytes come from
#[derive(Debug, Clone)]
pub enum SourceKind {
    Path(PathBuf),
    /// Shared in-memory stream (tests, embedded assets)
    Memory(Arc<[u8]>),
}

/// An openable byte source
#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub name: String,
    pub kind: SourceKind,
}

impl SourceSpec {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: path.display().to_string(),
            kind: SourceKind::Path(path),
        }
    }

    pub fn memory(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            kind: SourceKind::Memory(bytes.into()),
        }
    }

    /// Open the source for reading
    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        match &self.kind {
            SourceKind::Path(path) => Ok(Box::new(BufReader::new(File::open(path)?))),
            SourceKind::Memory(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
        }
    }
}

/// Supplies the next source to decode
pub trait SourceQueue {
    /// `None` ends the driver loop
    fn next_source(&mut self) -> Option<SourceSpec>;

    /// Play everything from `self`, then everything from `next`
    fn chain<Q: SourceQueue>(self, next: Q) -> Chain<Self, Q>
    where
        Self: Sized,
    {
        Chain {
            first: Some(self),
            second: next,
        }
    }
}

impl<Q: SourceQueue + ?Sized> SourceQueue for Box<Q> {
    fn next_source(&mut self) -> Option<SourceSpec> {
        (**self).next_source()
    }
}

/// Two queues back to back, see [`SourceQueue::chain`]
#[derive(Debug, Clone)]
pub struct Chain<A, B> {
    first: Option<A>,
    second: B,
}

impl<A: SourceQueue, B: SourceQueue> SourceQueue for Chain<A, B> {
    fn next_source(&mut self) -> Option<SourceSpec> {
        if let Some(first) = &mut self.first {
            match first.next_source() {
                Some(spec) => return Some(spec),
                None => self.first = None,
            }
        }
        self.second.next_source()
    }
}

/// Replays one source, forever or a fixed number of times
#[derive(Debug, Clone)]
pub struct RepeatSource {
    spec: SourceSpec,
    remaining: Option<usize>,
}

impl RepeatSource {
    pub fn forever(spec: SourceSpec) -> Self {
        Self {
            spec,
            remaining: None,
        }
    }

    pub fn times(spec: SourceSpec, count: usize) -> Self {
        Self {
            spec,
            remaining: Some(count),
        }
    }
}

impl SourceQueue for RepeatSource {
    fn next_source(&mut self) -> Option<SourceSpec> {
        match &mut self.remaining {
            None => Some(self.spec.clone()),
            Some(0) => None,
            Some(n) => {
                *n -= 1;
                Some(self.spec.clone())
            }
        }
    }
}

/// Plays a list of sources in order
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    entries: Vec<SourceSpec>,
    next: usize,
    looping: bool,
}

impl Playlist {
    pub fn new(entries: Vec<SourceSpec>) -> Self {
        Self {
            entries,
            next: 0,
            looping: false,
        }
    }

    /// Start over after the last entry
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SourceQueue for Playlist {
    fn next_source(&mut self) -> Option<SourceSpec> {
        if self.next >= self.entries.len() {
            if !self.looping || self.entries.is_empty() {
                return None;
            }
            self.next = 0;
        }
        let spec = self.entries[self.next].clone();
        self.next += 1;
        Some(spec)
    }
}

/// How often an empty [`QueueSource`] rechecks its queue
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Create a lock-free queue of sources fed from another thread
///
/// The [`QueueSource`] half waits for new entries until the [`SourceSender`]
/// is dropped and the queue has been emptied.
pub fn source_queue(capacity: usize) -> (SourceSender, QueueSource) {
    let (producer, consumer) = RingBuffer::new(capacity);
    (
        SourceSender { producer },
        QueueSource {
            consumer,
            stop: None,
        },
    )
}

/// Sending half of [`source_queue`]
pub struct SourceSender {
    producer: Producer<SourceSpec>,
}

impl SourceSender {
    /// Enqueue a source; hands it back if the queue is full
    pub fn send(&mut self, spec: SourceSpec) -> Result<(), SourceSpec> {
        self.producer.push(spec).map_err(|err| match err {
            PushError::Full(spec) => spec,
        })
    }

    /// Free slots
    pub fn slots(&self) -> usize {
        self.producer.slots()
    }
}

/// Receiving half of [`source_queue`]
pub struct QueueSource {
    consumer: Consumer<SourceSpec>,
    stop: Option<Arc<AtomicBool>>,
}

impl QueueSource {
    /// Give up waiting once `stop` is set
    pub fn with_stop(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    fn stopped(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|stop| stop.load(Ordering::Relaxed))
    }
}

impl SourceQueue for QueueSource {
    fn next_source(&mut self) -> Option<SourceSpec> {
        loop {
            if let Ok(spec) = self.consumer.pop() {
                return Some(spec);
            }
            if self.stopped() {
                return None;
            }
            if self.consumer.is_abandoned() {
                // The sender may have pushed right before going away
                return self.consumer.pop().ok();
            }
            std::thread::sleep(QUEUE_POLL_INTERVAL);
        }
    }
}
