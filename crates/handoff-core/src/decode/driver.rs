//! Decode driver loop
//!
//! Runs one decode session per source:
//!
//! ```text
//! Idle ──open──► StreamOpen ──reset arena, start──► Decoding
//!   ▲                                                  │
//!   └──────────── StreamClosed | Error ◄───────────────┘
//! ```
//!
//! Input refills carry the unconsumed tail forward, decoded blocks go through
//! the block handoff, and recoverable decode errors are counted and skipped.
//! Nothing on an error path touches the handoff cursors.

use std::fmt;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::decoder::{DecodeCallbacks, Decoder, Flow, PcmBlock, RunOutcome};
use super::error::{DecodeError, SessionError, SessionResult};
use super::input::InputBuffer;
use super::source::{SourceQueue, SourceSpec};
use crate::arena::Arena;
use crate::handoff::{BlockProducer, HandoffError, HandoffStats};

/// Default pause after a source could not be opened
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Lifecycle state of the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    StreamOpen,
    Decoding,
    StreamClosed,
    Error,
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The source ran out of bytes
    EndOfStream,
    /// The stop flag was raised between blocks
    Stopped,
    /// The decoder reported an unrecoverable error
    Fatal(DecodeError),
    /// Reading the source failed
    ReadError(String),
}

impl SessionOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, SessionOutcome::EndOfStream | SessionOutcome::Stopped)
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOutcome::EndOfStream => write!(f, "end of stream"),
            SessionOutcome::Stopped => write!(f, "stopped"),
            SessionOutcome::Fatal(e) => write!(f, "{}", e),
            SessionOutcome::ReadError(e) => write!(f, "read error: {}", e),
        }
    }
}

/// What one session did
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub source: String,
    pub outcome: SessionOutcome,
    /// Decoded blocks handed off
    pub blocks: u64,
    /// Frames handed off
    pub frames: u64,
    pub recoverable_errors: u64,
    pub bytes_read: u64,
    /// Sample rate of the last decoded block
    pub sample_rate: Option<u32>,
    pub elapsed: Duration,
}

/// Totals over a whole [`DecodeDriver::run`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverSummary {
    /// Sessions that reached the decoder
    pub sessions: u64,
    /// Sources that could not be opened
    pub unavailable: u64,
    /// Sessions that ended on a fatal or read error
    pub failed: u64,
    pub frames: u64,
    /// The output side went away
    pub disconnected: bool,
}

impl DriverSummary {
    fn record(&mut self, report: &SessionReport) {
        self.sessions += 1;
        self.frames += report.frames;
        if !report.outcome.is_clean() {
            self.failed += 1;
        }
    }
}

/// Owns the decoder and everything a session needs
pub struct DecodeDriver<D: Decoder> {
    decoder: D,
    arena: Arena,
    input: InputBuffer,
    producer: BlockProducer,
    state: DriverState,
    stop: Arc<AtomicBool>,
    retry_delay: Duration,
}

impl<D: Decoder> DecodeDriver<D> {
    pub fn new(decoder: D, producer: BlockProducer) -> Self {
        Self {
            decoder,
            arena: Arena::default(),
            input: InputBuffer::default(),
            producer,
            state: DriverState::Idle,
            stop: Arc::new(AtomicBool::new(false)),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Replace the session arena
    pub fn with_arena(mut self, arena: Arena) -> Self {
        self.arena = arena;
        self
    }

    /// Replace the input staging buffer
    pub fn with_input(mut self, input: InputBuffer) -> Self {
        self.input = input;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Share an externally owned stop flag
    pub fn with_stop(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Flag checked between blocks and between sources
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn stats(&self) -> Arc<HandoffStats> {
        self.producer.stats()
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Decode sources until the queue runs dry, the stop flag is raised, or
    /// the output side disconnects
    pub fn run<Q: SourceQueue + ?Sized>(&mut self, queue: &mut Q) -> DriverSummary {
        let mut summary = DriverSummary::default();
        log::info!("Decode loop started ({})", self.decoder.name());

        loop {
            self.state = DriverState::Idle;
            if self.stop.load(Ordering::Relaxed) {
                log::info!("Decode loop stopped");
                break;
            }
            if self.producer.is_abandoned() {
                summary.disconnected = true;
                break;
            }
            let Some(spec) = queue.next_source() else {
                log::info!("No more sources");
                break;
            };

            match self.run_source(&spec) {
                Ok(report) => summary.record(&report),
                Err(SessionError::SourceUnavailable { name, source }) => {
                    log::warn!("Cannot open {}: {}", name, source);
                    summary.unavailable += 1;
                    if !self.retry_delay.is_zero() {
                        std::thread::sleep(self.retry_delay);
                    }
                }
                Err(SessionError::Handoff(e)) => {
                    log::warn!("Output disconnected: {}", e);
                    summary.disconnected = true;
                    break;
                }
            }
        }

        self.state = DriverState::Idle;
        log::info!(
            "Decode loop finished: {} sessions, {} unavailable, {} failed, {} frames",
            summary.sessions,
            summary.unavailable,
            summary.failed,
            summary.frames
        );
        summary
    }

    /// Decode one source to completion
    ///
    /// Returns `Err` only when the source cannot be opened or the output side
    /// is gone. Decode failures are part of the report.
    pub fn run_source(&mut self, spec: &SourceSpec) -> SessionResult<SessionReport> {
        self.state = DriverState::StreamOpen;
        let mut reader = match spec.open() {
            Ok(reader) => reader,
            Err(source) => {
                self.state = DriverState::Error;
                return Err(SessionError::SourceUnavailable {
                    name: spec.name.clone(),
                    source,
                });
            }
        };

        log::debug!("Opened {}", spec.name);
        let started = Instant::now();
        self.arena.reset();
        self.input.clear();

        let mut session = SessionIo {
            reader: reader.as_mut(),
            producer: &mut self.producer,
            stop: &self.stop,
            blocks: 0,
            frames: 0,
            recoverable_errors: 0,
            bytes_read: 0,
            sample_rate: None,
            failure: None,
            handoff_error: None,
            stopped: false,
        };

        let run = match self.decoder.start(&mut self.arena) {
            Ok(()) => {
                self.state = DriverState::Decoding;
                self.decoder
                    .run(&mut self.arena, &mut self.input, &mut session)
            }
            Err(e) => {
                session.failure = Some(SessionOutcome::Fatal(e));
                RunOutcome::Aborted
            }
        };
        self.decoder.finish();

        let SessionIo {
            blocks,
            frames,
            recoverable_errors,
            bytes_read,
            sample_rate,
            failure,
            handoff_error,
            stopped,
            ..
        } = session;
        drop(reader);

        if let Some(e) = handoff_error {
            self.state = DriverState::Error;
            return Err(e.into());
        }

        let outcome = match failure {
            Some(outcome) => outcome,
            None if stopped => SessionOutcome::Stopped,
            None => SessionOutcome::EndOfStream,
        };
        self.state = if outcome.is_clean() {
            DriverState::StreamClosed
        } else {
            DriverState::Error
        };

        let report = SessionReport {
            source: spec.name.clone(),
            outcome,
            blocks,
            frames,
            recoverable_errors,
            bytes_read,
            sample_rate,
            elapsed: started.elapsed(),
        };

        log::info!(
            "Decoded {} ({:?}, {}) in {} ms: {} blocks, {} frames, {} skipped errors",
            report.source,
            run,
            report.outcome,
            report.elapsed.as_millis(),
            report.blocks,
            report.frames,
            report.recoverable_errors
        );
        Ok(report)
    }
}

/// Callback side of one session
struct SessionIo<'a> {
    reader: &'a mut (dyn Read + Send),
    producer: &'a mut BlockProducer,
    stop: &'a AtomicBool,
    blocks: u64,
    frames: u64,
    recoverable_errors: u64,
    bytes_read: u64,
    sample_rate: Option<u32>,
    failure: Option<SessionOutcome>,
    handoff_error: Option<HandoffError>,
    stopped: bool,
}

impl DecodeCallbacks for SessionIo<'_> {
    fn input(&mut self, input: &mut InputBuffer) -> Flow {
        match input.refill(&mut *self.reader) {
            Ok(0) => Flow::Stop,
            Ok(n) => {
                self.bytes_read += n as u64;
                Flow::Continue
            }
            Err(e) => {
                log::warn!("Source read failed: {}", e);
                self.failure = Some(SessionOutcome::ReadError(e.to_string()));
                Flow::Break
            }
        }
    }

    fn output(&mut self, block: &PcmBlock<'_>) -> Flow {
        if self.stop.load(Ordering::Relaxed) {
            self.stopped = true;
            return Flow::Stop;
        }

        let frames = block.frames();
        if let Err(e) = self.producer.push_with(frames, |i| block.frame(i)) {
            self.handoff_error = Some(e);
            return Flow::Break;
        }

        self.blocks += 1;
        self.frames += frames as u64;
        self.sample_rate = Some(block.sample_rate);
        Flow::Continue
    }

    fn error(&mut self, error: &DecodeError) -> Flow {
        if error.is_recoverable() {
            log::debug!("Skipping: {}", error);
            self.recoverable_errors += 1;
            Flow::Continue
        } else {
            log::warn!("{}", error);
            self.failure = Some(SessionOutcome::Fatal(error.clone()));
            Flow::Break
        }
    }
}
