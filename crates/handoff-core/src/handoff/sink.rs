//! Output sink seam

use crate::types::StereoFrame;

/// Fixed-rate output device
///
/// Accepts exactly one frame per invocation. Implementations run on the
/// output context and must not block or allocate in [`write`](Self::write).
pub trait SampleSink {
    fn write(&mut self, frame: StereoFrame);

    /// Called once when the output stops
    fn finish(&mut self) {}
}

/// Collects frames (tests, offline rendering)
impl SampleSink for Vec<StereoFrame> {
    #[inline]
    fn write(&mut self, frame: StereoFrame) {
        self.push(frame);
    }
}

/// Optional sink; `None` discards
impl<S: SampleSink> SampleSink for Option<S> {
    #[inline]
    fn write(&mut self, frame: StereoFrame) {
        if let Some(sink) = self {
            sink.write(frame);
        }
    }

    fn finish(&mut self) {
        if let Some(sink) = self {
            sink.finish();
        }
    }
}

/// Both sinks get every frame
impl<A: SampleSink, B: SampleSink> SampleSink for (A, B) {
    #[inline]
    fn write(&mut self, frame: StereoFrame) {
        self.0.write(frame);
        self.1.write(frame);
    }

    fn finish(&mut self) {
        self.0.finish();
        self.1.finish();
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl SampleSink for NullSink {
    #[inline]
    fn write(&mut self, _frame: StereoFrame) {}
}
