//! The container/codec pair the decode loop drives.
//!
//! A backend looks like a hardware or platform decoder: tracks are listed by
//! the container, compressed chunks go into an input queue, decoded PCM comes
//! out of an output queue, and both queues are polled with a short timeout so
//! the caller stays responsive.

use std::time::Duration;

use crate::error::Result;

/// Broad category of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Other,
}

/// Container-reported description of one track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackFormat {
    pub kind: TrackKind,
    /// Short codec name, e.g. "mp3" or "pcm_s16le".
    pub codec: String,
    pub sample_rate: Option<u32>,
    pub channel_count: Option<u16>,
    /// Track duration in microseconds, when the container knows it.
    pub duration_us: Option<u64>,
}

impl TrackFormat {
    pub fn is_audio(&self) -> bool {
        self.kind == TrackKind::Audio
    }
}

/// Shape of the PCM the codec produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channel_count: u16,
}

/// Result of offering one compressed chunk to the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStatus {
    /// A chunk of `bytes` compressed bytes was queued.
    Queued { bytes: usize },
    /// The source is exhausted and end-of-stream was signalled to the codec.
    EndOfStream,
    /// No input slot became free within the timeout.
    Busy,
}

/// Result of polling the codec's output queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputStatus {
    /// Interleaved 16-bit PCM in native byte order.
    ///
    /// `end_of_stream` marks the last chunk the codec will produce; `data`
    /// may be empty in that case.
    Chunk { data: Vec<u8>, end_of_stream: bool },
    /// The codec changed its output shape; chunks after this use it.
    FormatChanged(OutputFormat),
    /// Nothing decoded within the timeout.
    Pending,
}

/// A container extractor and decoder exclusively owned by one decode.
pub trait MediaBackend: Send {
    fn track_count(&self) -> usize;

    fn track_format(&self, index: usize) -> Option<TrackFormat>;

    /// Restrict extraction to a single track.
    fn select_track(&mut self, index: usize) -> Result<()>;

    /// Create, configure and start the codec for the selected track.
    fn start(&mut self) -> Result<OutputFormat>;

    fn queue_input(&mut self, timeout: Duration) -> Result<InputStatus>;

    fn dequeue_output(&mut self, timeout: Duration) -> Result<OutputStatus>;

    /// Stop the codec. Only called after a successful `start`.
    fn stop(&mut self);

    /// Free every codec and extractor resource.
    fn release(&mut self);
}

impl<B: MediaBackend + ?Sized> MediaBackend for Box<B> {
    fn track_count(&self) -> usize {
        (**self).track_count()
    }

    fn track_format(&self, index: usize) -> Option<TrackFormat> {
        (**self).track_format(index)
    }

    fn select_track(&mut self, index: usize) -> Result<()> {
        (**self).select_track(index)
    }

    fn start(&mut self) -> Result<OutputFormat> {
        (**self).start()
    }

    fn queue_input(&mut self, timeout: Duration) -> Result<InputStatus> {
        (**self).queue_input(timeout)
    }

    fn dequeue_output(&mut self, timeout: Duration) -> Result<OutputStatus> {
        (**self).dequeue_output(timeout)
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn release(&mut self) {
        (**self).release()
    }
}
