//! Playback position reporting for a waveform view.

pub mod clock;
pub mod feed;

pub use clock::ClockPlayer;
pub use feed::{PositionFeed, DEFAULT_REFRESH_INTERVAL};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::error::Result;

/// Control surface of whatever is producing audio.
///
/// The feed only needs transport control and a position readout; decoding
/// and output are the implementor's business.
pub trait PlayerControl: Send + 'static {
    fn prepare(&mut self) -> Result<()>;

    fn start(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn seek_to(&mut self, position_ms: u64) -> Result<()>;

    fn current_position_ms(&self) -> u64;

    fn is_playing(&self) -> bool;

    fn duration_ms(&self) -> u64;
}

/// Playback position at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PositionCursor {
    pub current_ms: u64,
    pub duration_ms: u64,
}

impl PositionCursor {
    pub fn new(current_ms: u64, duration_ms: u64) -> Self {
        Self {
            current_ms,
            duration_ms,
        }
    }

    /// Cursor parked at the end of the track.
    pub fn at_end(duration_ms: u64) -> Self {
        Self::new(duration_ms, duration_ms)
    }

    /// Fraction of the track already played, in `[0, 1]`.
    pub fn played_fraction(&self) -> f64 {
        if self.duration_ms == 0 {
            return 0.0;
        }
        (self.current_ms as f64 / self.duration_ms as f64).clamp(0.0, 1.0)
    }

    /// Index of the first bucket that has not been played yet.
    pub fn played_buckets(&self, bucket_count: usize) -> usize {
        let boundary = (self.played_fraction() * bucket_count as f64).floor() as usize;
        boundary.min(bucket_count)
    }

    pub fn is_at_end(&self) -> bool {
        self.duration_ms > 0 && self.current_ms >= self.duration_ms
    }

    /// `"m:ss / m:ss"`
    pub fn time_label(&self) -> String {
        format!(
            "{} / {}",
            format_time(self.current_ms),
            format_time(self.duration_ms)
        )
    }
}

/// Format milliseconds as `m:ss`.
pub fn format_time(ms: u64) -> String {
    let total_secs = ms / 1000;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

/// Receives cursor updates from a [`PositionFeed`].
pub trait PositionSink: Send + 'static {
    fn on_position(&mut self, cursor: PositionCursor);
}

impl PositionSink for watch::Sender<PositionCursor> {
    fn on_position(&mut self, cursor: PositionCursor) {
        self.send_replace(cursor);
    }
}

impl PositionSink for mpsc::UnboundedSender<PositionCursor> {
    fn on_position(&mut self, cursor: PositionCursor) {
        // A dropped receiver just means nobody is watching anymore
        let _ = self.send(cursor);
    }
}
