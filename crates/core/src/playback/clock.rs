use tokio::time::Instant;

use super::PlayerControl;
use crate::error::{Result, WaveformError};

/// A player with no audio output, driven by tokio's clock.
///
/// Position advances in real time while started and stops at the duration.
/// Useful for driving a [`super::PositionFeed`] without an output device, and
/// under a paused test clock it advances only when the test says so.
#[derive(Debug)]
pub struct ClockPlayer {
    duration_ms: u64,
    anchor_ms: u64,
    started_at: Option<Instant>,
    prepared: bool,
}

impl ClockPlayer {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            anchor_ms: 0,
            started_at: None,
            prepared: false,
        }
    }

    fn position_at(&self, now: Instant) -> u64 {
        let elapsed = self
            .started_at
            .map(|started| now.saturating_duration_since(started).as_millis() as u64)
            .unwrap_or(0);
        self.anchor_ms.saturating_add(elapsed).min(self.duration_ms)
    }

    /// Stop the clock if it has run past the end.
    fn settle(&mut self) {
        if self.started_at.is_none() {
            return;
        }
        let position = self.position_at(Instant::now());
        if position >= self.duration_ms {
            self.anchor_ms = position;
            self.started_at = None;
        }
    }
}

impl PlayerControl for ClockPlayer {
    fn prepare(&mut self) -> Result<()> {
        self.prepared = true;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if !self.prepared {
            return Err(WaveformError::Player("player not prepared".to_string()));
        }
        self.settle();
        if self.is_playing() {
            return Ok(());
        }
        // Restarting a finished track plays it again from the top
        if self.anchor_ms >= self.duration_ms {
            self.anchor_ms = 0;
        }
        self.started_at = Some(Instant::now());
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.anchor_ms = self.position_at(Instant::now());
        self.started_at = None;
        Ok(())
    }

    fn seek_to(&mut self, position_ms: u64) -> Result<()> {
        self.settle();
        self.anchor_ms = position_ms.min(self.duration_ms);
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
        Ok(())
    }

    fn current_position_ms(&self) -> u64 {
        self.position_at(Instant::now())
    }

    fn is_playing(&self) -> bool {
        self.started_at.is_some() && self.current_position_ms() < self.duration_ms
    }

    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }
}
