//! Periodic position sampling with at most one tick chain in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::{PlayerControl, PositionCursor, PositionSink};
use crate::error::{Result, WaveformError};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(20);

/// The one pending tick chain, if any.
///
/// Bumping `generation` retires whatever chain is running; a chain only
/// pushes while its own generation is current.
#[derive(Default)]
struct TickSlot {
    handle: Option<JoinHandle<()>>,
    generation: Arc<AtomicU64>,
}

impl TickSlot {
    fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

/// Samples a player's position on a fixed cadence and forwards it to a sink.
pub struct PositionFeed<P: PlayerControl, S: PositionSink> {
    player: Arc<Mutex<P>>,
    sink: Arc<Mutex<S>>,
    refresh_interval: Duration,
    snap_to_start_at_completion: bool,
    tick: TickSlot,
}

impl<P: PlayerControl, S: PositionSink> PositionFeed<P, S> {
    pub fn new(player: P, sink: S) -> Self {
        Self {
            player: Arc::new(Mutex::new(player)),
            sink: Arc::new(Mutex::new(sink)),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            snap_to_start_at_completion: true,
            tick: TickSlot::default(),
        }
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_snap_to_start(mut self, snap: bool) -> Self {
        self.snap_to_start_at_completion = snap;
        self
    }

    pub fn player(&self) -> Arc<Mutex<P>> {
        self.player.clone()
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Current position, read straight from the player.
    pub fn cursor(&self) -> PositionCursor {
        let player = self.player.lock();
        PositionCursor::new(player.current_position_ms(), player.duration_ms())
    }

    pub fn is_ticking(&self) -> bool {
        self.tick.is_active()
    }

    pub fn is_playing(&self) -> bool {
        self.player.lock().is_playing()
    }

    /// Prepare the player and publish its starting position.
    pub fn prepare(&mut self) -> Result<()> {
        self.player.lock().prepare()?;
        let cursor = self.cursor();
        self.push(cursor);
        Ok(())
    }

    /// Start playback and begin sampling.
    ///
    /// Must be called from within a tokio runtime.
    pub fn play(&mut self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| WaveformError::Player(format!("position feed needs a runtime: {e}")))?;

        {
            let mut player = self.player.lock();
            if !player.is_playing() {
                player.start()?;
            }
        }

        self.cancel_ticks();
        let generation = self.tick.generation.load(Ordering::Acquire);
        let current = self.tick.generation.clone();
        let player = self.player.clone();
        let sink = self.sink.clone();
        let interval = self.refresh_interval;

        log::debug!("Scheduling position ticks every {:?}", interval);
        self.tick.handle = Some(runtime.spawn(async move {
            loop {
                let (cursor, playing) = {
                    let player = player.lock();
                    let cursor =
                        PositionCursor::new(player.current_position_ms(), player.duration_ms());
                    (cursor, player.is_playing())
                };
                {
                    let mut sink = sink.lock();
                    if current.load(Ordering::Acquire) != generation {
                        return;
                    }
                    sink.on_position(cursor);
                }
                if !playing {
                    return;
                }
                tokio::time::sleep(interval).await;
            }
        }));
        Ok(())
    }

    /// Pause playback and stop sampling.
    pub fn pause(&mut self) -> Result<()> {
        self.cancel_ticks();
        self.player.lock().pause()
    }

    /// Play when paused, pause when playing.
    pub fn toggle(&mut self) -> Result<()> {
        if self.is_playing() {
            self.pause()
        } else {
            self.play()
        }
    }

    /// Seek and publish the new position right away.
    pub fn seek(&mut self, position_ms: u64) -> Result<()> {
        let cursor = {
            let mut player = self.player.lock();
            let target = position_ms.min(player.duration_ms());
            player.seek_to(target)?;
            PositionCursor::new(target, player.duration_ms())
        };
        self.push(cursor);
        Ok(())
    }

    /// Stop sampling, pause, and optionally rewind to the start.
    pub fn stop(&mut self, snap_to_start: bool) -> Result<()> {
        self.cancel_ticks();
        let cursor = {
            let mut player = self.player.lock();
            player.pause()?;
            if !snap_to_start {
                return Ok(());
            }
            player.seek_to(0)?;
            PositionCursor::new(0, player.duration_ms())
        };
        self.push(cursor);
        Ok(())
    }

    /// Called when the player reports it reached the end.
    ///
    /// Publishes a cursor at the very end so the view shows the track as
    /// fully played, then rewinds if snapping is configured.
    pub fn on_playback_completed(&mut self) -> Result<()> {
        self.cancel_ticks();
        let duration_ms = self.player.lock().duration_ms();
        self.push(PositionCursor::at_end(duration_ms));
        log::debug!("Playback completed at {} ms", duration_ms);
        self.stop(self.snap_to_start_at_completion)
    }

    fn push(&self, cursor: PositionCursor) {
        self.sink.lock().on_position(cursor);
    }

    fn cancel_ticks(&mut self) {
        {
            // Holding the sink lock means no stale chain is mid-push
            let _sink = self.sink.lock();
            self.tick.generation.fetch_add(1, Ordering::AcqRel);
        }
        if let Some(handle) = self.tick.handle.take() {
            handle.abort();
        }
    }
}

impl<P: PlayerControl, S: PositionSink> Drop for PositionFeed<P, S> {
    fn drop(&mut self) {
        self.cancel_ticks();
    }
}
