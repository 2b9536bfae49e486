//! Pulls the full PCM stream of the first audio track out of a backend.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::backend::{InputStatus, MediaBackend, OutputFormat, OutputStatus, TrackFormat};
use super::source::AudioSource;
use super::symphonia_backend::SymphoniaBackend;
use super::waveform::WaveformData;
use crate::error::{Result, WaveformError};

/// Default wait on each of the input and output polls.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// How a decode ended when it did not fail.
#[derive(Debug)]
pub enum DecodeOutcome {
    Completed(WaveformData),
    Cancelled,
}

/// Owns a backend and releases it exactly once.
///
/// Release happens on the explicit call or on drop, whichever comes first.
pub(crate) struct BackendGuard<B: MediaBackend> {
    backend: B,
    started: bool,
    released: bool,
}

impl<B: MediaBackend> BackendGuard<B> {
    fn new(backend: B) -> Self {
        Self {
            backend,
            started: false,
            released: false,
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.started {
            self.backend.stop();
        }
        self.backend.release();
    }
}

impl<B: MediaBackend> Drop for BackendGuard<B> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Decodes one audio track into [`WaveformData`].
pub struct SampleDecoder<B: MediaBackend = SymphoniaBackend> {
    backend: BackendGuard<B>,
    track_index: usize,
    track: TrackFormat,
    poll_timeout: Duration,
}

impl SampleDecoder<SymphoniaBackend> {
    /// Probe `source` with the bundled symphonia backend.
    pub fn open(source: AudioSource) -> Result<Self> {
        Self::new(SymphoniaBackend::open(source)?)
    }
}

impl<B: MediaBackend> SampleDecoder<B> {
    /// Select the first audio track of `backend`.
    ///
    /// Fails with [`WaveformError::NoAudioTrack`] when the container has no
    /// tracks or none of them is audio; the backend is released first.
    pub fn new(backend: B) -> Result<Self> {
        let mut backend = BackendGuard::new(backend);

        let track_count = backend.backend.track_count();
        let found = (0..track_count).find_map(|index| {
            backend
                .backend
                .track_format(index)
                .filter(TrackFormat::is_audio)
                .map(|format| (index, format))
        });

        let Some((track_index, track)) = found else {
            backend.release();
            return Err(WaveformError::NoAudioTrack { track_count });
        };

        backend.backend.select_track(track_index)?;
        log::debug!(
            "Selected audio track {} of {} ({}, {:?} Hz, {:?} ch)",
            track_index,
            track_count,
            track.codec,
            track.sample_rate,
            track.channel_count
        );

        Ok(Self {
            backend,
            track_index,
            track,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        })
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn track_index(&self) -> usize {
        self.track_index
    }

    pub fn track_format(&self) -> &TrackFormat {
        &self.track
    }

    /// Size of the decoded stream implied by the container, in bytes.
    ///
    /// An estimate: containers round durations and codecs pad frames.
    pub fn estimated_total_bytes(&self) -> Option<f64> {
        let duration_us = self.track.duration_us?;
        let channels = self.track.channel_count?;
        let rate = self.track.sample_rate?;
        let total = duration_us as f64 / 1_000_000.0 * channels as f64 * rate as f64 * 2.0;
        (total > 0.0).then_some(total)
    }

    /// Run the decode loop to end-of-stream.
    ///
    /// `progress` receives `bytes_decoded / estimated_total * 100` after every
    /// output chunk; the values never decrease and may pass 100. `cancel` is
    /// checked at the top of every iteration. The backend is stopped and
    /// released before this returns, whatever the outcome.
    pub fn decode<F>(
        mut self,
        cancel: &CancellationToken,
        mut progress: F,
    ) -> Result<DecodeOutcome>
    where
        F: FnMut(f32),
    {
        let started_at = Instant::now();
        let estimate = self.estimated_total_bytes();
        if estimate.is_none() {
            log::warn!("Container reports no duration; decoding without progress");
        }

        let result = self.run_loop(cancel, estimate, &mut progress);
        self.backend.release();

        match &result {
            Ok(DecodeOutcome::Completed(data)) => log::info!(
                "Decoded {} samples in {}ms",
                data.sample_count(),
                started_at.elapsed().as_millis()
            ),
            Ok(DecodeOutcome::Cancelled) => log::info!(
                "Decode cancelled after {}ms",
                started_at.elapsed().as_millis()
            ),
            Err(e) => log::warn!("Decode failed: {}", e),
        }
        result
    }

    fn run_loop(
        &mut self,
        cancel: &CancellationToken,
        estimate: Option<f64>,
        progress: &mut dyn FnMut(f32),
    ) -> Result<DecodeOutcome> {
        let timeout = self.poll_timeout;
        let mut format = self.backend.backend.start()?;
        self.backend.started = true;
        log::info!("Start building waveform data");

        let mut stream: Vec<u8> = Vec::new();
        let mut input_done = false;

        loop {
            if cancel.is_cancelled() {
                return Ok(DecodeOutcome::Cancelled);
            }

            if !input_done {
                match self.backend.backend.queue_input(timeout)? {
                    InputStatus::EndOfStream => input_done = true,
                    InputStatus::Queued { .. } | InputStatus::Busy => {}
                }
            }

            match self.backend.backend.dequeue_output(timeout)? {
                OutputStatus::Chunk {
                    data,
                    end_of_stream,
                } => {
                    stream.extend_from_slice(&data);
                    if let Some(total) = estimate {
                        progress((stream.len() as f64 / total * 100.0) as f32);
                    }
                    if end_of_stream {
                        break;
                    }
                }
                OutputStatus::FormatChanged(new_format) => {
                    log::debug!("Output format changed to {:?}", new_format);
                    format = new_format;
                }
                OutputStatus::Pending => {}
            }
        }

        self.finish(format, &stream).map(DecodeOutcome::Completed)
    }

    fn finish(&self, format: OutputFormat, stream: &[u8]) -> Result<WaveformData> {
        // The codec's view of the stream wins; fall back to the container's.
        let sample_rate = match format.sample_rate {
            0 => self.track.sample_rate.unwrap_or(0),
            rate => rate,
        };
        let channel_count = match format.channel_count {
            0 => self.track.channel_count.unwrap_or(0),
            count => count,
        };
        if sample_rate == 0 || channel_count == 0 {
            return Err(WaveformError::Decode(
                "decoder never reported an output format".to_string(),
            ));
        }

        let duration_ms = match self.track.duration_us {
            Some(duration_us) => duration_us / 1000,
            None => {
                let frames = stream.len() as u64 / 2 / channel_count as u64;
                frames * 1000 / sample_rate as u64
            }
        };

        WaveformData::from_pcm_bytes(sample_rate, channel_count, duration_ms, stream)
    }
}
