#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use wavesync_core::{
    InputStatus, MediaBackend, OutputFormat, OutputStatus, Result, TrackFormat, TrackKind,
    WaveformError,
};

#[derive(Default)]
pub struct Counters {
    pub started: AtomicUsize,
    pub stopped: AtomicUsize,
    pub released: AtomicUsize,
}

impl Counters {
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

/// A backend that emits `chunk` over and over.
///
/// Ends after `chunk_limit` chunks, or never when there is no limit, and can
/// be told to fail on a given chunk instead.
pub struct MockBackend {
    tracks: Vec<TrackFormat>,
    chunk: Vec<i16>,
    chunk_limit: Option<usize>,
    fail_at: Option<usize>,
    delay: Duration,
    emitted: usize,
    pub counters: Arc<Counters>,
}

pub fn audio_track(duration_us: Option<u64>) -> TrackFormat {
    TrackFormat {
        kind: TrackKind::Audio,
        codec: "pcm_s16le".to_string(),
        sample_rate: Some(8000),
        channel_count: Some(1),
        duration_us,
    }
}

impl MockBackend {
    /// One second of 8kHz mono in `chunks` equal pieces.
    pub fn one_second(chunks: usize) -> Self {
        Self {
            tracks: vec![audio_track(Some(1_000_000))],
            chunk: vec![100; 8000 / chunks],
            chunk_limit: Some(chunks),
            fail_at: None,
            delay: Duration::ZERO,
            emitted: 0,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn with_tracks(mut self, tracks: Vec<TrackFormat>) -> Self {
        self.tracks = tracks;
        self
    }

    pub fn endless(mut self) -> Self {
        self.chunk_limit = None;
        self
    }

    pub fn failing_at(mut self, chunk: usize) -> Self {
        self.fail_at = Some(chunk);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn counters(&self) -> Arc<Counters> {
        self.counters.clone()
    }
}

impl MediaBackend for MockBackend {
    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_format(&self, index: usize) -> Option<TrackFormat> {
        self.tracks.get(index).cloned()
    }

    fn select_track(&mut self, _index: usize) -> Result<()> {
        Ok(())
    }

    fn start(&mut self) -> Result<OutputFormat> {
        self.counters.started.fetch_add(1, Ordering::SeqCst);
        Ok(OutputFormat {
            sample_rate: 8000,
            channel_count: 1,
        })
    }

    fn queue_input(&mut self, _timeout: Duration) -> Result<InputStatus> {
        Ok(InputStatus::Queued {
            bytes: self.chunk.len() * 2,
        })
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> Result<OutputStatus> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail_at == Some(self.emitted) {
            return Err(WaveformError::Decode("mock codec fault".to_string()));
        }

        self.emitted += 1;
        let end_of_stream = self.chunk_limit.is_some_and(|limit| self.emitted >= limit);
        Ok(OutputStatus::Chunk {
            data: self.chunk.iter().flat_map(|s| s.to_ne_bytes()).collect(),
            end_of_stream,
        })
    }

    fn stop(&mut self) {
        self.counters.stopped.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Write a 16-bit mono sine WAV.
pub fn write_sine_wav(path: &Path, sample_rate: u32, seconds: u32, freq: f32) -> Vec<i16> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();

    let total = sample_rate * seconds;
    let mut samples = Vec::with_capacity(total as usize);
    for n in 0..total {
        let t = n as f32 / sample_rate as f32;
        let value = ((t * freq * std::f32::consts::TAU).sin() * 0.5 * i16::MAX as f32) as i16;
        writer.write_sample(value).unwrap();
        samples.push(value);
    }
    writer.finalize().unwrap();
    samples
}
