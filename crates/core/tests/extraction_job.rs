mod common;

use std::thread::{self, ThreadId};
use std::time::Duration;

use common::{audio_track, MockBackend};
use wavesync_core::{
    ExtractionJob, ExtractionObserver, JobCanceller, JobStatus, SampleDecoder, TrackKind,
    WaveformData, WaveformError,
};

#[derive(Default)]
struct Recorder {
    progress: Vec<f32>,
    completed: Vec<WaveformData>,
    failed: Vec<WaveformError>,
    threads: Vec<ThreadId>,
    cancel_on_progress: Option<JobCanceller>,
}

impl ExtractionObserver for Recorder {
    fn on_progress(&mut self, percent: f32) {
        self.threads.push(thread::current().id());
        self.progress.push(percent);
        if let Some(canceller) = &self.cancel_on_progress {
            canceller.cancel();
        }
    }

    fn on_complete(&mut self, data: WaveformData) {
        self.threads.push(thread::current().id());
        self.completed.push(data);
    }

    fn on_failed(&mut self, error: WaveformError) {
        self.threads.push(thread::current().id());
        self.failed.push(error);
    }
}

#[tokio::test]
async fn test_completes_with_monotonic_progress() {
    let backend = MockBackend::one_second(20);
    let counters = backend.counters();
    let job = ExtractionJob::new(SampleDecoder::new(backend).unwrap());

    let mut recorder = Recorder::default();
    let status = job.run(&mut recorder).await.unwrap();

    assert_eq!(status, JobStatus::Completed);
    assert_eq!(recorder.completed.len(), 1);
    assert!(recorder.failed.is_empty());

    assert_eq!(recorder.progress.len(), 20);
    assert!(recorder.progress.windows(2).all(|w| w[0] <= w[1]));
    assert!((recorder.progress[19] - 100.0).abs() < 1e-3);

    let data = &recorder.completed[0];
    assert_eq!(data.sample_count(), 8000);
    assert_eq!(data.duration_ms(), 1000);
    assert_eq!(counters.started(), 1);
    assert_eq!(counters.released(), 1);
}

#[tokio::test]
async fn test_observer_runs_on_awaiting_task() {
    let job = ExtractionJob::new(SampleDecoder::new(MockBackend::one_second(4)).unwrap());

    let mut recorder = Recorder::default();
    job.run(&mut recorder).await.unwrap();

    let here = thread::current().id();
    assert!(!recorder.threads.is_empty());
    assert!(recorder.threads.iter().all(|id| *id == here));
}

#[tokio::test]
async fn test_cancel_from_first_progress() {
    let backend = MockBackend::one_second(8000)
        .endless()
        .with_delay(Duration::from_millis(1));
    let counters = backend.counters();
    let mut job = ExtractionJob::new(SampleDecoder::new(backend).unwrap());

    let mut recorder = Recorder {
        cancel_on_progress: Some(job.canceller()),
        ..Recorder::default()
    };
    job.start().unwrap();
    let status = job.deliver_to(&mut recorder).await;

    assert_eq!(status, JobStatus::Cancelled);
    assert_eq!(recorder.progress.len(), 1);
    assert!(recorder.completed.is_empty());
    assert!(recorder.failed.is_empty());
    assert_eq!(counters.stopped(), 1);
    assert_eq!(counters.released(), 1);
}

#[tokio::test]
async fn test_backend_failure_is_reported_once() {
    let backend = MockBackend::one_second(10).failing_at(3);
    let counters = backend.counters();
    let job = ExtractionJob::new(SampleDecoder::new(backend).unwrap());

    let mut recorder = Recorder::default();
    let status = job.run(&mut recorder).await.unwrap();

    assert_eq!(status, JobStatus::Failed);
    assert_eq!(recorder.progress.len(), 3);
    assert!(recorder.completed.is_empty());
    assert_eq!(recorder.failed.len(), 1);
    assert!(matches!(recorder.failed[0], WaveformError::Decode(_)));
    assert_eq!(counters.released(), 1);
}

#[tokio::test]
async fn test_no_audio_track_never_starts() {
    let backend = MockBackend::one_second(4).with_tracks(vec![]);
    let counters = backend.counters();

    let result = SampleDecoder::new(backend);
    assert!(matches!(
        result,
        Err(WaveformError::NoAudioTrack { track_count: 0 })
    ));
    assert_eq!(counters.started(), 0);
    assert_eq!(counters.released(), 1);
}

#[tokio::test]
async fn test_only_non_audio_tracks() {
    let mut video = audio_track(None);
    video.kind = TrackKind::Other;
    let backend = MockBackend::one_second(4).with_tracks(vec![video.clone(), video]);
    let counters = backend.counters();

    let result = SampleDecoder::new(backend);
    assert!(matches!(
        result,
        Err(WaveformError::NoAudioTrack { track_count: 2 })
    ));
    assert_eq!(counters.started(), 0);
}

#[tokio::test]
async fn test_second_start_fails() {
    let mut job = ExtractionJob::new(SampleDecoder::new(MockBackend::one_second(4)).unwrap());

    job.start().unwrap();
    assert!(matches!(job.start(), Err(WaveformError::AlreadyStarted)));

    let mut recorder = Recorder::default();
    assert_eq!(job.deliver_to(&mut recorder).await, JobStatus::Completed);
    assert_eq!(recorder.completed.len(), 1);
}

#[tokio::test]
async fn test_cancel_before_start_releases_immediately() {
    let backend = MockBackend::one_second(4);
    let counters = backend.counters();
    let mut job = ExtractionJob::new(SampleDecoder::new(backend).unwrap());

    job.cancel();
    assert_eq!(job.status(), JobStatus::Cancelled);
    assert_eq!(counters.released(), 1);

    job.start().unwrap();
    let mut recorder = Recorder::default();
    assert_eq!(job.deliver_to(&mut recorder).await, JobStatus::Cancelled);
    assert!(recorder.progress.is_empty());
    assert_eq!(counters.started(), 0);
}

#[tokio::test]
async fn test_cancel_after_completion_is_noop() {
    let mut job = ExtractionJob::new(SampleDecoder::new(MockBackend::one_second(2)).unwrap());
    let canceller = job.canceller();

    job.start().unwrap();
    let mut recorder = Recorder::default();
    assert_eq!(job.deliver_to(&mut recorder).await, JobStatus::Completed);

    canceller.cancel();
    job.cancel();
    assert_eq!(job.status(), JobStatus::Completed);
    assert_eq!(recorder.completed.len(), 1);
}

#[test]
fn test_start_outside_runtime_fails() {
    let mut job = ExtractionJob::new(SampleDecoder::new(MockBackend::one_second(2)).unwrap());
    assert!(matches!(job.start(), Err(WaveformError::InvalidArgument(_))));
    assert_eq!(job.status(), JobStatus::Pending);
}
