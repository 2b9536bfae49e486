//! Background extraction with progress, completion and cancellation.
//!
//! The decode loop runs on tokio's blocking pool. Its events travel back over
//! a channel and are handed to the observer by whichever task awaits
//! [`ExtractionJob::deliver_to`], so observers never run on the worker thread.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::audio::{
    AudioSource, DecodeOutcome, MediaBackend, SampleDecoder, SymphoniaBackend, WaveformData,
};
use crate::error::{Result, WaveformError};

/// Lifecycle of an extraction job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Decoding,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Notification produced by a running job.
#[derive(Debug)]
pub enum ExtractionEvent {
    /// Percent of the estimated decoded size. May exceed 100.
    Progress(f32),
    Completed(WaveformData),
    Failed(WaveformError),
}

impl ExtractionEvent {
    pub fn dispatch<O: ExtractionObserver + ?Sized>(self, observer: &mut O) {
        match self {
            Self::Progress(percent) => observer.on_progress(percent),
            Self::Completed(data) => observer.on_complete(data),
            Self::Failed(error) => observer.on_failed(error),
        }
    }
}

/// Receives the outcome of an extraction.
///
/// For a job that is not cancelled exactly one of `on_complete` and
/// `on_failed` is called; a cancelled job calls neither.
pub trait ExtractionObserver {
    fn on_progress(&mut self, _percent: f32) {}

    fn on_complete(&mut self, data: WaveformData);

    fn on_failed(&mut self, error: WaveformError);
}

struct JobShared {
    status: Mutex<JobStatus>,
    cancel: CancellationToken,
}

impl JobShared {
    fn new() -> Self {
        Self {
            status: Mutex::new(JobStatus::Pending),
            cancel: CancellationToken::new(),
        }
    }

    fn status(&self) -> JobStatus {
        *self.status.lock()
    }

    fn cancel(&self) {
        let mut status = self.status.lock();
        match *status {
            JobStatus::Pending => {
                *status = JobStatus::Cancelled;
                self.cancel.cancel();
            }
            // The worker moves to Cancelled once the loop unwinds
            JobStatus::Decoding => self.cancel.cancel(),
            _ => {}
        }
    }

    fn begin(&self) -> bool {
        let mut status = self.status.lock();
        if *status != JobStatus::Pending {
            return false;
        }
        *status = JobStatus::Decoding;
        true
    }

    /// Settle the terminal status of a finished decode.
    ///
    /// Runs under the same lock as `cancel`, so a cancel either lands before
    /// this (and wins) or after it (and is a no-op).
    fn finish(&self, result: Result<DecodeOutcome>) -> Option<ExtractionEvent> {
        let mut status = self.status.lock();
        if status.is_terminal() {
            return None;
        }

        let cancelled = self.cancel.is_cancelled();
        match result {
            Ok(DecodeOutcome::Completed(data)) if !cancelled => {
                *status = JobStatus::Completed;
                Some(ExtractionEvent::Completed(data))
            }
            Err(error) if !cancelled => {
                *status = JobStatus::Failed;
                Some(ExtractionEvent::Failed(error))
            }
            _ => {
                *status = JobStatus::Cancelled;
                None
            }
        }
    }
}

/// Cancels a job from anywhere, including from inside an observer.
#[derive(Clone)]
pub struct JobCanceller {
    shared: Arc<JobShared>,
}

impl JobCanceller {
    /// Request cancellation. No-op once the job is terminal.
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    pub fn status(&self) -> JobStatus {
        self.shared.status()
    }
}

/// One extraction attempt. Build a fresh job to retry.
pub struct ExtractionJob<B: MediaBackend + 'static = SymphoniaBackend> {
    decoder: Option<SampleDecoder<B>>,
    shared: Arc<JobShared>,
    events: Option<mpsc::UnboundedReceiver<ExtractionEvent>>,
    worker: Option<JoinHandle<()>>,
}

impl ExtractionJob<SymphoniaBackend> {
    /// Probe `source` and prepare a job for it.
    ///
    /// Fails with [`WaveformError::NoAudioTrack`] before any decoding when
    /// the source has no audio track.
    pub fn open(source: AudioSource) -> Result<Self> {
        Ok(Self::new(SampleDecoder::open(source)?))
    }
}

impl<B: MediaBackend + 'static> ExtractionJob<B> {
    pub fn new(decoder: SampleDecoder<B>) -> Self {
        Self {
            decoder: Some(decoder),
            shared: Arc::new(JobShared::new()),
            events: None,
            worker: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.shared.status()
    }

    pub fn canceller(&self) -> JobCanceller {
        JobCanceller {
            shared: self.shared.clone(),
        }
    }

    /// Request cancellation. A job that never started releases its decoder
    /// immediately.
    pub fn cancel(&mut self) {
        self.shared.cancel();
        if self.status() == JobStatus::Cancelled {
            self.decoder = None;
        }
    }

    /// Move the decode onto the blocking pool and return immediately.
    ///
    /// Must be called from within a tokio runtime. Starting a job that was
    /// cancelled while pending does nothing.
    pub fn start(&mut self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            WaveformError::InvalidArgument(format!("extraction needs a tokio runtime: {e}"))
        })?;

        let Some(decoder) = self.decoder.take() else {
            return match self.status() {
                JobStatus::Cancelled => Ok(()),
                _ => Err(WaveformError::AlreadyStarted),
            };
        };
        if !self.shared.begin() {
            log::debug!("Job cancelled before start; releasing decoder");
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(rx);

        let shared = self.shared.clone();
        self.worker = Some(runtime.spawn_blocking(move || {
            let cancel = shared.cancel.clone();
            let result = decoder.decode(&cancel, |percent| {
                let _ = tx.send(ExtractionEvent::Progress(percent));
            });
            if let Some(event) = shared.finish(result) {
                let _ = tx.send(event);
            }
        }));
        Ok(())
    }

    /// Next event for the observer, or `None` once the worker is done.
    ///
    /// Events produced after cancellation are swallowed.
    pub async fn next_event(&mut self) -> Option<ExtractionEvent> {
        let events = self.events.as_mut()?;
        while let Some(event) = events.recv().await {
            if self.shared.cancel.is_cancelled() {
                continue;
            }
            return Some(event);
        }
        None
    }

    /// Deliver every event to `observer` on the calling task and return the
    /// final status.
    pub async fn deliver_to<O: ExtractionObserver + ?Sized>(
        &mut self,
        observer: &mut O,
    ) -> JobStatus {
        while let Some(event) = self.next_event().await {
            event.dispatch(observer);
        }
        self.events = None;

        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                log::error!("Extraction worker died: {}", e);
                let failure = WaveformError::Decode(format!("extraction worker died: {e}"));
                if let Some(event) = self.shared.finish(Err(failure)) {
                    event.dispatch(observer);
                }
            }
        }
        self.status()
    }

    /// Start the job and deliver its events to `observer`.
    pub async fn run<O: ExtractionObserver + ?Sized>(
        mut self,
        observer: &mut O,
    ) -> Result<JobStatus> {
        self.start()?;
        Ok(self.deliver_to(observer).await)
    }
}

impl<B: MediaBackend + 'static> Drop for ExtractionJob<B> {
    fn drop(&mut self) {
        // Nobody is left to observe the result
        self.shared.cancel();
    }
}
