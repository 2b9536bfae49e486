pub use audio::{
    AudioSource, DecodeOutcome, FileSegment, InputStatus, MediaBackend, OutputFormat,
    OutputStatus, SampleDecoder, SymphoniaBackend, TrackFormat, TrackKind, WaveformData,
    WaveformRecord, DEFAULT_POLL_TIMEOUT,
};
pub use config::{
    default_config_path, ConfigError, ConfigFile, ConfigManager, ConfigOption, ConfigSchema,
    Settings,
};
pub use error::{Result, WaveformError};
pub use job::{ExtractionEvent, ExtractionJob, ExtractionObserver, JobCanceller, JobStatus};
pub use playback::{
    format_time, ClockPlayer, PlayerControl, PositionCursor, PositionFeed, PositionSink,
    DEFAULT_REFRESH_INTERVAL,
};
pub use resample::{resample, resample_by_block, BucketSpec, PeakMode, ResampledSeries};
pub use view::WaveformModel;
// Re-exported so callers can cancel a bare `SampleDecoder::decode`
pub use tokio_util::sync::CancellationToken;

pub mod audio;
mod config;
mod error;
mod job;
pub mod playback;
mod resample;
mod view;
