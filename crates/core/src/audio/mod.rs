//! Audio sources, decoder backends and the decode loop.

pub mod backend;
pub mod decoder;
pub mod source;
pub mod symphonia_backend;
pub mod waveform;

pub use backend::{InputStatus, MediaBackend, OutputFormat, OutputStatus, TrackFormat, TrackKind};
pub use decoder::{DecodeOutcome, SampleDecoder, DEFAULT_POLL_TIMEOUT};
pub use source::{AudioSource, FileSegment};
pub use symphonia_backend::SymphoniaBackend;
pub use waveform::{WaveformData, WaveformRecord};
