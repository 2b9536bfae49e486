//! Block aggregation of PCM into display buckets.

use serde::{Deserialize, Serialize};

use crate::audio::WaveformData;
use crate::error::{Result, WaveformError};

/// How a bucket's samples collapse into one magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeakMode {
    /// Mean of absolute sample values.
    #[default]
    Average,
    /// Largest absolute sample value.
    Max,
}

impl PeakMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Average => "average",
            Self::Max => "max",
        }
    }
}

impl std::str::FromStr for PeakMode {
    type Err = WaveformError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "average" | "avg" => Ok(Self::Average),
            "max" | "peak" => Ok(Self::Max),
            other => Err(WaveformError::InvalidArgument(format!(
                "unknown peak mode: {other}"
            ))),
        }
    }
}

/// Bucketed magnitudes derived from a sample buffer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResampledSeries {
    buckets: Vec<f32>,
    samples_per_bucket: usize,
    mode: PeakMode,
}

impl ResampledSeries {
    /// Wrap buckets computed elsewhere, e.g. loaded from a cache.
    pub fn from_buckets(buckets: Vec<f32>, mode: PeakMode) -> Self {
        Self {
            buckets,
            samples_per_bucket: 0,
            mode,
        }
    }

    pub fn buckets(&self) -> &[f32] {
        &self.buckets
    }

    pub fn into_buckets(self) -> Vec<f32> {
        self.buckets
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn samples_per_bucket(&self) -> usize {
        self.samples_per_bucket
    }

    pub fn mode(&self) -> PeakMode {
        self.mode
    }

    /// Largest bucket, or 0.0 for an empty series.
    pub fn max_amplitude(&self) -> f32 {
        self.buckets.iter().copied().fold(0.0, f32::max)
    }

    /// Buckets scaled so the largest is 1.0. A silent series stays at zero.
    pub fn normalized(&self) -> Vec<f32> {
        let max = self.max_amplitude();
        if max <= 0.0 {
            return vec![0.0; self.buckets.len()];
        }
        self.buckets.iter().map(|b| b / max).collect()
    }
}

/// Reduce `samples` to `bucket_count` buckets.
///
/// Each bucket covers `samples.len() / bucket_count` consecutive samples;
/// samples past the last full bucket are dropped. When there are fewer
/// samples than buckets the series is empty.
pub fn resample(samples: &[i16], bucket_count: usize, mode: PeakMode) -> Result<ResampledSeries> {
    if bucket_count == 0 {
        return Err(WaveformError::InvalidArgument(
            "bucket count must be positive".to_string(),
        ));
    }

    let samples_per_bucket = samples.len() / bucket_count;
    Ok(aggregate(samples, samples_per_bucket, bucket_count, mode))
}

/// Reduce `samples` to buckets of exactly `samples_per_bucket` samples.
pub fn resample_by_block(
    samples: &[i16],
    samples_per_bucket: usize,
    mode: PeakMode,
) -> Result<ResampledSeries> {
    if samples_per_bucket == 0 {
        return Err(WaveformError::InvalidArgument(
            "samples per bucket must be positive".to_string(),
        ));
    }

    Ok(aggregate(samples, samples_per_bucket, usize::MAX, mode))
}

fn aggregate(
    samples: &[i16],
    samples_per_bucket: usize,
    limit: usize,
    mode: PeakMode,
) -> ResampledSeries {
    if samples_per_bucket == 0 {
        return ResampledSeries {
            buckets: Vec::new(),
            samples_per_bucket,
            mode,
        };
    }

    let buckets = samples
        .chunks_exact(samples_per_bucket)
        .take(limit)
        .map(|block| match mode {
            PeakMode::Average => average_abs(block),
            PeakMode::Max => max_abs(block),
        })
        .collect();

    ResampledSeries {
        buckets,
        samples_per_bucket,
        mode,
    }
}

fn average_abs(block: &[i16]) -> f32 {
    let sum: f64 = block.iter().map(|&s| (s as f64).abs()).sum();
    (sum / block.len() as f64) as f32
}

fn max_abs(block: &[i16]) -> f32 {
    block
        .iter()
        .map(|&s| (s as i32).unsigned_abs())
        .max()
        .unwrap_or(0) as f32
}

/// How many buckets a view wants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BucketSpec {
    /// An explicit bucket count.
    Count { buckets: usize },
    /// As many bars as fit a fixed-width view.
    FitWidth { width: f32, block_width: f32 },
    /// One bar per `sec_per_block` seconds of audio, for a scrolling view.
    PerBlock { sec_per_block: f32 },
}

impl BucketSpec {
    pub fn count(buckets: usize) -> Self {
        Self::Count { buckets }
    }

    /// Resample `data` with this sizing.
    pub fn resample(&self, data: &WaveformData, mode: PeakMode) -> Result<ResampledSeries> {
        match *self {
            Self::Count { buckets } => resample(data.samples(), buckets, mode),
            Self::FitWidth { width, block_width } => {
                if !(block_width > 0.0) || !(width >= 0.0) {
                    return Err(WaveformError::InvalidArgument(format!(
                        "cannot fit blocks of {block_width} into width {width}"
                    )));
                }
                let buckets = (width / block_width).floor() as usize;
                // A view narrower than one bar draws nothing
                if buckets == 0 {
                    return Ok(ResampledSeries::from_buckets(Vec::new(), mode));
                }
                resample(data.samples(), buckets, mode)
            }
            Self::PerBlock { sec_per_block } => {
                let per_block = sec_per_block as f64
                    * data.sample_rate() as f64
                    * data.channel_count() as f64;
                resample_by_block(data.samples(), per_block as usize, mode)
            }
        }
    }
}
