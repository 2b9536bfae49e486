use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WaveformError};

/// Decoded PCM of a whole track plus the parameters needed to interpret it.
///
/// Samples are signed 16-bit and interleaved when there is more than one
/// channel. The buffer is shared read-only between clones, so handing the
/// same data to two renderers never copies or mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformData {
    sample_rate: u32,
    channel_count: u16,
    duration_ms: u64,
    samples: Arc<[i16]>,
}

impl WaveformData {
    pub fn new(
        sample_rate: u32,
        channel_count: u16,
        duration_ms: u64,
        samples: impl Into<Arc<[i16]>>,
    ) -> Result<Self> {
        if sample_rate == 0 {
            return Err(WaveformError::InvalidArgument(
                "sample rate must be positive".to_string(),
            ));
        }
        if channel_count == 0 {
            return Err(WaveformError::InvalidArgument(
                "channel count must be positive".to_string(),
            ));
        }

        Ok(Self {
            sample_rate,
            channel_count,
            duration_ms,
            samples: samples.into(),
        })
    }

    /// Build from raw decoder output.
    ///
    /// `bytes` holds 16-bit samples in the platform's native byte order,
    /// which is what decoders hand back. A trailing odd byte is dropped.
    pub fn from_pcm_bytes(
        sample_rate: u32,
        channel_count: u16,
        duration_ms: u64,
        bytes: &[u8],
    ) -> Result<Self> {
        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_ne_bytes([pair[0], pair[1]]))
            .collect();

        Self::new(sample_rate, channel_count, duration_ms, samples)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    /// Duration in milliseconds as reported by the container.
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Number of complete multi-channel frames.
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channel_count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Flatten into the transfer record used across process boundaries.
    pub fn to_record(&self) -> Result<WaveformRecord> {
        Ok(WaveformRecord {
            sample_rate: i32::try_from(self.sample_rate)
                .map_err(|_| WaveformError::Record("sample rate out of range".to_string()))?,
            channel: i32::from(self.channel_count),
            duration_ms: i64::try_from(self.duration_ms)
                .map_err(|_| WaveformError::Record("duration out of range".to_string()))?,
            samples: self.samples.to_vec(),
        })
    }

    pub fn from_record(record: WaveformRecord) -> Result<Self> {
        let sample_rate = u32::try_from(record.sample_rate)
            .map_err(|_| WaveformError::Record(format!("sample rate {}", record.sample_rate)))?;
        let channel_count = u16::try_from(record.channel)
            .map_err(|_| WaveformError::Record(format!("channel count {}", record.channel)))?;
        let duration_ms = u64::try_from(record.duration_ms)
            .map_err(|_| WaveformError::Record(format!("duration {}", record.duration_ms)))?;

        Self::new(sample_rate, channel_count, duration_ms, record.samples)
    }

    /// Write the flat binary record.
    ///
    /// Layout, all little-endian: `sample_rate: i32`, `channel: i32`,
    /// `duration_ms: i64`, `count: u32`, then `count` samples as `i16`.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        let record = self.to_record()?;
        let count = u32::try_from(record.samples.len())
            .map_err(|_| WaveformError::Record("too many samples".to_string()))?;

        writer.write_all(&record.sample_rate.to_le_bytes())?;
        writer.write_all(&record.channel.to_le_bytes())?;
        writer.write_all(&record.duration_ms.to_le_bytes())?;
        writer.write_all(&count.to_le_bytes())?;

        let mut body = Vec::with_capacity(record.samples.len() * 2);
        for sample in &record.samples {
            body.extend_from_slice(&sample.to_le_bytes());
        }
        writer.write_all(&body)?;
        writer.flush()?;
        Ok(())
    }

    /// Read a record written by [`WaveformData::write_to`].
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut word = [0u8; 4];
        let mut long = [0u8; 8];

        reader.read_exact(&mut word)?;
        let sample_rate = i32::from_le_bytes(word);
        reader.read_exact(&mut word)?;
        let channel = i32::from_le_bytes(word);
        reader.read_exact(&mut long)?;
        let duration_ms = i64::from_le_bytes(long);
        reader.read_exact(&mut word)?;
        let count = u32::from_le_bytes(word) as usize;

        // Grow with the data actually present instead of trusting the header.
        let mut body = Vec::new();
        reader.take(count as u64 * 2).read_to_end(&mut body)?;
        if body.len() != count * 2 {
            return Err(WaveformError::Record(format!(
                "expected {} samples, found {}",
                count,
                body.len() / 2
            )));
        }

        let samples = body
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        Self::from_record(WaveformRecord {
            sample_rate,
            channel,
            duration_ms,
            samples,
        })
    }
}

/// Flat form of [`WaveformData`] for marshalling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveformRecord {
    pub sample_rate: i32,
    pub channel: i32,
    pub duration_ms: i64,
    pub samples: Vec<i16>,
}
