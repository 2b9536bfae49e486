//! [`MediaBackend`] built on symphonia's format readers and codecs.
//!
//! Symphonia decodes synchronously, so the poll timeouts are never waited
//! on: every call returns as soon as it has done one unit of work.

use std::collections::VecDeque;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::backend::{InputStatus, MediaBackend, OutputFormat, OutputStatus, TrackFormat, TrackKind};
use super::source::AudioSource;
use crate::error::{Result, WaveformError};

/// Compressed packets held between `queue_input` and `dequeue_output`.
const INPUT_SLOTS: usize = 4;

pub struct SymphoniaBackend {
    format: Box<dyn FormatReader>,
    selected: Option<usize>,
    decoder: Option<Box<dyn Decoder>>,
    pending: VecDeque<Packet>,
    /// Decoded bytes held back while a format change is reported.
    ready: Option<Vec<u8>>,
    output_format: Option<OutputFormat>,
    input_done: bool,
    eos_sent: bool,
}

impl SymphoniaBackend {
    /// Open and probe a source.
    pub fn open(source: AudioSource) -> Result<Self> {
        log::debug!("Probing {:?}", source);
        let opened = source.open()?;
        let mss = MediaSourceStream::new(opened.stream, Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = opened.extension.as_deref() {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;

        Ok(Self::from_reader(probed.format))
    }

    pub fn from_reader(format: Box<dyn FormatReader>) -> Self {
        Self {
            format,
            selected: None,
            decoder: None,
            pending: VecDeque::with_capacity(INPUT_SLOTS),
            ready: None,
            output_format: None,
            input_done: false,
            eos_sent: false,
        }
    }

    fn selected_track_id(&self) -> Option<u32> {
        self.selected
            .and_then(|index| self.format.tracks().get(index))
            .map(|track| track.id)
    }
}

fn describe_track(params: &CodecParameters) -> TrackFormat {
    let kind = if params.codec != CODEC_TYPE_NULL {
        TrackKind::Audio
    } else {
        TrackKind::Other
    };

    let codec = symphonia::default::get_codecs()
        .get_codec(params.codec)
        .map(|descriptor| descriptor.short_name.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let duration_us = match (params.n_frames, params.time_base, params.sample_rate) {
        (Some(frames), Some(time_base), _) => {
            let time = time_base.calc_time(frames);
            Some(time.seconds * 1_000_000 + (time.frac * 1_000_000.0) as u64)
        }
        (Some(frames), None, Some(rate)) if rate > 0 => Some(frames * 1_000_000 / rate as u64),
        _ => None,
    };

    TrackFormat {
        kind,
        codec,
        sample_rate: params.sample_rate,
        channel_count: params.channels.map(|channels| channels.count() as u16),
        duration_us,
    }
}

impl MediaBackend for SymphoniaBackend {
    fn track_count(&self) -> usize {
        self.format.tracks().len()
    }

    fn track_format(&self, index: usize) -> Option<TrackFormat> {
        self.format
            .tracks()
            .get(index)
            .map(|track| describe_track(&track.codec_params))
    }

    fn select_track(&mut self, index: usize) -> Result<()> {
        if index >= self.format.tracks().len() {
            return Err(WaveformError::InvalidArgument(format!(
                "track {index} does not exist"
            )));
        }
        self.selected = Some(index);
        Ok(())
    }

    fn start(&mut self) -> Result<OutputFormat> {
        let index = self
            .selected
            .ok_or_else(|| WaveformError::Decode("no track selected".to_string()))?;
        let params = self.format.tracks()[index].codec_params.clone();

        let decoder =
            symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;
        self.decoder = Some(decoder);

        // Some containers only learn the shape from the first decoded packet;
        // a FormatChanged is emitted then.
        let output = OutputFormat {
            sample_rate: params.sample_rate.unwrap_or(0),
            channel_count: params
                .channels
                .map(|channels| channels.count() as u16)
                .unwrap_or(0),
        };
        self.output_format = Some(output);
        Ok(output)
    }

    fn queue_input(&mut self, _timeout: Duration) -> Result<InputStatus> {
        if self.input_done {
            return Ok(InputStatus::EndOfStream);
        }
        if self.pending.len() >= INPUT_SLOTS {
            return Ok(InputStatus::Busy);
        }
        let track_id = self
            .selected_track_id()
            .ok_or_else(|| WaveformError::Decode("no track selected".to_string()))?;

        loop {
            match self.format.next_packet() {
                Ok(packet) => {
                    if packet.track_id() != track_id {
                        continue;
                    }
                    let bytes = packet.buf().len();
                    self.pending.push_back(packet);
                    return Ok(InputStatus::Queued { bytes });
                }
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.input_done = true;
                    return Ok(InputStatus::EndOfStream);
                }
                Err(SymphoniaError::ResetRequired) => {
                    return Err(WaveformError::Decode(
                        "track list changed during decoding".to_string(),
                    ));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> Result<OutputStatus> {
        if let Some(data) = self.ready.take() {
            return Ok(OutputStatus::Chunk {
                data,
                end_of_stream: false,
            });
        }

        if let Some(packet) = self.pending.pop_front() {
            let decoder = self
                .decoder
                .as_mut()
                .ok_or_else(|| WaveformError::Decode("codec not started".to_string()))?;

            let decoded = decoder.decode(&packet)?;
            let spec = *decoded.spec();
            let mut sample_buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);

            let mut data = Vec::with_capacity(sample_buf.samples().len() * 2);
            for sample in sample_buf.samples() {
                data.extend_from_slice(&sample.to_ne_bytes());
            }

            let format = OutputFormat {
                sample_rate: spec.rate,
                channel_count: spec.channels.count() as u16,
            };
            if self.output_format != Some(format) {
                self.output_format = Some(format);
                self.ready = Some(data);
                return Ok(OutputStatus::FormatChanged(format));
            }

            return Ok(OutputStatus::Chunk {
                data,
                end_of_stream: false,
            });
        }

        if self.input_done && !self.eos_sent {
            self.eos_sent = true;
            return Ok(OutputStatus::Chunk {
                data: Vec::new(),
                end_of_stream: true,
            });
        }

        Ok(OutputStatus::Pending)
    }

    fn stop(&mut self) {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.reset();
        }
        self.pending.clear();
        self.ready = None;
    }

    fn release(&mut self) {
        self.decoder = None;
        self.pending.clear();
        self.ready = None;
        self.selected = None;
    }
}
