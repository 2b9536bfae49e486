use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use wavesync_core::{
    AudioSource, BucketSpec, ClockPlayer, ConfigManager, ExtractionJob, ExtractionObserver,
    JobStatus, PeakMode, PositionCursor, PositionFeed, SampleDecoder, Settings, WaveformData,
    WaveformError, WaveformModel,
};

const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Extract, resample and follow audio waveforms.
#[derive(Parser, Debug)]
#[command(name = "wavesync")]
#[command(about = "Audio waveform extraction and playback position feed")]
struct Args {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a file or URL and print its bucketed waveform
    Decode {
        /// Path, file:// or http(s):// URL
        source: String,

        /// Number of buckets
        #[arg(long, default_value = "100", conflicts_with = "per_block")]
        buckets: usize,

        /// One bucket per configured `sec_per_block` seconds instead
        #[arg(long)]
        per_block: bool,

        /// average or max (defaults to the configured mode)
        #[arg(long)]
        mode: Option<PeakMode>,

        /// Print the buckets as JSON on stdout
        #[arg(long)]
        json: bool,

        /// Write the decoded samples as a binary waveform record
        #[arg(long)]
        record: Option<PathBuf>,
    },
    /// Decode a file, then follow a simulated playback across its waveform
    Play {
        source: String,

        /// Waveform width in terminal columns
        #[arg(long, default_value = "60")]
        columns: usize,

        /// average or max (defaults to the configured mode)
        #[arg(long)]
        mode: Option<PeakMode>,

        /// Start playback at this position, in seconds
        #[arg(long, default_value = "0")]
        start: f64,
    },
}

fn parse_source(source: &str) -> AudioSource {
    if source.contains("://") {
        AudioSource::uri(source)
    } else {
        AudioSource::path(source)
    }
}

/// Prints progress to stderr and keeps the outcome.
#[derive(Default)]
struct ProgressPrinter {
    last_percent: Option<u32>,
    data: Option<WaveformData>,
    error: Option<WaveformError>,
}

impl ExtractionObserver for ProgressPrinter {
    fn on_progress(&mut self, percent: f32) {
        let whole = percent.min(100.0) as u32;
        if self.last_percent != Some(whole) {
            eprint!("\rDecoding... {:>3}%", whole);
            self.last_percent = Some(whole);
        }
    }

    fn on_complete(&mut self, data: WaveformData) {
        if self.last_percent.is_some() {
            eprintln!("\rDecoding... done");
        }
        self.data = Some(data);
    }

    fn on_failed(&mut self, error: WaveformError) {
        if self.last_percent.is_some() {
            eprintln!();
        }
        self.error = Some(error);
    }
}

async fn extract(source: &str, settings: &Settings) -> anyhow::Result<WaveformData> {
    let started = Instant::now();
    // Probing can block on the network
    let source = parse_source(source);
    let opening = tokio::task::spawn_blocking(move || SampleDecoder::open(source));
    let decoder = tokio::select! {
        opened = opening => opened??,
        _ = tokio::signal::ctrl_c() => anyhow::bail!("Opening cancelled"),
    };
    let decoder = decoder.with_poll_timeout(settings.poll_timeout());
    let mut job = ExtractionJob::new(decoder);
    let canceller = job.canceller();

    let mut printer = ProgressPrinter::default();
    job.start()?;
    let status = tokio::select! {
        status = job.deliver_to(&mut printer) => status,
        _ = tokio::signal::ctrl_c() => {
            canceller.cancel();
            eprintln!();
            anyhow::bail!("Extraction cancelled");
        }
    };

    match (status, printer.data, printer.error) {
        (JobStatus::Completed, Some(data), _) => {
            log::info!(
                "Extracted {} samples in {} ms",
                data.sample_count(),
                started.elapsed().as_millis()
            );
            Ok(data)
        }
        (_, _, Some(error)) => Err(error.into()),
        (status, _, _) => anyhow::bail!("Extraction ended as {:?}", status),
    }
}

fn render_bars(normalized: &[f32]) -> String {
    normalized
        .iter()
        .map(|&level| {
            let index = (level * (BARS.len() - 1) as f32).round() as usize;
            BARS[index.min(BARS.len() - 1)]
        })
        .collect()
}

fn render_progress(model: &WaveformModel) -> String {
    let total = model.series().len();
    let played = model.played_boundary();
    format!(
        "{}{} {}",
        "━".repeat(played),
        " ".repeat(total - played),
        model.time_label()
    )
}

async fn decode(
    source: String,
    buckets: usize,
    per_block: bool,
    mode: Option<PeakMode>,
    json: bool,
    record: Option<PathBuf>,
    settings: Settings,
) -> anyhow::Result<()> {
    let data = extract(&source, &settings).await?;
    let mode = mode.unwrap_or(settings.peak_mode);
    let spec = if per_block {
        settings.per_block()
    } else {
        BucketSpec::count(buckets)
    };

    let mut model = WaveformModel::new(spec, mode);
    model.set_data(data)?;
    let Some(data) = model.data() else {
        anyhow::bail!("No waveform data");
    };

    if let Some(path) = record {
        let mut writer = BufWriter::new(File::create(&path)?);
        data.write_to(&mut writer)?;
        writer.flush()?;
        log::info!("Wrote waveform record to {}", path.display());
    }

    let series = model.series();
    if json {
        let output = serde_json::json!({
            "sample_rate": data.sample_rate(),
            "channels": data.channel_count(),
            "duration_ms": data.duration_ms(),
            "mode": series.mode(),
            "samples_per_bucket": series.samples_per_bucket(),
            "buckets": series.buckets(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Source:      {}", source);
    println!(
        "Format:      {} Hz, {} channel(s), {}",
        data.sample_rate(),
        data.channel_count(),
        wavesync_core::format_time(data.duration_ms())
    );
    println!("Samples:     {}", data.sample_count());
    println!(
        "Buckets:     {} x {} samples ({})",
        series.len(),
        series.samples_per_bucket(),
        series.mode().as_str()
    );
    println!("Peak:        {:.1}", series.max_amplitude());
    println!();
    println!("{}", render_bars(&model.normalized()));
    Ok(())
}

async fn play(
    source: String,
    columns: usize,
    mode: Option<PeakMode>,
    start: f64,
    settings: Settings,
) -> anyhow::Result<()> {
    let data = extract(&source, &settings).await?;
    let duration_ms = data.duration_ms();

    let mut model = WaveformModel::new(
        BucketSpec::count(columns.max(1)),
        mode.unwrap_or(settings.peak_mode),
    );
    model.set_data(data)?;
    println!("{}", render_bars(&model.normalized()));

    let (tx, mut rx) = watch::channel(PositionCursor::new(0, duration_ms));
    let mut feed = PositionFeed::new(ClockPlayer::new(duration_ms), tx)
        .with_refresh_interval(settings.refresh_interval())
        .with_snap_to_start(settings.snap_to_start_at_completion);
    feed.prepare()?;
    if start > 0.0 {
        feed.seek((start * 1000.0) as u64)?;
    }
    feed.play()?;

    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let cursor = *rx.borrow_and_update();
                model.set_position(cursor);
                write!(stdout, "\r{}", render_progress(&model))?;
                stdout.flush()?;

                if cursor.is_at_end() && !feed.is_playing() {
                    feed.on_playback_completed()?;
                    model.force_complete();
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                feed.stop(false)?;
                break;
            }
        }
    }

    writeln!(stdout, "\r{}", render_progress(&model))?;
    Ok(())
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = ConfigManager::new(args.config);
    let settings = match config.load() {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("{}; using default settings", e);
            Settings::default()
        }
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        match args.command {
            Command::Decode {
                source,
                buckets,
                per_block,
                mode,
                json,
                record,
            } => decode(source, buckets, per_block, mode, json, record, settings).await,
            Command::Play {
                source,
                columns,
                mode,
                start,
            } => play(source, columns, mode, start, settings).await,
        }
    })
}
