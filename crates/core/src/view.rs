//! State behind a waveform display.
//!
//! Holds the decoded data, the current bucket series and the play cursor.
//! Changing the peak mode or bucket sizing recomputes the series from the
//! retained samples; position updates are held back while the user scrubs.

use std::time::Instant;

use crate::audio::WaveformData;
use crate::error::Result;
use crate::playback::PositionCursor;
use crate::resample::{BucketSpec, PeakMode, ResampledSeries};

#[derive(Debug, Clone)]
pub struct WaveformModel {
    data: Option<WaveformData>,
    series: ResampledSeries,
    mode: PeakMode,
    spec: BucketSpec,
    cursor: PositionCursor,
    scrubbing: bool,
}

impl WaveformModel {
    pub fn new(spec: BucketSpec, mode: PeakMode) -> Self {
        Self {
            data: None,
            series: ResampledSeries::from_buckets(Vec::new(), mode),
            mode,
            spec,
            cursor: PositionCursor::default(),
            scrubbing: false,
        }
    }

    /// Take ownership of freshly decoded data and bucket it.
    pub fn set_data(&mut self, data: WaveformData) -> Result<()> {
        self.series = compute(&data, &self.spec, self.mode)?;
        self.cursor = PositionCursor::new(0, data.duration_ms());
        self.data = Some(data);
        Ok(())
    }

    /// Show buckets computed ahead of time, skipping extraction.
    ///
    /// Without samples behind them, later mode or sizing changes keep these
    /// buckets as they are.
    pub fn set_preloaded(&mut self, buckets: Vec<f32>, duration_ms: u64) {
        self.data = None;
        self.series = ResampledSeries::from_buckets(buckets, self.mode);
        self.cursor = PositionCursor::new(0, duration_ms);
    }

    pub fn set_peak_mode(&mut self, mode: PeakMode) -> Result<()> {
        self.mode = mode;
        self.recompute()
    }

    pub fn set_bucket_spec(&mut self, spec: BucketSpec) -> Result<()> {
        self.spec = spec;
        self.recompute()
    }

    fn recompute(&mut self) -> Result<()> {
        if let Some(data) = &self.data {
            self.series = compute(data, &self.spec, self.mode)?;
        }
        Ok(())
    }

    /// Apply a cursor from the position feed. Ignored while scrubbing.
    pub fn set_position(&mut self, cursor: PositionCursor) {
        if self.scrubbing {
            return;
        }
        self.cursor = cursor;
    }

    pub fn begin_scrub(&mut self) {
        self.scrubbing = true;
    }

    /// Move the cursor to `fraction` of the track while scrubbing.
    pub fn scrub_to(&mut self, fraction: f64) -> u64 {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let target = (self.cursor.duration_ms as f64 * fraction).round() as u64;
        self.cursor.current_ms = target;
        target
    }

    /// Finish scrubbing and return the position the player should seek to.
    pub fn end_scrub(&mut self) -> Option<u64> {
        if !std::mem::take(&mut self.scrubbing) {
            return None;
        }
        Some(self.cursor.current_ms)
    }

    /// Show the whole track as played.
    pub fn force_complete(&mut self) {
        self.cursor.current_ms = self.cursor.duration_ms;
    }

    /// Number of leading buckets drawn in the played color.
    pub fn played_boundary(&self) -> usize {
        self.cursor.played_buckets(self.series.len())
    }

    pub fn normalized(&self) -> Vec<f32> {
        self.series.normalized()
    }

    pub fn time_label(&self) -> String {
        self.cursor.time_label()
    }

    pub fn data(&self) -> Option<&WaveformData> {
        self.data.as_ref()
    }

    pub fn series(&self) -> &ResampledSeries {
        &self.series
    }

    pub fn cursor(&self) -> PositionCursor {
        self.cursor
    }

    pub fn peak_mode(&self) -> PeakMode {
        self.mode
    }

    pub fn bucket_spec(&self) -> BucketSpec {
        self.spec
    }

    pub fn is_scrubbing(&self) -> bool {
        self.scrubbing
    }
}

fn compute(data: &WaveformData, spec: &BucketSpec, mode: PeakMode) -> Result<ResampledSeries> {
    let started = Instant::now();
    let series = spec.resample(data, mode)?;
    log::debug!(
        "Computed {} {} buckets in {:?}",
        series.len(),
        mode.as_str(),
        started.elapsed()
    );
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> WaveformData {
        // 8 samples, alternating magnitude per pair
        WaveformData::new(8, 1, 1000, vec![1i16, -1, 4, -4, 2, -2, 8, -8]).unwrap()
    }

    #[test]
    fn test_set_data_computes_series() {
        let mut model = WaveformModel::new(BucketSpec::count(4), PeakMode::Average);
        model.set_data(data()).unwrap();
        assert_eq!(model.series().buckets(), &[1.0, 4.0, 2.0, 8.0]);
        assert_eq!(model.cursor(), PositionCursor::new(0, 1000));
    }

    #[test]
    fn test_config_change_recomputes() {
        let mut model = WaveformModel::new(BucketSpec::count(4), PeakMode::Average);
        model.set_data(data()).unwrap();

        model.set_bucket_spec(BucketSpec::count(2)).unwrap();
        assert_eq!(model.series().buckets(), &[2.5, 5.0]);

        model.set_peak_mode(PeakMode::Max).unwrap();
        assert_eq!(model.series().buckets(), &[4.0, 8.0]);
        assert_eq!(model.normalized(), vec![0.5, 1.0]);
    }

    #[test]
    fn test_invalid_spec_is_reported() {
        let mut model = WaveformModel::new(BucketSpec::count(4), PeakMode::Average);
        model.set_data(data()).unwrap();
        assert!(model.set_bucket_spec(BucketSpec::count(0)).is_err());
    }

    #[test]
    fn test_narrow_view_draws_no_bars() {
        let mut model = WaveformModel::new(BucketSpec::count(4), PeakMode::Average);
        model.set_data(data()).unwrap();
        model.set_position(PositionCursor::new(500, 1000));

        let narrow = BucketSpec::FitWidth {
            width: 3.0,
            block_width: 4.0,
        };
        model.set_bucket_spec(narrow).unwrap();
        assert!(model.series().is_empty());
        assert_eq!(model.played_boundary(), 0);
        assert!(model.normalized().is_empty());
    }

    #[test]
    fn test_position_ignored_while_scrubbing() {
        let mut model = WaveformModel::new(BucketSpec::count(4), PeakMode::Average);
        model.set_data(data()).unwrap();

        model.set_position(PositionCursor::new(250, 1000));
        assert_eq!(model.played_boundary(), 1);

        model.begin_scrub();
        assert_eq!(model.scrub_to(0.75), 750);
        model.set_position(PositionCursor::new(300, 1000));
        assert_eq!(model.cursor().current_ms, 750);

        assert_eq!(model.end_scrub(), Some(750));
        assert_eq!(model.end_scrub(), None);
        model.set_position(PositionCursor::new(800, 1000));
        assert_eq!(model.cursor().current_ms, 800);
    }

    #[test]
    fn test_force_complete() {
        let mut model = WaveformModel::new(BucketSpec::count(4), PeakMode::Average);
        model.set_data(data()).unwrap();
        model.set_position(PositionCursor::new(980, 1000));
        model.force_complete();
        assert_eq!(model.played_boundary(), 4);
        assert_eq!(model.time_label(), "0:01 / 0:01");
    }

    #[test]
    fn test_preloaded_buckets_survive_mode_change() {
        let mut model = WaveformModel::new(BucketSpec::count(4), PeakMode::Average);
        model.set_preloaded(vec![0.1, 0.4, 0.2], 3_000);
        model.set_peak_mode(PeakMode::Max).unwrap();

        assert!(model.data().is_none());
        assert_eq!(model.series().buckets(), &[0.1, 0.4, 0.2]);
        assert_eq!(model.cursor().duration_ms, 3_000);
    }
}
