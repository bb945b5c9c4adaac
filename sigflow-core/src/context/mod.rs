//! Per-session indicator context.
//!
//! An `IndicatorContext` is a read-only snapshot of one instrument's session:
//! the bars seen so far, the precomputed indicator series aligned to them,
//! and a few session scalars (previous close, support, resistance). Detectors
//! only read from it. Every series is optional; a detector whose inputs are
//! absent simply never fires.

pub mod aggregate;

pub use aggregate::{aggregate, window_at, AggregatedBar};

use crate::domain::{Bar, Board, LimitState};
use crate::error::ContextError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Named indicator series a context can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Series {
    /// Short-period oscillator on 1-bar data (RSI6 on 1-minute bars).
    FastOscillator,
    /// Short-period oscillator on aggregated data (RSI6 on 5-minute bars).
    SlowOscillator,
    /// Slow trend oscillator used by the run detectors (KDJ D line).
    TrendReference,
    MaShort,
    MaMid,
    MaBase,
    BandUpper,
    BandMiddle,
    BandLower,
}

impl Series {
    pub const ALL: [Series; 9] = [
        Series::FastOscillator,
        Series::SlowOscillator,
        Series::TrendReference,
        Series::MaShort,
        Series::MaMid,
        Series::MaBase,
        Series::BandUpper,
        Series::BandMiddle,
        Series::BandLower,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Series::FastOscillator => "fast_osc",
            Series::SlowOscillator => "slow_osc",
            Series::TrendReference => "trend_ref",
            Series::MaShort => "ma_short",
            Series::MaMid => "ma_mid",
            Series::MaBase => "ma_base",
            Series::BandUpper => "band_upper",
            Series::BandMiddle => "band_middle",
            Series::BandLower => "band_lower",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }
}

/// Anything a detector may read from a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Input {
    Series(Series),
    PrevClose,
    Support,
    Resistance,
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Series(s) => f.write_str(s.name()),
            Input::PrevClose => f.write_str("prev_close"),
            Input::Support => f.write_str("support"),
            Input::Resistance => f.write_str("resistance"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorContext {
    instrument_id: String,
    board: Board,
    bars: Vec<Bar>,
    series: BTreeMap<Series, Vec<f64>>,
    prev_close: Option<f64>,
    support: Option<f64>,
    resistance: Option<f64>,
}

/// Collects the parts of a context and checks their alignment in `build`.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    instrument_id: String,
    bars: Vec<Bar>,
    series: BTreeMap<Series, Vec<f64>>,
    prev_close: Option<f64>,
    support: Option<f64>,
    resistance: Option<f64>,
}

impl ContextBuilder {
    pub fn series(mut self, series: Series, values: Vec<f64>) -> Self {
        self.series.insert(series, values);
        self
    }

    pub fn prev_close(mut self, value: f64) -> Self {
        self.prev_close = Some(value);
        self
    }

    pub fn support(mut self, value: f64) -> Self {
        self.support = Some(value);
        self
    }

    pub fn resistance(mut self, value: f64) -> Self {
        self.resistance = Some(value);
        self
    }

    pub fn build(self) -> Result<IndicatorContext, ContextError> {
        for (position, bar) in self.bars.iter().enumerate() {
            if bar.index != position {
                return Err(ContextError::NonContiguousIndex {
                    position,
                    index: bar.index,
                });
            }
        }
        for (position, pair) in self.bars.windows(2).enumerate() {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(ContextError::NonMonotonicTime {
                    position: position + 1,
                });
            }
        }
        for (series, values) in &self.series {
            if values.len() != self.bars.len() {
                return Err(ContextError::LengthMismatch {
                    series: series.name(),
                    len: values.len(),
                    expected: self.bars.len(),
                });
            }
        }

        Ok(IndicatorContext {
            board: Board::classify(&self.instrument_id),
            instrument_id: self.instrument_id,
            bars: self.bars,
            series: self.series,
            prev_close: self.prev_close,
            support: self.support,
            resistance: self.resistance,
        })
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

impl IndicatorContext {
    pub fn builder(instrument_id: impl Into<String>, bars: Vec<Bar>) -> ContextBuilder {
        ContextBuilder {
            instrument_id: instrument_id.into(),
            bars,
            series: BTreeMap::new(),
            prev_close: None,
            support: None,
            resistance: None,
        }
    }

    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }

    pub fn board(&self) -> Board {
        self.board
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn bar(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Index of the most recent bar, `None` for an empty session.
    pub fn latest_index(&self) -> Option<usize> {
        self.bars.len().checked_sub(1)
    }

    /// Close at `index`; `None` when out of range or NaN.
    pub fn close(&self, index: usize) -> Option<f64> {
        self.bars.get(index).and_then(|b| finite(b.close))
    }

    /// Series value at `index`; `None` when the series is absent, the index
    /// is out of range, or the value is NaN.
    pub fn value(&self, series: Series, index: usize) -> Option<f64> {
        self.series
            .get(&series)
            .and_then(|v| v.get(index).copied())
            .and_then(finite)
    }

    pub fn has_series(&self, series: Series) -> bool {
        self.series.contains_key(&series)
    }

    pub fn has(&self, input: Input) -> bool {
        match input {
            Input::Series(s) => self.has_series(s),
            Input::PrevClose => self.prev_close().is_some(),
            Input::Support => self.support().is_some(),
            Input::Resistance => self.resistance().is_some(),
        }
    }

    /// Inputs from `wanted` that this context does not provide.
    pub fn missing(&self, wanted: &[Input]) -> Vec<Input> {
        wanted.iter().copied().filter(|i| !self.has(*i)).collect()
    }

    pub fn prev_close(&self) -> Option<f64> {
        self.prev_close.and_then(finite)
    }

    /// Support level as supplied. Not filtered: a corrupt level is a fault
    /// the level detectors report, not missing data.
    pub fn support(&self) -> Option<f64> {
        self.support.filter(|v| !v.is_nan())
    }

    pub fn resistance(&self) -> Option<f64> {
        self.resistance.filter(|v| !v.is_nan())
    }

    /// Percentage change of `price` from the previous session close.
    pub fn net_gain_pct(&self, price: f64) -> Option<f64> {
        let prev = self.prev_close()?;
        if prev <= 0.0 || !price.is_finite() {
            return None;
        }
        Some((price - prev) / prev * 100.0)
    }

    /// Daily limit state of the close at `index`.
    pub fn limit_state(&self, index: usize) -> LimitState {
        match (self.close(index), self.prev_close()) {
            (Some(close), Some(prev)) => self.board.limit_state(close, prev),
            _ => LimitState::Free,
        }
    }

    /// The `window`-bar aggregate containing `index`.
    pub fn aggregated(&self, index: usize, window: usize) -> Option<AggregatedBar> {
        window_at(&self.bars, index, window)
    }

    /// A copy holding only the first `len` bars (and series values).
    ///
    /// Used to replay a finished session one bar at a time.
    pub fn truncated(&self, len: usize) -> IndicatorContext {
        let len = len.min(self.bars.len());
        IndicatorContext {
            instrument_id: self.instrument_id.clone(),
            board: self.board,
            bars: self.bars[..len].to_vec(),
            series: self
                .series
                .iter()
                .map(|(k, v)| (*k, v[..len].to_vec()))
                .collect(),
            prev_close: self.prev_close,
            support: self.support,
            resistance: self.resistance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_bars(closes: &[f64]) -> Vec<Bar> {
        let base = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                index: i,
                timestamp: base + chrono::Duration::minutes(i as i64),
                open: c,
                high: c + 0.5,
                low: c - 0.5,
                close: c,
                volume: 100.0,
            })
            .collect()
    }

    #[test]
    fn build_checks_series_length() {
        let err = IndicatorContext::builder("600519", make_bars(&[1.0, 2.0, 3.0]))
            .series(Series::FastOscillator, vec![50.0, 50.0])
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ContextError::LengthMismatch {
                series: "fast_osc",
                len: 2,
                expected: 3
            }
        );
    }

    #[test]
    fn build_checks_contiguous_index() {
        let mut bars = make_bars(&[1.0, 2.0, 3.0]);
        bars[2].index = 7;
        let err = IndicatorContext::builder("600519", bars).build().unwrap_err();
        assert_eq!(err, ContextError::NonContiguousIndex { position: 2, index: 7 });
    }

    #[test]
    fn build_checks_monotonic_time() {
        let mut bars = make_bars(&[1.0, 2.0, 3.0]);
        bars[2].timestamp = bars[1].timestamp;
        let err = IndicatorContext::builder("600519", bars).build().unwrap_err();
        assert_eq!(err, ContextError::NonMonotonicTime { position: 2 });
    }

    #[test]
    fn value_hides_nan_and_out_of_range() {
        let ctx = IndicatorContext::builder("600519", make_bars(&[1.0, 2.0]))
            .series(Series::SlowOscillator, vec![f64::NAN, 40.0])
            .build()
            .unwrap();
        assert_eq!(ctx.value(Series::SlowOscillator, 0), None);
        assert_eq!(ctx.value(Series::SlowOscillator, 1), Some(40.0));
        assert_eq!(ctx.value(Series::SlowOscillator, 2), None);
        assert_eq!(ctx.value(Series::FastOscillator, 1), None);
    }

    #[test]
    fn missing_inputs_are_reported() {
        let ctx = IndicatorContext::builder("600519", make_bars(&[1.0]))
            .series(Series::FastOscillator, vec![50.0])
            .prev_close(1.0)
            .build()
            .unwrap();
        let missing = ctx.missing(&[
            Input::Series(Series::FastOscillator),
            Input::Series(Series::SlowOscillator),
            Input::PrevClose,
            Input::Support,
        ]);
        assert_eq!(
            missing,
            vec![Input::Series(Series::SlowOscillator), Input::Support]
        );
    }

    #[test]
    fn net_gain_from_prev_close() {
        let ctx = IndicatorContext::builder("600519", make_bars(&[11.0]))
            .prev_close(10.0)
            .build()
            .unwrap();
        let gain = ctx.net_gain_pct(11.0).unwrap();
        assert!((gain - 10.0).abs() < 1e-9);

        let no_prev = IndicatorContext::builder("600519", make_bars(&[11.0]))
            .build()
            .unwrap();
        assert_eq!(no_prev.net_gain_pct(11.0), None);
    }

    #[test]
    fn limit_state_uses_board_from_instrument_id() {
        let ctx = IndicatorContext::builder("300750", make_bars(&[11.5]))
            .prev_close(10.0)
            .build()
            .unwrap();
        assert_eq!(ctx.board(), Board::Growth);
        assert_eq!(ctx.limit_state(0), LimitState::Free);

        let main = IndicatorContext::builder("600519", make_bars(&[11.5]))
            .prev_close(10.0)
            .build()
            .unwrap();
        assert_eq!(main.limit_state(0), LimitState::LimitUp);
    }

    #[test]
    fn truncated_keeps_prefix() {
        let ctx = IndicatorContext::builder("600519", make_bars(&[1.0, 2.0, 3.0]))
            .series(Series::MaShort, vec![1.0, 1.5, 2.0])
            .support(1.5)
            .build()
            .unwrap();
        let head = ctx.truncated(2);
        assert_eq!(head.len(), 2);
        assert_eq!(head.latest_index(), Some(1));
        assert_eq!(head.value(Series::MaShort, 1), Some(1.5));
        assert_eq!(head.value(Series::MaShort, 2), None);
        assert_eq!(head.support(), Some(1.5));
        assert_eq!(ctx.truncated(10).len(), 3);
    }

    #[test]
    fn series_names_round_trip() {
        for s in Series::ALL {
            assert_eq!(Series::from_name(s.name()), Some(s));
        }
        assert_eq!(Series::from_name("volume"), None);
    }
}
