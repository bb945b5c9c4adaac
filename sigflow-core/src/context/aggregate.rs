//! Fixed-width bar aggregation.
//!
//! Windows are aligned on the session bar index: with `window = 5`, bars
//! 0..=4 form the first window, 5..=9 the second, and so on. The last window
//! may be partial while the session is still running. Void bars are skipped;
//! a window made only of void bars does not exist.

use crate::domain::Bar;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatedBar {
    /// Index of the first bar in the window.
    pub first_index: usize,
    /// Index of the last non-void bar in the window.
    pub last_index: usize,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl AggregatedBar {
    pub fn body_high(&self) -> f64 {
        self.open.max(self.close)
    }

    pub fn body_low(&self) -> f64 {
        self.open.min(self.close)
    }
}

fn fold(chunk: &[Bar]) -> Option<AggregatedBar> {
    let mut bars = chunk.iter().filter(|b| !b.is_void());
    let first = bars.next()?;
    let mut agg = AggregatedBar {
        first_index: first.index,
        last_index: first.index,
        open: first.open,
        high: first.high,
        low: first.low,
        close: first.close,
        volume: first.volume,
    };
    for bar in bars {
        agg.last_index = bar.index;
        agg.high = agg.high.max(bar.high);
        agg.low = agg.low.min(bar.low);
        agg.close = bar.close;
        agg.volume += bar.volume;
    }
    Some(agg)
}

/// Aggregate a whole session into consecutive windows of `window` bars.
pub fn aggregate(bars: &[Bar], window: usize) -> Vec<AggregatedBar> {
    if window == 0 {
        return Vec::new();
    }
    bars.chunks(window).filter_map(fold).collect()
}

/// The window containing `index`.
///
/// An index past the end of the session falls back to the most recent
/// window. Returns `None` for an empty session, a zero window, or a window
/// with no usable bars.
pub fn window_at(bars: &[Bar], index: usize, window: usize) -> Option<AggregatedBar> {
    if window == 0 || bars.is_empty() {
        return None;
    }
    let index = index.min(bars.len() - 1);
    let start = index / window * window;
    let end = (start + window).min(bars.len());
    fold(&bars[start..end])
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
                open: c - 0.5,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume: 100.0,
            })
            .collect()
    }

    #[test]
    fn aggregate_builds_ohlcv_per_window() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 11.5, 13.0, 9.0, 8.0]);
        let aggs = aggregate(&bars, 5);
        assert_eq!(aggs.len(), 2);

        let first = aggs[0];
        assert_eq!(first.first_index, 0);
        assert_eq!(first.last_index, 4);
        assert_eq!(first.open, 9.5);
        assert_eq!(first.close, 13.0);
        assert_eq!(first.high, 14.0);
        assert_eq!(first.low, 9.0);
        assert_eq!(first.volume, 500.0);

        let partial = aggs[1];
        assert_eq!(partial.first_index, 5);
        assert_eq!(partial.last_index, 6);
        assert_eq!(partial.close, 8.0);
    }

    #[test]
    fn window_at_uses_index_alignment() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 11.5, 13.0, 9.0, 8.0]);
        assert_eq!(window_at(&bars, 3, 5).unwrap().close, 13.0);
        assert_eq!(window_at(&bars, 5, 5).unwrap().close, 8.0);
    }

    #[test]
    fn window_at_falls_back_to_latest_window() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 11.5, 13.0, 9.0, 8.0]);
        assert_eq!(window_at(&bars, 100, 5).unwrap().close, 8.0);
    }

    #[test]
    fn void_bars_are_skipped() {
        let mut bars = make_bars(&[10.0, 11.0, 12.0]);
        bars[2].close = f64::NAN;
        let agg = window_at(&bars, 2, 5).unwrap();
        assert_eq!(agg.close, 11.0);
        assert_eq!(agg.last_index, 1);
    }

    #[test]
    fn all_void_window_is_none() {
        let mut bars = make_bars(&[10.0, 11.0]);
        for bar in &mut bars {
            bar.open = f64::NAN;
        }
        assert!(window_at(&bars, 0, 5).is_none());
        assert!(aggregate(&bars, 5).is_empty());
    }

    #[test]
    fn zero_window_or_empty_session() {
        let bars = make_bars(&[10.0]);
        assert!(window_at(&bars, 0, 0).is_none());
        assert!(window_at(&[], 0, 5).is_none());
        assert!(aggregate(&bars, 0).is_empty());
    }
}
