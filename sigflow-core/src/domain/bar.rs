//! Bar: one interval of intraday market data.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// OHLCV bar for a single instrument within one trading session.
///
/// `index` is session-relative: the first bar of the day is 0 and indices
/// increase by one per bar with no gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub index: usize,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Direction of a single bar's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarDirection {
    Bullish,
    Bearish,
    Flat,
}

impl Bar {
    /// Returns true if any OHLC field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }

    /// Strict: a doji (close == open) is neither bullish nor bearish.
    pub fn direction(&self) -> BarDirection {
        if self.close > self.open {
            BarDirection::Bullish
        } else if self.close < self.open {
            BarDirection::Bearish
        } else {
            BarDirection::Flat
        }
    }

    pub fn is_bullish(&self) -> bool {
        self.direction() == BarDirection::Bullish
    }

    pub fn is_bearish(&self) -> bool {
        self.direction() == BarDirection::Bearish
    }

    /// Calendar date of the session this bar belongs to.
    pub fn session_date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar(open: f64, close: f64) -> Bar {
        Bar {
            index: 0,
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 4)
                .unwrap()
                .and_hms_opt(9, 31, 0)
                .unwrap(),
            open,
            high: open.max(close) + 0.1,
            low: open.min(close) - 0.1,
            close,
            volume: 1_000.0,
        }
    }

    #[test]
    fn bar_is_sane() {
        assert!(sample_bar(10.0, 10.2).is_sane());
    }

    #[test]
    fn bar_with_nan_is_void() {
        let mut bar = sample_bar(10.0, 10.2);
        bar.close = f64::NAN;
        assert!(bar.is_void());
        assert!(!bar.is_sane());
    }

    #[test]
    fn bar_high_below_low_is_insane() {
        let mut bar = sample_bar(10.0, 10.2);
        bar.high = 9.0;
        assert!(!bar.is_sane());
    }

    #[test]
    fn direction_is_strict() {
        assert!(sample_bar(10.0, 10.2).is_bullish());
        assert!(sample_bar(10.2, 10.0).is_bearish());
        let doji = sample_bar(10.0, 10.0);
        assert_eq!(doji.direction(), BarDirection::Flat);
        assert!(!doji.is_bullish());
        assert!(!doji.is_bearish());
    }

    #[test]
    fn nan_bar_has_no_direction() {
        let mut bar = sample_bar(10.0, 10.2);
        bar.close = f64::NAN;
        assert_eq!(bar.direction(), BarDirection::Flat);
    }

    #[test]
    fn session_date_from_timestamp() {
        let bar = sample_bar(10.0, 10.2);
        assert_eq!(bar.session_date(), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
    }
}
