//! Band-breakout regime classifier.
//!
//! Looks at the session in aggregated windows, newest first, and reports the
//! most recent window whose body broke out of the bands. The band value for
//! a window is the one at its last bar. Windows without band data or with a
//! zero open/close are skipped.
//!
//! The manager uses the result to tag events that trade against the latest
//! breakout as fake: a Buy after a breakdown, a Sell after a breakthrough.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::context::{aggregate, IndicatorContext, Series};
use crate::domain::{Category, SignalEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    None,
    Breakthrough,
    Breakdown,
}

impl Regime {
    /// Whether an event of `category` trades against this regime.
    pub fn opposes(self, category: Category) -> bool {
        matches!(
            (self, category),
            (Regime::Breakdown, Category::Buy) | (Regime::Breakthrough, Category::Sell)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Regime::None => "none",
            Regime::Breakthrough => "breakthrough",
            Regime::Breakdown => "breakdown",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegimeClassifier {
    window_bars: usize,
}

impl Default for RegimeClassifier {
    fn default() -> Self {
        Self { window_bars: 5 }
    }
}

impl RegimeClassifier {
    pub fn new(window_bars: usize) -> Self {
        Self {
            window_bars: window_bars.max(1),
        }
    }

    pub fn window_bars(&self) -> usize {
        self.window_bars
    }

    pub fn classify(&self, ctx: &IndicatorContext) -> Regime {
        if !ctx.has_series(Series::BandUpper) || !ctx.has_series(Series::BandLower) {
            return Regime::None;
        }
        for window in aggregate(ctx.bars(), self.window_bars).iter().rev() {
            let (Some(upper), Some(lower)) = (
                ctx.value(Series::BandUpper, window.last_index),
                ctx.value(Series::BandLower, window.last_index),
            ) else {
                continue;
            };
            if window.open == 0.0 || window.close == 0.0 {
                continue;
            }
            if window.body_high() > upper || window.open > upper {
                return Regime::Breakthrough;
            }
            if window.body_low() < lower || window.open < lower {
                return Regime::Breakdown;
            }
        }
        Regime::None
    }

    /// Mark `event` fake when it opposes `regime`. Returns whether it did.
    pub fn tag(regime: Regime, event: &mut SignalEvent) -> bool {
        if !regime.opposes(event.category) {
            return false;
        }
        event.mark_fake(format!("latest band breakout is {regime}"));
        true
    }
}
