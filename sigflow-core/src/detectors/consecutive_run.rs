//! Consecutive-run detector.
//!
//! Fires once per run of `run_length` or more consecutive bullish (surge,
//! Buy) or bearish (plunge, Sell) bars, provided the trend reference and the
//! slow oscillator both moved the same way over `trend_lookback` bars.
//!
//! State:
//! - `in_run`: the current run already fired. Cleared by the first bar that
//!   breaks the run.
//! - `awaiting_opposite`: the last fired event is still displayed and no
//!   opposite-category signal has appeared since. Blocks firing until
//!   `notify_opposite_appeared`.
//! - `last_fired`: index of the last hit.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{base_event, check_delay, check_level, check_non_zero, Detector};
use crate::context::{IndicatorContext, Input, Series};
use crate::domain::{Bar, Category, SignalEvent};
use crate::error::{ConfigError, DetectorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunDirection {
    /// Bullish bars, Buy category.
    Surge,
    /// Bearish bars, Sell category.
    Plunge,
}

impl RunDirection {
    pub fn category(self) -> Category {
        match self {
            RunDirection::Surge => Category::Buy,
            RunDirection::Plunge => Category::Sell,
        }
    }

    fn matches(self, bar: &Bar) -> bool {
        match self {
            RunDirection::Surge => bar.is_bullish(),
            RunDirection::Plunge => bar.is_bearish(),
        }
    }

    /// `earlier` -> `current` moved in this direction, strictly.
    fn trending(self, earlier: f64, current: f64) -> bool {
        match self {
            RunDirection::Surge => earlier < current,
            RunDirection::Plunge => earlier > current,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsecutiveRunConfig {
    pub run_length: usize,
    pub trend_lookback: usize,
    /// Surge: the trend reference must be above this floor.
    /// Plunge: the trend reference must be below this ceiling.
    pub reference_limit: f64,
    pub delay_minutes: f64,
}

impl ConsecutiveRunConfig {
    pub fn surge_defaults() -> Self {
        Self {
            run_length: 5,
            trend_lookback: 9,
            reference_limit: 35.0,
            delay_minutes: 0.0,
        }
    }

    pub fn plunge_defaults() -> Self {
        Self {
            run_length: 5,
            trend_lookback: 9,
            reference_limit: 65.0,
            delay_minutes: 0.0,
        }
    }
}

const INPUTS: &[Input] = &[
    Input::Series(Series::TrendReference),
    Input::Series(Series::SlowOscillator),
    Input::PrevClose,
];

#[derive(Debug, Clone)]
pub struct ConsecutiveRun {
    name: String,
    direction: RunDirection,
    config: ConsecutiveRunConfig,
    in_run: bool,
    awaiting_opposite: bool,
    last_fired: Option<usize>,
}

impl ConsecutiveRun {
    pub fn new(
        name: impl Into<String>,
        direction: RunDirection,
        config: ConsecutiveRunConfig,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        check_non_zero(&name, "run_length", config.run_length)?;
        check_non_zero(&name, "trend_lookback", config.trend_lookback)?;
        check_level(&name, "reference_limit", config.reference_limit)?;
        check_delay(&name, config.delay_minutes)?;
        Ok(Self {
            name,
            direction,
            config,
            in_run: false,
            awaiting_opposite: false,
            last_fired: None,
        })
    }

    pub fn surge(config: ConsecutiveRunConfig) -> Result<Self, ConfigError> {
        Self::new("consecutive_surge", RunDirection::Surge, config)
    }

    pub fn plunge(config: ConsecutiveRunConfig) -> Result<Self, ConfigError> {
        Self::new("consecutive_plunge", RunDirection::Plunge, config)
    }

    pub fn in_run(&self) -> bool {
        self.in_run
    }

    pub fn awaiting_opposite(&self) -> bool {
        self.awaiting_opposite
    }

    pub fn last_fired(&self) -> Option<usize> {
        self.last_fired
    }

    /// Length of the matching run ending at `index`.
    fn run_length_at(&self, ctx: &IndicatorContext, index: usize) -> usize {
        ctx.bars()[..=index]
            .iter()
            .rev()
            .take_while(|b| self.direction.matches(b))
            .count()
    }

    fn trend_confirmed(&self, ctx: &IndicatorContext, index: usize) -> bool {
        let lookback = self.config.trend_lookback;
        if index < lookback {
            return false;
        }
        let earlier = index - lookback;
        let (Some(ref_then), Some(ref_now)) = (
            ctx.value(Series::TrendReference, earlier),
            ctx.value(Series::TrendReference, index),
        ) else {
            trace!(detector = %self.name, index, "trend reference missing");
            return false;
        };
        let (Some(slow_then), Some(slow_now)) = (
            ctx.value(Series::SlowOscillator, earlier),
            ctx.value(Series::SlowOscillator, index),
        ) else {
            trace!(detector = %self.name, index, "slow oscillator missing");
            return false;
        };

        let within_limit = match self.direction {
            RunDirection::Surge => ref_now > self.config.reference_limit,
            RunDirection::Plunge => ref_now < self.config.reference_limit,
        };
        within_limit
            && self.direction.trending(ref_then, ref_now)
            && self.direction.trending(slow_then, slow_now)
    }
}

impl Detector for ConsecutiveRun {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> Category {
        self.direction.category()
    }

    fn delay_minutes(&self) -> f64 {
        self.config.delay_minutes
    }

    fn inputs(&self) -> &'static [Input] {
        INPUTS
    }

    fn check_condition(
        &mut self,
        ctx: &IndicatorContext,
        index: usize,
    ) -> Result<bool, DetectorError> {
        let Some(bar) = ctx.bar(index) else {
            return Ok(false);
        };
        if !self.direction.matches(bar) {
            if self.in_run {
                trace!(detector = %self.name, index, "run broken");
            }
            self.in_run = false;
            return Ok(false);
        }
        if self.in_run {
            return Ok(false);
        }

        let run = self.run_length_at(ctx, index);
        if run < self.config.run_length {
            return Ok(false);
        }
        if !self.trend_confirmed(ctx, index) {
            return Ok(false);
        }
        if self.awaiting_opposite {
            debug!(detector = %self.name, index, "run qualifies but previous signal still awaits the opposite side");
            return Ok(false);
        }

        self.in_run = true;
        self.awaiting_opposite = true;
        self.last_fired = Some(index);
        debug!(detector = %self.name, index, run, "condition hit");
        Ok(true)
    }

    fn validate_signal(
        &self,
        _ctx: &IndicatorContext,
        _signal_index: usize,
        _current_index: usize,
    ) -> Result<bool, DetectorError> {
        Ok(true)
    }

    fn build_event(
        &self,
        ctx: &IndicatorContext,
        index: usize,
    ) -> Result<SignalEvent, DetectorError> {
        let mut event = base_event(self, ctx, index, false)?;
        event.set_aux("run_length", self.run_length_at(ctx, index) as f64);
        if let Some(reference) = ctx.value(Series::TrendReference, index) {
            event.set_aux("trend_ref", reference);
        }
        if let Some(slow) = ctx.value(Series::SlowOscillator, index) {
            event.set_aux("slow", slow);
        }
        Ok(event)
    }

    fn reset(&mut self) {
        self.in_run = false;
        self.awaiting_opposite = false;
        self.last_fired = None;
    }

    fn notify_opposite_appeared(&mut self) {
        if self.awaiting_opposite {
            debug!(detector = %self.name, "opposite signal appeared, re-armed");
        }
        self.awaiting_opposite = false;
    }
}
