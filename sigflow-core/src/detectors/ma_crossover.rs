//! Moving-average crossover buy detector.
//!
//! Fires on the bar where the short MA crosses above the mid MA. The cross
//! must hold (short strictly above mid) for every bar of the delay window.
//! A hit while the fast oscillator is already overheated is marked fake.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{base_event, check_delay, check_level, validation_window, Detector};
use crate::context::{IndicatorContext, Input, Series};
use crate::domain::{Category, SignalEvent};
use crate::error::{ConfigError, DetectorError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaCrossoverConfig {
    /// Fast oscillator at or above this level marks the hit as fake.
    pub overheat_level: f64,
    pub delay_minutes: f64,
}

impl Default for MaCrossoverConfig {
    fn default() -> Self {
        Self {
            overheat_level: 80.0,
            delay_minutes: 10.0,
        }
    }
}

const INPUTS: &[Input] = &[
    Input::Series(Series::MaShort),
    Input::Series(Series::MaMid),
    Input::Series(Series::MaBase),
    Input::Series(Series::FastOscillator),
    Input::PrevClose,
];

#[derive(Debug, Clone)]
pub struct MaCrossoverBuy {
    name: String,
    config: MaCrossoverConfig,
}

impl MaCrossoverBuy {
    pub fn new(name: impl Into<String>, config: MaCrossoverConfig) -> Result<Self, ConfigError> {
        let name = name.into();
        check_level(&name, "overheat_level", config.overheat_level)?;
        check_delay(&name, config.delay_minutes)?;
        Ok(Self { name, config })
    }

    pub fn default_params() -> Result<Self, ConfigError> {
        Self::new("ma_crossover_buy", MaCrossoverConfig::default())
    }

    fn pair(ctx: &IndicatorContext, index: usize) -> Option<(f64, f64)> {
        Some((
            ctx.value(Series::MaShort, index)?,
            ctx.value(Series::MaMid, index)?,
        ))
    }
}

impl Detector for MaCrossoverBuy {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> Category {
        Category::Buy
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
        if index == 0 {
            return Ok(false);
        }
        let (Some((prev_short, prev_mid)), Some((short, mid))) =
            (Self::pair(ctx, index - 1), Self::pair(ctx, index))
        else {
            trace!(detector = %self.name, index, "moving averages missing");
            return Ok(false);
        };
        let crossed = prev_short <= prev_mid && short > mid;
        if crossed {
            debug!(detector = %self.name, index, short, mid, "condition hit");
        }
        Ok(crossed)
    }

    fn validate_signal(
        &self,
        ctx: &IndicatorContext,
        signal_index: usize,
        current_index: usize,
    ) -> Result<bool, DetectorError> {
        for i in validation_window(signal_index, current_index) {
            match Self::pair(ctx, i) {
                Some((short, mid)) if short > mid => {}
                _ => {
                    debug!(detector = %self.name, signal_index, failed_at = i, "cross did not hold");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn check_fake_signal(&self, ctx: &IndicatorContext, index: usize) -> Option<String> {
        let fast = ctx.value(Series::FastOscillator, index)?;
        (fast >= self.config.overheat_level).then(|| {
            format!(
                "fast oscillator {fast:.1} >= {:.0}, overheated",
                self.config.overheat_level
            )
        })
    }

    fn build_event(
        &self,
        ctx: &IndicatorContext,
        index: usize,
    ) -> Result<SignalEvent, DetectorError> {
        let mut event = base_event(self, ctx, index, true)?;
        for (key, series) in [
            ("ma_short", Series::MaShort),
            ("ma_mid", Series::MaMid),
            ("ma_base", Series::MaBase),
            ("fast", Series::FastOscillator),
        ] {
            if let Some(v) = ctx.value(series, index) {
                event.set_aux(key, v);
            }
        }
        Ok(event)
    }
}
