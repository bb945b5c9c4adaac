//! Dual-oscillator threshold detector.
//!
//! Compares a fast (1-bar) and a slow (aggregated) oscillator:
//! - **Sell**: slow >= threshold, slow + fast >= sum threshold, and the fast
//!   reading has not dropped more than `max_divergence` below the slow one.
//! - **Buy**: slow < threshold, slow + fast < sum threshold, and the fast
//!   reading is at most `max_divergence` above the slow one.
//!
//! Stateless. A hit is discarded if the threshold and sum part of the
//! condition fires again inside the delay window. The fake check compares the
//! close against a safety line pulled `safety_line_ratio` of the way from the
//! outer band toward the middle band.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{base_event, check_delay, check_level, validation_window, Detector};
use crate::context::{IndicatorContext, Input, Series};
use crate::domain::{Category, SignalEvent};
use crate::error::{ConfigError, DetectorError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DualOscillatorConfig {
    pub slow_threshold: f64,
    pub sum_threshold: f64,
    pub max_divergence: f64,
    pub safety_line_ratio: f64,
    pub delay_minutes: f64,
}

impl DualOscillatorConfig {
    pub fn buy_defaults() -> Self {
        Self {
            slow_threshold: 30.0,
            sum_threshold: 45.0,
            max_divergence: 5.0,
            safety_line_ratio: 0.1,
            delay_minutes: 0.5,
        }
    }

    pub fn sell_defaults() -> Self {
        Self {
            slow_threshold: 75.0,
            sum_threshold: 155.0,
            max_divergence: 5.0,
            safety_line_ratio: 0.1,
            delay_minutes: 0.5,
        }
    }
}

const BUY_INPUTS: &[Input] = &[
    Input::Series(Series::FastOscillator),
    Input::Series(Series::SlowOscillator),
    Input::Series(Series::BandLower),
    Input::Series(Series::BandMiddle),
    Input::PrevClose,
];

const SELL_INPUTS: &[Input] = &[
    Input::Series(Series::FastOscillator),
    Input::Series(Series::SlowOscillator),
    Input::Series(Series::BandUpper),
    Input::Series(Series::BandMiddle),
    Input::PrevClose,
];

#[derive(Debug, Clone)]
pub struct DualOscillator {
    name: String,
    category: Category,
    config: DualOscillatorConfig,
}

impl DualOscillator {
    pub fn new(
        name: impl Into<String>,
        category: Category,
        config: DualOscillatorConfig,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        check_level(&name, "slow_threshold", config.slow_threshold)?;
        if !(0.0..=200.0).contains(&config.sum_threshold) {
            return Err(ConfigError::invalid(
                &name,
                "sum_threshold",
                format!("must be within [0, 200], got {}", config.sum_threshold),
            ));
        }
        if config.slow_threshold >= config.sum_threshold {
            return Err(ConfigError::invalid(
                &name,
                "slow_threshold",
                format!(
                    "must be below sum_threshold ({} >= {})",
                    config.slow_threshold, config.sum_threshold
                ),
            ));
        }
        if !config.max_divergence.is_finite() || config.max_divergence < 0.0 {
            return Err(ConfigError::invalid(
                &name,
                "max_divergence",
                format!("must be a finite value >= 0, got {}", config.max_divergence),
            ));
        }
        if !(0.0..1.0).contains(&config.safety_line_ratio) {
            return Err(ConfigError::invalid(
                &name,
                "safety_line_ratio",
                format!("must be within [0, 1), got {}", config.safety_line_ratio),
            ));
        }
        check_delay(&name, config.delay_minutes)?;
        Ok(Self {
            name,
            category,
            config,
        })
    }

    pub fn buy(config: DualOscillatorConfig) -> Result<Self, ConfigError> {
        Self::new("dual_oscillator_buy", Category::Buy, config)
    }

    pub fn sell(config: DualOscillatorConfig) -> Result<Self, ConfigError> {
        Self::new("dual_oscillator_sell", Category::Sell, config)
    }

    pub fn config(&self) -> &DualOscillatorConfig {
        &self.config
    }

    fn readings(ctx: &IndicatorContext, index: usize) -> Option<(f64, f64)> {
        let fast = ctx.value(Series::FastOscillator, index)?;
        let slow = ctx.value(Series::SlowOscillator, index)?;
        Some((fast, slow))
    }

    /// Threshold and sum part of the condition.
    fn in_zone(&self, fast: f64, slow: f64) -> bool {
        let c = &self.config;
        match self.category {
            Category::Sell => slow >= c.slow_threshold && slow + fast >= c.sum_threshold,
            Category::Buy => slow < c.slow_threshold && slow + fast < c.sum_threshold,
        }
    }

    fn divergence_ok(&self, fast: f64, slow: f64) -> bool {
        let diff = fast - slow;
        match self.category {
            Category::Sell => diff >= -self.config.max_divergence,
            Category::Buy => diff <= self.config.max_divergence,
        }
    }

    fn safety_line(&self, ctx: &IndicatorContext, index: usize) -> Option<f64> {
        let middle = ctx.value(Series::BandMiddle, index)?;
        let ratio = self.config.safety_line_ratio;
        match self.category {
            Category::Buy => {
                let lower = ctx.value(Series::BandLower, index)?;
                Some(lower + (middle - lower) * ratio)
            }
            Category::Sell => {
                let upper = ctx.value(Series::BandUpper, index)?;
                Some(upper - (upper - middle) * ratio)
            }
        }
    }
}

impl Detector for DualOscillator {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> Category {
        self.category
    }

    fn delay_minutes(&self) -> f64 {
        self.config.delay_minutes
    }

    fn inputs(&self) -> &'static [Input] {
        match self.category {
            Category::Buy => BUY_INPUTS,
            Category::Sell => SELL_INPUTS,
        }
    }

    fn check_condition(
        &mut self,
        ctx: &IndicatorContext,
        index: usize,
    ) -> Result<bool, DetectorError> {
        let Some((fast, slow)) = Self::readings(ctx, index) else {
            trace!(detector = %self.name, index, "oscillator data missing");
            return Ok(false);
        };
        let hit = self.in_zone(fast, slow) && self.divergence_ok(fast, slow);
        if hit {
            debug!(detector = %self.name, index, fast, slow, "condition hit");
        }
        Ok(hit)
    }

    fn validate_signal(
        &self,
        ctx: &IndicatorContext,
        signal_index: usize,
        current_index: usize,
    ) -> Result<bool, DetectorError> {
        for i in validation_window(signal_index, current_index) {
            if let Some((fast, slow)) = Self::readings(ctx, i) {
                if self.in_zone(fast, slow) {
                    debug!(detector = %self.name, signal_index, refired_at = i, "condition re-fired in delay window");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn check_fake_signal(&self, ctx: &IndicatorContext, index: usize) -> Option<String> {
        let close = ctx.close(index)?;
        let line = self.safety_line(ctx, index)?;
        match self.category {
            Category::Buy if close < line => Some(format!(
                "close {close:.2} below lower safety line {line:.2}"
            )),
            Category::Sell if close > line => Some(format!(
                "close {close:.2} above upper safety line {line:.2}"
            )),
            _ => None,
        }
    }

    fn build_event(
        &self,
        ctx: &IndicatorContext,
        index: usize,
    ) -> Result<SignalEvent, DetectorError> {
        let mut event = base_event(self, ctx, index, true)?;
        if let Some((fast, slow)) = Self::readings(ctx, index) {
            event.set_aux("fast", fast);
            event.set_aux("slow", slow);
        }
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::test_support::{bars_from_closes, context_with};

    fn ctx(fast: Vec<f64>, slow: Vec<f64>) -> IndicatorContext {
        let closes = vec![10.0; fast.len()];
        context_with(
            bars_from_closes(&closes),
            &[(Series::FastOscillator, fast), (Series::SlowOscillator, slow)],
        )
    }

    #[test]
    fn sell_fires_in_overbought_zone() {
        let mut det = DualOscillator::sell(DualOscillatorConfig::sell_defaults()).unwrap();
        let c = ctx(vec![80.0, 70.0, 70.0], vec![78.0, 80.0, 90.0]);
        assert!(det.check_condition(&c, 0).unwrap());
        // Sum 150 < 155
        assert!(!det.check_condition(&c, 1).unwrap());
        // Fast 20 below slow: divergence too large
        assert!(!det.check_condition(&c, 2).unwrap());
    }

    #[test]
    fn buy_fires_in_oversold_zone() {
        let mut det = DualOscillator::buy(DualOscillatorConfig::buy_defaults()).unwrap();
        let c = ctx(vec![15.0, 20.0, 18.0], vec![20.0, 28.0, 5.0]);
        assert!(det.check_condition(&c, 0).unwrap());
        // Sum 48 >= 45
        assert!(!det.check_condition(&c, 1).unwrap());
        // Fast 13 above slow
        assert!(!det.check_condition(&c, 2).unwrap());
    }

    #[test]
    fn buy_threshold_is_strict() {
        let mut det = DualOscillator::buy(DualOscillatorConfig::buy_defaults()).unwrap();
        let c = ctx(vec![10.0], vec![30.0]);
        assert!(!det.check_condition(&c, 0).unwrap());
    }

    #[test]
    fn missing_or_nan_data_is_false() {
        let mut det = DualOscillator::sell(DualOscillatorConfig::sell_defaults()).unwrap();
        let c = ctx(vec![f64::NAN], vec![90.0]);
        assert!(!det.check_condition(&c, 0).unwrap());
        assert!(!det.check_condition(&c, 5).unwrap());

        let bare = context_with(bars_from_closes(&[10.0]), &[]);
        assert!(!det.check_condition(&bare, 0).unwrap());
    }

    #[test]
    fn validation_fails_when_zone_refires() {
        let det = DualOscillator::sell(DualOscillatorConfig::sell_defaults()).unwrap();
        // Bar 1 is back in the zone even though the divergence part fails there
        let c = ctx(vec![80.0, 60.0, 50.0], vec![78.0, 95.0, 60.0]);
        assert!(!det.validate_signal(&c, 0, 1).unwrap());
    }

    #[test]
    fn validation_passes_when_zone_is_left() {
        let det = DualOscillator::sell(DualOscillatorConfig::sell_defaults()).unwrap();
        let c = ctx(vec![80.0, 60.0, 50.0], vec![78.0, 70.0, 60.0]);
        assert!(det.validate_signal(&c, 0, 1).unwrap());
        assert!(det.validate_signal(&c, 0, 2).unwrap());
        // Empty window
        assert!(det.validate_signal(&c, 0, 0).unwrap());
    }

    #[test]
    fn buy_below_lower_safety_line_is_fake() {
        let det = DualOscillator::buy(DualOscillatorConfig::buy_defaults()).unwrap();
        let c = context_with(
            bars_from_closes(&[9.0, 9.5]),
            &[
                (Series::BandLower, vec![9.2, 9.2]),
                (Series::BandMiddle, vec![10.2, 10.2]),
            ],
        );
        // Safety line 9.3
        let reason = det.check_fake_signal(&c, 0).unwrap();
        assert!(reason.contains("below lower safety line"));
        assert!(det.check_fake_signal(&c, 1).is_none());
    }

    #[test]
    fn sell_above_upper_safety_line_is_fake() {
        let det = DualOscillator::sell(DualOscillatorConfig::sell_defaults()).unwrap();
        let c = context_with(
            bars_from_closes(&[11.0, 10.5]),
            &[
                (Series::BandUpper, vec![10.8, 10.8]),
                (Series::BandMiddle, vec![9.8, 9.8]),
            ],
        );
        // Safety line 10.7
        assert!(det.check_fake_signal(&c, 0).is_some());
        assert!(det.check_fake_signal(&c, 1).is_none());
    }

    #[test]
    fn fake_check_without_bands_is_none() {
        let det = DualOscillator::buy(DualOscillatorConfig::buy_defaults()).unwrap();
        let c = context_with(bars_from_closes(&[1.0]), &[]);
        assert!(det.check_fake_signal(&c, 0).is_none());
    }

    #[test]
    fn event_carries_readings() {
        let det = DualOscillator::buy(DualOscillatorConfig::buy_defaults()).unwrap();
        let c = ctx(vec![15.0], vec![20.0]);
        let event = det.build_event(&c, 0).unwrap();
        assert_eq!(event.category, Category::Buy);
        assert_eq!(event.detector, "dual_oscillator_buy");
        assert_eq!(event.aux("fast"), Some(15.0));
        assert_eq!(event.aux("slow"), Some(20.0));
        assert!(event.wait_validate);
        assert!(!event.is_fake);
    }

    #[test]
    fn build_event_out_of_range_is_internal_error() {
        let det = DualOscillator::buy(DualOscillatorConfig::buy_defaults()).unwrap();
        let c = ctx(vec![15.0], vec![20.0]);
        assert!(matches!(
            det.build_event(&c, 3),
            Err(DetectorError::Internal(_))
        ));
    }

    #[test]
    fn config_validation() {
        let mut bad = DualOscillatorConfig::buy_defaults();
        bad.slow_threshold = 50.0;
        assert!(DualOscillator::buy(bad).is_err());

        let mut bad = DualOscillatorConfig::sell_defaults();
        bad.safety_line_ratio = 1.0;
        assert!(DualOscillator::sell(bad).is_err());

        let mut bad = DualOscillatorConfig::sell_defaults();
        bad.delay_minutes = -0.5;
        assert!(DualOscillator::sell(bad).is_err());

        let mut bad = DualOscillatorConfig::sell_defaults();
        bad.slow_threshold = 120.0;
        assert!(DualOscillator::sell(bad).is_err());
    }
}
