//! Level-crossing detector with hysteresis.
//!
//! Watches the close of the aggregated window containing the bar against a
//! fixed session level:
//! - **Support breakdown** (Sell): aggregated close < support.
//! - **Resistance breakthrough** (Buy): aggregated close > resistance.
//!
//! After firing, the detector stays quiet while price remains beyond the
//! level. A window back on the original side arms it again, and the next
//! crossing fires.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{
    base_event, check_delay, check_non_zero, check_positive, validation_window, Detector,
};
use crate::context::{IndicatorContext, Input};
use crate::domain::{Category, SignalEvent};
use crate::error::{ConfigError, DetectorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelKind {
    Support,
    Resistance,
}

impl LevelKind {
    pub fn category(self) -> Category {
        match self {
            LevelKind::Support => Category::Sell,
            LevelKind::Resistance => Category::Buy,
        }
    }

    fn field(self) -> &'static str {
        match self {
            LevelKind::Support => "support",
            LevelKind::Resistance => "resistance",
        }
    }

    /// Price is beyond the level in the trigger direction.
    fn crossed(self, price: f64, level: f64) -> bool {
        match self {
            LevelKind::Support => price < level,
            LevelKind::Resistance => price > level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelCrossingConfig {
    /// Bars per aggregated window.
    pub window_bars: usize,
    /// A move from the previous close at least this large (percent) in the
    /// trigger direction marks the event as fake.
    pub fake_move_pct: f64,
    pub delay_minutes: f64,
}

impl LevelCrossingConfig {
    pub fn support_defaults() -> Self {
        Self {
            window_bars: 5,
            fake_move_pct: 5.0,
            delay_minutes: 1.0,
        }
    }

    pub fn resistance_defaults() -> Self {
        Self {
            window_bars: 5,
            fake_move_pct: 5.0,
            delay_minutes: 2.0,
        }
    }
}

const SUPPORT_INPUTS: &[Input] = &[Input::Support, Input::PrevClose];
const RESISTANCE_INPUTS: &[Input] = &[Input::Resistance, Input::PrevClose];

#[derive(Debug, Clone)]
pub struct LevelCrossing {
    name: String,
    kind: LevelKind,
    config: LevelCrossingConfig,
    confirmed: bool,
    reset_triggered: bool,
}

impl LevelCrossing {
    pub fn new(
        name: impl Into<String>,
        kind: LevelKind,
        config: LevelCrossingConfig,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        check_non_zero(&name, "window_bars", config.window_bars)?;
        check_positive(&name, "fake_move_pct", config.fake_move_pct)?;
        check_delay(&name, config.delay_minutes)?;
        Ok(Self {
            name,
            kind,
            config,
            confirmed: false,
            reset_triggered: false,
        })
    }

    pub fn support_breakdown(config: LevelCrossingConfig) -> Result<Self, ConfigError> {
        Self::new("support_breakdown", LevelKind::Support, config)
    }

    pub fn resistance_breakthrough(config: LevelCrossingConfig) -> Result<Self, ConfigError> {
        Self::new("resistance_breakthrough", LevelKind::Resistance, config)
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    /// The session level. A supplied but unusable level is a fault.
    fn level(&self, ctx: &IndicatorContext, index: usize) -> Result<Option<f64>, DetectorError> {
        let level = match self.kind {
            LevelKind::Support => ctx.support(),
            LevelKind::Resistance => ctx.resistance(),
        };
        match level {
            Some(v) if !v.is_finite() || v <= 0.0 => Err(DetectorError::InvalidValue {
                field: self.kind.field(),
                index,
                value: v,
            }),
            other => Ok(other),
        }
    }
}

impl Detector for LevelCrossing {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> Category {
        self.kind.category()
    }

    fn delay_minutes(&self) -> f64 {
        self.config.delay_minutes
    }

    fn inputs(&self) -> &'static [Input] {
        match self.kind {
            LevelKind::Support => SUPPORT_INPUTS,
            LevelKind::Resistance => RESISTANCE_INPUTS,
        }
    }

    fn check_condition(
        &mut self,
        ctx: &IndicatorContext,
        index: usize,
    ) -> Result<bool, DetectorError> {
        let Some(level) = self.level(ctx, index)? else {
            trace!(detector = %self.name, index, "no level");
            return Ok(false);
        };
        if index >= ctx.len() {
            return Ok(false);
        }
        let Some(window) = ctx.aggregated(index, self.config.window_bars) else {
            trace!(detector = %self.name, index, "no aggregated window");
            return Ok(false);
        };
        let price = window.close;

        if self.kind.crossed(price, level) {
            if self.confirmed && !self.reset_triggered {
                trace!(detector = %self.name, index, price, level, "debounced");
                return Ok(false);
            }
            self.confirmed = true;
            self.reset_triggered = false;
            debug!(detector = %self.name, index, price, level, "condition hit");
            return Ok(true);
        }

        if self.confirmed {
            debug!(detector = %self.name, index, price, level, "back across level, re-armed");
            self.reset_triggered = true;
            self.confirmed = false;
        }
        Ok(false)
    }

    fn validate_signal(
        &self,
        ctx: &IndicatorContext,
        signal_index: usize,
        current_index: usize,
    ) -> Result<bool, DetectorError> {
        let Some(level) = self.level(ctx, signal_index)? else {
            return Ok(false);
        };
        for i in validation_window(signal_index, current_index) {
            if let Some(close) = ctx.close(i) {
                if !self.kind.crossed(close, level) {
                    debug!(detector = %self.name, signal_index, returned_at = i, close, level, "price returned across level");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn check_fake_signal(&self, ctx: &IndicatorContext, index: usize) -> Option<String> {
        let close = ctx.close(index)?;
        let change = ctx.net_gain_pct(close)?;
        let limit = self.config.fake_move_pct;
        match self.kind {
            LevelKind::Support if change <= -limit => Some(format!(
                "already down {:.2}% from previous close",
                -change
            )),
            LevelKind::Resistance if change >= limit => Some(format!(
                "already up {change:.2}% from previous close"
            )),
            _ => None,
        }
    }

    fn build_event(
        &self,
        ctx: &IndicatorContext,
        index: usize,
    ) -> Result<SignalEvent, DetectorError> {
        let mut event = base_event(self, ctx, index, false)?;
        if let Some(level) = self.level(ctx, index)? {
            event.set_aux("level", level);
            if event.price > 0.0 {
                event.set_aux("distance_to_level_pct", (event.price - level) / event.price * 100.0);
            }
        }
        if let Some(window) = ctx.aggregated(index, self.config.window_bars) {
            event.set_aux("window_close", window.close);
        }
        Ok(event)
    }

    fn reset(&mut self) {
        self.confirmed = false;
        self.reset_triggered = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::test_support::bars_from_closes;

    /// Five-bar windows, every bar of a window at the same close.
    fn windowed(closes: &[f64]) -> Vec<f64> {
        closes.iter().flat_map(|&c| std::iter::repeat(c).take(5)).collect()
    }

    fn support_ctx(closes: &[f64], support: f64) -> IndicatorContext {
        IndicatorContext::builder("600519", bars_from_closes(closes))
            .support(support)
            .prev_close(100.0)
            .build()
            .unwrap()
    }

    fn sweep(det: &mut LevelCrossing, ctx: &IndicatorContext) -> Vec<usize> {
        (0..ctx.len())
            .filter(|&i| det.check_condition(ctx, i).unwrap())
            .collect()
    }

    #[test]
    fn hysteresis_fires_once_per_crossing() {
        let mut det =
            LevelCrossing::support_breakdown(LevelCrossingConfig::support_defaults()).unwrap();
        let ctx = support_ctx(&windowed(&[101.0, 99.0, 99.0, 101.0, 98.0]), 100.0);
        assert_eq!(sweep(&mut det, &ctx), vec![5, 20]);
    }

    #[test]
    fn resistance_breakthrough_fires_above_level() {
        let mut det =
            LevelCrossing::resistance_breakthrough(LevelCrossingConfig::resistance_defaults())
                .unwrap();
        let ctx = IndicatorContext::builder(
            "600519",
            bars_from_closes(&windowed(&[99.0, 101.0, 102.0, 99.5, 100.5])),
        )
        .resistance(100.0)
        .build()
        .unwrap();
        assert_eq!(sweep(&mut det, &ctx), vec![5, 20]);
        assert_eq!(det.category(), Category::Buy);
    }

    #[test]
    fn window_close_not_single_bar_drives_condition() {
        let mut det =
            LevelCrossing::support_breakdown(LevelCrossingConfig::support_defaults()).unwrap();
        // Bar 1 dips below support but the window closes above it
        let ctx = support_ctx(&[101.0, 99.0, 101.0, 101.0, 101.0], 100.0);
        assert!(sweep(&mut det, &ctx).is_empty());
    }

    #[test]
    fn missing_level_never_fires() {
        let mut det =
            LevelCrossing::support_breakdown(LevelCrossingConfig::support_defaults()).unwrap();
        let ctx = IndicatorContext::builder("600519", bars_from_closes(&[90.0; 5]))
            .build()
            .unwrap();
        assert!(sweep(&mut det, &ctx).is_empty());
    }

    #[test]
    fn corrupt_level_is_a_fault() {
        let mut det =
            LevelCrossing::support_breakdown(LevelCrossingConfig::support_defaults()).unwrap();
        let ctx = support_ctx(&[90.0; 5], -1.0);
        assert!(matches!(
            det.check_condition(&ctx, 0),
            Err(DetectorError::InvalidValue { field: "support", .. })
        ));
    }

    #[test]
    fn validation_fails_when_price_returns() {
        let det =
            LevelCrossing::support_breakdown(LevelCrossingConfig::support_defaults()).unwrap();
        let ctx = support_ctx(&[99.0, 98.0, 100.0, 97.0], 100.0);
        assert!(det.validate_signal(&ctx, 0, 1).unwrap());
        // Close at exactly the level counts as back across
        assert!(!det.validate_signal(&ctx, 1, 2).unwrap());
    }

    #[test]
    fn large_move_from_prev_close_is_fake() {
        let det =
            LevelCrossing::support_breakdown(LevelCrossingConfig::support_defaults()).unwrap();
        let ctx = support_ctx(&[94.0, 97.0], 98.0);
        let reason = det.check_fake_signal(&ctx, 0).unwrap();
        assert!(reason.contains("6.00%"));
        assert!(det.check_fake_signal(&ctx, 1).is_none());
    }

    #[test]
    fn event_reports_distance_to_level() {
        let det =
            LevelCrossing::support_breakdown(LevelCrossingConfig::support_defaults()).unwrap();
        let ctx = support_ctx(&[98.0], 100.0);
        let event = det.build_event(&ctx, 0).unwrap();
        assert_eq!(event.aux("level"), Some(100.0));
        let distance = event.aux("distance_to_level_pct").unwrap();
        assert!((distance - (-2.0 / 98.0 * 100.0)).abs() < 1e-9);
        assert!(!event.wait_validate);
    }

    #[test]
    fn reset_clears_hysteresis() {
        let mut det =
            LevelCrossing::support_breakdown(LevelCrossingConfig::support_defaults()).unwrap();
        let ctx = support_ctx(&[99.0; 5], 100.0);
        assert!(det.check_condition(&ctx, 0).unwrap());
        assert!(!det.check_condition(&ctx, 1).unwrap());
        det.reset();
        assert!(!det.is_confirmed());
        assert!(det.check_condition(&ctx, 2).unwrap());
    }
}
