//! Oscillator-spike detector: a sharp move of the slow oscillator into an
//! extreme zone.
//!
//! Two branches, checked in order:
//! - **Extreme**: `special_lookback` bars ago the oscillator was already past
//!   `special_level` and it has moved further since. A start pinned at the
//!   scale boundary (0 for plunge, 100 for surge) also counts when the
//!   opposite move stays within `boundary_tolerance` and the fast oscillator
//!   confirms; without a fast reading the boundary case never fires.
//! - **Normal**: over `normal_lookback` bars the oscillator moved at least
//!   `normal_magnitude` and now sits past `normal_level`.
//!
//! A plunge does not fire while the instrument is limit-down, a surge not
//! while it is limit-up.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{
    base_event, check_delay, check_level, check_non_zero, check_positive, validation_window,
    Detector,
};
use crate::context::{IndicatorContext, Input, Series};
use crate::domain::{Category, LimitState, SignalEvent};
use crate::error::{ConfigError, DetectorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpikeDirection {
    /// Oscillator collapsing toward 0, Sell category.
    Plunge,
    /// Oscillator racing toward 100, Buy category.
    Surge,
}

impl SpikeDirection {
    pub fn category(self) -> Category {
        match self {
            SpikeDirection::Plunge => Category::Sell,
            SpikeDirection::Surge => Category::Buy,
        }
    }

    /// Signed move from `start` to `current`, positive in this direction.
    fn moved(self, start: f64, current: f64) -> f64 {
        match self {
            SpikeDirection::Plunge => start - current,
            SpikeDirection::Surge => current - start,
        }
    }

    /// `value` lies past `level` on this direction's side.
    fn beyond(self, value: f64, level: f64) -> bool {
        match self {
            SpikeDirection::Plunge => value < level,
            SpikeDirection::Surge => value > level,
        }
    }

    fn at_or_beyond(self, value: f64, level: f64) -> bool {
        match self {
            SpikeDirection::Plunge => value <= level,
            SpikeDirection::Surge => value >= level,
        }
    }

    fn boundary(self) -> f64 {
        match self {
            SpikeDirection::Plunge => 0.0,
            SpikeDirection::Surge => 100.0,
        }
    }

    fn blocked_by(self) -> LimitState {
        match self {
            SpikeDirection::Plunge => LimitState::LimitDown,
            SpikeDirection::Surge => LimitState::LimitUp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscillatorSpikeConfig {
    pub normal_lookback: usize,
    pub normal_magnitude: f64,
    pub normal_level: f64,
    pub special_lookback: usize,
    pub special_level: f64,
    pub boundary_tolerance: f64,
    pub fast_confirm_level: f64,
    pub delay_minutes: f64,
}

impl OscillatorSpikeConfig {
    pub fn plunge_defaults() -> Self {
        Self {
            normal_lookback: 5,
            normal_magnitude: 15.0,
            normal_level: 20.0,
            special_lookback: 10,
            special_level: 20.0,
            boundary_tolerance: 5.0,
            fast_confirm_level: 30.0,
            delay_minutes: 0.0,
        }
    }

    pub fn surge_defaults() -> Self {
        Self {
            normal_lookback: 5,
            normal_magnitude: 15.0,
            normal_level: 80.0,
            special_lookback: 10,
            special_level: 80.0,
            boundary_tolerance: 5.0,
            fast_confirm_level: 70.0,
            delay_minutes: 0.0,
        }
    }
}

/// Which branch produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpikeBranch {
    Extreme,
    Boundary,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spike {
    pub branch: SpikeBranch,
    pub start: f64,
    pub current: f64,
    pub moved: f64,
    pub lookback: usize,
}

const INPUTS: &[Input] = &[
    Input::Series(Series::SlowOscillator),
    Input::Series(Series::FastOscillator),
    Input::PrevClose,
];

#[derive(Debug, Clone)]
pub struct OscillatorSpike {
    name: String,
    direction: SpikeDirection,
    config: OscillatorSpikeConfig,
}

impl OscillatorSpike {
    pub fn new(
        name: impl Into<String>,
        direction: SpikeDirection,
        config: OscillatorSpikeConfig,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        check_non_zero(&name, "normal_lookback", config.normal_lookback)?;
        if config.special_lookback <= config.normal_lookback {
            return Err(ConfigError::invalid(
                &name,
                "special_lookback",
                format!(
                    "must exceed normal_lookback ({} <= {})",
                    config.special_lookback, config.normal_lookback
                ),
            ));
        }
        check_positive(&name, "normal_magnitude", config.normal_magnitude)?;
        check_level(&name, "normal_level", config.normal_level)?;
        check_level(&name, "special_level", config.special_level)?;
        check_level(&name, "fast_confirm_level", config.fast_confirm_level)?;
        if !config.boundary_tolerance.is_finite() || config.boundary_tolerance < 0.0 {
            return Err(ConfigError::invalid(
                &name,
                "boundary_tolerance",
                format!("must be a finite value >= 0, got {}", config.boundary_tolerance),
            ));
        }
        check_delay(&name, config.delay_minutes)?;
        Ok(Self {
            name,
            direction,
            config,
        })
    }

    pub fn plunge(config: OscillatorSpikeConfig) -> Result<Self, ConfigError> {
        Self::new("oscillator_plunge", SpikeDirection::Plunge, config)
    }

    pub fn surge(config: OscillatorSpikeConfig) -> Result<Self, ConfigError> {
        Self::new("oscillator_surge", SpikeDirection::Surge, config)
    }

    /// Evaluate both branches at `index` without the price-limit guard.
    pub fn evaluate(&self, ctx: &IndicatorContext, index: usize) -> Option<Spike> {
        let dir = self.direction;
        let c = &self.config;
        let current = ctx.value(Series::SlowOscillator, index)?;

        if index >= c.special_lookback {
            let lookback = c.special_lookback;
            if let Some(start) = ctx.value(Series::SlowOscillator, index - lookback) {
                let moved = dir.moved(start, current);
                if dir.beyond(start, c.special_level) && moved > 0.0 {
                    return Some(Spike {
                        branch: SpikeBranch::Extreme,
                        start,
                        current,
                        moved,
                        lookback,
                    });
                }
                if start == dir.boundary() && moved >= -c.boundary_tolerance {
                    let Some(fast) = ctx.value(Series::FastOscillator, index) else {
                        trace!(detector = %self.name, index, "boundary case without fast oscillator");
                        return None;
                    };
                    if dir.at_or_beyond(fast, c.fast_confirm_level) {
                        return Some(Spike {
                            branch: SpikeBranch::Boundary,
                            start,
                            current,
                            moved,
                            lookback,
                        });
                    }
                }
            }
        }

        if index >= c.normal_lookback {
            let lookback = c.normal_lookback;
            let start = ctx.value(Series::SlowOscillator, index - lookback)?;
            let moved = dir.moved(start, current);
            if moved >= c.normal_magnitude && dir.at_or_beyond(current, c.normal_level) {
                return Some(Spike {
                    branch: SpikeBranch::Normal,
                    start,
                    current,
                    moved,
                    lookback,
                });
            }
        }
        None
    }
}

impl Detector for OscillatorSpike {
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
        if ctx.limit_state(index) == self.direction.blocked_by() {
            trace!(detector = %self.name, index, "at daily price limit");
            return Ok(false);
        }
        match self.evaluate(ctx, index) {
            Some(spike) => {
                debug!(
                    detector = %self.name,
                    index,
                    branch = ?spike.branch,
                    start = spike.start,
                    current = spike.current,
                    "condition hit"
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// The price-limit guard is not applied here: a spike inside the window
    /// invalidates the hit even on a bar pinned at the daily limit.
    fn validate_signal(
        &self,
        ctx: &IndicatorContext,
        signal_index: usize,
        current_index: usize,
    ) -> Result<bool, DetectorError> {
        for i in validation_window(signal_index, current_index) {
            if self.evaluate(ctx, i).is_some() {
                debug!(detector = %self.name, signal_index, refired_at = i, "spike re-fired in delay window");
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn build_event(
        &self,
        ctx: &IndicatorContext,
        index: usize,
    ) -> Result<SignalEvent, DetectorError> {
        let mut event = base_event(self, ctx, index, true)?;
        if let Some(spike) = self.evaluate(ctx, index) {
            event.set_aux("osc_current", spike.current);
            event.set_aux("osc_start", spike.start);
            event.set_aux("osc_move", spike.moved);
            event.set_aux("lookback", spike.lookback as f64);
        }
        Ok(event)
    }
}
