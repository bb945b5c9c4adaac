//! Signal detectors: per-bar condition checks that feed the signal manager.
//!
//! A detector answers four questions about a bar: does the condition hold
//! here (`check_condition`), did the hit survive its delay window
//! (`validate_signal`), does it look suspicious (`check_fake_signal`), and
//! what does the resulting event carry (`build_event`). Detectors only read
//! the context; some keep their own state between calls (run and level
//! detectors), which is why `check_condition` takes `&mut self`.

pub mod consecutive_run;
pub mod dual_oscillator;
pub mod factory;
pub mod level_crossing;
pub mod ma_crossover;
pub mod oscillator_spike;

pub use consecutive_run::{ConsecutiveRun, ConsecutiveRunConfig, RunDirection};
pub use dual_oscillator::{DualOscillator, DualOscillatorConfig};
pub use factory::create_detector;
pub use level_crossing::{LevelCrossing, LevelCrossingConfig, LevelKind};
pub use ma_crossover::{MaCrossoverBuy, MaCrossoverConfig};
pub use oscillator_spike::{OscillatorSpike, OscillatorSpikeConfig, SpikeDirection};

use std::ops::RangeInclusive;

use crate::context::{IndicatorContext, Input};
use crate::domain::{Category, SignalEvent};
use crate::error::{ConfigError, DetectorError};

/// Trait for signal detectors.
///
/// # Contract
/// - Missing, NaN, or out-of-range data makes `check_condition` return
///   `Ok(false)`. `Err` is reserved for genuine faults.
/// - `validate_signal` receives `current_index = signal_index + required`
///   (clipped to the latest bar) and inspects bars
///   `signal_index + 1 ..= current_index`. An empty window passes.
/// - `check_fake_signal` never blocks an event; it only annotates it.
pub trait Detector: Send + Sync {
    /// Unique name within the detector's namespace.
    fn name(&self) -> &str;

    fn category(&self) -> Category;

    /// Confirmation delay in minutes.
    fn delay_minutes(&self) -> f64;

    /// Context inputs this detector reads.
    fn inputs(&self) -> &'static [Input];

    fn check_condition(
        &mut self,
        ctx: &IndicatorContext,
        index: usize,
    ) -> Result<bool, DetectorError>;

    fn validate_signal(
        &self,
        ctx: &IndicatorContext,
        signal_index: usize,
        current_index: usize,
    ) -> Result<bool, DetectorError>;

    /// `Some(reason)` when the hit at `index` looks suspect.
    fn check_fake_signal(&self, _ctx: &IndicatorContext, _index: usize) -> Option<String> {
        None
    }

    fn build_event(&self, ctx: &IndicatorContext, index: usize)
        -> Result<SignalEvent, DetectorError>;

    /// Clear internal state. Called on a new session or instrument.
    fn reset(&mut self) {}

    /// A signal of the opposite category has been displayed.
    fn notify_opposite_appeared(&mut self) {}
}

/// Bars that must elapse before a hit can be confirmed.
///
/// `ceil(delay / interval)`; a zero delay confirms in the same cycle.
pub fn required_bars(delay_minutes: f64, bar_interval_minutes: f64) -> usize {
    let positive = delay_minutes > 0.0 && bar_interval_minutes > 0.0;
    if !positive {
        return 0;
    }
    (delay_minutes / bar_interval_minutes).ceil() as usize
}

/// Bars inspected when validating a hit at `signal_index`.
pub fn validation_window(signal_index: usize, current_index: usize) -> RangeInclusive<usize> {
    (signal_index + 1)..=current_index
}

/// Event skeleton shared by every detector: close price, timestamp, net
/// gain from the previous close, and the fake check.
pub(crate) fn base_event<D: Detector + ?Sized>(
    detector: &D,
    ctx: &IndicatorContext,
    index: usize,
    wait_validate: bool,
) -> Result<SignalEvent, DetectorError> {
    let bar = ctx.bar(index).ok_or_else(|| {
        DetectorError::Internal(format!(
            "{}: no bar at index {index} (session has {})",
            detector.name(),
            ctx.len()
        ))
    })?;
    let mut event = SignalEvent::new(
        detector.name(),
        detector.category(),
        index,
        bar.timestamp,
        bar.close,
    );
    event.wait_validate = wait_validate;
    if let Some(gain) = ctx.net_gain_pct(bar.close) {
        event.set_aux("net_gain", gain);
    }
    if let Some(reason) = detector.check_fake_signal(ctx, index) {
        event.mark_fake(reason);
    }
    Ok(event)
}

// ─── Parameter checks ────────────────────────────────────────────────

pub(crate) fn check_delay(detector: &str, delay_minutes: f64) -> Result<(), ConfigError> {
    if !delay_minutes.is_finite() || delay_minutes < 0.0 {
        return Err(ConfigError::invalid(
            detector,
            "delay_minutes",
            format!("must be a finite value >= 0, got {delay_minutes}"),
        ));
    }
    Ok(())
}

/// Oscillator levels live on a 0..=100 scale.
pub(crate) fn check_level(detector: &str, field: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=100.0).contains(&value) {
        return Err(ConfigError::invalid(
            detector,
            field,
            format!("must be within [0, 100], got {value}"),
        ));
    }
    Ok(())
}

pub(crate) fn check_positive(detector: &str, field: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::invalid(
            detector,
            field,
            format!("must be a finite value > 0, got {value}"),
        ));
    }
    Ok(())
}

pub(crate) fn check_non_zero(detector: &str, field: &str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid(detector, field, "must be > 0"));
    }
    Ok(())
}
