//! Factory: converts `DetectorConfig` entries into runtime trait objects.
//!
//! Every detector type has typed defaults. A config entry overrides them
//! through its `params` table; keys the detector does not know are rejected
//! rather than silently ignored.

use std::collections::BTreeMap;

use super::{
    ConsecutiveRun, ConsecutiveRunConfig, Detector, DualOscillator, DualOscillatorConfig,
    LevelCrossing, LevelCrossingConfig, LevelKind, MaCrossoverBuy, MaCrossoverConfig,
    OscillatorSpike, OscillatorSpikeConfig, RunDirection, SpikeDirection,
};
use crate::config::{DetectorConfig, DetectorKind};
use crate::domain::Category;
use crate::error::ConfigError;

// ─── Helpers ─────────────────────────────────────────────────────────

/// Extract a named f64 parameter, falling back to `default`.
fn param(config: &DetectorConfig, name: &str, default: f64) -> f64 {
    config.params.get(name).copied().unwrap_or(default)
}

/// Extract a named whole-number parameter, falling back to `default`.
fn param_usize(config: &DetectorConfig, name: &str, default: usize) -> Result<usize, ConfigError> {
    match config.params.get(name).copied() {
        None => Ok(default),
        Some(v) if v.is_finite() && v >= 0.0 && v.fract() == 0.0 => Ok(v as usize),
        Some(v) => Err(ConfigError::invalid(
            config.detector_name(),
            name,
            format!("must be a whole number >= 0, got {v}"),
        )),
    }
}

fn to_map(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn reject_unknown(config: &DetectorConfig) -> Result<(), ConfigError> {
    let (_, known) = default_params(config.kind);
    match config.params.keys().find(|k| !known.contains_key(*k)) {
        Some(key) => Err(ConfigError::invalid(
            config.detector_name(),
            key.as_str(),
            format!(
                "unknown parameter for {}; expected one of: {}",
                config.kind,
                known.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
        )),
        None => Ok(()),
    }
}

// ─── Typed defaults ──────────────────────────────────────────────────

fn dual_oscillator_defaults(kind: DetectorKind) -> DualOscillatorConfig {
    match kind.category() {
        Category::Buy => DualOscillatorConfig::buy_defaults(),
        Category::Sell => DualOscillatorConfig::sell_defaults(),
    }
}

fn dual_oscillator_map(c: &DualOscillatorConfig) -> BTreeMap<String, f64> {
    to_map(&[
        ("slow_threshold", c.slow_threshold),
        ("sum_threshold", c.sum_threshold),
        ("max_divergence", c.max_divergence),
        ("safety_line_ratio", c.safety_line_ratio),
    ])
}

fn run_defaults(kind: DetectorKind) -> ConsecutiveRunConfig {
    match kind.category() {
        Category::Buy => ConsecutiveRunConfig::surge_defaults(),
        Category::Sell => ConsecutiveRunConfig::plunge_defaults(),
    }
}

fn run_map(c: &ConsecutiveRunConfig) -> BTreeMap<String, f64> {
    to_map(&[
        ("run_length", c.run_length as f64),
        ("trend_lookback", c.trend_lookback as f64),
        ("reference_limit", c.reference_limit),
    ])
}

fn level_defaults(kind: DetectorKind) -> LevelCrossingConfig {
    match kind.category() {
        Category::Buy => LevelCrossingConfig::resistance_defaults(),
        Category::Sell => LevelCrossingConfig::support_defaults(),
    }
}

fn level_map(c: &LevelCrossingConfig) -> BTreeMap<String, f64> {
    to_map(&[
        ("window_bars", c.window_bars as f64),
        ("fake_move_pct", c.fake_move_pct),
    ])
}

fn spike_defaults(kind: DetectorKind) -> OscillatorSpikeConfig {
    match kind.category() {
        Category::Buy => OscillatorSpikeConfig::surge_defaults(),
        Category::Sell => OscillatorSpikeConfig::plunge_defaults(),
    }
}

fn spike_map(c: &OscillatorSpikeConfig) -> BTreeMap<String, f64> {
    to_map(&[
        ("normal_lookback", c.normal_lookback as f64),
        ("normal_magnitude", c.normal_magnitude),
        ("normal_level", c.normal_level),
        ("special_lookback", c.special_lookback as f64),
        ("special_level", c.special_level),
        ("boundary_tolerance", c.boundary_tolerance),
        ("fast_confirm_level", c.fast_confirm_level),
    ])
}

fn ma_map(c: &MaCrossoverConfig) -> BTreeMap<String, f64> {
    to_map(&[("overheat_level", c.overheat_level)])
}

/// Default delay and parameter table for a detector type.
pub fn default_params(kind: DetectorKind) -> (f64, BTreeMap<String, f64>) {
    match kind {
        DetectorKind::DualOscillatorBuy | DetectorKind::DualOscillatorSell => {
            let c = dual_oscillator_defaults(kind);
            (c.delay_minutes, dual_oscillator_map(&c))
        }
        DetectorKind::ConsecutiveSurge | DetectorKind::ConsecutivePlunge => {
            let c = run_defaults(kind);
            (c.delay_minutes, run_map(&c))
        }
        DetectorKind::ResistanceBreakthrough | DetectorKind::SupportBreakdown => {
            let c = level_defaults(kind);
            (c.delay_minutes, level_map(&c))
        }
        DetectorKind::OscillatorSurge | DetectorKind::OscillatorPlunge => {
            let c = spike_defaults(kind);
            (c.delay_minutes, spike_map(&c))
        }
        DetectorKind::MaCrossoverBuy => {
            let c = MaCrossoverConfig::default();
            (c.delay_minutes, ma_map(&c))
        }
    }
}

// ─── Detector factory ────────────────────────────────────────────────

/// Create a detector from a `DetectorConfig`.
pub fn create_detector(config: &DetectorConfig) -> Result<Box<dyn Detector>, ConfigError> {
    reject_unknown(config)?;
    let name = config.detector_name().to_string();
    let kind = config.kind;

    match kind {
        DetectorKind::DualOscillatorBuy | DetectorKind::DualOscillatorSell => {
            let d = dual_oscillator_defaults(kind);
            let c = DualOscillatorConfig {
                slow_threshold: param(config, "slow_threshold", d.slow_threshold),
                sum_threshold: param(config, "sum_threshold", d.sum_threshold),
                max_divergence: param(config, "max_divergence", d.max_divergence),
                safety_line_ratio: param(config, "safety_line_ratio", d.safety_line_ratio),
                delay_minutes: config.delay_minutes.unwrap_or(d.delay_minutes),
            };
            Ok(Box::new(DualOscillator::new(name, kind.category(), c)?))
        }
        DetectorKind::ConsecutiveSurge | DetectorKind::ConsecutivePlunge => {
            let d = run_defaults(kind);
            let c = ConsecutiveRunConfig {
                run_length: param_usize(config, "run_length", d.run_length)?,
                trend_lookback: param_usize(config, "trend_lookback", d.trend_lookback)?,
                reference_limit: param(config, "reference_limit", d.reference_limit),
                delay_minutes: config.delay_minutes.unwrap_or(d.delay_minutes),
            };
            let direction = match kind.category() {
                Category::Buy => RunDirection::Surge,
                Category::Sell => RunDirection::Plunge,
            };
            Ok(Box::new(ConsecutiveRun::new(name, direction, c)?))
        }
        DetectorKind::ResistanceBreakthrough | DetectorKind::SupportBreakdown => {
            let d = level_defaults(kind);
            let c = LevelCrossingConfig {
                window_bars: param_usize(config, "window_bars", d.window_bars)?,
                fake_move_pct: param(config, "fake_move_pct", d.fake_move_pct),
                delay_minutes: config.delay_minutes.unwrap_or(d.delay_minutes),
            };
            let level = match kind.category() {
                Category::Buy => LevelKind::Resistance,
                Category::Sell => LevelKind::Support,
            };
            Ok(Box::new(LevelCrossing::new(name, level, c)?))
        }
        DetectorKind::OscillatorSurge | DetectorKind::OscillatorPlunge => {
            let d = spike_defaults(kind);
            let c = OscillatorSpikeConfig {
                normal_lookback: param_usize(config, "normal_lookback", d.normal_lookback)?,
                normal_magnitude: param(config, "normal_magnitude", d.normal_magnitude),
                normal_level: param(config, "normal_level", d.normal_level),
                special_lookback: param_usize(config, "special_lookback", d.special_lookback)?,
                special_level: param(config, "special_level", d.special_level),
                boundary_tolerance: param(config, "boundary_tolerance", d.boundary_tolerance),
                fast_confirm_level: param(config, "fast_confirm_level", d.fast_confirm_level),
                delay_minutes: config.delay_minutes.unwrap_or(d.delay_minutes),
            };
            let direction = match kind.category() {
                Category::Buy => SpikeDirection::Surge,
                Category::Sell => SpikeDirection::Plunge,
            };
            Ok(Box::new(OscillatorSpike::new(name, direction, c)?))
        }
        DetectorKind::MaCrossoverBuy => {
            let d = MaCrossoverConfig::default();
            let c = MaCrossoverConfig {
                overheat_level: param(config, "overheat_level", d.overheat_level),
                delay_minutes: config.delay_minutes.unwrap_or(d.delay_minutes),
            };
            Ok(Box::new(MaCrossoverBuy::new(name, c)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_builds_with_defaults() {
        for kind in DetectorKind::ALL {
            let det = create_detector(&DetectorConfig::bare(kind)).unwrap();
            assert_eq!(det.name(), kind.as_str());
            assert_eq!(det.category(), kind.category());
        }
    }

    #[test]
    fn explicit_defaults_match_bare_entries() {
        for kind in DetectorKind::ALL {
            let bare = create_detector(&DetectorConfig::bare(kind)).unwrap();
            let explicit = create_detector(&DetectorConfig::with_defaults(kind)).unwrap();
            assert_eq!(bare.delay_minutes(), explicit.delay_minutes());
        }
    }

    #[test]
    fn default_delays() {
        let delay = |k| create_detector(&DetectorConfig::bare(k)).unwrap().delay_minutes();
        assert_eq!(delay(DetectorKind::DualOscillatorBuy), 0.5);
        assert_eq!(delay(DetectorKind::DualOscillatorSell), 0.5);
        assert_eq!(delay(DetectorKind::SupportBreakdown), 1.0);
        assert_eq!(delay(DetectorKind::ResistanceBreakthrough), 2.0);
        assert_eq!(delay(DetectorKind::OscillatorPlunge), 0.0);
        assert_eq!(delay(DetectorKind::ConsecutiveSurge), 0.0);
        assert_eq!(delay(DetectorKind::MaCrossoverBuy), 10.0);
    }

    #[test]
    fn overrides_are_applied() {
        let mut config = DetectorConfig::bare(DetectorKind::SupportBreakdown);
        config.name = Some("tight_support".into());
        config.delay_minutes = Some(3.0);
        let det = create_detector(&config).unwrap();
        assert_eq!(det.name(), "tight_support");
        assert_eq!(det.delay_minutes(), 3.0);
    }

    #[test]
    fn fractional_count_is_rejected() {
        let mut config = DetectorConfig::bare(DetectorKind::ConsecutivePlunge);
        config.params.insert("run_length".into(), 4.5);
        let err = create_detector(&config).err().unwrap();
        assert!(matches!(err, ConfigError::InvalidParam { ref field, .. } if field == "run_length"));
    }

    #[test]
    fn invalid_values_surface_detector_errors() {
        let mut config = DetectorConfig::bare(DetectorKind::DualOscillatorSell);
        config.params.insert("safety_line_ratio".into(), 1.5);
        assert!(create_detector(&config).is_err());

        let mut config = DetectorConfig::bare(DetectorKind::OscillatorSurge);
        config.delay_minutes = Some(f64::NAN);
        assert!(create_detector(&config).is_err());
    }
}
