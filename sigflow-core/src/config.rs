//! Engine configuration: which detectors run, with which parameters.
//!
//! Stored as TOML. Each detector entry names its `type`, an optional unique
//! `name`, an optional `delay_minutes`, and a `params` table; anything left
//! out falls back to the detector's defaults.
//!
//! ```toml
//! bar_interval_minutes = 1.0
//!
//! [[buy]]
//! type = "dual_oscillator_buy"
//! delay_minutes = 0.5
//! params = { slow_threshold = 30.0, sum_threshold = 45.0 }
//!
//! [[sell]]
//! type = "support_breakdown"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::detectors::factory::{create_detector, default_params};
use crate::detectors::Detector;
use crate::domain::Category;
use crate::error::ConfigError;
use crate::fingerprint::ConfigFingerprint;

/// Every detector type the factory can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DetectorKind {
    DualOscillatorBuy,
    DualOscillatorSell,
    ConsecutiveSurge,
    ConsecutivePlunge,
    ResistanceBreakthrough,
    SupportBreakdown,
    OscillatorSurge,
    OscillatorPlunge,
    MaCrossoverBuy,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 9] = [
        DetectorKind::DualOscillatorBuy,
        DetectorKind::DualOscillatorSell,
        DetectorKind::ConsecutiveSurge,
        DetectorKind::ConsecutivePlunge,
        DetectorKind::ResistanceBreakthrough,
        DetectorKind::SupportBreakdown,
        DetectorKind::OscillatorSurge,
        DetectorKind::OscillatorPlunge,
        DetectorKind::MaCrossoverBuy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DetectorKind::DualOscillatorBuy => "dual_oscillator_buy",
            DetectorKind::DualOscillatorSell => "dual_oscillator_sell",
            DetectorKind::ConsecutiveSurge => "consecutive_surge",
            DetectorKind::ConsecutivePlunge => "consecutive_plunge",
            DetectorKind::ResistanceBreakthrough => "resistance_breakthrough",
            DetectorKind::SupportBreakdown => "support_breakdown",
            DetectorKind::OscillatorSurge => "oscillator_surge",
            DetectorKind::OscillatorPlunge => "oscillator_plunge",
            DetectorKind::MaCrossoverBuy => "ma_crossover_buy",
        }
    }

    pub fn category(self) -> Category {
        match self {
            DetectorKind::DualOscillatorBuy
            | DetectorKind::ConsecutiveSurge
            | DetectorKind::ResistanceBreakthrough
            | DetectorKind::OscillatorSurge
            | DetectorKind::MaCrossoverBuy => Category::Buy,
            DetectorKind::DualOscillatorSell
            | DetectorKind::ConsecutivePlunge
            | DetectorKind::SupportBreakdown
            | DetectorKind::OscillatorPlunge => Category::Sell,
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownDetector(s.to_string()))
    }
}

impl TryFrom<String> for DetectorKind {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DetectorKind> for String {
    fn from(kind: DetectorKind) -> Self {
        kind.as_str().to_string()
    }
}

/// One detector entry.
///
/// Uses `BTreeMap` so serialization (and therefore the fingerprint) is
/// deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectorConfig {
    #[serde(rename = "type")]
    pub kind: DetectorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, f64>,
}

impl DetectorConfig {
    /// Entry with no overrides: every value comes from the detector defaults.
    pub fn bare(kind: DetectorKind) -> Self {
        Self {
            kind,
            name: None,
            delay_minutes: None,
            params: BTreeMap::new(),
        }
    }

    /// Entry with every default written out.
    pub fn with_defaults(kind: DetectorKind) -> Self {
        let (delay, params) = default_params(kind);
        Self {
            kind,
            name: None,
            delay_minutes: Some(delay),
            params,
        }
    }

    /// Name the built detector will carry.
    pub fn detector_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.kind.as_str())
    }
}

fn default_bar_interval() -> f64 {
    1.0
}

fn default_regime_window() -> usize {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Minutes per bar. Delays are converted to bar counts with it.
    #[serde(default = "default_bar_interval")]
    pub bar_interval_minutes: f64,
    /// Bars per window for the band-breakout regime classifier.
    #[serde(default = "default_regime_window")]
    pub regime_window_bars: usize,
    #[serde(default)]
    pub buy: Vec<DetectorConfig>,
    #[serde(default)]
    pub sell: Vec<DetectorConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::default_set()
    }
}

impl EngineConfig {
    /// The standard detector population with all defaults spelled out.
    pub fn default_set() -> Self {
        let buy = [
            DetectorKind::DualOscillatorBuy,
            DetectorKind::ResistanceBreakthrough,
            DetectorKind::OscillatorSurge,
            DetectorKind::ConsecutiveSurge,
            DetectorKind::MaCrossoverBuy,
        ];
        let sell = [
            DetectorKind::DualOscillatorSell,
            DetectorKind::SupportBreakdown,
            DetectorKind::OscillatorPlunge,
            DetectorKind::ConsecutivePlunge,
        ];
        Self {
            bar_interval_minutes: default_bar_interval(),
            regime_window_bars: default_regime_window(),
            buy: buy.into_iter().map(DetectorConfig::with_defaults).collect(),
            sell: sell.into_iter().map(DetectorConfig::with_defaults).collect(),
        }
    }

    /// Load a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn detectors(&self, category: Category) -> &[DetectorConfig] {
        match category {
            Category::Buy => &self.buy,
            Category::Sell => &self.sell,
        }
    }

    /// Check every value without keeping the built detectors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.bar_interval_minutes.is_finite() || self.bar_interval_minutes <= 0.0 {
            return Err(ConfigError::invalid(
                "engine",
                "bar_interval_minutes",
                format!("must be a finite value > 0, got {}", self.bar_interval_minutes),
            ));
        }
        if self.regime_window_bars == 0 {
            return Err(ConfigError::invalid("engine", "regime_window_bars", "must be > 0"));
        }
        for category in [Category::Buy, Category::Sell] {
            self.build_detectors(category)?;
        }
        Ok(())
    }

    /// Build the detectors of one namespace, in configuration order.
    pub fn build_detectors(
        &self,
        category: Category,
    ) -> Result<Vec<Box<dyn Detector>>, ConfigError> {
        let mut seen = HashSet::new();
        let mut built = Vec::new();
        for entry in self.detectors(category) {
            let name = entry.detector_name();
            if entry.kind.category() != category {
                return Err(ConfigError::invalid(
                    name,
                    "type",
                    format!(
                        "{} is a {} detector listed under [[{}]]",
                        entry.kind,
                        entry.kind.category(),
                        category
                    ),
                ));
            }
            if !seen.insert(name.to_string()) {
                return Err(ConfigError::invalid(
                    name,
                    "name",
                    format!("duplicate detector name in [[{category}]]"),
                ));
            }
            built.push(create_detector(entry)?);
        }
        Ok(built)
    }

    /// Stable hash of the canonical JSON form of this configuration.
    pub fn fingerprint(&self) -> Result<ConfigFingerprint, ConfigError> {
        let json = serde_json::to_string(self)
            .map_err(|e| ConfigError::Parse(format!("serialize configuration: {e}")))?;
        Ok(ConfigFingerprint::from_bytes(json.as_bytes()))
    }
}
