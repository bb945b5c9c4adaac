//! Signal events emitted by detectors and carried through the manager.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Signal namespace. Buy and Sell detectors run in independent namespaces
/// with separate pending tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Buy,
    Sell,
}

impl Category {
    pub fn opposite(self) -> Self {
        match self {
            Category::Buy => Category::Sell,
            Category::Sell => Category::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Buy => "buy",
            Category::Sell => "sell",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detector hit at one bar.
///
/// Created when a detector's condition holds, staged in the pending table,
/// and surfaced in a `ScanReport` once its delay window has passed
/// validation. `aux` carries detector-specific readings (oscillator values,
/// level distances, run length, net gain) keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub bar_index: usize,
    pub timestamp: NaiveDateTime,
    pub detector: String,
    pub category: Category,
    pub price: f64,
    pub aux: BTreeMap<String, f64>,
    pub is_fake: bool,
    pub fake_reason: Option<String>,
    /// Re-checked against the detector on the next cycle after display.
    pub wait_validate: bool,
}

impl SignalEvent {
    pub fn new(
        detector: impl Into<String>,
        category: Category,
        bar_index: usize,
        timestamp: NaiveDateTime,
        price: f64,
    ) -> Self {
        Self {
            bar_index,
            timestamp,
            detector: detector.into(),
            category,
            price,
            aux: BTreeMap::new(),
            is_fake: false,
            fake_reason: None,
            wait_validate: false,
        }
    }

    /// Record an auxiliary reading. Non-finite values are dropped.
    pub fn with_aux(mut self, key: &str, value: f64) -> Self {
        self.set_aux(key, value);
        self
    }

    pub fn set_aux(&mut self, key: &str, value: f64) {
        if value.is_finite() {
            self.aux.insert(key.to_string(), value);
        }
    }

    pub fn aux(&self, key: &str) -> Option<f64> {
        self.aux.get(key).copied()
    }

    /// Tag the event as suspect. The latest reason wins.
    pub fn mark_fake(&mut self, reason: impl Into<String>) {
        self.is_fake = true;
        self.fake_reason = Some(reason.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    #[test]
    fn category_opposite_is_involutive() {
        assert_eq!(Category::Buy.opposite(), Category::Sell);
        assert_eq!(Category::Buy.opposite().opposite(), Category::Buy);
    }

    #[test]
    fn aux_drops_non_finite() {
        let event = SignalEvent::new("d", Category::Buy, 3, ts(), 10.0)
            .with_aux("fast", 12.5)
            .with_aux("slow", f64::NAN);
        assert_eq!(event.aux("fast"), Some(12.5));
        assert_eq!(event.aux("slow"), None);
    }

    #[test]
    fn mark_fake_overwrites_reason() {
        let mut event = SignalEvent::new("d", Category::Sell, 3, ts(), 10.0);
        assert!(!event.is_fake);
        event.mark_fake("first");
        event.mark_fake("second");
        assert!(event.is_fake);
        assert_eq!(event.fake_reason.as_deref(), Some("second"));
    }

    #[test]
    fn category_serializes_lowercase() {
        let json = serde_json::to_string(&Category::Sell).unwrap();
        assert_eq!(json, "\"sell\"");
    }
}
