//! Per-cycle scan output.

use serde::{Deserialize, Serialize};

use crate::domain::{Category, SignalEvent};
use crate::fingerprint::ConfigFingerprint;
use crate::regime::Regime;

/// Detector call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultStage {
    Detect,
    BuildEvent,
    Validate,
    Revalidate,
}

/// A detector error caught during a scan. The sweep carried on without it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorFault {
    pub detector: String,
    pub category: Category,
    pub stage: FaultStage,
    pub index: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub instrument_id: String,
    /// Most recent bar in the scanned context.
    pub latest_index: Option<usize>,
    /// Bar indices visited by the detect sweep, inclusive.
    pub swept: Option<(usize, usize)>,
    pub regime: Regime,
    /// Hits newly staged this cycle.
    pub staged: usize,
    /// Hits confirmed this cycle, oldest first, Buy before Sell per index.
    pub confirmed: Vec<SignalEvent>,
    /// Hits that failed validation this cycle.
    pub discarded: usize,
    /// Previously displayed events dropped by re-validation.
    pub removed: Vec<SignalEvent>,
    /// Categories with an event newly confirmed or still on display. Their
    /// opposite namespaces are notified by `SignalManager::apply_coupling`.
    #[serde(default)]
    pub appeared: Vec<Category>,
    pub faults: Vec<DetectorFault>,
    pub fingerprint: Option<ConfigFingerprint>,
}

impl ScanReport {
    pub(crate) fn empty(instrument_id: &str, fingerprint: Option<ConfigFingerprint>) -> Self {
        Self {
            instrument_id: instrument_id.to_string(),
            latest_index: None,
            swept: None,
            regime: Regime::None,
            staged: 0,
            confirmed: Vec::new(),
            discarded: 0,
            removed: Vec::new(),
            appeared: Vec::new(),
            faults: Vec::new(),
            fingerprint,
        }
    }

    /// At least one detector call failed this cycle.
    pub fn is_degraded(&self) -> bool {
        !self.faults.is_empty()
    }
}
