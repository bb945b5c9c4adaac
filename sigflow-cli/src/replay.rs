//! Bar-by-bar session replay.
//!
//! Plays each session the way a live scheduler would: one scan cycle per
//! arriving bar, on a context that holds only the bars seen so far, with
//! every cycle's coupling committed before the next. The manager is reset at
//! every session boundary.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use sigflow_core::domain::{Category, SignalEvent};
use sigflow_core::fingerprint::ConfigFingerprint;
use sigflow_core::manager::{DetectorFault, SignalManager};

use crate::loader::Session;

/// Everything one session produced.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub date: NaiveDate,
    pub instrument_id: String,
    pub bars: usize,
    /// Every confirmation, in cycle order.
    pub confirmed: Vec<SignalEvent>,
    /// Events dropped by re-validation after they were displayed.
    pub removed: Vec<SignalEvent>,
    /// Events still on display when the session ended.
    pub displayed: Vec<SignalEvent>,
    pub discarded: usize,
    pub faults: Vec<DetectorFault>,
    pub fingerprint: Option<ConfigFingerprint>,
}

/// Warn once per detector about inputs the session does not provide.
fn warn_missing_inputs(manager: &SignalManager, session: &Session) {
    for category in [Category::Buy, Category::Sell] {
        for detector in manager.detectors(category) {
            let missing = session.context.missing(detector.inputs());
            if !missing.is_empty() {
                let names: Vec<String> = missing.iter().map(|i| i.to_string()).collect();
                warn!(
                    detector = detector.name(),
                    date = %session.date,
                    missing = names.join(","),
                    "detector inputs not provided; it will stay silent"
                );
            }
        }
    }
}

pub fn replay_session(manager: &mut SignalManager, session: &Session) -> SessionSummary {
    manager.reset_all();
    warn_missing_inputs(manager, session);

    let ctx = &session.context;
    let mut summary = SessionSummary {
        date: session.date,
        instrument_id: ctx.instrument_id().to_string(),
        bars: ctx.len(),
        confirmed: Vec::new(),
        removed: Vec::new(),
        displayed: Vec::new(),
        discarded: 0,
        faults: Vec::new(),
        fingerprint: manager.fingerprint().cloned(),
    };
    for len in 1..=ctx.len() {
        let report = manager.scan(&ctx.truncated(len));
        manager.apply_coupling(&report);
        summary.confirmed.extend(report.confirmed);
        summary.removed.extend(report.removed);
        summary.discarded += report.discarded;
        summary.faults.extend(report.faults);
    }
    summary.displayed = manager.displayed().to_vec();

    info!(
        date = %session.date,
        bars = summary.bars,
        confirmed = summary.confirmed.len(),
        removed = summary.removed.len(),
        discarded = summary.discarded,
        faults = summary.faults.len(),
        "session replayed"
    );
    summary
}

pub fn replay_all(manager: &mut SignalManager, sessions: &[Session]) -> Vec<SessionSummary> {
    sessions
        .iter()
        .map(|session| replay_session(manager, session))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{parse_sessions, Levels};
    use sigflow_core::config::{DetectorConfig, DetectorKind, EngineConfig};

    /// Two days, each with five bearish bars after a flat open.
    fn two_day_csv() -> String {
        let mut csv = String::from("timestamp,open,high,low,close,volume,trend_ref,slow_osc\n");
        for day in [3, 4] {
            for i in 0..15 {
                let (open, close): (f64, f64) = if i < 10 { (10.0, 10.2) } else { (10.2, 10.0) };
                csv.push_str(&format!(
                    "2024-06-0{day} 09:{:02}:00,{open},{},{},{close},1000,{},{}\n",
                    30 + i,
                    open.max(close) + 0.05,
                    open.min(close) - 0.05,
                    70.0 - i as f64,
                    90.0 - 2.0 * i as f64,
                ));
            }
        }
        csv
    }

    fn plunge_only() -> SignalManager {
        let config = EngineConfig {
            bar_interval_minutes: 1.0,
            regime_window_bars: 5,
            buy: vec![],
            sell: vec![DetectorConfig::bare(DetectorKind::ConsecutivePlunge)],
        };
        SignalManager::from_config(&config).unwrap()
    }

    #[test]
    fn each_session_starts_fresh() {
        let sessions = parse_sessions(two_day_csv().as_bytes(), "600519", Levels::default()).unwrap();
        let mut manager = plunge_only();
        let summaries = replay_all(&mut manager, &sessions);

        assert_eq!(summaries.len(), 2);
        for summary in &summaries {
            let indices: Vec<usize> = summary.confirmed.iter().map(|e| e.bar_index).collect();
            assert_eq!(indices, vec![14]);
            assert_eq!(summary.displayed.len(), 1);
            assert!(summary.fingerprint.is_some());
        }
    }

    #[test]
    fn summary_serializes() {
        let sessions = parse_sessions(two_day_csv().as_bytes(), "600519", Levels::default()).unwrap();
        let mut manager = plunge_only();
        let summary = replay_session(&mut manager, &sessions[0]);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"consecutive_plunge\""));
        assert!(json.contains("\"date\":\"2024-06-03\""));
    }
}
