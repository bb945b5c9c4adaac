//! Signal manager: the detect → delayed-confirm scan cycle.
//!
//! One `scan` per scheduler tick. Each cycle runs four phases, in order:
//!
//! 1. **Detect**: every bar not yet swept is offered to every detector of
//!    both namespaces. The first hit per (namespace, bar) is built into an
//!    event, tagged against the band-breakout regime, and staged.
//! 2. **Confirm**: staged entries whose delay has elapsed are validated over
//!    their delay window and leave the pending table either way.
//! 3. **Coupling**: every category with an event newly confirmed or still
//!    on display is recorded in the report. Nothing is notified yet.
//! 4. **Re-validation**: events displayed in earlier cycles that asked for
//!    it are checked once more against their detector.
//!
//! The caller commits a cycle's notifications with `apply_coupling`, which
//! re-arms the opposite namespace of each recorded category. A cycle whose
//! report is dropped leaves the opposite side as it was.
//!
//! Detector errors never abort a cycle. They are logged, recorded in the
//! report, and treated as "no hit" for that detector.

pub mod pending;
pub mod report;

pub use pending::{PendingEntry, PendingTable};
pub use report::{DetectorFault, FaultStage, ScanReport};

use tracing::{debug, debug_span, info, trace, warn};

use crate::config::EngineConfig;
use crate::context::IndicatorContext;
use crate::detectors::{required_bars, Detector};
use crate::domain::{Category, SignalEvent};
use crate::error::{ConfigError, DetectorError};
use crate::fingerprint::ConfigFingerprint;
use crate::regime::{Regime, RegimeClassifier};

// ─── Namespace ───────────────────────────────────────────────────────

/// Detectors of one category plus their pending table.
struct Namespace {
    category: Category,
    detectors: Vec<Box<dyn Detector>>,
    pending: PendingTable,
}

fn fault(
    detector: &dyn Detector,
    stage: FaultStage,
    index: usize,
    err: &DetectorError,
) -> DetectorFault {
    warn!(
        detector = detector.name(),
        category = %detector.category(),
        index,
        stage = ?stage,
        error = %err,
        "detector fault"
    );
    DetectorFault {
        detector: detector.name().to_string(),
        category: detector.category(),
        stage,
        index,
        message: err.to_string(),
    }
}

impl Namespace {
    fn new(category: Category) -> Self {
        Self {
            category,
            detectors: Vec::new(),
            pending: PendingTable::new(),
        }
    }

    fn register(&mut self, detector: Box<dyn Detector>) -> Result<(), ConfigError> {
        if detector.category() != self.category {
            return Err(ConfigError::invalid(
                detector.name(),
                "category",
                format!(
                    "{} detector cannot join the {} namespace",
                    detector.category(),
                    self.category
                ),
            ));
        }
        if self.detectors.iter().any(|d| d.name() == detector.name()) {
            return Err(ConfigError::invalid(
                detector.name(),
                "name",
                format!("already registered in the {} namespace", self.category),
            ));
        }
        self.detectors.push(detector);
        Ok(())
    }

    /// Phase 1 for a single bar. Returns whether an entry was staged.
    fn detect_at(
        &mut self,
        ctx: &IndicatorContext,
        index: usize,
        regime: Regime,
        faults: &mut Vec<DetectorFault>,
    ) -> bool {
        let mut staged = false;
        // Every detector sees every bar so stateful ones stay in step.
        for (slot, detector) in self.detectors.iter_mut().enumerate() {
            match detector.check_condition(ctx, index) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    faults.push(fault(&**detector, FaultStage::Detect, index, &err));
                    continue;
                }
            }
            if self.pending.contains(index) {
                trace!(detector = detector.name(), index, "bar already staged in namespace");
                continue;
            }
            match detector.build_event(ctx, index) {
                Ok(mut event) => {
                    if RegimeClassifier::tag(regime, &mut event) {
                        debug!(detector = detector.name(), index, %regime, "tagged against regime");
                    }
                    debug!(
                        detector = detector.name(),
                        category = %self.category,
                        index,
                        price = event.price,
                        fake = event.is_fake,
                        "staged"
                    );
                    staged |= self.pending.stage(event, slot);
                }
                Err(err) => {
                    faults.push(fault(&**detector, FaultStage::BuildEvent, index, &err));
                }
            }
        }
        staged
    }

    /// Phase 2. Returns confirmed events and the number discarded.
    fn confirm(
        &mut self,
        ctx: &IndicatorContext,
        latest: usize,
        bar_interval_minutes: f64,
        faults: &mut Vec<DetectorFault>,
    ) -> (Vec<SignalEvent>, usize) {
        let detectors = &self.detectors;
        let required_for = |slot: usize| {
            detectors
                .get(slot)
                .map(|d| required_bars(d.delay_minutes(), bar_interval_minutes))
                .unwrap_or(0)
        };
        let ready = self.pending.drain_ready(|entry| {
            latest.saturating_sub(entry.event.bar_index) >= required_for(entry.slot)
        });

        let mut confirmed = Vec::new();
        let mut discarded = 0;
        for entry in ready {
            let Some(detector) = self.detectors.get(entry.slot) else {
                discarded += 1;
                continue;
            };
            let index = entry.event.bar_index;
            let window_end = (index + required_for(entry.slot)).min(latest);
            match detector.validate_signal(ctx, index, window_end) {
                Ok(true) => {
                    info!(
                        detector = detector.name(),
                        category = %self.category,
                        index,
                        price = entry.event.price,
                        fake = entry.event.is_fake,
                        reason = entry.event.fake_reason.as_deref().unwrap_or(""),
                        "signal confirmed"
                    );
                    confirmed.push(entry.event);
                }
                Ok(false) => {
                    debug!(detector = detector.name(), index, "discarded after delay window");
                    discarded += 1;
                }
                Err(err) => {
                    faults.push(fault(&**detector, FaultStage::Validate, index, &err));
                    discarded += 1;
                }
            }
        }
        (confirmed, discarded)
    }

    fn notify_all(&mut self) {
        for detector in &mut self.detectors {
            detector.notify_opposite_appeared();
        }
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut Box<dyn Detector>> {
        self.detectors.iter_mut().find(|d| d.name() == name)
    }

    fn reset(&mut self) {
        for detector in &mut self.detectors {
            detector.reset();
        }
        self.pending.clear();
    }
}

// ─── Manager ─────────────────────────────────────────────────────────

/// Owns the detectors of one instrument/session and runs scan cycles.
///
/// Not shared between threads: `scan` takes `&mut self`, so cycles are
/// serialized by construction.
pub struct SignalManager {
    bar_interval_minutes: f64,
    buy: Namespace,
    sell: Namespace,
    /// First bar index the next detect sweep visits.
    next_index: usize,
    displayed: Vec<SignalEvent>,
    regime: RegimeClassifier,
    fingerprint: Option<ConfigFingerprint>,
}

impl SignalManager {
    /// Empty manager; add detectors with `add_buy` / `add_sell`.
    pub fn new(bar_interval_minutes: f64) -> Result<Self, ConfigError> {
        if !bar_interval_minutes.is_finite() || bar_interval_minutes <= 0.0 {
            return Err(ConfigError::invalid(
                "engine",
                "bar_interval_minutes",
                format!("must be a finite value > 0, got {bar_interval_minutes}"),
            ));
        }
        Ok(Self {
            bar_interval_minutes,
            buy: Namespace::new(Category::Buy),
            sell: Namespace::new(Category::Sell),
            next_index: 0,
            displayed: Vec::new(),
            regime: RegimeClassifier::default(),
            fingerprint: None,
        })
    }

    /// Build every configured detector. Fails on the first invalid entry.
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut manager = Self::new(config.bar_interval_minutes)?;
        manager.regime = RegimeClassifier::new(config.regime_window_bars);
        for detector in config.build_detectors(Category::Buy)? {
            manager.buy.register(detector)?;
        }
        for detector in config.build_detectors(Category::Sell)? {
            manager.sell.register(detector)?;
        }
        let fingerprint = config.fingerprint()?;
        info!(
            buy = manager.buy.detectors.len(),
            sell = manager.sell.detectors.len(),
            fingerprint = fingerprint.short(),
            "signal manager ready"
        );
        manager.fingerprint = Some(fingerprint);
        Ok(manager)
    }

    /// Register a Buy detector. The configuration fingerprint no longer
    /// describes the population afterwards and is dropped.
    pub fn add_buy(&mut self, detector: Box<dyn Detector>) -> Result<(), ConfigError> {
        self.buy.register(detector)?;
        self.fingerprint = None;
        Ok(())
    }

    pub fn add_sell(&mut self, detector: Box<dyn Detector>) -> Result<(), ConfigError> {
        self.sell.register(detector)?;
        self.fingerprint = None;
        Ok(())
    }

    fn namespace(&self, category: Category) -> &Namespace {
        match category {
            Category::Buy => &self.buy,
            Category::Sell => &self.sell,
        }
    }

    fn namespace_mut(&mut self, category: Category) -> &mut Namespace {
        match category {
            Category::Buy => &mut self.buy,
            Category::Sell => &mut self.sell,
        }
    }

    pub fn detectors(&self, category: Category) -> &[Box<dyn Detector>] {
        &self.namespace(category).detectors
    }

    pub fn pending(&self, category: Category) -> &PendingTable {
        &self.namespace(category).pending
    }

    /// Confirmed events still on display, oldest first.
    pub fn displayed(&self) -> &[SignalEvent] {
        &self.displayed
    }

    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn bar_interval_minutes(&self) -> f64 {
        self.bar_interval_minutes
    }

    pub fn fingerprint(&self) -> Option<&ConfigFingerprint> {
        self.fingerprint.as_ref()
    }

    /// Run one full cycle over `ctx`.
    pub fn scan(&mut self, ctx: &IndicatorContext) -> ScanReport {
        let _span = debug_span!("scan", instrument = ctx.instrument_id()).entered();
        let mut report = ScanReport::empty(ctx.instrument_id(), self.fingerprint.clone());
        let Some(latest) = ctx.latest_index() else {
            trace!("empty context");
            return report;
        };
        report.latest_index = Some(latest);
        if latest + 1 < self.next_index {
            warn!(
                latest,
                next_index = self.next_index,
                "context is behind the swept frontier; call reset_all on a new session"
            );
        }

        let regime = self.regime.classify(ctx);
        report.regime = regime;

        // Phase 1: detect
        if self.next_index <= latest {
            report.swept = Some((self.next_index, latest));
            for namespace in [&mut self.buy, &mut self.sell] {
                for index in self.next_index..=latest {
                    if namespace.detect_at(ctx, index, regime, &mut report.faults) {
                        report.staged += 1;
                    }
                }
            }
            self.next_index = latest + 1;
        }

        // Phase 2: confirm
        let mut confirmed = Vec::new();
        for namespace in [&mut self.buy, &mut self.sell] {
            let (events, discarded) =
                namespace.confirm(ctx, latest, self.bar_interval_minutes, &mut report.faults);
            confirmed.extend(events);
            report.discarded += discarded;
        }
        confirmed.sort_by_key(|e| (e.bar_index, e.category));

        // Phase 3: coupling, from this cycle's confirmations and earlier displays
        report.appeared = [Category::Buy, Category::Sell]
            .into_iter()
            .filter(|&category| {
                confirmed
                    .iter()
                    .chain(self.displayed.iter())
                    .any(|e| e.category == category)
            })
            .collect();

        // Phase 4: re-validate earlier displays
        report.removed = self.revalidate(ctx, &mut report.faults);

        self.displayed.extend(confirmed.iter().cloned());
        report.confirmed = confirmed;
        if report.is_degraded() {
            warn!(faults = report.faults.len(), "scan completed with detector faults");
        }
        report
    }

    fn revalidate(
        &mut self,
        ctx: &IndicatorContext,
        faults: &mut Vec<DetectorFault>,
    ) -> Vec<SignalEvent> {
        let mut kept = Vec::with_capacity(self.displayed.len());
        let mut removed = Vec::new();
        for mut event in std::mem::take(&mut self.displayed) {
            if !event.wait_validate {
                kept.push(event);
                continue;
            }
            let Some(detector) = self.namespace_mut(event.category).find_mut(&event.detector)
            else {
                // Reported once: the flag is cleared so the event is not retried.
                let err = DetectorError::Internal(format!(
                    "detector '{}' is not registered in the {} namespace",
                    event.detector, event.category
                ));
                warn!(
                    detector = %event.detector,
                    index = event.bar_index,
                    error = %err,
                    "cannot re-validate displayed signal"
                );
                faults.push(DetectorFault {
                    detector: event.detector.clone(),
                    category: event.category,
                    stage: FaultStage::Revalidate,
                    index: event.bar_index,
                    message: err.to_string(),
                });
                event.wait_validate = false;
                kept.push(event);
                continue;
            };
            match detector.check_condition(ctx, event.bar_index) {
                Ok(true) => {
                    event.wait_validate = false;
                    kept.push(event);
                }
                Ok(false) => {
                    info!(
                        detector = %event.detector,
                        index = event.bar_index,
                        "displayed signal no longer holds, removed"
                    );
                    removed.push(event);
                }
                Err(err) => {
                    faults.push(fault(
                        &**detector,
                        FaultStage::Revalidate,
                        event.bar_index,
                        &err,
                    ));
                    kept.push(event);
                }
            }
        }
        self.displayed = kept;
        removed
    }

    /// Commit the cross-category notifications recorded in `report`.
    ///
    /// Call once per accepted cycle, before the next `scan`.
    pub fn apply_coupling(&mut self, report: &ScanReport) {
        for &category in &report.appeared {
            debug!(%category, "notifying opposite namespace");
            self.namespace_mut(category.opposite()).notify_all();
        }
    }

    /// A Buy signal appeared outside this manager: re-arm Sell detectors.
    pub fn notify_buy_appeared(&mut self) {
        self.sell.notify_all();
    }

    /// A Sell signal appeared outside this manager: re-arm Buy detectors.
    pub fn notify_sell_appeared(&mut self) {
        self.buy.notify_all();
    }

    /// Drop all staged entries. Detector state and the frontier are kept.
    pub fn clear_pending(&mut self) {
        self.buy.pending.clear();
        self.sell.pending.clear();
    }

    /// Forget everything about the current session.
    pub fn reset_all(&mut self) {
        self.buy.reset();
        self.sell.reset();
        self.next_index = 0;
        self.displayed.clear();
        debug!("manager reset");
    }
}
