//! Sigflow Core: intraday detect/confirm signal engine.
//!
//! This crate contains the whole signal pipeline for one trading session:
//! - Domain types (bars, boards and price limits, signal events)
//! - Read-only indicator context with index-aligned series and 5-bar views
//! - Buy/Sell detectors behind a single `Detector` trait
//! - Band-breakout regime classifier used for fake tagging
//! - Signal manager: detect, stage, confirm after a delay, re-validate
//! - TOML configuration with per-detector parameters and a BLAKE3 fingerprint

pub mod config;
pub mod context;
pub mod detectors;
pub mod domain;
pub mod error;
pub mod fingerprint;
pub mod manager;
pub mod regime;

pub use config::{DetectorConfig, DetectorKind, EngineConfig};
pub use context::{IndicatorContext, Input, Series};
pub use detectors::{create_detector, Detector};
pub use domain::{Bar, Board, Category, SignalEvent};
pub use error::{ConfigError, ContextError, DetectorError};
pub use fingerprint::ConfigFingerprint;
pub use manager::{ScanReport, SignalManager};
pub use regime::{Regime, RegimeClassifier};
