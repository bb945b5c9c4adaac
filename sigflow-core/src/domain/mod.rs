//! Domain types for sigflow

pub mod bar;
pub mod event;
pub mod instrument;

pub use bar::{Bar, BarDirection};
pub use event::{Category, SignalEvent};
pub use instrument::{Board, LimitState};
