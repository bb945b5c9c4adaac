//! Error types shared across the engine.
//!
//! Three concerns, three enums:
//! - `DetectorError`: a detector call failed. Caught by the manager, recorded
//!   as a fault, never propagated out of a scan.
//! - `ConfigError`: a detector or engine configuration is invalid. Raised at
//!   construction time only.
//! - `ContextError`: an `IndicatorContext` could not be assembled.

/// Failure inside a detector call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetectorError {
    #[error("invalid value {value} for '{field}' at index {index}")]
    InvalidValue {
        field: &'static str,
        index: usize,
        value: f64,
    },
    #[error("internal detector fault: {0}")]
    Internal(String),
}

/// Invalid engine or detector configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("detector '{detector}': invalid '{field}': {reason}")]
    InvalidParam {
        detector: String,
        field: String,
        reason: String,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    #[error("failed to read configuration: {0}")]
    Io(String),
    #[error("unknown detector: {0}")]
    UnknownDetector(String),
}

impl ConfigError {
    pub(crate) fn invalid(
        detector: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParam {
            detector: detector.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// An `IndicatorContext` could not be built from the supplied inputs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContextError {
    #[error("series '{series}' has {len} values, expected {expected}")]
    LengthMismatch {
        series: &'static str,
        len: usize,
        expected: usize,
    },
    #[error("bar at position {position} has index {index}; indices must run 0, 1, 2, ...")]
    NonContiguousIndex { position: usize, index: usize },
    #[error("bar at position {position} is not later than the previous bar")]
    NonMonotonicTime { position: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_param_message_names_detector_and_field() {
        let err = ConfigError::invalid("support_breakdown", "window_bars", "must be > 0");
        assert_eq!(
            err.to_string(),
            "detector 'support_breakdown': invalid 'window_bars': must be > 0"
        );
    }

    #[test]
    fn detector_error_display() {
        let err = DetectorError::InvalidValue {
            field: "support",
            index: 3,
            value: -1.0,
        };
        assert!(err.to_string().contains("'support'"));
        assert!(err.to_string().contains("index 3"));
    }
}
