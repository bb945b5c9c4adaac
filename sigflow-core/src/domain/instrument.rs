//! Instrument boards and the daily price-limit guard.

use serde::{Deserialize, Serialize};

/// Daily price-limit board an instrument trades on.
///
/// Classified from the instrument id: special-treatment names (`ST`, `*ST`)
/// move at most 5% a day, ids starting with `3` (growth board) 20%, and
/// everything else 10%.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Board {
    Main,
    Growth,
    SpecialTreatment,
}

/// Where a price sits relative to the daily limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LimitState {
    Free,
    LimitUp,
    LimitDown,
}

/// Slack applied to the board threshold when testing for a limit hit.
const LIMIT_TOLERANCE_PCT: f64 = 0.05;

impl Board {
    pub fn classify(instrument_id: &str) -> Self {
        let id = instrument_id.trim();
        let upper = id.to_ascii_uppercase();
        if upper.starts_with("ST") || upper.starts_with("*ST") {
            Board::SpecialTreatment
        } else if id.starts_with('3') {
            Board::Growth
        } else {
            Board::Main
        }
    }

    /// Percentage change treated as the limit for this board.
    pub fn threshold_pct(&self) -> f64 {
        match self {
            Board::Main => 9.9,
            Board::Growth => 19.9,
            Board::SpecialTreatment => 4.9,
        }
    }

    /// Classify `price` against the limits implied by `prev_close`.
    ///
    /// A non-positive or non-finite `prev_close` cannot define a limit and
    /// yields `LimitState::Free`.
    pub fn limit_state(&self, price: f64, prev_close: f64) -> LimitState {
        if !prev_close.is_finite() || prev_close <= 0.0 || !price.is_finite() {
            return LimitState::Free;
        }
        let change_pct = (price - prev_close) / prev_close * 100.0;
        let threshold = self.threshold_pct();
        if change_pct >= threshold - LIMIT_TOLERANCE_PCT {
            LimitState::LimitUp
        } else if change_pct <= -threshold + LIMIT_TOLERANCE_PCT {
            LimitState::LimitDown
        } else {
            LimitState::Free
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_is_classified_from_instrument_id() {
        assert_eq!(Board::classify("600519"), Board::Main);
        assert_eq!(Board::classify("000001"), Board::Main);
        assert_eq!(Board::classify("300750"), Board::Growth);
        assert_eq!(Board::classify("ST1234"), Board::SpecialTreatment);
        assert_eq!(Board::classify("*ST1234"), Board::SpecialTreatment);
        assert_eq!(Board::classify("st1234"), Board::SpecialTreatment);
    }

    #[test]
    fn main_board_limits_at_ten_percent() {
        let board = Board::Main;
        assert_eq!(board.limit_state(10.99, 10.0), LimitState::LimitUp);
        assert_eq!(board.limit_state(10.5, 10.0), LimitState::Free);
        assert_eq!(board.limit_state(9.01, 10.0), LimitState::LimitDown);
    }

    #[test]
    fn growth_board_has_wider_limits() {
        let board = Board::Growth;
        assert_eq!(board.limit_state(11.0, 10.0), LimitState::Free);
        assert_eq!(board.limit_state(12.0, 10.0), LimitState::LimitUp);
        assert_eq!(board.limit_state(8.0, 10.0), LimitState::LimitDown);
    }

    #[test]
    fn special_treatment_limits_at_five_percent() {
        let board = Board::SpecialTreatment;
        assert_eq!(board.limit_state(10.49, 10.0), LimitState::LimitUp);
        assert_eq!(board.limit_state(9.5, 10.0), LimitState::LimitDown);
        assert_eq!(board.limit_state(10.3, 10.0), LimitState::Free);
    }

    #[test]
    fn missing_prev_close_is_free() {
        assert_eq!(Board::Main.limit_state(11.0, 0.0), LimitState::Free);
        assert_eq!(Board::Main.limit_state(11.0, f64::NAN), LimitState::Free);
        assert_eq!(Board::Main.limit_state(f64::NAN, 10.0), LimitState::Free);
    }
}
