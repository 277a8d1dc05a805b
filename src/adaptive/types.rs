//! Adaptation loop inputs and outputs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A closed trade, as reported by the strategy layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub symbol: String,
    /// Realized P&L in quote currency
    pub pnl: f64,
    /// Fractional return on the position (0.1 = +10%)
    pub pnl_pct: f64,
    pub closed_at: DateTime<Utc>,
}

impl TradeOutcome {
    pub fn new(symbol: impl Into<String>, pnl: f64, pnl_pct: f64, closed_at: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            pnl,
            pnl_pct,
            closed_at,
        }
    }

    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn is_loss(&self) -> bool {
        self.pnl < 0.0
    }
}

/// One adaptation cycle's output, relative to the neutral baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentRecord {
    /// Added to the baseline minimum confidence
    pub confidence_delta: f64,
    pub position_size_multiplier: f64,
    pub stop_loss_multiplier: f64,
    pub take_profit_multiplier: f64,
    /// Added to the baseline max concurrent positions
    pub max_positions_delta: i32,
    /// Comma-separated rule tags; empty means nothing to change
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl AdjustmentRecord {
    /// Neutral record: no delta, unit multipliers, empty reason
    pub fn none(timestamp: DateTime<Utc>) -> Self {
        Self {
            confidence_delta: 0.0,
            position_size_multiplier: 1.0,
            stop_loss_multiplier: 1.0,
            take_profit_multiplier: 1.0,
            max_positions_delta: 0,
            reason: String::new(),
            timestamp,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.reason.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.reason.split(", ").filter(|t| !t.is_empty())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags().any(|t| t == tag)
    }

    pub(crate) fn push_tag(&mut self, tag: &str) {
        if !self.reason.is_empty() {
            self.reason.push_str(", ");
        }
        self.reason.push_str(tag);
    }
}
