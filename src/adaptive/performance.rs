//! Trailing trade performance

use serde::{Deserialize, Serialize};

use super::types::TradeOutcome;

/// Reported profit factor when the window has wins but no losses
pub const PROFIT_FACTOR_CAP: f64 = 100.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceWindow {
    pub trade_count: usize,
    pub win_rate: f64,
    /// Gross profit / gross loss, capped at [`PROFIT_FACTOR_CAP`]
    pub profit_factor: f64,
    pub avg_win: f64,
    /// Magnitude of the average losing trade
    pub avg_loss: f64,
    /// Largest peak-to-trough drop of cumulative fractional return
    pub max_drawdown: f64,
    pub window_hours: u64,
}

impl PerformanceWindow {
    pub fn compute(trades: &[TradeOutcome], window_hours: u64) -> Self {
        if trades.is_empty() {
            return Self {
                window_hours,
                ..Default::default()
            };
        }

        let wins: Vec<f64> = trades.iter().filter(|t| t.is_win()).map(|t| t.pnl).collect();
        let losses: Vec<f64> = trades.iter().filter(|t| t.is_loss()).map(|t| -t.pnl).collect();

        let gross_profit: f64 = wins.iter().sum();
        let gross_loss: f64 = losses.iter().sum();

        let profit_factor = if gross_loss > 0.0 {
            (gross_profit / gross_loss).min(PROFIT_FACTOR_CAP)
        } else if gross_profit > 0.0 {
            PROFIT_FACTOR_CAP
        } else {
            0.0
        };

        Self {
            trade_count: trades.len(),
            win_rate: wins.len() as f64 / trades.len() as f64,
            profit_factor,
            avg_win: mean(&wins),
            avg_loss: mean(&losses),
            max_drawdown: max_drawdown(trades),
            window_hours,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Peak tracking over cumulative return, in close order
fn max_drawdown(trades: &[TradeOutcome]) -> f64 {
    let mut ordered: Vec<&TradeOutcome> = trades.iter().collect();
    ordered.sort_by_key(|t| t.closed_at);

    let mut cumulative = 0.0_f64;
    let mut peak = 0.0_f64;
    let mut worst = 0.0_f64;
    for trade in ordered {
        cumulative += trade.pnl_pct;
        peak = peak.max(cumulative);
        worst = worst.max(peak - cumulative);
    }
    worst
}
