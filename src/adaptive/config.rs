//! Adaptation loop configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    // Cadence and anti-thrash limits
    /// Minimum time between two applied adjustments
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_adaptations_per_day")]
    pub max_adaptations_per_day: u32,
    /// How often the background loop wakes to evaluate `should_adapt`
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    // Trade window
    #[serde(default = "default_min_trades")]
    pub min_trades: usize,
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u64,

    // Rule thresholds
    #[serde(default = "default_low_win_rate")]
    pub low_win_rate: f64,
    #[serde(default = "default_high_win_rate")]
    pub high_win_rate: f64,
    #[serde(default = "default_min_profit_factor")]
    pub min_profit_factor: f64,
    #[serde(default = "default_max_drawdown")]
    pub max_drawdown: f64,

    // Regime classification
    #[serde(default = "default_volatility_threshold")]
    pub volatility_threshold: f64,
    #[serde(default = "default_trend_threshold")]
    pub trend_threshold: f64,
    #[serde(default = "default_regime_window")]
    pub regime_window: usize,

    // Safety limits
    /// Max absolute deviation of the confidence threshold from baseline
    #[serde(default = "default_confidence_band")]
    pub confidence_band: f64,
    #[serde(default = "default_min_position_multiplier")]
    pub min_position_multiplier: f64,
    #[serde(default = "default_max_position_multiplier")]
    pub max_position_multiplier: f64,
    #[serde(default = "default_baseline_max_positions")]
    pub baseline_max_positions: u32,
}

fn default_true() -> bool { true }
fn default_interval_secs() -> u64 { 3600 }
fn default_max_adaptations_per_day() -> u32 { 3 }
fn default_poll_interval_secs() -> u64 { 300 }
fn default_min_trades() -> usize { 20 }
fn default_lookback_hours() -> u64 { 24 }
fn default_low_win_rate() -> f64 { 0.40 }
fn default_high_win_rate() -> f64 { 0.70 }
fn default_min_profit_factor() -> f64 { 1.5 }
fn default_max_drawdown() -> f64 { 0.15 }
fn default_volatility_threshold() -> f64 { 0.05 }
fn default_trend_threshold() -> f64 { 0.01 }
fn default_regime_window() -> usize { 50 }
fn default_confidence_band() -> f64 { 0.10 }
fn default_min_position_multiplier() -> f64 { 0.25 }
fn default_max_position_multiplier() -> f64 { 1.5 }
fn default_baseline_max_positions() -> u32 { 5 }

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_secs: default_interval_secs(),
            max_adaptations_per_day: default_max_adaptations_per_day(),
            poll_interval_secs: default_poll_interval_secs(),
            min_trades: default_min_trades(),
            lookback_hours: default_lookback_hours(),
            low_win_rate: default_low_win_rate(),
            high_win_rate: default_high_win_rate(),
            min_profit_factor: default_min_profit_factor(),
            max_drawdown: default_max_drawdown(),
            volatility_threshold: default_volatility_threshold(),
            trend_threshold: default_trend_threshold(),
            regime_window: default_regime_window(),
            confidence_band: default_confidence_band(),
            min_position_multiplier: default_min_position_multiplier(),
            max_position_multiplier: default_max_position_multiplier(),
            baseline_max_positions: default_baseline_max_positions(),
        }
    }
}

impl AdaptationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Sanity check; returns a description of the first problem found
    pub fn validate(&self) -> std::result::Result<(), String> {
        for (name, value) in [
            ("low_win_rate", self.low_win_rate),
            ("high_win_rate", self.high_win_rate),
            ("min_profit_factor", self.min_profit_factor),
            ("max_drawdown", self.max_drawdown),
            ("volatility_threshold", self.volatility_threshold),
            ("trend_threshold", self.trend_threshold),
            ("confidence_band", self.confidence_band),
            ("min_position_multiplier", self.min_position_multiplier),
            ("max_position_multiplier", self.max_position_multiplier),
        ] {
            if !value.is_finite() {
                return Err(format!("{} must be finite, got {}", name, value));
            }
        }
        if self.low_win_rate >= self.high_win_rate {
            return Err(format!(
                "low_win_rate ({}) must be below high_win_rate ({})",
                self.low_win_rate, self.high_win_rate
            ));
        }
        if self.min_position_multiplier <= 0.0
            || self.min_position_multiplier > self.max_position_multiplier
        {
            return Err(format!(
                "position multiplier band [{}, {}] is invalid",
                self.min_position_multiplier, self.max_position_multiplier
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_band) {
            return Err(format!("confidence_band {} outside [0, 1]", self.confidence_band));
        }
        if !(1..=10).contains(&self.baseline_max_positions) {
            return Err(format!(
                "baseline_max_positions {} outside [1, 10]",
                self.baseline_max_positions
            ));
        }
        Ok(())
    }
}
