//! Configuration for the pre-filter, quality filter and sniper gate

use serde::{Deserialize, Serialize};

/// Structural pre-filter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreFilterConfig {
    /// Symbols matching any of these regexes are treated as spam
    #[serde(default)]
    pub blocked_patterns: Vec<String>,
}

/// Heuristic quality filter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityFilterConfig {
    // Basic validation
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_min_liquidity")]
    pub min_liquidity: f64,
    #[serde(default = "default_min_volume")]
    pub min_volume: f64,

    // Per-symbol state
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
    #[serde(default = "default_max_signals_per_window")]
    pub max_signals_per_window: u32,

    // Volume quality
    #[serde(default = "default_min_volume_quality")]
    pub min_volume_quality: f64,
    #[serde(default = "default_min_avg_trade_size")]
    pub min_avg_trade_size: f64,
    #[serde(default = "default_min_volume_consistency")]
    pub min_volume_consistency: f64,
    #[serde(default = "default_max_volume_liquidity_ratio")]
    pub max_volume_liquidity_ratio: f64,

    // Liquidity depth / spikes
    #[serde(default = "default_min_liquidity_depth_ratio")]
    pub min_liquidity_depth_ratio: f64,
    #[serde(default = "default_max_volume_spike")]
    pub max_volume_spike: f64,

    // Fail-open external heuristics
    #[serde(default = "default_top_holders_count")]
    pub top_holders_count: usize,
    #[serde(default = "default_max_top_holder_share")]
    pub max_top_holder_share: f64,
    #[serde(default = "default_max_top_holders_combined_share")]
    pub max_top_holders_combined_share: f64,
    #[serde(default = "default_max_wash_trading_score")]
    pub max_wash_trading_score: f64,
    #[serde(default = "default_min_unique_traders")]
    pub min_unique_traders: u32,
    #[serde(default = "default_max_pump_dump_score")]
    pub max_pump_dump_score: f64,
    #[serde(default = "default_rsi_overbought")]
    pub rsi_overbought: f64,
    #[serde(default = "default_rsi_oversold")]
    pub rsi_oversold: f64,
    #[serde(default = "default_max_price_change_5m")]
    pub max_price_change_5m: f64,
    #[serde(default = "default_min_liquidity_locked")]
    pub min_liquidity_locked: f64,
    #[serde(default = "default_min_token_age_hours")]
    pub min_token_age_hours: f64,

    // Price manipulation
    #[serde(default = "default_max_target_stop_ratio")]
    pub max_target_stop_ratio: f64,
    #[serde(default = "default_min_stop_distance")]
    pub min_stop_distance: f64,
    #[serde(default = "default_max_stop_distance")]
    pub max_stop_distance: f64,
    #[serde(default = "default_round_number_penalty")]
    pub round_number_penalty: f64,

    /// Signals evaluated concurrently within one batch
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_min_confidence() -> f64 { 0.7 }
fn default_min_liquidity() -> f64 { 50_000.0 }
fn default_min_volume() -> f64 { 10_000.0 }
fn default_cooldown_secs() -> u64 { 300 }
fn default_rate_limit_window_secs() -> u64 { 3600 }
fn default_max_signals_per_window() -> u32 { 3 }
fn default_min_volume_quality() -> f64 { 0.5 }
fn default_min_avg_trade_size() -> f64 { 50.0 }
fn default_min_volume_consistency() -> f64 { 0.4 }
fn default_max_volume_liquidity_ratio() -> f64 { 5.0 }
fn default_min_liquidity_depth_ratio() -> f64 { 0.05 }
fn default_max_volume_spike() -> f64 { 10.0 }
fn default_top_holders_count() -> usize { 10 }
fn default_max_top_holder_share() -> f64 { 0.2 }
fn default_max_top_holders_combined_share() -> f64 { 0.6 }
fn default_max_wash_trading_score() -> f64 { 0.7 }
fn default_min_unique_traders() -> u32 { 20 }
fn default_max_pump_dump_score() -> f64 { 0.6 }
fn default_rsi_overbought() -> f64 { 80.0 }
fn default_rsi_oversold() -> f64 { 20.0 }
fn default_max_price_change_5m() -> f64 { 0.3 }
fn default_min_liquidity_locked() -> f64 { 0.5 }
fn default_min_token_age_hours() -> f64 { 1.0 }
fn default_max_target_stop_ratio() -> f64 { 10.0 }
fn default_min_stop_distance() -> f64 { 0.01 }
fn default_max_stop_distance() -> f64 { 0.5 }
fn default_round_number_penalty() -> f64 { 0.05 }
fn default_concurrency() -> usize { 16 }

impl Default for QualityFilterConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            min_liquidity: default_min_liquidity(),
            min_volume: default_min_volume(),
            cooldown_secs: default_cooldown_secs(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            max_signals_per_window: default_max_signals_per_window(),
            min_volume_quality: default_min_volume_quality(),
            min_avg_trade_size: default_min_avg_trade_size(),
            min_volume_consistency: default_min_volume_consistency(),
            max_volume_liquidity_ratio: default_max_volume_liquidity_ratio(),
            min_liquidity_depth_ratio: default_min_liquidity_depth_ratio(),
            max_volume_spike: default_max_volume_spike(),
            top_holders_count: default_top_holders_count(),
            max_top_holder_share: default_max_top_holder_share(),
            max_top_holders_combined_share: default_max_top_holders_combined_share(),
            max_wash_trading_score: default_max_wash_trading_score(),
            min_unique_traders: default_min_unique_traders(),
            max_pump_dump_score: default_max_pump_dump_score(),
            rsi_overbought: default_rsi_overbought(),
            rsi_oversold: default_rsi_oversold(),
            max_price_change_5m: default_max_price_change_5m(),
            min_liquidity_locked: default_min_liquidity_locked(),
            min_token_age_hours: default_min_token_age_hours(),
            max_target_stop_ratio: default_max_target_stop_ratio(),
            min_stop_distance: default_min_stop_distance(),
            max_stop_distance: default_max_stop_distance(),
            round_number_penalty: default_round_number_penalty(),
            concurrency: default_concurrency(),
        }
    }
}

/// Sniper safety gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SniperConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_min_lp_burn_rate")]
    pub min_lp_burn_rate: f64,
    #[serde(default = "default_true")]
    pub require_authority_revocation: bool,
    #[serde(default = "default_max_top_holder_share_sniper")]
    pub max_top_holder_share: f64,
    #[serde(default = "default_min_sniper_volume")]
    pub min_volume: f64,
    #[serde(default = "default_true")]
    pub social_enabled: bool,
    #[serde(default = "default_min_mentions")]
    pub min_mentions: u32,
    #[serde(default = "default_min_social_score")]
    pub min_social_score: f64,
    #[serde(default = "default_true")]
    pub honeypot_enabled: bool,
    #[serde(default = "default_min_honeypot_safety")]
    pub min_honeypot_safety: f64,
    /// Confidence at or above which a passed candidate is a "proceed"
    #[serde(default = "default_proceed_confidence")]
    pub proceed_confidence: f64,
}

fn default_true() -> bool { true }
fn default_min_lp_burn_rate() -> f64 { 0.9 }
fn default_max_top_holder_share_sniper() -> f64 { 0.3 }
fn default_min_sniper_volume() -> f64 { 5_000.0 }
fn default_min_mentions() -> u32 { 5 }
fn default_min_social_score() -> f64 { 0.3 }
fn default_min_honeypot_safety() -> f64 { 0.7 }
fn default_proceed_confidence() -> f64 { 0.7 }

impl Default for SniperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_lp_burn_rate: default_min_lp_burn_rate(),
            require_authority_revocation: true,
            max_top_holder_share: default_max_top_holder_share_sniper(),
            min_volume: default_min_sniper_volume(),
            social_enabled: true,
            min_mentions: default_min_mentions(),
            min_social_score: default_min_social_score(),
            honeypot_enabled: true,
            min_honeypot_safety: default_min_honeypot_safety(),
            proceed_confidence: default_proceed_confidence(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_defaults() {
        let config = QualityFilterConfig::default();
        assert_eq!(config.min_confidence, 0.7);
        assert_eq!(config.cooldown_secs, 300);
        assert!(config.concurrency > 0);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let parsed: SniperConfig = serde_json::from_str(r#"{"social_enabled": false}"#).unwrap();
        assert!(!parsed.social_enabled);
        assert!(parsed.honeypot_enabled);
        assert_eq!(parsed.min_lp_burn_rate, 0.9);
    }
}
