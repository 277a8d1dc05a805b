//! Market regime classifier
//!
//! Coarse classification of recent price behaviour from simple returns:
//! dispersion first (volatile), then average drift (trending up/down),
//! otherwise ranging.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum price points needed to classify
pub const MIN_PRICE_POINTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    TrendingUp,
    TrendingDown,
    Ranging,
    Volatile,
    Unknown,
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MarketRegime::TrendingUp => "trending_up",
            MarketRegime::TrendingDown => "trending_down",
            MarketRegime::Ranging => "ranging",
            MarketRegime::Volatile => "volatile",
            MarketRegime::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Classification result with the statistics behind it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeClassification {
    pub regime: MarketRegime,
    /// Population std-dev of simple returns
    pub volatility: f64,
    /// Mean simple return
    pub drift: f64,
    pub samples: usize,
}

impl RegimeClassification {
    fn unknown(samples: usize) -> Self {
        Self {
            regime: MarketRegime::Unknown,
            volatility: 0.0,
            drift: 0.0,
            samples,
        }
    }
}

pub struct RegimeClassifier {
    volatility_threshold: f64,
    trend_threshold: f64,
    window: usize,
}

impl RegimeClassifier {
    pub fn new(volatility_threshold: f64, trend_threshold: f64, window: usize) -> Self {
        Self {
            volatility_threshold,
            trend_threshold,
            window: window.max(MIN_PRICE_POINTS),
        }
    }

    /// Classify the trailing `window` prices (oldest first)
    pub fn classify(&self, prices: &[f64]) -> RegimeClassification {
        let recent = &prices[prices.len().saturating_sub(self.window)..];
        if recent.len() < MIN_PRICE_POINTS {
            return RegimeClassification::unknown(recent.len());
        }

        let returns: Vec<f64> = recent
            .windows(2)
            .filter(|w| w[0] > 0.0 && w[1].is_finite())
            .map(|w| w[1] / w[0] - 1.0)
            .collect();
        if returns.len() < MIN_PRICE_POINTS - 1 {
            return RegimeClassification::unknown(recent.len());
        }

        let n = returns.len() as f64;
        let drift = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - drift).powi(2)).sum::<f64>() / n;
        let volatility = variance.sqrt();

        let regime = if volatility > self.volatility_threshold {
            MarketRegime::Volatile
        } else if drift > self.trend_threshold {
            MarketRegime::TrendingUp
        } else if drift < -self.trend_threshold {
            MarketRegime::TrendingDown
        } else {
            MarketRegime::Ranging
        };

        RegimeClassification {
            regime,
            volatility,
            drift,
            samples: recent.len(),
        }
    }
}
