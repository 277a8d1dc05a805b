//! Structural pre-filter
//!
//! Cheap validation that runs before any expensive stage: drops malformed,
//! spam-named and duplicate signals without touching any collaborator.

use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

use crate::error::{Error, Result};
use crate::filter::config::PreFilterConfig;
use crate::filter::types::{Action, Signal};

/// Reason why a signal was dropped by the pre-filter
#[derive(Debug, Clone, PartialEq)]
pub enum PreFilterReason {
    EmptySymbol,
    BlockedSymbol(String),
    NonPositiveTarget(f64),
    NonPositiveStopLoss(f64),
    ConfidenceOutOfRange(f64),
    NonFiniteMarket { volume: f64, liquidity: f64 },
    Duplicate,
}

impl std::fmt::Display for PreFilterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreFilterReason::EmptySymbol => write!(f, "empty symbol"),
            PreFilterReason::BlockedSymbol(pattern) => {
                write!(f, "symbol matches blocked pattern: {}", pattern)
            }
            PreFilterReason::NonPositiveTarget(v) => write!(f, "price target {} not positive", v),
            PreFilterReason::NonPositiveStopLoss(v) => write!(f, "stop loss {} not positive", v),
            PreFilterReason::ConfidenceOutOfRange(v) => {
                write!(f, "confidence {} outside [0, 1]", v)
            }
            PreFilterReason::NonFiniteMarket { volume, liquidity } => {
                write!(f, "volume {} / liquidity {} not finite", volume, liquidity)
            }
            PreFilterReason::Duplicate => write!(f, "duplicate signal in batch"),
        }
    }
}

/// Structural validator for incoming batches
pub struct PreFilter {
    blocked_patterns: Vec<Regex>,
}

impl PreFilter {
    /// Create a pre-filter, compiling blocked symbol patterns up front
    pub fn new(config: &PreFilterConfig) -> Result<Self> {
        let blocked_patterns = config
            .blocked_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::InvalidRegex(e.to_string()))?;

        Ok(Self { blocked_patterns })
    }

    /// Validate a single signal in isolation
    pub fn validate(&self, signal: &Signal) -> std::result::Result<(), PreFilterReason> {
        if signal.symbol.trim().is_empty() {
            return Err(PreFilterReason::EmptySymbol);
        }

        for pattern in &self.blocked_patterns {
            if pattern.is_match(&signal.symbol) {
                return Err(PreFilterReason::BlockedSymbol(pattern.to_string()));
            }
        }

        // `!(x > 0.0)` also catches NaN
        if !(signal.price_target > 0.0) || !signal.price_target.is_finite() {
            return Err(PreFilterReason::NonPositiveTarget(signal.price_target));
        }
        if !(signal.stop_loss > 0.0) || !signal.stop_loss.is_finite() {
            return Err(PreFilterReason::NonPositiveStopLoss(signal.stop_loss));
        }

        if !(0.0..=1.0).contains(&signal.confidence) {
            return Err(PreFilterReason::ConfidenceOutOfRange(signal.confidence));
        }

        if !signal.volume.is_finite() || !signal.liquidity.is_finite() {
            return Err(PreFilterReason::NonFiniteMarket {
                volume: signal.volume,
                liquidity: signal.liquidity,
            });
        }

        Ok(())
    }

    /// Partition a batch into surviving signals and a rejection count
    pub fn process(&self, signals: Vec<Signal>) -> (Vec<Signal>, usize) {
        let input = signals.len();
        let mut seen: HashSet<(String, Action, String, i64)> = HashSet::with_capacity(input);
        let mut passed = Vec::with_capacity(input);

        for signal in signals {
            let verdict = self.validate(&signal).and_then(|_| {
                let key = (
                    signal.symbol.clone(),
                    signal.action,
                    signal.timeframe.clone(),
                    signal.timestamp.timestamp_millis(),
                );
                if seen.insert(key) {
                    Ok(())
                } else {
                    Err(PreFilterReason::Duplicate)
                }
            });

            match verdict {
                Ok(()) => passed.push(signal),
                Err(reason) => {
                    debug!(symbol = %signal.symbol, reason = %reason, "Pre-filter rejected signal");
                }
            }
        }

        let rejected = input - passed.len();
        (passed, rejected)
    }
}
