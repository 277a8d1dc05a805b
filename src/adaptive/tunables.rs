//! Shared tunable state written by the adaptation loop
//!
//! Readers take a snapshot (`Arc<TunableState>`); the writer publishes a new
//! immutable record with a single pointer swap, so a reader never sees a
//! half-updated set of multipliers.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Thresholds and multipliers consumed by the quality filter and strategy layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunableState {
    /// Added to the quality filter's baseline minimum confidence
    pub confidence_offset: f64,
    pub position_size_multiplier: f64,
    pub stop_loss_multiplier: f64,
    pub take_profit_multiplier: f64,
    pub max_positions: u32,
    /// Reason of the adjustment that produced this state; empty for baseline
    pub reason: String,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TunableState {
    /// Neutral state: no offset, unit multipliers
    pub fn baseline(max_positions: u32) -> Self {
        Self {
            confidence_offset: 0.0,
            position_size_multiplier: 1.0,
            stop_loss_multiplier: 1.0,
            take_profit_multiplier: 1.0,
            max_positions,
            reason: String::new(),
            updated_at: None,
        }
    }

    pub fn is_baseline(&self) -> bool {
        self.reason.is_empty()
    }
}

impl Default for TunableState {
    fn default() -> Self {
        Self::baseline(5)
    }
}

/// Cloneable handle to the published tunable state
#[derive(Clone)]
pub struct TunableHandle {
    current: Arc<RwLock<Arc<TunableState>>>,
}

impl TunableHandle {
    pub fn new(initial: TunableState) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(initial))),
        }
    }

    /// Snapshot of the current state
    pub fn load(&self) -> Arc<TunableState> {
        self.current.read().clone()
    }

    /// Publish a new state, returning the previous one
    pub fn publish(&self, state: TunableState) -> Arc<TunableState> {
        let next = Arc::new(state);
        std::mem::replace(&mut *self.current.write(), next)
    }
}

impl Default for TunableHandle {
    fn default() -> Self {
        Self::new(TunableState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_survives_publish() {
        let handle = TunableHandle::new(TunableState::baseline(5));
        let before = handle.load();

        let mut next = TunableState::baseline(3);
        next.position_size_multiplier = 0.5;
        next.reason = "high_drawdown".to_string();
        let previous = handle.publish(next);

        assert_eq!(previous.max_positions, 5);
        assert_eq!(before.position_size_multiplier, 1.0);
        assert_eq!(handle.load().position_size_multiplier, 0.5);
        assert!(!handle.load().is_baseline());
    }

    #[test]
    fn test_handles_share_state() {
        let handle = TunableHandle::default();
        let reader = handle.clone();
        let mut next = TunableState::default();
        next.confidence_offset = 0.05;
        handle.publish(next);
        assert_eq!(reader.load().confidence_offset, 0.05);
    }
}
