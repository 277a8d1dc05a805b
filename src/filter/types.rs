//! Core data types shared across the filtering pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Trade direction of a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Sell,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Buy => write!(f, "buy"),
            Action::Sell => write!(f, "sell"),
        }
    }
}

/// Candidate trading signal produced by an upstream strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub symbol: String,
    /// Token mint/contract address, used by social and honeypot lookups
    #[serde(default)]
    pub token_address: Option<String>,
    pub action: Action,
    pub confidence: f64,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub price_target: f64,
    pub stop_loss: f64,
    /// Reference price at signal time
    #[serde(default)]
    pub entry_price: Option<f64>,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub liquidity: f64,
    #[serde(default)]
    pub rsi: Option<f64>,
    #[serde(default)]
    pub support: Option<f64>,
    #[serde(default)]
    pub resistance: Option<f64>,
    #[serde(default)]
    pub source: String,

    // Well-known optional fields
    #[serde(default)]
    pub is_sniper_candidate: bool,
    #[serde(default)]
    pub price_change_5m: Option<f64>,
    #[serde(default)]
    pub sniper_analysis: Option<SniperAnalysis>,
    #[serde(default)]
    pub sniper_confidence: Option<f64>,

    /// Collaborator-specific annotations
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

fn default_timeframe() -> String {
    "5m".to_string()
}

impl Signal {
    /// Create a signal with neutral market data; use the `with_*` helpers to fill it in
    pub fn new(symbol: impl Into<String>, action: Action, confidence: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            token_address: None,
            action,
            confidence,
            timeframe: default_timeframe(),
            timestamp: Utc::now(),
            price_target: 0.0,
            stop_loss: 0.0,
            entry_price: None,
            volume: 0.0,
            liquidity: 0.0,
            rsi: None,
            support: None,
            resistance: None,
            source: String::new(),
            is_sniper_candidate: false,
            price_change_5m: None,
            sniper_analysis: None,
            sniper_confidence: None,
            extra: HashMap::new(),
        }
    }

    pub fn with_targets(mut self, price_target: f64, stop_loss: f64) -> Self {
        self.price_target = price_target;
        self.stop_loss = stop_loss;
        self
    }

    pub fn with_market(mut self, volume: f64, liquidity: f64) -> Self {
        self.volume = volume;
        self.liquidity = liquidity;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_sniper(mut self, token_address: impl Into<String>) -> Self {
        self.is_sniper_candidate = true;
        self.token_address = Some(token_address.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Address used for address-keyed lookups
    pub fn address(&self) -> &str {
        self.token_address.as_deref().unwrap_or(&self.symbol)
    }

    /// Read a numeric annotation from the extension map
    pub fn extra_f64(&self, key: &str) -> Option<f64> {
        self.extra.get(key).and_then(Value::as_f64)
    }
}

/// Whether a dependency failure lets a check pass or forces a rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckPolicy {
    /// Secondary heuristic: unavailable data passes with a neutral score
    FailOpen,
    /// Capital guard: unavailable data rejects with zero confidence
    FailClosed,
}

/// Score assigned to a fail-open check whose dependency was unavailable
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Uniform outcome of a single sub-check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub check: String,
    pub passed: bool,
    pub confidence_score: f64,
    pub reason: String,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub details: Value,
    pub policy: CheckPolicy,
    /// Produced by a dependency failure rather than real data
    #[serde(default)]
    pub degraded: bool,
}

impl CheckResult {
    pub fn pass(check: &str, confidence_score: f64, reason: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            passed: true,
            confidence_score,
            reason: reason.into(),
            metrics: BTreeMap::new(),
            details: Value::Null,
            policy: CheckPolicy::FailClosed,
            degraded: false,
        }
    }

    pub fn fail(check: &str, reason: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            passed: false,
            confidence_score: 0.0,
            reason: reason.into(),
            metrics: BTreeMap::new(),
            details: Value::Null,
            policy: CheckPolicy::FailClosed,
            degraded: false,
        }
    }

    /// Outcome of a check whose collaborator errored or timed out
    pub fn from_dependency_failure(
        check: &str,
        policy: CheckPolicy,
        error: &crate::error::Error,
    ) -> Self {
        let (passed, confidence_score, verdict) = match policy {
            CheckPolicy::FailOpen => (true, NEUTRAL_SCORE, "passing"),
            CheckPolicy::FailClosed => (false, 0.0, "rejecting"),
        };
        Self {
            check: check.to_string(),
            passed,
            confidence_score,
            reason: format!("{} unavailable ({}), {}", check, error, verdict),
            metrics: BTreeMap::new(),
            details: serde_json::json!({ "transient": error.is_retryable() }),
            policy,
            degraded: true,
        }
    }

    /// Passed only because a fail-open dependency was unavailable
    pub fn is_degraded_pass(&self) -> bool {
        self.passed && self.degraded && self.policy == CheckPolicy::FailOpen
    }

    /// Rejected only because a fail-closed dependency was unavailable
    pub fn is_forced_rejection(&self) -> bool {
        !self.passed && self.degraded && self.policy == CheckPolicy::FailClosed
    }

    pub fn with_policy(mut self, policy: CheckPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_metric(mut self, name: &str, value: f64) -> Self {
        self.metrics.insert(name.to_string(), value);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Sniper gate verdict for capital deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Proceed,
    Caution,
    Reject,
}

/// Summary of a passed sniper gate, attached to the signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SniperAnalysis {
    pub confidence_score: f64,
    pub recommendation: Recommendation,
    /// Sub-score per evaluated check
    pub scores: BTreeMap<String, f64>,
    pub checked_at: DateTime<Utc>,
}
