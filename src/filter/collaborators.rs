//! External collaborator contracts
//!
//! The pipeline never fetches third-party data itself. Providers implement
//! these traits; every method returns `Result` so that an outage is always
//! distinguishable from a legitimate empty or zero answer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::filter::types::Signal;

/// One holder's share of supply, as a fraction in [0,1]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolderShare {
    pub address: String,
    pub share: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionHistory {
    pub wash_trading_score: f64,
    pub tx_frequency: f64,
    pub large_tx_count: u32,
    pub unique_traders: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidityLocks {
    pub is_locked: bool,
    /// Fraction of liquidity locked, [0,1]
    pub pct_locked: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LpBurn {
    /// Fraction of LP tokens burned, [0,1]
    pub rate: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityRevocation {
    pub mint_revoked: bool,
    pub freeze_revoked: bool,
    pub complete: bool,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HolderDistribution {
    pub top_share: f64,
    pub well_distributed: bool,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialAnalysis {
    pub total_mentions: u32,
    pub meets_requirement: bool,
    pub score: f64,
    pub sentiment: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HoneypotAnalysis {
    pub safe_for_sniping: bool,
    pub safety_score: f64,
    pub risk_level: String,
    pub can_buy: bool,
    pub can_sell: bool,
    pub confidence: f64,
}

/// On-chain token, holder and liquidity analytics
#[async_trait]
pub trait OnChainAnalytics: Send + Sync {
    async fn top_holders(&self, symbol: &str, n: usize) -> Result<Vec<HolderShare>>;

    async fn transaction_history(&self, symbol: &str) -> Result<TransactionHistory>;

    async fn liquidity_locks(&self, symbol: &str) -> Result<LiquidityLocks>;

    /// Token age in hours
    async fn token_age(&self, symbol: &str) -> Result<f64>;

    async fn lp_burn_rate(&self, symbol: &str) -> Result<LpBurn>;

    async fn authority_revocation(&self, symbol: &str) -> Result<AuthorityRevocation>;

    async fn holder_distribution(&self, symbol: &str) -> Result<HolderDistribution>;
}

/// Social mention analytics
#[async_trait]
pub trait SocialAnalytics: Send + Sync {
    async fn social_analysis(
        &self,
        symbol: &str,
        address: &str,
        min_mentions: u32,
    ) -> Result<SocialAnalysis>;
}

/// Honeypot / sellability analytics
#[async_trait]
pub trait HoneypotAnalytics: Send + Sync {
    async fn honeypot_analysis(&self, address: &str) -> Result<HoneypotAnalysis>;
}

/// Last-mile timeframe confirmation, opaque to the pipeline
#[async_trait]
pub trait ConfirmationFilter: Send + Sync {
    fn name(&self) -> &'static str {
        "confirmation"
    }

    async fn filter(&self, signals: Vec<Signal>) -> Vec<Signal>;
}

/// Await a collaborator call, converting an elapsed deadline into `Error::Timeout`
pub async fn with_timeout<T, F>(service: &str, timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            service: service.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
