//! Offline replay backend
//!
//! Serves collaborator answers from a JSON fixture file so a batch of
//! signals can be screened without any live provider. A token or field
//! missing from the fixtures is reported as an error, the same way a live
//! outage would be, so every failure policy is reachable from a fixture.
//!
//! ```json
//! {
//!   "tokens": {
//!     "PEPE": {
//!       "address": "PepeMint111",
//!       "age_hours": 72.0,
//!       "holders": [{ "address": "a", "share": 0.04 }],
//!       "lp_burn": { "rate": 0.98, "confidence": 0.9 }
//!     }
//!   }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::adaptive::{HistorySource, TradeOutcome};
use crate::error::{Error, Result};
use crate::filter::collaborators::{
    AuthorityRevocation, HolderDistribution, HolderShare, HoneypotAnalysis, HoneypotAnalytics,
    LiquidityLocks, LpBurn, OnChainAnalytics, SocialAnalysis, SocialAnalytics,
    TransactionHistory,
};

/// Recorded provider answers for one token
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenFixture {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub holders: Option<Vec<HolderShare>>,
    #[serde(default)]
    pub transactions: Option<TransactionHistory>,
    #[serde(default)]
    pub liquidity_locks: Option<LiquidityLocks>,
    #[serde(default)]
    pub age_hours: Option<f64>,
    #[serde(default)]
    pub lp_burn: Option<LpBurn>,
    #[serde(default)]
    pub authority: Option<AuthorityRevocation>,
    #[serde(default)]
    pub distribution: Option<HolderDistribution>,
    #[serde(default)]
    pub social: Option<SocialAnalysis>,
    #[serde(default)]
    pub honeypot: Option<HoneypotAnalysis>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    tokens: HashMap<String, TokenFixture>,
    #[serde(default)]
    trades: Vec<TradeOutcome>,
    #[serde(default)]
    prices: Vec<f64>,
}

/// JSON-backed implementation of every collaborator trait
#[derive(Debug, Clone, Default)]
pub struct FixtureAnalytics {
    tokens: HashMap<String, TokenFixture>,
    trades: Vec<TradeOutcome>,
    prices: Vec<f64>,
}

impl FixtureAnalytics {
    pub fn from_json(json: &str) -> Result<Self> {
        let file: FixtureFile = serde_json::from_str(json)?;
        Ok(Self {
            tokens: file.tokens,
            trades: file.trades,
            prices: file.prices,
        })
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await?;
        let fixtures = Self::from_json(&json)?;
        debug!(
            path = %path.display(),
            tokens = fixtures.tokens.len(),
            trades = fixtures.trades.len(),
            "Loaded replay fixtures"
        );
        Ok(fixtures)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Look a token up by symbol, falling back to its recorded address
    fn token(&self, key: &str) -> Result<&TokenFixture> {
        self.tokens
            .get(key)
            .or_else(|| {
                self.tokens
                    .values()
                    .find(|t| t.address.as_deref() == Some(key))
            })
            .ok_or_else(|| Error::NotFound(format!("fixture for {}", key)))
    }

    fn field<T: Clone>(&self, key: &str, name: &str, pick: impl Fn(&TokenFixture) -> Option<&T>) -> Result<T> {
        pick(self.token(key)?)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{} for {}", name, key)))
    }
}

#[async_trait]
impl OnChainAnalytics for FixtureAnalytics {
    async fn top_holders(&self, symbol: &str, n: usize) -> Result<Vec<HolderShare>> {
        let mut holders = self.field(symbol, "holders", |t| t.holders.as_ref())?;
        holders.sort_by(|a, b| b.share.total_cmp(&a.share));
        holders.truncate(n);
        Ok(holders)
    }

    async fn transaction_history(&self, symbol: &str) -> Result<TransactionHistory> {
        self.field(symbol, "transactions", |t| t.transactions.as_ref())
    }

    async fn liquidity_locks(&self, symbol: &str) -> Result<LiquidityLocks> {
        self.field(symbol, "liquidity_locks", |t| t.liquidity_locks.as_ref())
    }

    async fn token_age(&self, symbol: &str) -> Result<f64> {
        self.field(symbol, "age_hours", |t| t.age_hours.as_ref())
    }

    async fn lp_burn_rate(&self, symbol: &str) -> Result<LpBurn> {
        self.field(symbol, "lp_burn", |t| t.lp_burn.as_ref())
    }

    async fn authority_revocation(&self, symbol: &str) -> Result<AuthorityRevocation> {
        self.field(symbol, "authority", |t| t.authority.as_ref())
    }

    async fn holder_distribution(&self, symbol: &str) -> Result<HolderDistribution> {
        self.field(symbol, "distribution", |t| t.distribution.as_ref())
    }
}

#[async_trait]
impl SocialAnalytics for FixtureAnalytics {
    async fn social_analysis(&self, symbol: &str, address: &str, min_mentions: u32) -> Result<SocialAnalysis> {
        let key = if self.tokens.contains_key(symbol) { symbol } else { address };
        let mut social = self.field(key, "social", |t| t.social.as_ref())?;
        social.meets_requirement = social.total_mentions >= min_mentions;
        Ok(social)
    }
}

#[async_trait]
impl HoneypotAnalytics for FixtureAnalytics {
    async fn honeypot_analysis(&self, address: &str) -> Result<HoneypotAnalysis> {
        self.field(address, "honeypot", |t| t.honeypot.as_ref())
    }
}

#[async_trait]
impl HistorySource for FixtureAnalytics {
    async fn trade_outcomes(&self, since: chrono::DateTime<chrono::Utc>) -> Result<Vec<TradeOutcome>> {
        Ok(self
            .trades
            .iter()
            .filter(|t| t.closed_at >= since)
            .cloned()
            .collect())
    }

    async fn price_history(&self, limit: usize) -> Result<Vec<f64>> {
        if self.prices.is_empty() {
            return Err(Error::InsufficientHistory("no recorded prices".to_string()));
        }
        Ok(self.prices[self.prices.len().saturating_sub(limit)..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FIXTURES: &str = r#"{
        "tokens": {
            "PEPE": {
                "address": "PepeMint111",
                "age_hours": 72.0,
                "holders": [
                    { "address": "a", "share": 0.02 },
                    { "address": "b", "share": 0.08 },
                    { "address": "c", "share": 0.05 }
                ],
                "social": { "total_mentions": 12, "score": 0.6, "sentiment": 0.2, "confidence": 0.8 },
                "honeypot": { "safe_for_sniping": true, "safety_score": 0.9, "risk_level": "low",
                              "can_buy": true, "can_sell": true, "confidence": 0.9 }
            }
        },
        "prices": [1.0, 1.1, 1.2]
    }"#;

    #[test]
    fn test_lookup_by_symbol_and_address() {
        let fixtures = FixtureAnalytics::from_json(FIXTURES).unwrap();
        tokio_test::block_on(async {
            assert_eq!(fixtures.token_age("PEPE").await.unwrap(), 72.0);
            let honeypot = fixtures.honeypot_analysis("PepeMint111").await.unwrap();
            assert!(honeypot.can_sell);
        });
    }

    #[test]
    fn test_top_holders_sorted_and_truncated() {
        let fixtures = FixtureAnalytics::from_json(FIXTURES).unwrap();
        let holders = tokio_test::block_on(fixtures.top_holders("PEPE", 2)).unwrap();
        assert_eq!(holders.len(), 2);
        assert_eq!(holders[0].address, "b");
        assert_eq!(holders[1].address, "c");
    }

    #[test]
    fn test_missing_data_is_an_error() {
        let fixtures = FixtureAnalytics::from_json(FIXTURES).unwrap();
        tokio_test::block_on(async {
            assert!(matches!(fixtures.token_age("BONK").await, Err(Error::NotFound(_))));
            assert!(matches!(fixtures.lp_burn_rate("PEPE").await, Err(Error::NotFound(_))));
        });
    }

    #[test]
    fn test_social_requirement_recomputed() {
        let fixtures = FixtureAnalytics::from_json(FIXTURES).unwrap();
        tokio_test::block_on(async {
            assert!(fixtures.social_analysis("PEPE", "PepeMint111", 10).await.unwrap().meets_requirement);
            assert!(!fixtures.social_analysis("PEPE", "PepeMint111", 20).await.unwrap().meets_requirement);
        });
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FIXTURES.as_bytes()).unwrap();

        let fixtures = FixtureAnalytics::load(file.path()).await.unwrap();
        assert_eq!(fixtures.len(), 1);
        assert_eq!(fixtures.price_history(2).await.unwrap(), vec![1.1, 1.2]);
        assert!(fixtures.trade_outcomes(chrono::Utc::now()).await.unwrap().is_empty());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            FixtureAnalytics::from_json("{ not json"),
            Err(Error::Serialization(_))
        ));
    }
}
