//! Sniper safety gate
//!
//! Extra on-chain, social and honeypot checks for signals flagged as sniper
//! candidates. Every gate is fail-closed: a collaborator error or timeout
//! rejects with zero confidence, because these checks guard capital
//! deployment directly.
//!
//! Order (short-circuiting):
//! 1. LP burn rate
//! 2. Authority revocation (if required)
//! 3. Top-holder share
//! 4. Active volume
//! 5. Social mentions (if enabled)
//! 6. Honeypot safety (if enabled)

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::filter::collaborators::{
    with_timeout, HoneypotAnalytics, OnChainAnalytics, SocialAnalytics,
};
use crate::filter::config::SniperConfig;
use crate::filter::types::{CheckPolicy, CheckResult, Recommendation, Signal, SniperAnalysis};

/// Outcome of the sniper gate for one candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SniperResult {
    pub passed: bool,
    pub reason: String,
    pub confidence_score: f64,
    pub recommendation: Recommendation,
    /// Results of the checks actually evaluated, keyed by check name
    pub checks: BTreeMap<String, CheckResult>,
}

impl SniperResult {
    /// Summary attached to an accepted signal
    pub fn analysis(&self) -> SniperAnalysis {
        SniperAnalysis {
            confidence_score: self.confidence_score,
            recommendation: self.recommendation,
            scores: self
                .checks
                .iter()
                .map(|(name, r)| (name.clone(), r.confidence_score))
                .collect(),
            checked_at: Utc::now(),
        }
    }
}

/// Cumulative sniper gate statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SniperStats {
    pub candidates: u64,
    pub passed: u64,
    pub rejected: u64,
    pub rejections_by_check: BTreeMap<String, u64>,
    /// Rejections forced by an unavailable dependency rather than bad data
    pub dependency_rejections: u64,
    pub avg_pass_confidence: f64,
}

impl SniperStats {
    pub fn pass_rate(&self) -> f64 {
        if self.candidates == 0 {
            0.0
        } else {
            self.passed as f64 / self.candidates as f64
        }
    }
}

/// Conditional safety gate nested in the quality filter
pub struct SafetyGate {
    config: SniperConfig,
    onchain: Arc<dyn OnChainAnalytics>,
    social: Option<Arc<dyn SocialAnalytics>>,
    honeypot: Option<Arc<dyn HoneypotAnalytics>>,
    timeout: Duration,
    stats: Mutex<SniperStats>,
}

impl SafetyGate {
    /// Create a gate; enabling a check without its collaborator is a configuration error
    pub fn new(
        config: SniperConfig,
        onchain: Arc<dyn OnChainAnalytics>,
        social: Option<Arc<dyn SocialAnalytics>>,
        honeypot: Option<Arc<dyn HoneypotAnalytics>>,
        timeout: Duration,
    ) -> Result<Self> {
        if config.social_enabled && social.is_none() {
            return Err(Error::Config(
                "sniper.social_enabled requires a social analytics client".to_string(),
            ));
        }
        if config.honeypot_enabled && honeypot.is_none() {
            return Err(Error::Config(
                "sniper.honeypot_enabled requires a honeypot analytics client".to_string(),
            ));
        }

        Ok(Self {
            config,
            onchain,
            social,
            honeypot,
            timeout,
            stats: Mutex::new(SniperStats::default()),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Run the ordered gate checks for a candidate
    pub async fn check(&self, signal: &Signal) -> SniperResult {
        let mut checks = BTreeMap::new();

        let lp = self.check_lp_burn(signal).await;
        if !Self::record(&mut checks, lp) {
            return self.reject(signal, checks);
        }

        if self.config.require_authority_revocation {
            let authority = self.check_authority(signal).await;
            if !Self::record(&mut checks, authority) {
                return self.reject(signal, checks);
            }
        }

        let holders = self.check_holder_distribution(signal).await;
        if !Self::record(&mut checks, holders) {
            return self.reject(signal, checks);
        }

        let volume = self.check_volume(signal);
        if !Self::record(&mut checks, volume) {
            return self.reject(signal, checks);
        }

        if self.config.social_enabled {
            if let Some(social) = &self.social {
                let result = self.check_social(social.as_ref(), signal).await;
                if !Self::record(&mut checks, result) {
                    return self.reject(signal, checks);
                }
            }
        }

        if self.config.honeypot_enabled {
            if let Some(honeypot) = &self.honeypot {
                let result = self.check_honeypot(honeypot.as_ref(), signal).await;
                if !Self::record(&mut checks, result) {
                    return self.reject(signal, checks);
                }
            }
        }

        self.approve(signal, checks)
    }

    async fn check_lp_burn(&self, signal: &Signal) -> CheckResult {
        let check = "lp_burn";
        match with_timeout(check, self.timeout, self.onchain.lp_burn_rate(&signal.symbol)).await {
            Ok(lp) if lp.rate >= self.config.min_lp_burn_rate => {
                CheckResult::pass(check, lp.confidence, format!("{:.0}% LP burned", lp.rate * 100.0))
                    .with_metric("rate", lp.rate)
            }
            Ok(lp) => CheckResult::fail(
                check,
                format!(
                    "LP burn {:.0}% below {:.0}%",
                    lp.rate * 100.0,
                    self.config.min_lp_burn_rate * 100.0
                ),
            )
            .with_metric("rate", lp.rate),
            Err(e) => CheckResult::from_dependency_failure(check, CheckPolicy::FailClosed, &e),
        }
    }

    async fn check_authority(&self, signal: &Signal) -> CheckResult {
        let check = "authority";
        match with_timeout(check, self.timeout, self.onchain.authority_revocation(&signal.symbol))
            .await
        {
            Ok(auth) if auth.complete => {
                CheckResult::pass(check, auth.confidence, "mint and freeze authority revoked")
            }
            Ok(auth) => CheckResult::fail(
                check,
                format!(
                    "authority not revoked (mint: {}, freeze: {})",
                    auth.mint_revoked, auth.freeze_revoked
                ),
            )
            .with_details(json!({
                "mint_revoked": auth.mint_revoked,
                "freeze_revoked": auth.freeze_revoked,
            })),
            Err(e) => CheckResult::from_dependency_failure(check, CheckPolicy::FailClosed, &e),
        }
    }

    async fn check_holder_distribution(&self, signal: &Signal) -> CheckResult {
        let check = "holder_distribution";
        match with_timeout(check, self.timeout, self.onchain.holder_distribution(&signal.symbol))
            .await
        {
            Ok(dist) if dist.top_share <= self.config.max_top_holder_share => CheckResult::pass(
                check,
                dist.confidence,
                format!("top holder {:.1}%", dist.top_share * 100.0),
            )
            .with_metric("top_share", dist.top_share),
            Ok(dist) => CheckResult::fail(
                check,
                format!(
                    "top holder {:.1}% exceeds {:.1}%",
                    dist.top_share * 100.0,
                    self.config.max_top_holder_share * 100.0
                ),
            )
            .with_metric("top_share", dist.top_share),
            Err(e) => CheckResult::from_dependency_failure(check, CheckPolicy::FailClosed, &e),
        }
    }

    fn check_volume(&self, signal: &Signal) -> CheckResult {
        let check = "volume";
        let result = if signal.volume >= self.config.min_volume {
            let score = (signal.volume / (self.config.min_volume * 2.0)).min(1.0);
            CheckResult::pass(check, score, format!("volume {:.0}", signal.volume))
        } else {
            CheckResult::fail(
                check,
                format!(
                    "volume {:.0} below sniper minimum {:.0}",
                    signal.volume, self.config.min_volume
                ),
            )
        };
        result.with_metric("volume", signal.volume)
    }

    async fn check_social(&self, social: &dyn SocialAnalytics, signal: &Signal) -> CheckResult {
        let check = "social";
        let call = social.social_analysis(&signal.symbol, signal.address(), self.config.min_mentions);
        match with_timeout(check, self.timeout, call).await {
            Ok(s) if s.meets_requirement && s.score >= self.config.min_social_score => {
                CheckResult::pass(check, s.score, format!("{} mentions", s.total_mentions))
                    .with_metric("mentions", s.total_mentions as f64)
                    .with_metric("sentiment", s.sentiment)
            }
            Ok(s) => CheckResult::fail(
                check,
                format!(
                    "{} mentions, score {:.2} (need {} mentions, score {:.2})",
                    s.total_mentions, s.score, self.config.min_mentions, self.config.min_social_score
                ),
            )
            .with_metric("mentions", s.total_mentions as f64),
            Err(e) => CheckResult::from_dependency_failure(check, CheckPolicy::FailClosed, &e),
        }
    }

    async fn check_honeypot(&self, honeypot: &dyn HoneypotAnalytics, signal: &Signal) -> CheckResult {
        let check = "honeypot";
        match with_timeout(check, self.timeout, honeypot.honeypot_analysis(signal.address())).await {
            Ok(h) if h.safe_for_sniping
                && h.can_sell
                && h.safety_score >= self.config.min_honeypot_safety =>
            {
                CheckResult::pass(check, h.safety_score, format!("risk level {}", h.risk_level))
                    .with_metric("safety_score", h.safety_score)
            }
            Ok(h) => CheckResult::fail(
                check,
                format!(
                    "honeypot risk {} (safety {:.2}, can_sell: {})",
                    h.risk_level, h.safety_score, h.can_sell
                ),
            )
            .with_metric("safety_score", h.safety_score),
            Err(e) => CheckResult::from_dependency_failure(check, CheckPolicy::FailClosed, &e),
        }
    }

    /// Store a check result, returning whether it passed
    fn record(checks: &mut BTreeMap<String, CheckResult>, result: CheckResult) -> bool {
        let passed = result.passed;
        checks.insert(result.check.clone(), result.with_policy(CheckPolicy::FailClosed));
        passed
    }

    fn reject(&self, signal: &Signal, checks: BTreeMap<String, CheckResult>) -> SniperResult {
        let failed = checks.values().find(|r| !r.passed);
        let forced = failed.is_some_and(CheckResult::is_forced_rejection);
        let (check, reason) = failed
            .map(|r| (r.check.clone(), r.reason.clone()))
            .unwrap_or_else(|| ("unknown".to_string(), "rejected".to_string()));

        {
            let mut stats = self.stats.lock();
            stats.candidates += 1;
            stats.rejected += 1;
            if forced {
                stats.dependency_rejections += 1;
            }
            *stats.rejections_by_check.entry(check.clone()).or_insert(0) += 1;
        }

        debug!(symbol = %signal.symbol, check = %check, reason = %reason, "Sniper gate rejected");

        SniperResult {
            passed: false,
            reason,
            confidence_score: 0.0,
            recommendation: Recommendation::Reject,
            checks,
        }
    }

    fn approve(&self, signal: &Signal, checks: BTreeMap<String, CheckResult>) -> SniperResult {
        let confidence = if checks.is_empty() {
            0.0
        } else {
            checks.values().map(|r| r.confidence_score).sum::<f64>() / checks.len() as f64
        };
        let recommendation = if confidence >= self.config.proceed_confidence {
            Recommendation::Proceed
        } else {
            Recommendation::Caution
        };

        {
            let mut stats = self.stats.lock();
            stats.candidates += 1;
            stats.passed += 1;
            let n = stats.passed as f64;
            stats.avg_pass_confidence += (confidence - stats.avg_pass_confidence) / n;
        }

        info!(
            symbol = %signal.symbol,
            confidence = %format!("{:.2}", confidence),
            recommendation = ?recommendation,
            checks = checks.len(),
            "Sniper gate passed"
        );

        SniperResult {
            passed: true,
            reason: format!("all {} sniper checks passed", checks.len()),
            confidence_score: confidence,
            recommendation,
            checks,
        }
    }

    pub fn stats(&self) -> SniperStats {
        self.stats.lock().clone()
    }

    pub fn reset_stats(&self) {
        *self.stats.lock() = SniperStats::default();
    }
}
