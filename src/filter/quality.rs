//! Heuristic quality filter
//!
//! Ordered, short-circuiting legitimacy checks, cheapest and most decisive
//! first:
//! 1. Basic validation (confidence, liquidity, volume floors)
//! 2. Per-symbol cooldown
//! 3. Per-symbol rate limit
//! 4. Volume quality score
//! 5. Liquidity depth and volume spike
//! 6. Holder concentration, wash trading, pump/dump, token age (fail-open)
//! 7. Price manipulation
//!
//! Sniper candidates then go through the [`SafetyGate`]. Evaluation only
//! computes a verdict; cooldown/rate-limit state and signal metadata are
//! written once the signal has passed everything.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::adaptive::tunables::TunableHandle;
use crate::error::Error;
use crate::filter::collaborators::{with_timeout, OnChainAnalytics};
use crate::filter::config::QualityFilterConfig;
use crate::filter::heuristics;
use crate::filter::sniper::{SafetyGate, SniperResult, SniperStats};
use crate::filter::symbol_state::SymbolState;
use crate::filter::types::{CheckPolicy, CheckResult, Signal};

/// Decision for one signal, computed without side effects
#[derive(Debug, Clone)]
pub struct QualityVerdict {
    pub passed: bool,
    /// Every check evaluated, in order; the last one decided a rejection
    pub checks: Vec<CheckResult>,
    pub sniper: Option<SniperResult>,
    /// Confidence after penalties, applied on acceptance
    pub adjusted_confidence: f64,
    pub quality_score: f64,
}

impl QualityVerdict {
    /// Check that caused the rejection, if any
    pub fn failed_check(&self) -> Option<&CheckResult> {
        if self.passed {
            None
        } else {
            self.checks.iter().rev().find(|c| !c.passed)
        }
    }
}

/// Cumulative quality filter statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityStats {
    pub evaluated: u64,
    pub passed: u64,
    pub rejected: u64,
    pub rejections_by_check: BTreeMap<String, u64>,
    /// Fail-open checks that passed because a dependency was unavailable
    pub degraded_checks: u64,
    /// Rejections forced by a fail-closed check whose dependency was unavailable
    pub dependency_rejections: u64,
}

/// Per-signal legitimacy filter with per-symbol state
pub struct QualityFilter {
    config: QualityFilterConfig,
    onchain: Arc<dyn OnChainAnalytics>,
    sniper: Option<SafetyGate>,
    state: SymbolState,
    tunables: TunableHandle,
    timeout: Duration,
    stats: Mutex<QualityStats>,
}

impl QualityFilter {
    pub fn new(
        config: QualityFilterConfig,
        onchain: Arc<dyn OnChainAnalytics>,
        tunables: TunableHandle,
        timeout: Duration,
    ) -> Self {
        let state = SymbolState::new(
            config.cooldown_secs,
            config.rate_limit_window_secs,
            config.max_signals_per_window,
        );
        Self {
            config,
            onchain,
            sniper: None,
            state,
            tunables,
            timeout,
            stats: Mutex::new(QualityStats::default()),
        }
    }

    /// Attach the sniper safety gate
    pub fn with_safety_gate(mut self, gate: SafetyGate) -> Self {
        self.sniper = Some(gate);
        self
    }

    /// Minimum confidence after the adaptation offset
    pub fn effective_min_confidence(&self) -> f64 {
        let offset = self.tunables.load().confidence_offset;
        (self.config.min_confidence + offset).clamp(0.0, 1.0)
    }

    /// Decide whether a signal is legitimate, recording cooldown/rate-limit state on acceptance
    pub async fn is_legitimate(&self, signal: &Signal) -> bool {
        let _guard = self.state.lock(&signal.symbol).await;
        let verdict = self.evaluate(signal).await;
        self.record(&verdict);
        if verdict.passed {
            self.state.commit(&signal.symbol, signal.timestamp);
        }
        verdict.passed
    }

    /// Filter a batch, preserving input order.
    ///
    /// Signals for the same symbol are evaluated sequentially in batch order;
    /// distinct symbols run concurrently.
    pub async fn filter(&self, signals: Vec<Signal>) -> Vec<Signal> {
        let mut group_index: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<Vec<(usize, Signal)>> = Vec::new();
        for (idx, signal) in signals.into_iter().enumerate() {
            let slot = *group_index.entry(signal.symbol.clone()).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push((idx, signal));
        }

        let mut accepted: Vec<(usize, Signal)> = stream::iter(groups)
            .map(|group| async move {
                let mut out = Vec::with_capacity(group.len());
                for (idx, signal) in group {
                    if let Some(signal) = self.screen(signal).await {
                        out.push((idx, signal));
                    }
                }
                out
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .flat_map(stream::iter)
            .collect()
            .await;

        accepted.sort_by_key(|(idx, _)| *idx);
        accepted.into_iter().map(|(_, signal)| signal).collect()
    }

    /// Evaluate, commit and enrich one signal
    async fn screen(&self, mut signal: Signal) -> Option<Signal> {
        let _guard = self.state.lock(&signal.symbol).await;
        let verdict = self.evaluate(&signal).await;
        self.record(&verdict);
        if !verdict.passed {
            return None;
        }

        self.state.commit(&signal.symbol, signal.timestamp);
        Self::apply_metadata(&mut signal, &verdict);
        Some(signal)
    }

    fn apply_metadata(signal: &mut Signal, verdict: &QualityVerdict) {
        signal.confidence = verdict.adjusted_confidence;
        signal
            .extra
            .insert("quality_score".to_string(), json!(verdict.quality_score));
        if let Some(sniper) = &verdict.sniper {
            signal.sniper_confidence = Some(sniper.confidence_score);
            signal.sniper_analysis = Some(sniper.analysis());
        }
    }

    /// Run every check in order.
    ///
    /// Leaves symbol state and quality statistics untouched; callers commit
    /// and record the verdict. The sniper gate still counts its own checks.
    pub async fn evaluate(&self, signal: &Signal) -> QualityVerdict {
        let min_confidence = self.effective_min_confidence();
        let mut checks = Vec::new();

        // 1-5: local checks, no collaborator calls
        let local = [
            heuristics::basic_validation(signal, min_confidence, &self.config),
            self.state.check_cooldown(&signal.symbol, signal.timestamp),
            self.state.check_rate_limit(&signal.symbol, signal.timestamp),
        ];
        for result in local {
            if !Self::push(&mut checks, result) {
                return self.reject(signal, checks, None);
            }
        }

        for result in [
            heuristics::volume_quality(signal, &self.config),
            heuristics::liquidity_depth(signal, &self.config),
            heuristics::volume_spike(signal, &self.config),
        ] {
            if !Self::push(&mut checks, result) {
                return self.reject(signal, checks, None);
            }
        }

        // 6: fail-open collaborator checks
        let holders = self.check_holder_concentration(signal).await;
        if !Self::push(&mut checks, holders) {
            return self.reject(signal, checks, None);
        }

        let wash = self.check_wash_trading(signal).await;
        if !Self::push(&mut checks, wash) {
            return self.reject(signal, checks, None);
        }

        let pump = self.check_pump_dump(signal).await;
        if !Self::push(&mut checks, pump) {
            return self.reject(signal, checks, None);
        }

        let age = self.check_token_age(signal).await;
        if !Self::push(&mut checks, age) {
            return self.reject(signal, checks, None);
        }

        // 7: price manipulation
        let manipulation = heuristics::price_manipulation(signal, min_confidence, &self.config);
        let adjusted_confidence = manipulation
            .metrics
            .get("adjusted_confidence")
            .copied()
            .unwrap_or(signal.confidence);
        if !Self::push(&mut checks, manipulation) {
            return self.reject(signal, checks, None);
        }

        // Sniper gate for flagged candidates
        let mut sniper = None;
        if signal.is_sniper_candidate {
            match &self.sniper {
                Some(gate) if gate.is_enabled() => {
                    let result = gate.check(signal).await;
                    let gate_check = if result.passed {
                        CheckResult::pass("sniper", result.confidence_score, result.reason.clone())
                    } else {
                        let mut failed = CheckResult::fail("sniper", result.reason.clone());
                        failed.degraded = result.checks.values().any(CheckResult::is_forced_rejection);
                        failed
                    };
                    let passed = Self::push(&mut checks, gate_check);
                    if !passed {
                        return self.reject(signal, checks, Some(result));
                    }
                    sniper = Some(result);
                }
                _ => {
                    debug!(symbol = %signal.symbol, "Sniper candidate but gate disabled, skipping");
                }
            }
        }

        let quality_score =
            checks.iter().map(|c| c.confidence_score).sum::<f64>() / checks.len() as f64;

        QualityVerdict {
            passed: true,
            checks,
            sniper,
            adjusted_confidence,
            quality_score,
        }
    }

    async fn check_holder_concentration(&self, signal: &Signal) -> CheckResult {
        let call = self
            .onchain
            .top_holders(&signal.symbol, self.config.top_holders_count);
        match with_timeout("top_holders", self.timeout, call).await {
            Ok(holders) => heuristics::holder_concentration(&holders, &self.config),
            Err(e) => self.fail_open("holder_concentration", signal, &e),
        }
    }

    async fn check_wash_trading(&self, signal: &Signal) -> CheckResult {
        let call = self.onchain.transaction_history(&signal.symbol);
        match with_timeout("transaction_history", self.timeout, call).await {
            Ok(history) => heuristics::wash_trading(&history, &self.config),
            Err(e) => self.fail_open("wash_trading", signal, &e),
        }
    }

    async fn check_pump_dump(&self, signal: &Signal) -> CheckResult {
        let call = self.onchain.liquidity_locks(&signal.symbol);
        let locks = match with_timeout("liquidity_locks", self.timeout, call).await {
            Ok(locks) => Some(locks),
            Err(e) => {
                warn!(
                    symbol = %signal.symbol,
                    error = %e,
                    "Liquidity lock lookup failed, scoring pump/dump without it"
                );
                None
            }
        };
        heuristics::pump_dump(signal, locks.as_ref(), &self.config)
    }

    async fn check_token_age(&self, signal: &Signal) -> CheckResult {
        let call = self.onchain.token_age(&signal.symbol);
        match with_timeout("token_age", self.timeout, call).await {
            Ok(hours) => heuristics::token_age(hours, &self.config),
            Err(e) => self.fail_open("token_age", signal, &e),
        }
    }

    fn fail_open(&self, check: &str, signal: &Signal, error: &Error) -> CheckResult {
        warn!(
            symbol = %signal.symbol,
            check = check,
            error = %error,
            transient = error.is_retryable(),
            "Dependency unavailable, failing open"
        );
        CheckResult::from_dependency_failure(check, CheckPolicy::FailOpen, error)
    }

    fn push(checks: &mut Vec<CheckResult>, result: CheckResult) -> bool {
        let passed = result.passed;
        checks.push(result);
        passed
    }

    fn reject(
        &self,
        signal: &Signal,
        checks: Vec<CheckResult>,
        sniper: Option<SniperResult>,
    ) -> QualityVerdict {
        if let Some(failed) = checks.last() {
            debug!(
                symbol = %signal.symbol,
                check = %failed.check,
                reason = %failed.reason,
                "Quality filter rejected signal"
            );
        }

        QualityVerdict {
            passed: false,
            checks,
            sniper,
            adjusted_confidence: signal.confidence,
            quality_score: 0.0,
        }
    }

    fn record(&self, verdict: &QualityVerdict) {
        let mut stats = self.stats.lock();
        stats.evaluated += 1;
        stats.degraded_checks += verdict
            .checks
            .iter()
            .filter(|c| c.is_degraded_pass())
            .count() as u64;
        if verdict.passed {
            stats.passed += 1;
        } else {
            stats.rejected += 1;
            if let Some(failed) = verdict.checks.last() {
                if failed.is_forced_rejection() {
                    stats.dependency_rejections += 1;
                }
                *stats
                    .rejections_by_check
                    .entry(failed.check.clone())
                    .or_insert(0) += 1;
            }
        }
    }

    /// Clear rate-limit windows and prune cooldowns older than an hour
    pub fn reset_state(&self, now: DateTime<Utc>) {
        self.state.reset(now);
        *self.stats.lock() = QualityStats::default();
        if let Some(gate) = &self.sniper {
            gate.reset_stats();
        }
    }

    pub fn stats(&self) -> QualityStats {
        self.stats.lock().clone()
    }

    pub fn sniper_stats(&self) -> Option<SniperStats> {
        self.sniper.as_ref().map(SafetyGate::stats)
    }

    pub fn symbol_state(&self) -> &SymbolState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive::tunables::TunableState;
    use crate::filter::config::SniperConfig;
    use crate::filter::sniper::tests::{MockHoneypot, MockOnChain, MockSocial};
    use crate::filter::types::Action;
    use chrono::Duration as ChronoDuration;

    fn good_signal(symbol: &str) -> Signal {
        Signal::new(symbol, Action::Buy, 0.85)
            .with_targets(1.37, 0.93)
            .with_market(20_000.0, 100_000.0)
    }

    fn filter_with(onchain: Arc<MockOnChain>) -> QualityFilter {
        QualityFilter::new(
            QualityFilterConfig::default(),
            onchain,
            TunableHandle::default(),
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn test_low_confidence_rejected_before_dependency_calls() {
        let onchain = Arc::new(MockOnChain::default());
        let filter = filter_with(onchain.clone());

        let mut signal = good_signal("PEPE");
        signal.confidence = 0.5;
        let verdict = filter.evaluate(&signal).await;

        assert!(!verdict.passed);
        let failed = verdict.failed_check().unwrap();
        assert_eq!(failed.check, "basic_validation");
        assert_eq!(failed.reason, "confidence 0.50 below minimum 0.70");
        assert_eq!(onchain.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cooldown_updates_only_on_acceptance() {
        let filter = filter_with(Arc::new(MockOnChain::default()));
        let t0 = Utc::now();

        // Rejected signal does not start a cooldown
        let mut weak = good_signal("BONK").with_timestamp(t0);
        weak.confidence = 0.1;
        assert!(!filter.is_legitimate(&weak).await);
        assert!(filter.symbol_state().last_accepted("BONK").is_none());

        let first = good_signal("BONK").with_timestamp(t0);
        assert!(filter.is_legitimate(&first).await);
        assert_eq!(filter.symbol_state().last_accepted("BONK"), Some(t0));

        let too_soon = good_signal("BONK").with_timestamp(t0 + ChronoDuration::seconds(299));
        assert!(!filter.is_legitimate(&too_soon).await);
        assert_eq!(filter.symbol_state().last_accepted("BONK"), Some(t0));

        let later = good_signal("BONK").with_timestamp(t0 + ChronoDuration::seconds(300));
        assert!(filter.is_legitimate(&later).await);
    }

    #[tokio::test]
    async fn test_rate_limit_per_symbol() {
        let config = QualityFilterConfig {
            cooldown_secs: 0,
            max_signals_per_window: 2,
            ..Default::default()
        };
        let filter = QualityFilter::new(
            config,
            Arc::new(MockOnChain::default()),
            TunableHandle::default(),
            Duration::from_millis(50),
        );
        let t0 = Utc::now();
        let batch: Vec<_> = (0..4)
            .map(|i| good_signal("WIF").with_timestamp(t0 + ChronoDuration::seconds(i)))
            .chain(std::iter::once(good_signal("POPCAT").with_timestamp(t0)))
            .collect();

        let passed = filter.filter(batch).await;
        let symbols: Vec<_> = passed.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["WIF", "WIF", "POPCAT"]);
        assert_eq!(filter.stats().rejections_by_check.get("rate_limit"), Some(&2));
    }

    #[tokio::test]
    async fn test_fail_open_on_dependency_error() {
        let filter = filter_with(Arc::new(MockOnChain::failing()));
        let verdict = filter.evaluate(&good_signal("PEPE")).await;

        assert!(verdict.passed);
        assert!(verdict.checks.iter().any(|c| c.degraded));

        assert!(filter.is_legitimate(&good_signal("PEPE")).await);
        // holder concentration, wash trading, pump/dump lock lookup, token age
        assert_eq!(filter.stats().degraded_checks, 4);
    }

    #[tokio::test]
    async fn test_fail_open_on_timeout() {
        let onchain = Arc::new(MockOnChain {
            age_delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let filter = filter_with(onchain);
        let verdict = filter.evaluate(&good_signal("PEPE")).await;

        assert!(verdict.passed);
        let age = verdict.checks.iter().find(|c| c.check == "token_age").unwrap();
        assert!(age.passed);
        assert!(age.degraded);
        assert!(age.reason.contains("timed out"));
    }

    #[tokio::test]
    async fn test_evaluate_leaves_state_and_stats_alone() {
        let filter = filter_with(Arc::new(MockOnChain::default()));
        let signal = good_signal("PEPE");

        assert!(filter.evaluate(&signal).await.passed);
        assert!(filter.evaluate(&signal).await.passed);
        assert_eq!(filter.stats().evaluated, 0);
        assert!(filter.symbol_state().last_accepted("PEPE").is_none());

        assert!(filter.is_legitimate(&signal).await);
        let stats = filter.stats();
        assert_eq!(stats.evaluated, 1);
        assert_eq!(stats.passed, 1);
    }

    #[tokio::test]
    async fn test_wash_trading_rejects() {
        let onchain = Arc::new(MockOnChain {
            wash_score: 0.9,
            ..Default::default()
        });
        let filter = filter_with(onchain);
        let verdict = filter.evaluate(&good_signal("PEPE")).await;
        assert!(!verdict.passed);
        assert_eq!(verdict.failed_check().unwrap().check, "wash_trading");
    }

    #[tokio::test]
    async fn test_young_token_rejected() {
        let onchain = Arc::new(MockOnChain {
            age_hours: 0.2,
            ..Default::default()
        });
        let filter = filter_with(onchain);
        assert!(!filter.is_legitimate(&good_signal("NEW")).await);
    }

    #[tokio::test]
    async fn test_non_candidate_bypasses_gate() {
        let onchain = Arc::new(MockOnChain::default());
        let gate = SafetyGate::new(
            SniperConfig::default(),
            onchain.clone(),
            Some(Arc::new(MockSocial { score: 0.9, fail: true })),
            Some(Arc::new(MockHoneypot { safety: 0.9, delay: None })),
            Duration::from_millis(50),
        )
        .unwrap();
        let gated = filter_with(onchain.clone()).with_safety_gate(gate);
        let plain = filter_with(Arc::new(MockOnChain::default()));

        let batch = vec![good_signal("PEPE"), good_signal("BONK")];
        let with_gate = gated.filter(batch.clone()).await;
        let without_gate = plain.filter(batch).await;

        let ids = |v: &[Signal]| v.iter().map(|s| s.id).collect::<Vec<_>>();
        assert_eq!(ids(&with_gate), ids(&without_gate));
        assert!(with_gate.iter().all(|s| s.sniper_analysis.is_none()));
        assert_eq!(gated.sniper_stats().unwrap().candidates, 0);
    }

    #[tokio::test]
    async fn test_sniper_pass_enriches_signal() {
        let onchain = Arc::new(MockOnChain::default());
        let gate = SafetyGate::new(
            SniperConfig::default(),
            onchain.clone(),
            Some(Arc::new(MockSocial { score: 0.6, fail: false })),
            Some(Arc::new(MockHoneypot { safety: 0.9, delay: None })),
            Duration::from_millis(50),
        )
        .unwrap();
        let filter = filter_with(onchain).with_safety_gate(gate);

        let passed = filter
            .filter(vec![good_signal("SNIPE").with_sniper("MintAddr")])
            .await;
        assert_eq!(passed.len(), 1);
        assert!(passed[0].sniper_analysis.is_some());
        assert!(passed[0].sniper_confidence.unwrap() > 0.0);
        assert!(passed[0].extra.contains_key("quality_score"));
    }

    #[tokio::test]
    async fn test_sniper_failure_leaves_signal_untouched() {
        let onchain = Arc::new(MockOnChain {
            lp_rate: 0.2,
            ..Default::default()
        });
        let gate = SafetyGate::new(
            SniperConfig::default(),
            onchain.clone(),
            Some(Arc::new(MockSocial { score: 0.6, fail: false })),
            Some(Arc::new(MockHoneypot { safety: 0.9, delay: None })),
            Duration::from_millis(50),
        )
        .unwrap();
        let filter = filter_with(onchain).with_safety_gate(gate);
        let signal = good_signal("SNIPE").with_sniper("MintAddr");

        let verdict = filter.evaluate(&signal).await;
        assert!(!verdict.passed);
        assert_eq!(verdict.failed_check().unwrap().check, "sniper");
        assert!(filter.symbol_state().last_accepted("SNIPE").is_none());
    }

    #[tokio::test]
    async fn test_unavailable_gate_dependency_counted_as_forced_rejection() {
        let onchain = Arc::new(MockOnChain::default());
        let gate = SafetyGate::new(
            SniperConfig::default(),
            onchain.clone(),
            Some(Arc::new(MockSocial { score: 0.6, fail: false })),
            Some(Arc::new(MockHoneypot {
                safety: 0.9,
                delay: Some(Duration::from_millis(200)),
            })),
            Duration::from_millis(10),
        )
        .unwrap();
        let filter = filter_with(onchain).with_safety_gate(gate);

        assert!(!filter.is_legitimate(&good_signal("SNIPE").with_sniper("MintAddr")).await);
        let stats = filter.stats();
        assert_eq!(stats.dependency_rejections, 1);
        assert_eq!(stats.degraded_checks, 0);
        assert_eq!(stats.rejections_by_check.get("sniper"), Some(&1));
    }

    #[tokio::test]
    async fn test_tunable_offset_raises_threshold() {
        let tunables = TunableHandle::default();
        let filter = QualityFilter::new(
            QualityFilterConfig::default(),
            Arc::new(MockOnChain::default()),
            tunables.clone(),
            Duration::from_millis(50),
        );
        let mut signal = good_signal("PEPE");
        signal.confidence = 0.72;
        assert!(filter.evaluate(&signal).await.passed);

        let mut raised = TunableState::default();
        raised.confidence_offset = 0.05;
        raised.reason = "low_win_rate".to_string();
        tunables.publish(raised);

        assert!((filter.effective_min_confidence() - 0.75).abs() < 1e-9);
        assert!(!filter.evaluate(&signal).await.passed);
    }

    #[tokio::test]
    async fn test_reset_clears_rate_limits() {
        let config = QualityFilterConfig {
            cooldown_secs: 0,
            max_signals_per_window: 1,
            ..Default::default()
        };
        let filter = QualityFilter::new(
            config,
            Arc::new(MockOnChain::default()),
            TunableHandle::default(),
            Duration::from_millis(50),
        );
        let now = Utc::now();
        assert!(filter.is_legitimate(&good_signal("WIF").with_timestamp(now)).await);
        assert!(!filter.is_legitimate(&good_signal("WIF").with_timestamp(now)).await);

        filter.reset_state(now);
        assert!(filter.is_legitimate(&good_signal("WIF").with_timestamp(now)).await);
        assert_eq!(filter.stats().evaluated, 1);
    }
}
