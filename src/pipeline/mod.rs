//! Pipeline orchestrator
//!
//! Sequences pre-filter → quality filter (with nested sniper gate) → final
//! confirmation, records per-stage counts and tracks latency against a soft
//! budget. The budget is observability only: a slow batch is logged, never
//! cut short.

pub mod stats;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::adaptive::tunables::TunableHandle;
use crate::config::Config;
use crate::error::Result;
use crate::filter::collaborators::{
    ConfirmationFilter, HoneypotAnalytics, OnChainAnalytics, SocialAnalytics,
};
use crate::filter::pre_filter::PreFilter;
use crate::filter::quality::{QualityFilter, QualityStats};
use crate::filter::sniper::{SafetyGate, SniperStats};
use crate::filter::types::Signal;

pub use stats::{BatchReport, HealthStatus, PipelineHealth, PipelineStats, StageStats};

pub const STAGE_PRE_FILTER: &str = "pre_filter";
pub const STAGE_QUALITY: &str = "quality";
pub const STAGE_CONFIRMATION: &str = "confirmation";

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Soft per-batch latency budget
    #[serde(default = "default_latency_budget_ms")]
    pub latency_budget_ms: u64,
    /// Share of the budget granted to each collaborator call
    #[serde(default = "default_dependency_timeout_fraction")]
    pub dependency_timeout_fraction: f64,
    #[serde(default = "default_target_rejection_min")]
    pub target_rejection_min: f64,
    #[serde(default = "default_target_rejection_max")]
    pub target_rejection_max: f64,
}

fn default_latency_budget_ms() -> u64 { 100 }
fn default_dependency_timeout_fraction() -> f64 { 0.5 }
fn default_target_rejection_min() -> f64 { 0.90 }
fn default_target_rejection_max() -> f64 { 0.95 }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            latency_budget_ms: default_latency_budget_ms(),
            dependency_timeout_fraction: default_dependency_timeout_fraction(),
            target_rejection_min: default_target_rejection_min(),
            target_rejection_max: default_target_rejection_max(),
        }
    }
}

impl PipelineConfig {
    pub fn latency_budget(&self) -> Duration {
        Duration::from_millis(self.latency_budget_ms)
    }

    /// Per-call collaborator timeout derived from the soft budget
    pub fn dependency_timeout(&self) -> Duration {
        let ms = (self.latency_budget_ms as f64 * self.dependency_timeout_fraction).max(1.0);
        Duration::from_millis(ms as u64)
    }
}

/// External collaborators wired into the pipeline
#[derive(Clone)]
pub struct Collaborators {
    pub onchain: Arc<dyn OnChainAnalytics>,
    pub social: Option<Arc<dyn SocialAnalytics>>,
    pub honeypot: Option<Arc<dyn HoneypotAnalytics>>,
    pub confirmation: Option<Arc<dyn ConfirmationFilter>>,
}

/// Multi-stage signal screening pipeline
pub struct Pipeline {
    config: PipelineConfig,
    pre_filter: PreFilter,
    quality: QualityFilter,
    confirmation: Option<Arc<dyn ConfirmationFilter>>,
    stats: Mutex<PipelineStats>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, pre_filter: PreFilter, quality: QualityFilter) -> Self {
        Self {
            config,
            pre_filter,
            quality,
            confirmation: None,
            stats: Mutex::new(PipelineStats::default()),
        }
    }

    /// Wire every stage from configuration. Invalid configuration is the only fatal error.
    pub fn build(config: &Config, collaborators: Collaborators, tunables: TunableHandle) -> Result<Self> {
        let timeout = config.pipeline.dependency_timeout();
        let pre_filter = PreFilter::new(&config.pre_filter)?;

        let mut quality = QualityFilter::new(
            config.quality.clone(),
            collaborators.onchain.clone(),
            tunables,
            timeout,
        );
        if config.sniper.enabled {
            let gate = SafetyGate::new(
                config.sniper.clone(),
                collaborators.onchain,
                collaborators.social,
                collaborators.honeypot,
                timeout,
            )?;
            quality = quality.with_safety_gate(gate);
        }

        let mut pipeline = Self::new(config.pipeline.clone(), pre_filter, quality);
        if let Some(confirmation) = collaborators.confirmation {
            pipeline = pipeline.with_confirmation(confirmation);
        }

        info!(
            budget_ms = config.pipeline.latency_budget_ms,
            dependency_timeout_ms = timeout.as_millis() as u64,
            sniper_gate = config.sniper.enabled,
            "Signal pipeline ready"
        );
        Ok(pipeline)
    }

    pub fn with_confirmation(mut self, confirmation: Arc<dyn ConfirmationFilter>) -> Self {
        self.confirmation = Some(confirmation);
        self
    }

    /// Screen a batch, returning approved signals
    pub async fn run(&self, signals: Vec<Signal>) -> Vec<Signal> {
        self.run_with_report(signals).await.0
    }

    /// Screen a batch, returning approved signals and the batch report
    pub async fn run_with_report(&self, signals: Vec<Signal>) -> (Vec<Signal>, BatchReport) {
        let start = Instant::now();
        let input = signals.len();
        let mut stages = Vec::with_capacity(3);

        // Stage 1: structural pre-filter
        let (signals, _) = self.pre_filter.process(signals);
        stages.push(Self::stage(STAGE_PRE_FILTER, input, signals.len()));

        // Stage 2: quality filter + sniper gate
        let quality_input = signals.len();
        let signals = self.quality.filter(signals).await;
        stages.push(Self::stage(STAGE_QUALITY, quality_input, signals.len()));

        // Stage 3: external confirmation
        let confirmation_input = signals.len();
        let signals = match &self.confirmation {
            Some(confirmation) => {
                let mut confirmed = confirmation.filter(signals).await;
                if confirmed.len() > confirmation_input {
                    warn!(
                        filter = confirmation.name(),
                        input = confirmation_input,
                        output = confirmed.len(),
                        "Confirmation filter returned more signals than it received, truncating"
                    );
                    confirmed.truncate(confirmation_input);
                }
                confirmed
            }
            None => signals,
        };
        stages.push(Self::stage(STAGE_CONFIRMATION, confirmation_input, signals.len()));

        let elapsed = start.elapsed();
        let over_budget = elapsed > self.config.latency_budget();
        let report = BatchReport {
            input,
            approved: signals.len(),
            stages,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
            over_budget,
        };

        if over_budget {
            warn!(
                elapsed_ms = %format!("{:.1}", report.elapsed_ms),
                budget_ms = self.config.latency_budget_ms,
                input,
                "Pipeline batch exceeded latency budget"
            );
        }

        info!(
            input,
            approved = report.approved,
            rejected = report.total_rejected(),
            elapsed_ms = %format!("{:.1}", report.elapsed_ms),
            "Pipeline batch complete"
        );

        self.stats.lock().record(&report);
        (signals, report)
    }

    fn stage(name: &str, input: usize, passed: usize) -> StageStats {
        let stats = StageStats::new(name, input, passed);
        info!(
            stage = name,
            input = stats.input,
            passed = stats.passed,
            rejected = stats.rejected,
            rejection_rate = %format!("{:.3}", stats.rejection_rate),
            "Stage complete"
        );
        stats
    }

    /// Cumulative statistics since the last reset
    pub fn stats(&self) -> PipelineStats {
        self.stats.lock().clone()
    }

    pub fn quality_stats(&self) -> QualityStats {
        self.quality.stats()
    }

    pub fn sniper_stats(&self) -> Option<SniperStats> {
        self.quality.sniper_stats()
    }

    /// Trailing rejection rate against the target band
    pub fn health(&self) -> PipelineHealth {
        let stats = self.stats.lock();
        let rate = stats.overall_rejection_rate();
        let (min, max) = (self.config.target_rejection_min, self.config.target_rejection_max);

        let status = if stats.total_input == 0 {
            HealthStatus::NoData
        } else if rate < min {
            HealthStatus::TooPermissive
        } else if rate > max {
            HealthStatus::TooStrict
        } else {
            HealthStatus::WithinTarget
        };

        PipelineHealth {
            status,
            overall_rejection_rate: rate,
            target_min: min,
            target_max: max,
            within_target: status == HealthStatus::WithinTarget,
            batches: stats.batches,
            last_batch_over_budget: stats.last_latency_ms > self.config.latency_budget_ms as f64,
        }
    }

    /// Zero all counters and reset the quality filter's per-symbol state
    pub fn reset(&self) {
        *self.stats.lock() = PipelineStats::default();
        self.quality.reset_state(chrono::Utc::now());
        info!("Pipeline statistics reset");
    }

    pub fn quality_filter(&self) -> &QualityFilter {
        &self.quality
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::config::{PreFilterConfig, QualityFilterConfig, SniperConfig};
    use crate::filter::sniper::tests::{MockHoneypot, MockOnChain, MockSocial};
    use crate::filter::types::Action;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};

    fn signal(symbol: &str, confidence: f64) -> Signal {
        Signal::new(symbol, Action::Buy, confidence)
            .with_targets(1.37, 0.93)
            .with_market(20_000.0, 100_000.0)
    }

    fn pipeline() -> Pipeline {
        let quality = QualityFilter::new(
            QualityFilterConfig::default(),
            Arc::new(MockOnChain::default()),
            TunableHandle::default(),
            Duration::from_millis(50),
        );
        Pipeline::new(
            PipelineConfig::default(),
            PreFilter::new(&PreFilterConfig::default()).unwrap(),
            quality,
        )
    }

    fn mixed_batch() -> Vec<Signal> {
        let t0 = Utc::now();
        vec![
            signal("PEPE", 0.9).with_timestamp(t0),
            signal("", 0.9),                                       // pre-filter
            signal("BONK", 0.5),                                   // basic validation
            signal("PEPE", 0.9).with_timestamp(t0 + ChronoDuration::seconds(5)), // cooldown
            signal("WIF", 0.8).with_targets(-1.0, 0.5),            // pre-filter
            signal("POPCAT", 0.8),
        ]
    }

    struct DropFirst;

    #[async_trait]
    impl ConfirmationFilter for DropFirst {
        async fn filter(&self, mut signals: Vec<Signal>) -> Vec<Signal> {
            if !signals.is_empty() {
                signals.remove(0);
            }
            signals
        }
    }

    struct Duplicating;

    #[async_trait]
    impl ConfirmationFilter for Duplicating {
        async fn filter(&self, signals: Vec<Signal>) -> Vec<Signal> {
            signals.iter().chain(signals.iter()).cloned().collect()
        }
    }

    #[tokio::test]
    async fn test_count_invariant() {
        let pipeline = pipeline().with_confirmation(Arc::new(DropFirst));
        let batch = mixed_batch();
        let input = batch.len();

        let (approved, report) = pipeline.run_with_report(batch).await;

        assert_eq!(report.total_rejected() as usize + approved.len(), input);
        assert_eq!(report.stages[0].rejected, 2);
        assert_eq!(report.stages[1].rejected, 2);
        assert_eq!(report.stages[2].rejected, 1);
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].symbol, "POPCAT");
    }

    #[tokio::test]
    async fn test_nan_market_data_never_approved() {
        let pipeline = pipeline();
        let batch = vec![
            signal("PEPE", 0.9).with_market(f64::NAN, f64::NAN),
            signal("BONK", 0.9).with_market(20_000.0, f64::NAN),
        ];

        let (approved, report) = pipeline.run_with_report(batch).await;
        assert!(approved.is_empty());
        assert_eq!(report.stages[0].rejected, 2);
    }

    #[tokio::test]
    async fn test_confirmation_cannot_inflate_batch() {
        let pipeline = pipeline().with_confirmation(Arc::new(Duplicating));
        let batch = vec![signal("PEPE", 0.9)];
        let (approved, report) = pipeline.run_with_report(batch).await;
        assert_eq!(approved.len(), 1);
        assert_eq!(report.total_rejected(), 0);
    }

    #[tokio::test]
    async fn test_stats_monotonic_until_reset() {
        let pipeline = pipeline();
        let mut last_input = 0;
        for _ in 0..3 {
            pipeline.run(mixed_batch()).await;
            let stats = pipeline.stats();
            assert!(stats.total_input > last_input);
            last_input = stats.total_input;
        }
        assert_eq!(pipeline.stats().batches, 3);

        pipeline.reset();
        let stats = pipeline.stats();
        assert_eq!(stats.batches, 0);
        assert_eq!(stats.total_input, 0);
        assert_eq!(stats.total_approved, 0);
        assert!(stats.stages.is_empty());
        assert_eq!(pipeline.quality_stats().evaluated, 0);
    }

    #[tokio::test]
    async fn test_health_band() {
        let pipeline = pipeline();
        assert_eq!(pipeline.health().status, HealthStatus::NoData);

        // 1 of 6 approved: 83% rejection, below the 90% floor
        pipeline.run(vec![
            signal("A", 0.9),
            signal("B", 0.1),
            signal("C", 0.1),
            signal("D", 0.1),
            signal("E", 0.1),
            signal("F", 0.1),
        ])
        .await;
        let health = pipeline.health();
        assert_eq!(health.status, HealthStatus::TooPermissive);
        assert!(!health.within_target);

        // Everything rejected: above the 95% ceiling
        pipeline.reset();
        pipeline.run(vec![signal("A", 0.1)]).await;
        assert_eq!(pipeline.health().status, HealthStatus::TooStrict);
    }

    #[tokio::test]
    async fn test_slow_batch_not_cancelled() {
        let config = PipelineConfig {
            latency_budget_ms: 1,
            ..Default::default()
        };
        let quality = QualityFilter::new(
            QualityFilterConfig::default(),
            Arc::new(MockOnChain::default()),
            TunableHandle::default(),
            Duration::from_millis(50),
        );
        let gate = SafetyGate::new(
            SniperConfig::default(),
            Arc::new(MockOnChain::default()),
            Some(Arc::new(MockSocial { score: 0.8, fail: false })),
            Some(Arc::new(MockHoneypot {
                safety: 0.9,
                delay: Some(Duration::from_millis(20)),
            })),
            Duration::from_millis(100),
        )
        .unwrap();
        let pipeline = Pipeline::new(
            config,
            PreFilter::new(&PreFilterConfig::default()).unwrap(),
            quality.with_safety_gate(gate),
        );

        let (approved, report) = pipeline
            .run_with_report(vec![signal("SNIPE", 0.9).with_sniper("Mint")])
            .await;
        assert!(report.over_budget);
        assert_eq!(approved.len(), 1);
        assert_eq!(pipeline.stats().slow_batches, 1);
        assert_eq!(pipeline.sniper_stats().unwrap().passed, 1);
    }

    #[test]
    fn test_dependency_timeout_derived_from_budget() {
        let config = PipelineConfig::default();
        assert_eq!(config.dependency_timeout(), Duration::from_millis(50));
    }
}
