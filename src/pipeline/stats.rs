//! Per-stage and cumulative pipeline statistics

use serde::{Deserialize, Serialize};

/// Counts for one stage of one batch (or accumulated across batches)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageStats {
    pub stage: String,
    pub input: u64,
    pub passed: u64,
    pub rejected: u64,
    pub rejection_rate: f64,
}

impl StageStats {
    pub fn new(stage: &str, input: usize, passed: usize) -> Self {
        let mut stats = Self {
            stage: stage.to_string(),
            input: input as u64,
            passed: passed as u64,
            rejected: input.saturating_sub(passed) as u64,
            rejection_rate: 0.0,
        };
        stats.update_rate();
        stats
    }

    /// Fold another batch of the same stage into this total
    pub fn absorb(&mut self, other: &StageStats) {
        self.input += other.input;
        self.passed += other.passed;
        self.rejected += other.rejected;
        self.update_rate();
    }

    fn update_rate(&mut self) {
        self.rejection_rate = if self.input == 0 {
            0.0
        } else {
            self.rejected as f64 / self.input as f64
        };
    }
}

/// Result of one `run` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub input: usize,
    pub approved: usize,
    pub stages: Vec<StageStats>,
    pub elapsed_ms: f64,
    pub over_budget: bool,
}

impl BatchReport {
    pub fn total_rejected(&self) -> u64 {
        self.stages.iter().map(|s| s.rejected).sum()
    }
}

/// Running totals across batches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    pub batches: u64,
    pub total_input: u64,
    pub total_approved: u64,
    /// Cumulative counts per stage, in pipeline order
    pub stages: Vec<StageStats>,
    pub last_latency_ms: f64,
    pub max_latency_ms: f64,
    pub slow_batches: u64,
}

impl PipelineStats {
    pub fn record(&mut self, report: &BatchReport) {
        self.batches += 1;
        self.total_input += report.input as u64;
        self.total_approved += report.approved as u64;
        self.last_latency_ms = report.elapsed_ms;
        self.max_latency_ms = self.max_latency_ms.max(report.elapsed_ms);
        if report.over_budget {
            self.slow_batches += 1;
        }

        for stage in &report.stages {
            match self.stages.iter_mut().find(|s| s.stage == stage.stage) {
                Some(total) => total.absorb(stage),
                None => self.stages.push(stage.clone()),
            }
        }
    }

    pub fn total_rejected(&self) -> u64 {
        self.total_input.saturating_sub(self.total_approved)
    }

    pub fn overall_rejection_rate(&self) -> f64 {
        if self.total_input == 0 {
            0.0
        } else {
            self.total_rejected() as f64 / self.total_input as f64
        }
    }

    pub fn stage(&self, name: &str) -> Option<&StageStats> {
        self.stages.iter().find(|s| s.stage == name)
    }
}

/// Where the trailing rejection rate sits relative to the target band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    NoData,
    WithinTarget,
    /// Rejecting less than the band: possibly letting spam through
    TooPermissive,
    /// Rejecting more than the band: possibly starving the strategy
    TooStrict,
}

/// Health snapshot for operators and the adaptation loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineHealth {
    pub status: HealthStatus,
    pub overall_rejection_rate: f64,
    pub target_min: f64,
    pub target_max: f64,
    pub within_target: bool,
    pub batches: u64,
    pub last_batch_over_budget: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_stats_rate() {
        let stats = StageStats::new("pre_filter", 10, 7);
        assert_eq!(stats.rejected, 3);
        assert!((stats.rejection_rate - 0.3).abs() < 1e-9);

        let empty = StageStats::new("quality", 0, 0);
        assert_eq!(empty.rejection_rate, 0.0);
    }

    #[test]
    fn test_record_accumulates() {
        let mut totals = PipelineStats::default();
        let report = BatchReport {
            input: 10,
            approved: 1,
            stages: vec![
                StageStats::new("pre_filter", 10, 8),
                StageStats::new("quality", 8, 1),
            ],
            elapsed_ms: 12.0,
            over_budget: false,
        };
        totals.record(&report);
        totals.record(&report);

        assert_eq!(totals.batches, 2);
        assert_eq!(totals.total_input, 20);
        assert_eq!(totals.stage("quality").unwrap().rejected, 14);
        assert!((totals.overall_rejection_rate() - 0.9).abs() < 1e-9);
    }
}
