//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::adaptive::config::AdaptationConfig;
use crate::filter::config::{PreFilterConfig, QualityFilterConfig, SniperConfig};
use crate::pipeline::PipelineConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub pre_filter: PreFilterConfig,
    #[serde(default)]
    pub quality: QualityFilterConfig,
    #[serde(default)]
    pub sniper: SniperConfig,
    #[serde(default)]
    pub adaptation: AdaptationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (SENTRY__SECTION__KEY)
            .add_source(
                config::Environment::with_prefix("SENTRY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Pipeline budget and target band
        if self.pipeline.latency_budget_ms == 0 {
            anyhow::bail!("latency_budget_ms must be positive");
        }
        let fraction = self.pipeline.dependency_timeout_fraction;
        if fraction <= 0.0 || fraction > 1.0 {
            anyhow::bail!("dependency_timeout_fraction must be in (0, 1], got {}", fraction);
        }
        let (min, max) = (self.pipeline.target_rejection_min, self.pipeline.target_rejection_max);
        if !(0.0..=1.0).contains(&min) || !(0.0..=1.0).contains(&max) || min > max {
            anyhow::bail!("target rejection band [{}, {}] is invalid", min, max);
        }

        // Blocked patterns (compile regex to check)
        for pattern in &self.pre_filter.blocked_patterns {
            regex::Regex::new(pattern)
                .with_context(|| format!("Invalid blocked_pattern regex: {}", pattern))?;
        }

        // Quality filter
        let quality = &self.quality;
        if !(0.0..=1.0).contains(&quality.min_confidence) {
            anyhow::bail!("min_confidence must be in [0, 1], got {}", quality.min_confidence);
        }
        if quality.max_signals_per_window == 0 {
            anyhow::bail!("max_signals_per_window must be at least 1");
        }
        if quality.min_stop_distance >= quality.max_stop_distance {
            anyhow::bail!(
                "min_stop_distance ({}) must be below max_stop_distance ({})",
                quality.min_stop_distance,
                quality.max_stop_distance
            );
        }
        if quality.concurrency == 0 {
            anyhow::bail!("quality.concurrency must be at least 1");
        }

        // Sniper gate
        let sniper = &self.sniper;
        for (name, value) in [
            ("min_lp_burn_rate", sniper.min_lp_burn_rate),
            ("max_top_holder_share", sniper.max_top_holder_share),
            ("min_social_score", sniper.min_social_score),
            ("min_honeypot_safety", sniper.min_honeypot_safety),
            ("proceed_confidence", sniper.proceed_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("sniper.{} must be in [0, 1], got {}", name, value);
            }
        }

        self.adaptation
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid adaptation config: {}", e))?;

        Ok(())
    }

    /// Human-readable summary for the CLI
    pub fn display_summary(&self) -> String {
        format!(
            r#"Configuration:
  Pipeline:
    latency_budget: {}ms
    dependency_timeout: {}ms
    target_rejection: {:.0}%-{:.0}%
  Pre-filter:
    blocked_patterns: {}
  Quality:
    min_confidence: {}
    min_liquidity: {}
    min_volume: {}
    cooldown: {}s
    rate_limit: {} per {}s
    concurrency: {}
  Sniper gate:
    enabled: {}
    min_lp_burn_rate: {}
    require_authority: {}
    social: {}
    honeypot: {}
  Adaptation:
    enabled: {}
    interval: {}s
    max_per_day: {}
    min_trades: {}
    lookback: {}h
  Logging:
    level: {}
    json: {}
"#,
            self.pipeline.latency_budget_ms,
            self.pipeline.dependency_timeout().as_millis(),
            self.pipeline.target_rejection_min * 100.0,
            self.pipeline.target_rejection_max * 100.0,
            self.pre_filter.blocked_patterns.len(),
            self.quality.min_confidence,
            self.quality.min_liquidity,
            self.quality.min_volume,
            self.quality.cooldown_secs,
            self.quality.max_signals_per_window,
            self.quality.rate_limit_window_secs,
            self.quality.concurrency,
            self.sniper.enabled,
            self.sniper.min_lp_burn_rate,
            self.sniper.require_authority_revocation,
            on_off(self.sniper.social_enabled),
            on_off(self.sniper.honeypot_enabled),
            self.adaptation.enabled,
            self.adaptation.interval_secs,
            self.adaptation.max_adaptations_per_day,
            self.adaptation.min_trades,
            self.adaptation.lookback_hours,
            self.logging.level,
            self.logging.json,
        )
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}
