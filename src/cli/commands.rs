//! CLI command implementations

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::adaptive::{AdaptationLoop, AdaptationStatus, TradeOutcome, TunableHandle, TunableState};
use crate::config::Config;
use crate::filter::collaborators::{HoneypotAnalytics, SocialAnalytics};
use crate::filter::types::Signal;
use crate::pipeline::{Collaborators, Pipeline};
use crate::replay::FixtureAnalytics;

async fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {} from {}", what, path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {} in {}", what, path.display()))
}

fn baseline_tunables(config: &Config) -> TunableHandle {
    TunableHandle::new(TunableState::baseline(config.adaptation.baseline_max_positions))
}

/// Wire a pipeline whose collaborators are served from replay fixtures
fn replay_pipeline(config: &Config, fixtures: FixtureAnalytics, tunables: TunableHandle) -> Result<Pipeline> {
    let fixtures = Arc::new(fixtures);
    let social: Option<Arc<dyn SocialAnalytics>> = if config.sniper.social_enabled {
        Some(fixtures.clone())
    } else {
        None
    };
    let honeypot: Option<Arc<dyn HoneypotAnalytics>> = if config.sniper.honeypot_enabled {
        Some(fixtures.clone())
    } else {
        None
    };

    let collaborators = Collaborators {
        onchain: fixtures,
        social,
        honeypot,
        confirmation: None,
    };
    Ok(Pipeline::build(config, collaborators, tunables)?)
}

/// Screen one batch of signals and print the approved set with statistics
pub async fn filter(config: &Config, signals_path: &Path, fixtures_path: Option<&Path>) -> Result<()> {
    let signals: Vec<Signal> = read_json(signals_path, "signals").await?;

    let fixtures = match fixtures_path {
        Some(path) => FixtureAnalytics::load(path)
            .await
            .with_context(|| format!("Failed to load fixtures from {}", path.display()))?,
        None => {
            warn!("No fixtures given - every collaborator lookup will fail and follow its failure policy");
            FixtureAnalytics::default()
        }
    };

    info!(signals = signals.len(), fixtures = fixtures.len(), "Replaying signal batch");

    let pipeline = replay_pipeline(config, fixtures, baseline_tunables(config))?;
    let (approved, report) = pipeline.run_with_report(signals).await;

    println!("\n=== APPROVED SIGNALS ({}) ===\n", approved.len());
    println!("{}", serde_json::to_string_pretty(&approved)?);

    println!("\n=== STAGES ===\n");
    for stage in &report.stages {
        println!(
            "  {:<14} input {:>5}  passed {:>5}  rejected {:>5}  ({:.1}%)",
            stage.stage,
            stage.input,
            stage.passed,
            stage.rejected,
            stage.rejection_rate * 100.0
        );
    }
    println!("  elapsed {:.1}ms{}", report.elapsed_ms, if report.over_budget { " (over budget)" } else { "" });

    let health = pipeline.health();
    println!("\n=== HEALTH ===\n");
    println!(
        "  rejection rate {:.1}% (target {:.0}%-{:.0}%): {:?}",
        health.overall_rejection_rate * 100.0,
        health.target_min * 100.0,
        health.target_max * 100.0,
        health.status
    );

    let quality = pipeline.quality_stats();
    println!("\n=== QUALITY FILTER ===\n");
    println!("{}", serde_json::to_string_pretty(&quality)?);

    if let Some(sniper) = pipeline.sniper_stats() {
        println!("\n=== SNIPER GATE ===\n");
        println!("  pass rate {:.1}%", sniper.pass_rate() * 100.0);
        println!("{}", serde_json::to_string_pretty(&sniper)?);
    }

    Ok(())
}

/// Run one adaptation cycle over recorded trades and prices
pub async fn adapt(config: &Config, trades_path: &Path, prices_path: &Path, at: Option<DateTime<Utc>>) -> Result<()> {
    if !config.adaptation.enabled {
        warn!("Adaptation disabled - thresholds will stay at baseline");
    }

    let trades: Vec<TradeOutcome> = read_json(trades_path, "trades").await?;
    let prices: Vec<f64> = read_json(prices_path, "prices").await?;

    // Evaluate as of the newest trade unless told otherwise
    let now = at
        .or_else(|| trades.iter().map(|t| t.closed_at).max())
        .unwrap_or_else(Utc::now);

    let adaptation = AdaptationLoop::new(config.adaptation.clone(), baseline_tunables(config))?;
    if !adaptation.should_adapt(now) {
        println!("Adaptation not allowed at {}", now);
        return Ok(());
    }

    let record = adaptation.adapt(&trades, &prices, now);

    println!("\n=== ADJUSTMENT ===\n");
    if record.is_noop() {
        println!("No adjustment needed.");
    } else {
        println!("{}", serde_json::to_string_pretty(&record)?);
    }

    println!("\n=== STATUS ===\n");
    println!("{}", serde_json::to_string_pretty(&adaptation.status())?);

    Ok(())
}

/// Run the background adaptation loop over recorded history until Ctrl+C
pub async fn watch(config: &Config, fixtures_path: &Path) -> Result<()> {
    let status = watch_until(config, fixtures_path, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Received shutdown signal");
    })
    .await?;

    println!("\n=== STATUS ===\n");
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn watch_until<F>(config: &Config, fixtures_path: &Path, shutdown: F) -> Result<AdaptationStatus>
where
    F: Future<Output = ()>,
{
    if !config.adaptation.enabled {
        anyhow::bail!("Adaptation is disabled in configuration");
    }

    let fixtures = FixtureAnalytics::load(fixtures_path)
        .await
        .with_context(|| format!("Failed to load fixtures from {}", fixtures_path.display()))?;
    let adaptation = Arc::new(AdaptationLoop::new(config.adaptation.clone(), baseline_tunables(config))?);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(adaptation.clone().run(Arc::new(fixtures), shutdown_rx));

    shutdown.await;
    let _ = shutdown_tx.send(());
    handle.await.context("Adaptation loop task failed")?;

    Ok(adaptation.status())
}

/// Show current configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.display_summary());
    Ok(())
}

/// Validate configuration and wire every stage without running a batch
pub fn check(config: &Config) -> Result<()> {
    println!("\n=== CONFIGURATION CHECK ===\n");

    let pipeline = replay_pipeline(config, FixtureAnalytics::default(), baseline_tunables(config))?;
    println!("Pipeline... OK");
    println!(
        "  dependency timeout: {}ms",
        config.pipeline.dependency_timeout().as_millis()
    );
    println!("  effective min confidence: {:.2}", pipeline.quality_filter().effective_min_confidence());
    println!(
        "  sniper gate: {}",
        if pipeline.sniper_stats().is_some() { "enabled" } else { "disabled" }
    );

    println!(
        "Adaptation... {}",
        if config.adaptation.enabled { "enabled" } else { "disabled" }
    );

    println!("\nAll checks passed.");
    Ok(())
}
