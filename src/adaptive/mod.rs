//! Adaptation loop
//!
//! Periodically reads trailing trade outcomes and price history, computes a
//! bounded adjustment from realized performance and market regime, and
//! publishes it as the shared [`TunableState`] read by the quality filter.
//!
//! Adjustments are computed from the neutral baseline every cycle and
//! replace the previous state rather than compounding on it.

pub mod config;
pub mod performance;
pub mod regime;
pub mod tunables;
pub mod types;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

pub use config::AdaptationConfig;
pub use performance::PerformanceWindow;
pub use regime::{MarketRegime, RegimeClassification, RegimeClassifier};
pub use tunables::{TunableHandle, TunableState};
pub use types::{AdjustmentRecord, TradeOutcome};

pub const TAG_LOW_WIN_RATE: &str = "low_win_rate";
pub const TAG_HIGH_WIN_RATE: &str = "high_win_rate";
pub const TAG_POOR_PROFIT_FACTOR: &str = "poor_profit_factor";
pub const TAG_HIGH_VOLATILITY: &str = "high_volatility";
pub const TAG_RANGING_MARKET: &str = "ranging_market";
pub const TAG_HIGH_DRAWDOWN: &str = "high_drawdown";

const STOP_LOSS_BOUNDS: (f64, f64) = (0.5, 1.5);
const TAKE_PROFIT_BOUNDS: (f64, f64) = (0.5, 2.0);
const MAX_POSITIONS_BOUNDS: (i64, i64) = (1, 10);

/// Read-only access to trade and price history
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Closed trades with `closed_at >= since`
    async fn trade_outcomes(&self, since: DateTime<Utc>) -> Result<Vec<TradeOutcome>>;

    /// Recent prices, oldest first
    async fn price_history(&self, limit: usize) -> Result<Vec<f64>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptationPhase {
    Idle,
    Evaluating,
}

/// Snapshot for operators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationStatus {
    pub enabled: bool,
    pub phase: AdaptationPhase,
    pub last_run: Option<DateTime<Utc>>,
    pub last_adaptation: Option<DateTime<Utc>>,
    pub adaptations_today: u32,
    pub tunables: TunableState,
    pub last_adjustment: Option<AdjustmentRecord>,
    pub last_performance: Option<PerformanceWindow>,
    pub last_regime: Option<RegimeClassification>,
}

struct LoopState {
    phase: AdaptationPhase,
    last_run: Option<DateTime<Utc>>,
    last_adaptation: Option<DateTime<Utc>>,
    day: NaiveDate,
    adaptations_today: u32,
    last_adjustment: Option<AdjustmentRecord>,
    last_performance: Option<PerformanceWindow>,
    last_regime: Option<RegimeClassification>,
}

impl LoopState {
    /// Reset the daily counter when `now` falls on a new local day
    fn roll_day(&mut self, now: DateTime<Utc>) {
        let today = now.with_timezone(&Local).date_naive();
        if today != self.day {
            self.day = today;
            self.adaptations_today = 0;
        }
    }
}

pub struct AdaptationLoop {
    config: AdaptationConfig,
    classifier: RegimeClassifier,
    tunables: TunableHandle,
    state: Mutex<LoopState>,
}

impl AdaptationLoop {
    /// Rejects configurations whose bounds would make the safety clamp unusable
    pub fn new(config: AdaptationConfig, tunables: TunableHandle) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::Config(format!("adaptation: {}", e)))?;

        let classifier = RegimeClassifier::new(
            config.volatility_threshold,
            config.trend_threshold,
            config.regime_window,
        );
        Ok(Self {
            config,
            classifier,
            tunables,
            state: Mutex::new(LoopState {
                phase: AdaptationPhase::Idle,
                last_run: None,
                last_adaptation: None,
                day: Local::now().date_naive(),
                adaptations_today: 0,
                last_adjustment: None,
                last_performance: None,
                last_regime: None,
            }),
        })
    }

    pub fn tunables(&self) -> &TunableHandle {
        &self.tunables
    }

    /// Whether an adjustment may be applied at `now`
    pub fn should_adapt(&self, now: DateTime<Utc>) -> bool {
        if !self.config.enabled {
            return false;
        }

        let mut state = self.state.lock();
        state.roll_day(now);

        if state.adaptations_today >= self.config.max_adaptations_per_day {
            debug!(
                today = state.adaptations_today,
                cap = self.config.max_adaptations_per_day,
                "Daily adaptation cap reached"
            );
            return false;
        }

        match state.last_adaptation {
            Some(last) => now
                .signed_duration_since(last)
                .to_std()
                .is_ok_and(|elapsed| elapsed >= self.config.interval()),
            None => true,
        }
    }

    /// Compute (and, if needed, apply) an adjustment from trailing history
    pub fn adapt(&self, trades: &[TradeOutcome], prices: &[f64], now: DateTime<Utc>) -> AdjustmentRecord {
        self.state.lock().phase = AdaptationPhase::Evaluating;

        let since = now - ChronoDuration::hours(self.config.lookback_hours as i64);
        let window: Vec<TradeOutcome> = trades
            .iter()
            .filter(|t| t.closed_at >= since && t.closed_at <= now)
            .cloned()
            .collect();

        if window.len() < self.config.min_trades {
            debug!(
                trades = window.len(),
                required = self.config.min_trades,
                "Not enough trades to adapt"
            );
            let mut state = self.state.lock();
            state.phase = AdaptationPhase::Idle;
            state.last_run = Some(now);
            return AdjustmentRecord::none(now);
        }

        let performance = PerformanceWindow::compute(&window, self.config.lookback_hours);
        let regime = self.classifier.classify(prices);
        let record = self.apply_safety_limits(self.propose(&performance, &regime, now));

        info!(
            trades = performance.trade_count,
            win_rate = %format!("{:.2}", performance.win_rate),
            profit_factor = %format!("{:.2}", performance.profit_factor),
            max_drawdown = %format!("{:.3}", performance.max_drawdown),
            regime = %regime.regime,
            reason = %record.reason,
            "Adaptation cycle evaluated"
        );

        {
            let mut state = self.state.lock();
            state.phase = AdaptationPhase::Idle;
            state.last_run = Some(now);
            state.last_performance = Some(performance);
            state.last_regime = Some(regime);
            if !record.is_noop() {
                state.roll_day(now);
                state.last_adaptation = Some(now);
                state.adaptations_today += 1;
                state.last_adjustment = Some(record.clone());
            }
        }

        if !record.is_noop() {
            self.apply(&record);
        }
        record
    }

    /// Stack the adjustment rules without any bounds applied
    fn propose(
        &self,
        performance: &PerformanceWindow,
        regime: &RegimeClassification,
        now: DateTime<Utc>,
    ) -> AdjustmentRecord {
        let mut record = AdjustmentRecord::none(now);

        if performance.win_rate < self.config.low_win_rate {
            record.confidence_delta += 0.05;
            record.position_size_multiplier *= 0.8;
            record.push_tag(TAG_LOW_WIN_RATE);
        } else if performance.win_rate > self.config.high_win_rate {
            record.confidence_delta -= 0.03;
            record.position_size_multiplier *= 1.2;
            record.push_tag(TAG_HIGH_WIN_RATE);
        }

        if performance.profit_factor < self.config.min_profit_factor {
            record.stop_loss_multiplier *= 0.9;
            record.take_profit_multiplier *= 1.2;
            record.push_tag(TAG_POOR_PROFIT_FACTOR);
        }

        match regime.regime {
            MarketRegime::Volatile => {
                record.position_size_multiplier *= 0.7;
                record.max_positions_delta -= 2;
                record.push_tag(TAG_HIGH_VOLATILITY);
            }
            MarketRegime::Ranging => {
                record.confidence_delta -= 0.02;
                record.take_profit_multiplier *= 0.8;
                record.push_tag(TAG_RANGING_MARKET);
            }
            _ => {}
        }

        if performance.max_drawdown > self.config.max_drawdown {
            record.position_size_multiplier *= 0.5;
            record.stop_loss_multiplier *= 0.8;
            record.push_tag(TAG_HIGH_DRAWDOWN);
        }

        record
    }

    /// Clamp every field into its configured bounds
    pub fn apply_safety_limits(&self, mut record: AdjustmentRecord) -> AdjustmentRecord {
        let band = self.config.confidence_band;
        record.confidence_delta = clamp_finite(record.confidence_delta, -band, band, 0.0);
        record.position_size_multiplier = clamp_finite(
            record.position_size_multiplier,
            self.config.min_position_multiplier,
            self.config.max_position_multiplier,
            1.0,
        );
        record.stop_loss_multiplier =
            clamp_finite(record.stop_loss_multiplier, STOP_LOSS_BOUNDS.0, STOP_LOSS_BOUNDS.1, 1.0);
        record.take_profit_multiplier = clamp_finite(
            record.take_profit_multiplier,
            TAKE_PROFIT_BOUNDS.0,
            TAKE_PROFIT_BOUNDS.1,
            1.0,
        );

        let baseline = self.config.baseline_max_positions as i64;
        let max_positions = (baseline + record.max_positions_delta as i64)
            .clamp(MAX_POSITIONS_BOUNDS.0, MAX_POSITIONS_BOUNDS.1);
        record.max_positions_delta = (max_positions - baseline) as i32;

        record
    }

    /// Publish `record` as the shared tunable state
    pub fn apply(&self, record: &AdjustmentRecord) {
        let max_positions = (self.config.baseline_max_positions as i64 + record.max_positions_delta as i64)
            .clamp(MAX_POSITIONS_BOUNDS.0, MAX_POSITIONS_BOUNDS.1) as u32;

        let next = TunableState {
            confidence_offset: record.confidence_delta,
            position_size_multiplier: record.position_size_multiplier,
            stop_loss_multiplier: record.stop_loss_multiplier,
            take_profit_multiplier: record.take_profit_multiplier,
            max_positions,
            reason: record.reason.clone(),
            updated_at: Some(record.timestamp),
        };
        self.tunables.publish(next);

        info!(
            reason = %record.reason,
            confidence_delta = %format!("{:+.3}", record.confidence_delta),
            position_size = %format!("{:.2}", record.position_size_multiplier),
            stop_loss = %format!("{:.2}", record.stop_loss_multiplier),
            take_profit = %format!("{:.2}", record.take_profit_multiplier),
            max_positions,
            "Tunables updated"
        );
    }

    /// Restore the neutral baseline
    pub fn revert(&self) {
        self.tunables
            .publish(TunableState::baseline(self.config.baseline_max_positions));
        self.state.lock().last_adjustment = None;
        info!("Tunables reverted to baseline");
    }

    pub fn status(&self) -> AdaptationStatus {
        let state = self.state.lock();
        AdaptationStatus {
            enabled: self.config.enabled,
            phase: state.phase,
            last_run: state.last_run,
            last_adaptation: state.last_adaptation,
            adaptations_today: state.adaptations_today,
            tunables: (*self.tunables.load()).clone(),
            last_adjustment: state.last_adjustment.clone(),
            last_performance: state.last_performance.clone(),
            last_regime: state.last_regime.clone(),
        }
    }

    /// Background loop: wake on the poll interval, adapt when allowed
    pub async fn run(self: Arc<Self>, source: Arc<dyn HistorySource>, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            info!("Adaptation disabled");
            return;
        }

        info!(
            interval_secs = self.config.interval_secs,
            max_per_day = self.config.max_adaptations_per_day,
            "Starting adaptation loop"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval());

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = Utc::now();
                    if !self.should_adapt(now) {
                        continue;
                    }
                    if let Err(e) = self.cycle(source.as_ref(), now).await {
                        error!(error = %e, "Adaptation cycle skipped");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Adaptation loop shutting down");
                    break;
                }
            }
        }
    }

    async fn cycle(&self, source: &dyn HistorySource, now: DateTime<Utc>) -> Result<()> {
        let since = now - ChronoDuration::hours(self.config.lookback_hours as i64);
        let trades = source.trade_outcomes(since).await?;
        let prices = match source.price_history(self.config.regime_window).await {
            Ok(prices) => prices,
            Err(e) => {
                warn!(error = %e, "Price history unavailable, regime unknown");
                Vec::new()
            }
        };
        self.adapt(&trades, &prices, now);
        Ok(())
    }
}

fn clamp_finite(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback.clamp(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use chrono::TimeZone;
    use rand::{Rng, SeedableRng};

    /// Local noon today, so interval arithmetic never crosses a day boundary
    fn noon() -> DateTime<Utc> {
        let date = Local::now().date_naive();
        Local
            .from_local_datetime(&date.and_hms_opt(12, 0, 0).unwrap())
            .earliest()
            .unwrap()
            .with_timezone(&Utc)
    }

    /// `wins` winners and `losses` losers with the given profit factor
    fn trades(wins: usize, losses: usize, profit_factor: f64, now: DateTime<Utc>) -> Vec<TradeOutcome> {
        let loss = 1.0;
        let win = profit_factor * losses as f64 * loss / wins.max(1) as f64;
        let total = wins + losses;
        (0..total)
            .map(|i| {
                // Interleave so drawdown stays small
                let is_win = (i * wins) / total != ((i + 1) * wins) / total;
                let pnl = if is_win { win } else { -loss };
                TradeOutcome::new(
                    "PEPE",
                    pnl,
                    pnl / 1000.0,
                    now - ChronoDuration::minutes((total - i) as i64),
                )
            })
            .collect()
    }

    fn volatile_prices() -> Vec<f64> {
        (0..30).map(|i| if i % 2 == 0 { 1.0 } else { 1.2 }).collect()
    }

    fn trending_prices() -> Vec<f64> {
        (0..30).map(|i| 1.02_f64.powi(i)).collect()
    }

    #[test]
    fn test_low_performance_in_volatile_market() {
        let now = noon();
        let adaptation = AdaptationLoop::new(AdaptationConfig::default(), TunableHandle::default()).unwrap();

        let history = trades(35, 65, 1.2, now);
        let performance = PerformanceWindow::compute(&history, 24);
        assert!((performance.win_rate - 0.35).abs() < 1e-9);
        assert!((performance.profit_factor - 1.2).abs() < 1e-9);

        let record = adaptation.adapt(&history, &volatile_prices(), now);

        assert!(record.has_tag(TAG_LOW_WIN_RATE));
        assert!(record.has_tag(TAG_POOR_PROFIT_FACTOR));
        assert!(record.has_tag(TAG_HIGH_VOLATILITY));
        assert!(record.position_size_multiplier < 1.0);
        assert_eq!(record.max_positions_delta, -2);

        let tunables = adaptation.tunables().load();
        assert_eq!(tunables.max_positions, 3);
        assert!((tunables.confidence_offset - 0.05).abs() < 1e-9);
        assert_eq!(tunables.reason, record.reason);
        assert_eq!(adaptation.status().adaptations_today, 1);
    }

    #[test]
    fn test_below_min_trades_is_noop() {
        let now = noon();
        let adaptation = AdaptationLoop::new(AdaptationConfig::default(), TunableHandle::default()).unwrap();
        let record = adaptation.adapt(&trades(2, 8, 0.5, now), &volatile_prices(), now);

        assert!(record.is_noop());
        assert!(adaptation.tunables().load().is_baseline());
        assert_eq!(adaptation.status().adaptations_today, 0);
        assert!(adaptation.status().last_run.is_some());
    }

    #[test]
    fn test_trades_outside_lookback_ignored() {
        let now = noon();
        let adaptation = AdaptationLoop::new(AdaptationConfig::default(), TunableHandle::default()).unwrap();
        let stale = trades(10, 90, 0.5, now - ChronoDuration::hours(48));
        assert!(adaptation.adapt(&stale, &volatile_prices(), now).is_noop());
    }

    #[test]
    fn test_healthy_trending_market_needs_nothing() {
        let now = noon();
        let adaptation = AdaptationLoop::new(AdaptationConfig::default(), TunableHandle::default()).unwrap();
        let record = adaptation.adapt(&trades(55, 45, 2.5, now), &trending_prices(), now);

        assert!(record.is_noop());
        assert!(adaptation.should_adapt(now));
        assert!(adaptation.status().last_regime.is_some());
    }

    #[test]
    fn test_unknown_regime_with_few_prices() {
        let now = noon();
        let adaptation = AdaptationLoop::new(AdaptationConfig::default(), TunableHandle::default()).unwrap();
        let record = adaptation.adapt(&trades(80, 20, 3.0, now), &[1.0, 1.1, 1.2], now);

        assert!(record.has_tag(TAG_HIGH_WIN_RATE));
        assert!(!record.has_tag(TAG_HIGH_VOLATILITY));
        assert_eq!(
            adaptation.status().last_regime.map(|r| r.regime),
            Some(MarketRegime::Unknown)
        );
    }

    #[test]
    fn test_should_adapt_interval() {
        let now = noon();
        let adaptation = AdaptationLoop::new(AdaptationConfig::default(), TunableHandle::default()).unwrap();
        assert!(adaptation.should_adapt(now));

        let record = adaptation.adapt(&trades(35, 65, 1.2, now), &volatile_prices(), now);
        assert!(!record.is_noop());

        assert!(!adaptation.should_adapt(now));
        assert!(!adaptation.should_adapt(now + ChronoDuration::minutes(30)));
        assert!(adaptation.should_adapt(now + ChronoDuration::hours(1)));
    }

    #[test]
    fn test_should_adapt_daily_cap() {
        let start = noon() - ChronoDuration::hours(4);
        let config = AdaptationConfig {
            interval_secs: 60,
            ..Default::default()
        };
        let adaptation = AdaptationLoop::new(config, TunableHandle::default()).unwrap();

        for i in 0..3 {
            let at = start + ChronoDuration::minutes(i * 10);
            assert!(adaptation.should_adapt(at));
            assert!(!adaptation.adapt(&trades(35, 65, 1.2, at), &volatile_prices(), at).is_noop());
        }

        // Interval long elapsed, cap still binds
        assert!(!adaptation.should_adapt(start + ChronoDuration::hours(2)));
        // Next local day resets the counter
        assert!(adaptation.should_adapt(start + ChronoDuration::days(1)));
    }

    #[test]
    fn test_unusable_bounds_rejected_at_construction() {
        let nan = AdaptationConfig {
            max_position_multiplier: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            AdaptationLoop::new(nan, TunableHandle::default()),
            Err(Error::Config(_))
        ));

        let inverted = AdaptationConfig {
            min_position_multiplier: 2.0,
            ..Default::default()
        };
        assert!(matches!(
            AdaptationLoop::new(inverted, TunableHandle::default()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_disabled_never_adapts() {
        let config = AdaptationConfig {
            enabled: false,
            ..Default::default()
        };
        let adaptation = AdaptationLoop::new(config, TunableHandle::default()).unwrap();
        assert!(!adaptation.should_adapt(noon()));
        assert!(!adaptation.status().enabled);
    }

    #[test]
    fn test_adjustments_do_not_compound() {
        let now = noon();
        let config = AdaptationConfig {
            interval_secs: 0,
            ..Default::default()
        };
        let adaptation = AdaptationLoop::new(config, TunableHandle::default()).unwrap();
        let history = trades(35, 65, 1.2, now);

        let first = adaptation.adapt(&history, &volatile_prices(), now);
        let first_state = adaptation.tunables().load();
        adaptation.adapt(&history, &volatile_prices(), now + ChronoDuration::seconds(1));
        let second_state = adaptation.tunables().load();

        assert_eq!(first_state.position_size_multiplier, second_state.position_size_multiplier);
        assert_eq!(second_state.position_size_multiplier, first.position_size_multiplier);
    }

    #[test]
    fn test_revert_restores_baseline() {
        let now = noon();
        let adaptation = AdaptationLoop::new(AdaptationConfig::default(), TunableHandle::default()).unwrap();
        adaptation.adapt(&trades(35, 65, 1.2, now), &volatile_prices(), now);
        assert!(!adaptation.tunables().load().is_baseline());

        adaptation.revert();
        let state = adaptation.tunables().load();
        assert!(state.is_baseline());
        assert_eq!(state.max_positions, 5);
        assert!(adaptation.status().last_adjustment.is_none());
    }

    #[test]
    fn test_safety_limits_bound_any_input() {
        let config = AdaptationConfig::default();
        let adaptation = AdaptationLoop::new(config.clone(), TunableHandle::default()).unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5e47);
        let specials = [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -0.0, 1e300, -1e300];

        for i in 0..2_000 {
            let draw = |rng: &mut rand::rngs::StdRng| {
                if i % 10 == 0 {
                    specials[rng.gen_range(0..specials.len())]
                } else {
                    rng.gen_range(-1_000.0..1_000.0)
                }
            };
            let raw = AdjustmentRecord {
                confidence_delta: draw(&mut rng),
                position_size_multiplier: draw(&mut rng),
                stop_loss_multiplier: draw(&mut rng),
                take_profit_multiplier: draw(&mut rng),
                max_positions_delta: rng.gen_range(i32::MIN..i32::MAX),
                reason: "fuzz".to_string(),
                timestamp: Utc::now(),
            };

            let clamped = adaptation.apply_safety_limits(raw);
            assert!(clamped.confidence_delta.abs() <= config.confidence_band);
            assert!(clamped.position_size_multiplier >= config.min_position_multiplier);
            assert!(clamped.position_size_multiplier <= config.max_position_multiplier);
            assert!((0.5..=1.5).contains(&clamped.stop_loss_multiplier));
            assert!((0.5..=2.0).contains(&clamped.take_profit_multiplier));
            let max_positions = config.baseline_max_positions as i64 + clamped.max_positions_delta as i64;
            assert!((1..=10).contains(&max_positions));
        }
    }

    struct StaticHistory {
        trades: Vec<TradeOutcome>,
        fail: bool,
    }

    #[async_trait]
    impl HistorySource for StaticHistory {
        async fn trade_outcomes(&self, _since: DateTime<Utc>) -> Result<Vec<TradeOutcome>> {
            if self.fail {
                return Err(Error::dependency("history", "store offline"));
            }
            Ok(self.trades.clone())
        }

        async fn price_history(&self, _limit: usize) -> Result<Vec<f64>> {
            Ok(volatile_prices())
        }
    }

    #[tokio::test]
    async fn test_background_loop_adapts_and_stops() {
        let config = AdaptationConfig {
            poll_interval_secs: 1,
            ..Default::default()
        };
        let adaptation = Arc::new(AdaptationLoop::new(config, TunableHandle::default()).unwrap());
        let source = Arc::new(StaticHistory {
            trades: trades(35, 65, 1.2, Utc::now()),
            fail: false,
        });
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(adaptation.clone().run(source, rx));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        assert!(adaptation.tunables().load().position_size_multiplier < 1.0);
    }

    #[tokio::test]
    async fn test_source_error_skips_cycle() {
        let adaptation = AdaptationLoop::new(AdaptationConfig::default(), TunableHandle::default()).unwrap();
        let source = StaticHistory {
            trades: Vec::new(),
            fail: true,
        };
        assert!(adaptation.cycle(&source, Utc::now()).await.is_err());
        assert!(adaptation.tunables().load().is_baseline());
        assert!(adaptation.status().last_run.is_none());
    }
}
