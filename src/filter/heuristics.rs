//! Pure scoring heuristics used by the quality filter
//!
//! Each function turns signal fields and (already fetched) collaborator data
//! into a `CheckResult`. None of them perform I/O.

use serde_json::json;

use crate::filter::collaborators::{HolderShare, LiquidityLocks, TransactionHistory};
use crate::filter::config::QualityFilterConfig;
use crate::filter::types::{Action, CheckPolicy, CheckResult, Signal};

/// Basic field validation against configured floors
pub fn basic_validation(signal: &Signal, min_confidence: f64, config: &QualityFilterConfig) -> CheckResult {
    let check = "basic_validation";

    if signal.symbol.trim().is_empty() {
        return CheckResult::fail(check, "empty symbol");
    }
    if signal.confidence < min_confidence {
        return CheckResult::fail(
            check,
            format!(
                "confidence {:.2} below minimum {:.2}",
                signal.confidence, min_confidence
            ),
        )
        .with_metric("confidence", signal.confidence);
    }
    // Negated so NaN fails the floor
    if !(signal.liquidity >= config.min_liquidity) {
        return CheckResult::fail(
            check,
            format!(
                "liquidity {:.0} below minimum {:.0}",
                signal.liquidity, config.min_liquidity
            ),
        )
        .with_metric("liquidity", signal.liquidity);
    }
    if !(signal.volume >= config.min_volume) {
        return CheckResult::fail(
            check,
            format!("volume {:.0} below minimum {:.0}", signal.volume, config.min_volume),
        )
        .with_metric("volume", signal.volume);
    }

    CheckResult::pass(check, signal.confidence, "basic fields valid")
}

/// Weighted-deduction volume quality score
pub fn volume_quality(signal: &Signal, config: &QualityFilterConfig) -> CheckResult {
    let mut score: f64 = 1.0;
    let mut issues = Vec::new();
    let mut result = CheckResult::pass("volume_quality", 1.0, "");

    if let Some(trades) = signal.extra_f64("trade_count").filter(|t| *t > 0.0) {
        let avg_trade = signal.volume / trades;
        result = result.with_metric("avg_trade_size", avg_trade);
        if avg_trade < config.min_avg_trade_size {
            score -= 0.3;
            issues.push(format!("small average trade size {:.1}", avg_trade));
        }
    }

    if let Some(consistency) = signal.extra_f64("volume_consistency") {
        result = result.with_metric("volume_consistency", consistency);
        if consistency < config.min_volume_consistency {
            score -= 0.3;
            issues.push(format!("low volume consistency {:.2}", consistency));
        }
    }

    if signal.liquidity > 0.0 {
        let ratio = signal.volume / signal.liquidity;
        result = result.with_metric("volume_liquidity_ratio", ratio);
        if !(ratio <= config.max_volume_liquidity_ratio) {
            score -= 0.4;
            issues.push(format!("volume/liquidity ratio {:.1}", ratio));
        }
    }

    let score = score.clamp(0.0, 1.0);
    result.confidence_score = score;
    result = result.with_metric("score", score);

    if score < config.min_volume_quality {
        result.passed = false;
        result.reason = format!(
            "volume quality {:.2} below {:.2}: {}",
            score,
            config.min_volume_quality,
            issues.join(", ")
        );
    } else if issues.is_empty() {
        result.reason = "volume quality ok".to_string();
    } else {
        result.reason = format!("volume quality {:.2} ({})", score, issues.join(", "));
    }
    result
}

/// Liquidity must be deep enough relative to traded volume
pub fn liquidity_depth(signal: &Signal, config: &QualityFilterConfig) -> CheckResult {
    if signal.volume <= 0.0 {
        return CheckResult::pass("liquidity_depth", 1.0, "no volume to compare");
    }

    let depth = signal.liquidity / signal.volume;
    if !(depth >= config.min_liquidity_depth_ratio) {
        return CheckResult::fail(
            "liquidity_depth",
            format!(
                "liquidity depth {:.3} below {:.3}",
                depth, config.min_liquidity_depth_ratio
            ),
        )
        .with_metric("depth_ratio", depth);
    }

    CheckResult::pass("liquidity_depth", depth.min(1.0), "liquidity depth ok")
        .with_metric("depth_ratio", depth)
}

/// Reject sudden volume spikes relative to the trailing average
pub fn volume_spike(signal: &Signal, config: &QualityFilterConfig) -> CheckResult {
    let Some(avg) = signal.extra_f64("avg_volume").filter(|v| *v > 0.0) else {
        return CheckResult::pass("volume_spike", 1.0, "no baseline volume");
    };

    let spike = signal.volume / avg;
    if spike > config.max_volume_spike {
        return CheckResult::fail(
            "volume_spike",
            format!("volume spike {:.1}x exceeds {:.1}x", spike, config.max_volume_spike),
        )
        .with_metric("spike_ratio", spike);
    }

    CheckResult::pass("volume_spike", 1.0, format!("volume {:.1}x average", spike))
        .with_metric("spike_ratio", spike)
}

/// Top-holder concentration
pub fn holder_concentration(holders: &[HolderShare], config: &QualityFilterConfig) -> CheckResult {
    let check = "holder_concentration";
    if holders.is_empty() {
        return CheckResult::pass(check, 0.5, "no holder data").with_policy(CheckPolicy::FailOpen);
    }

    let top = holders.iter().map(|h| h.share).fold(0.0_f64, f64::max);
    let combined: f64 = holders.iter().map(|h| h.share).sum();

    let result = if top > config.max_top_holder_share {
        CheckResult::fail(
            check,
            format!(
                "top holder owns {:.1}% (max {:.1}%)",
                top * 100.0,
                config.max_top_holder_share * 100.0
            ),
        )
    } else if combined > config.max_top_holders_combined_share {
        CheckResult::fail(
            check,
            format!(
                "top {} holders own {:.1}% (max {:.1}%)",
                holders.len(),
                combined * 100.0,
                config.max_top_holders_combined_share * 100.0
            ),
        )
    } else {
        CheckResult::pass(check, (1.0 - combined).clamp(0.0, 1.0), "holder distribution ok")
    };

    result
        .with_policy(CheckPolicy::FailOpen)
        .with_metric("top_share", top)
        .with_metric("combined_share", combined)
}

/// Wash trading and trader diversity
pub fn wash_trading(history: &TransactionHistory, config: &QualityFilterConfig) -> CheckResult {
    let check = "wash_trading";
    let result = if history.wash_trading_score > config.max_wash_trading_score {
        CheckResult::fail(
            check,
            format!(
                "wash trading score {:.2} exceeds {:.2}",
                history.wash_trading_score, config.max_wash_trading_score
            ),
        )
    } else if history.unique_traders < config.min_unique_traders {
        CheckResult::fail(
            check,
            format!(
                "only {} unique traders (min {})",
                history.unique_traders, config.min_unique_traders
            ),
        )
    } else {
        CheckResult::pass(
            check,
            1.0 - history.wash_trading_score.clamp(0.0, 1.0),
            "trading activity looks organic",
        )
    };

    result
        .with_policy(CheckPolicy::FailOpen)
        .with_metric("wash_trading_score", history.wash_trading_score)
        .with_metric("unique_traders", history.unique_traders as f64)
        .with_metric("large_tx_count", history.large_tx_count as f64)
}

/// Pump-and-dump pattern score.
///
/// `locks` is `None` when the lock lookup failed; that component then
/// contributes nothing and the result is flagged degraded.
pub fn pump_dump(
    signal: &Signal,
    locks: Option<&LiquidityLocks>,
    config: &QualityFilterConfig,
) -> CheckResult {
    let mut score = 0.0;
    let mut flags: Vec<String> = Vec::new();

    if let Some(rsi) = signal.rsi {
        if rsi > config.rsi_overbought || rsi < config.rsi_oversold {
            score += 0.3;
            flags.push(format!("rsi {:.0}", rsi));
        }
    }

    if let Some(change) = signal.price_change_5m {
        if change.abs() > config.max_price_change_5m {
            score += 0.3;
            flags.push(format!("5m change {:+.1}%", change * 100.0));
        }
    }

    if let (Some(entry), Some(support), Some(resistance)) =
        (signal.entry_price, signal.support, signal.resistance)
    {
        let upside = resistance - entry;
        let downside = entry - support;
        let asymmetric = if upside <= 0.0 || downside <= 0.0 {
            true
        } else {
            (upside / downside).max(downside / upside) > 5.0
        };
        if asymmetric {
            score += 0.2;
            flags.push("support/resistance asymmetry".to_string());
        }
    }

    let mut degraded = false;
    match locks {
        Some(lock) => {
            if !lock.is_locked || lock.pct_locked < config.min_liquidity_locked {
                score += 0.3;
                flags.push(format!("liquidity {:.0}% locked", lock.pct_locked * 100.0));
            }
        }
        None => degraded = true,
    }

    let mut result = if score >= config.max_pump_dump_score {
        CheckResult::fail(
            "pump_dump",
            format!("pump/dump pattern score {:.2}: {}", score, flags.join(", ")),
        )
    } else {
        CheckResult::pass("pump_dump", (1.0_f64 - score).max(0.0), "no pump/dump pattern")
    };
    result.degraded = degraded;
    result
        .with_policy(CheckPolicy::FailOpen)
        .with_metric("score", score)
        .with_details(json!({ "flags": flags }))
}

/// Minimum token age
pub fn token_age(age_hours: f64, config: &QualityFilterConfig) -> CheckResult {
    let result = if age_hours < config.min_token_age_hours {
        CheckResult::fail(
            "token_age",
            format!(
                "token is {:.1}h old (min {:.1}h)",
                age_hours, config.min_token_age_hours
            ),
        )
    } else {
        CheckResult::pass("token_age", 1.0, format!("token is {:.1}h old", age_hours))
    };
    result
        .with_policy(CheckPolicy::FailOpen)
        .with_metric("age_hours", age_hours)
}

/// True when a price has a single significant digit (0.5, 2, 300, 0.001)
pub fn is_round_number(value: f64) -> bool {
    if !(value > 0.0) || !value.is_finite() {
        return false;
    }
    let magnitude = 10f64.powf(value.log10().floor());
    let mantissa = value / magnitude;
    (mantissa - mantissa.round()).abs() < 1e-9
}

/// Unrealistic targets, stop sanity and round-number penalty.
///
/// The `adjusted_confidence` metric carries the penalised confidence that is
/// applied to the signal if it is ultimately accepted.
pub fn price_manipulation(
    signal: &Signal,
    min_confidence: f64,
    config: &QualityFilterConfig,
) -> CheckResult {
    let check = "price_manipulation";
    let target = signal.price_target;
    let stop = signal.stop_loss;

    let inverted = match signal.action {
        Action::Buy => target <= stop,
        Action::Sell => target >= stop,
    };
    if inverted {
        return CheckResult::fail(
            check,
            format!("{} target {} on wrong side of stop {}", signal.action, target, stop),
        );
    }

    let ratio = target.max(stop) / target.min(stop);
    if ratio > config.max_target_stop_ratio {
        return CheckResult::fail(
            check,
            format!(
                "target/stop ratio {:.1} exceeds {:.1}",
                ratio, config.max_target_stop_ratio
            ),
        )
        .with_metric("target_stop_ratio", ratio);
    }

    let mut result = CheckResult::pass(check, 1.0, "targets realistic")
        .with_metric("target_stop_ratio", ratio);

    if let Some(entry) = signal.entry_price.filter(|e| *e > 0.0) {
        let wrong_side = match signal.action {
            Action::Buy => stop >= entry,
            Action::Sell => stop <= entry,
        };
        if wrong_side {
            return CheckResult::fail(check, format!("stop {} not protective of entry {}", stop, entry));
        }

        let distance = (entry - stop).abs() / entry;
        result = result.with_metric("stop_distance", distance);
        if distance < config.min_stop_distance || distance > config.max_stop_distance {
            return CheckResult::fail(
                check,
                format!(
                    "stop distance {:.1}% outside [{:.1}%, {:.1}%]",
                    distance * 100.0,
                    config.min_stop_distance * 100.0,
                    config.max_stop_distance * 100.0
                ),
            )
            .with_metric("stop_distance", distance);
        }
    }

    let mut adjusted = signal.confidence;
    if is_round_number(target) {
        adjusted -= config.round_number_penalty;
        if adjusted < min_confidence {
            return CheckResult::fail(
                check,
                format!(
                    "round-number target {} drops confidence to {:.2} (min {:.2})",
                    target, adjusted, min_confidence
                ),
            )
            .with_metric("adjusted_confidence", adjusted);
        }
        result.reason = format!("round-number target {} penalised", target);
    }

    result.confidence_score = adjusted;
    result.with_metric("adjusted_confidence", adjusted)
}
