pub mod scaling;

use pmcc_core::{OptionContract, PMCCCandidate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use scaling::{logistic_saturating, rescale_linear};

/// Floors/ceilings and weights for the 0-100 scoring model. Every threshold
/// the spec calls "configurable" lives here rather than as a magic number
/// inline, so a deployment can retune without a code change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub spread_pct_floor: f64,
    pub spread_pct_ceiling: f64,
    pub open_interest_floor: f64,
    pub open_interest_ceiling: f64,
    pub volume_floor: f64,
    pub volume_ceiling: f64,
    pub profitability_midpoint: f64,
    pub profitability_steepness: f64,
    pub default_technical_score: Decimal,
    pub weight_profitability: Decimal,
    pub weight_risk: Decimal,
    pub weight_liquidity: Decimal,
    pub weight_technical: Decimal,
    pub min_total_score: Decimal,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            spread_pct_floor: 0.0,
            spread_pct_ceiling: 0.20,
            open_interest_floor: 10.0,
            open_interest_ceiling: 500.0,
            volume_floor: 0.0,
            volume_ceiling: 1000.0,
            profitability_midpoint: 2.0,
            profitability_steepness: 2.0,
            default_technical_score: Decimal::from(50),
            weight_profitability: Decimal::new(40, 2),
            weight_risk: Decimal::new(30, 2),
            weight_liquidity: Decimal::new(20, 2),
            weight_technical: Decimal::new(10, 2),
            min_total_score: Decimal::from(60),
        }
    }
}

/// 0-100 composite of bid-ask spread (40%), open interest (30%), and
/// volume (30%) for one leg, each rescaled against configured floors and
/// ceilings; the pair's score is the simple average of both legs.
pub fn liquidity_score(long: &OptionContract, short: &OptionContract, config: &ScoringConfig) -> Decimal {
    let leg_score = |c: &OptionContract| -> f64 {
        let spread_pct = c.spread_pct().and_then(|d| d.to_f64()).unwrap_or(config.spread_pct_ceiling);
        let oi = c.open_interest.unwrap_or(0) as f64;
        let volume = c.volume.unwrap_or(0) as f64;

        let spread_component = rescale_linear(spread_pct, config.spread_pct_floor, config.spread_pct_ceiling, true);
        let oi_component = rescale_linear(oi, config.open_interest_floor, config.open_interest_ceiling, false);
        let volume_component = rescale_linear(volume, config.volume_floor, config.volume_ceiling, false);

        spread_component * 0.4 + oi_component * 0.3 + volume_component * 0.3
    };

    let score = (leg_score(long) + leg_score(short)) / 2.0;
    Decimal::from_f64_retain(score).unwrap_or_default().round_dp(2)
}

/// The four 0-100 sub-scores and their weighted composite, computed from an
/// already-constructed `PMCCCandidate` (its economics were established and
/// invariant-checked by `PMCCCandidate::new`). `technical_override` is
/// supplied by the enhanced data collector (C7) when available; absent that,
/// the configured default (50) is used, matching the spec's "technical
/// (10%): default 50 unless an override is supplied."
pub fn composite_score(
    candidate: &PMCCCandidate,
    multiplier: i64,
    liquidity_score: Decimal,
    technical_override: Option<Decimal>,
    config: &ScoringConfig,
) -> Decimal {
    let risk_reward = candidate.risk_reward_ratio.to_f64().unwrap_or(0.0);
    let profitability = logistic_saturating(risk_reward, config.profitability_midpoint, config.profitability_steepness);

    let max_loss = candidate.max_loss.to_f64().unwrap_or(0.0);
    let notional = (candidate.underlying_price * Decimal::from(multiplier)).to_f64().unwrap_or(1.0).max(1.0);
    let loss_ratio = max_loss / notional;
    let loss_component = rescale_linear(loss_ratio, 0.0, 1.0, true);
    let theta_bonus = if candidate.strategy_greeks.theta >= Decimal::ZERO { 10.0 } else { 0.0 };
    let risk = (loss_component + theta_bonus).min(100.0);

    let technical = technical_override.unwrap_or(config.default_technical_score);

    let profitability_dec = Decimal::from_f64_retain(profitability).unwrap_or_default();
    let risk_dec = Decimal::from_f64_retain(risk).unwrap_or_default();

    let composite = config.weight_profitability * profitability_dec
        + config.weight_risk * risk_dec
        + config.weight_liquidity * liquidity_score
        + config.weight_technical * technical;

    composite.round_dp(2)
}

pub fn passes_minimum(score: Decimal, config: &ScoringConfig) -> bool {
    score >= config.min_total_score
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use pmcc_core::{OptionSide, Symbol};

    fn contract(side: OptionSide, strike: i64, bid: &str, ask: &str, oi: i64, volume: i64, delta: &str) -> OptionContract {
        OptionContract {
            option_symbol: "TEST".to_string(),
            underlying: Symbol::new("TEST"),
            side,
            strike: Decimal::from(strike),
            expiration_date: NaiveDate::from_ymd_opt(2027, 1, 15).unwrap(),
            bid: Some(bid.parse().unwrap()),
            ask: Some(ask.parse().unwrap()),
            last: None,
            volume: Some(volume),
            open_interest: Some(oi),
            delta: Some(delta.parse().unwrap()),
            gamma: Some(Decimal::ZERO),
            theta: Some(Decimal::new(-2, 2)),
            vega: Some(Decimal::ZERO),
            iv: None,
            dte: 400,
            updated_at: Utc::now(),
            adjusted: false,
        }
    }

    #[test]
    fn liquidity_score_rewards_tight_spread_and_deep_oi() {
        let config = ScoringConfig::default();
        let tight = contract(OptionSide::Call, 100, "9.90", "10.00", 400, 800, "0.80");
        let wide = contract(OptionSide::Call, 100, "8.00", "12.00", 5, 2, "0.80");
        let tight_score = liquidity_score(&tight, &tight, &config);
        let wide_score = liquidity_score(&wide, &wide, &config);
        assert!(tight_score > wide_score);
    }
}
