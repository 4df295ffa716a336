use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use market_data_provider::ChainFilter;
use pmcc_core::{
    CandidateWarning, LEAPSCriteria, OptionChain, OptionContract, OptionSide, PMCCCandidate,
    Quote, ScanErrorRecord, ScanPhase, ShortCallCriteria, Symbol, DEFAULT_CONTRACT_MULTIPLIER,
};
use provider_registry::ProviderRegistry;
use risk_score::{self, ScoringConfig};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Best-effort dividend context for the `EarlyAssignmentRisk` flag. The
/// coordinator may supply this from a prior calendar lookup; when absent the
/// flag is simply never raised, since §4.5 treats it as a warning, not a
/// required check.
#[derive(Debug, Clone, Default)]
pub struct DividendContext {
    pub ex_dividend_date: Option<NaiveDate>,
    pub expected_dividend_per_share: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    pub leaps: LEAPSCriteria,
    pub short_call: ShortCallCriteria,
    pub max_candidates_per_symbol: usize,
    pub contract_multiplier: i64,
    pub allow_non_standard: bool,
    pub scoring: ScoringConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            leaps: LEAPSCriteria::default(),
            short_call: ShortCallCriteria::default(),
            max_candidates_per_symbol: 3,
            contract_multiplier: DEFAULT_CONTRACT_MULTIPLIER,
            allow_non_standard: false,
            scoring: ScoringConfig::default(),
        }
    }
}

#[derive(Debug, Default)]
pub struct AnalysisOutcome {
    pub candidates: Vec<PMCCCandidate>,
    pub chain: Option<OptionChain>,
    pub errors: Vec<ScanErrorRecord>,
    pub warnings: Vec<String>,
    pub invariant_violations: usize,
    pub chain_fetched: bool,
}

/// C5: fetches one symbol's option chain, selects LEAPS/short-call pairs
/// satisfying the configured criteria, and scores + ranks the resulting
/// candidates. Stateless across symbols; every call is independent.
pub struct OptionsAnalyzer {
    registry: Arc<ProviderRegistry>,
}

impl OptionsAnalyzer {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub async fn analyze(
        &self,
        symbol: &Symbol,
        quote: &Quote,
        config: &AnalyzerConfig,
        dividends: Option<&DividendContext>,
        retain_chain: bool,
    ) -> AnalysisOutcome {
        let mut outcome = AnalysisOutcome::default();

        let filter = ChainFilter {
            side: Some(OptionSide::Call),
            min_dte: Some(config.short_call.min_dte),
            max_dte: Some(config.leaps.max_dte),
            ..Default::default()
        };

        let chain = match self.registry.get_option_chain(symbol.clone(), filter).await {
            Ok(chain) => chain,
            Err(e) => {
                outcome
                    .errors
                    .push(ScanErrorRecord::from_provider_error(ScanPhase::ChainFetch, Some(symbol.clone()), &e));
                return outcome;
            }
        };
        outcome.chain_fetched = true;

        if chain.is_empty() {
            outcome.warnings.push(format!("{symbol}: NoChain — empty option chain returned"));
            return outcome;
        }

        let underlying_price = if chain.underlying_price > Decimal::ZERO {
            chain.underlying_price
        } else {
            quote.mid().or(quote.last).unwrap_or_default()
        };

        let leaps: Vec<&OptionContract> = chain
            .calls()
            .filter(|c| config.allow_non_standard || !c.adjusted)
            .filter(|c| c.dte >= config.leaps.min_dte && c.dte <= config.leaps.max_dte)
            .filter(|c| {
                c.abs_delta()
                    .map(|d| d >= config.leaps.min_delta && d <= config.leaps.max_delta)
                    .unwrap_or(false)
            })
            .filter(|c| c.strike <= underlying_price)
            .filter(|c| c.is_liquid(config.leaps.min_open_interest, config.leaps.max_bid_ask_spread_pct))
            .collect();

        let shorts: Vec<&OptionContract> = chain
            .calls()
            .filter(|c| config.allow_non_standard || !c.adjusted)
            .filter(|c| c.dte >= config.short_call.min_dte && c.dte <= config.short_call.max_dte)
            .filter(|c| {
                c.abs_delta()
                    .map(|d| d >= config.short_call.min_delta && d <= config.short_call.max_delta)
                    .unwrap_or(false)
            })
            .filter(|c| c.strike > underlying_price)
            .filter(|c| c.is_liquid(config.short_call.min_open_interest, config.short_call.max_bid_ask_spread_pct))
            .collect();

        let now = Utc::now();
        let mut candidates: Vec<PMCCCandidate> = Vec::new();

        for long in &leaps {
            for short in &shorts {
                let warnings = dividend_warnings(short, underlying_price, dividends, now.date_naive());

                match PMCCCandidate::new(
                    symbol.clone(),
                    underlying_price,
                    (*long).clone(),
                    (*short).clone(),
                    config.contract_multiplier,
                    Decimal::ZERO,
                    Decimal::ZERO,
                    warnings,
                    now,
                ) {
                    Ok(mut candidate) => {
                        let liquidity = risk_score::liquidity_score(long, short, &config.scoring);
                        let composite = risk_score::composite_score(&candidate, config.contract_multiplier, liquidity, None, &config.scoring);
                        candidate.liquidity_score = liquidity;
                        candidate.traditional_score = composite;
                        if risk_score::passes_minimum(composite, &config.scoring) {
                            candidates.push(candidate);
                        }
                    }
                    Err(_) => {
                        outcome.invariant_violations += 1;
                    }
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.traditional_score
                .cmp(&a.traditional_score)
                .then_with(|| tie_break(a, b))
        });
        candidates.truncate(config.max_candidates_per_symbol);

        outcome.candidates = candidates;
        if retain_chain {
            outcome.chain = Some(chain);
        }
        outcome
    }
}

/// Tie-break for equal `traditional_score`: higher profit/loss ratio, then
/// higher summed open interest, then earlier short expiration.
fn tie_break(a: &PMCCCandidate, b: &PMCCCandidate) -> std::cmp::Ordering {
    let rr = b.risk_reward_ratio.cmp(&a.risk_reward_ratio);
    if rr != std::cmp::Ordering::Equal {
        return rr;
    }
    let oi_a = a.long_leaps.open_interest.unwrap_or(0) + a.short_call.open_interest.unwrap_or(0);
    let oi_b = b.long_leaps.open_interest.unwrap_or(0) + b.short_call.open_interest.unwrap_or(0);
    let oi = oi_b.cmp(&oi_a);
    if oi != std::cmp::Ordering::Equal {
        return oi;
    }
    a.short_call.expiration_date.cmp(&b.short_call.expiration_date)
}

/// Flags `EarlyAssignmentRisk` when the underlying has an ex-dividend date
/// within the short leg's remaining life and the short leg's extrinsic
/// value is less than the expected dividend (the classic early-assignment
/// setup for short ITM/near-ATM calls).
fn dividend_warnings(
    short: &OptionContract,
    underlying_price: Decimal,
    dividends: Option<&DividendContext>,
    today: NaiveDate,
) -> Vec<CandidateWarning> {
    let Some(ctx) = dividends else {
        return Vec::new();
    };
    let (Some(ex_date), Some(expected_dividend)) = (ctx.ex_dividend_date, ctx.expected_dividend_per_share) else {
        return Vec::new();
    };
    if ex_date < today || ex_date > short.expiration_date {
        return Vec::new();
    }

    let intrinsic = (underlying_price - short.strike).max(Decimal::ZERO);
    let extrinsic = short.mid().map(|mid| (mid - intrinsic).max(Decimal::ZERO)).unwrap_or_default();

    if extrinsic < expected_dividend {
        vec![CandidateWarning::EarlyAssignmentRisk]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pmcc_core::Symbol;

    fn contract(side: OptionSide, strike: &str, dte: i64, delta: &str, bid: &str, ask: &str, oi: i64) -> OptionContract {
        OptionContract {
            option_symbol: "TEST".to_string(),
            underlying: Symbol::new("TEST"),
            side,
            strike: strike.parse().unwrap(),
            expiration_date: Utc::now().date_naive() + chrono::Duration::days(dte),
            bid: Some(bid.parse().unwrap()),
            ask: Some(ask.parse().unwrap()),
            last: None,
            volume: Some(100),
            open_interest: Some(oi),
            delta: Some(delta.parse().unwrap()),
            gamma: Some(Decimal::ZERO),
            theta: Some(Decimal::new(-1, 2)),
            vega: Some(Decimal::ZERO),
            iv: None,
            dte,
            updated_at: Utc::now(),
            adjusted: false,
        }
    }

    #[test]
    fn tie_break_prefers_higher_risk_reward_then_open_interest() {
        let now = Utc::now();
        let long = contract(OptionSide::Call, "80", 400, "0.80", "21.00", "21.50", 50);
        let short_a = contract(OptionSide::Call, "100", 30, "0.25", "2.00", "2.10", 50);
        let short_b = contract(OptionSide::Call, "105", 30, "0.20", "1.00", "1.10", 200);

        let a = PMCCCandidate::new(
            Symbol::new("TEST"), Decimal::from(95), long.clone(), short_a, 100,
            Decimal::ZERO, Decimal::from(70), vec![], now,
        ).unwrap();
        let b = PMCCCandidate::new(
            Symbol::new("TEST"), Decimal::from(95), long, short_b, 100,
            Decimal::ZERO, Decimal::from(70), vec![], now,
        ).unwrap();

        let mut candidates = vec![a, b];
        candidates.sort_by(|x, y| tie_break(x, y));
        assert!(candidates[0].risk_reward_ratio >= candidates[1].risk_reward_ratio);
    }

    #[test]
    fn no_dividend_context_never_flags_risk() {
        let short = contract(OptionSide::Call, "100", 30, "0.25", "2.00", "2.10", 50);
        let warnings = dividend_warnings(&short, Decimal::from(95), None, Utc::now().date_naive());
        assert!(warnings.is_empty());
    }

    #[test]
    fn ex_dividend_past_short_expiration_not_flagged() {
        let short = contract(OptionSide::Call, "100", 10, "0.25", "0.10", "0.20", 50);
        let ctx = DividendContext {
            ex_dividend_date: Some(Utc::now().date_naive() + chrono::Duration::days(60)),
            expected_dividend_per_share: Some(Decimal::new(50, 2)),
        };
        let warnings = dividend_warnings(&short, Decimal::from(95), Some(&ctx), Utc::now().date_naive());
        assert!(warnings.is_empty());
    }

    #[test]
    fn otm_short_with_dividend_exceeding_extrinsic_flags_risk() {
        let short = contract(OptionSide::Call, "100", 10, "0.25", "0.10", "0.20", 50);
        let ctx = DividendContext {
            ex_dividend_date: Some(Utc::now().date_naive() + chrono::Duration::days(5)),
            expected_dividend_per_share: Some(Decimal::new(50, 2)),
        };
        let warnings = dividend_warnings(&short, Decimal::from(95), Some(&ctx), Utc::now().date_naive());
        assert_eq!(warnings, vec![CandidateWarning::EarlyAssignmentRisk]);
    }
}
