use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Opaque ticker string. Unique key across the domain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Symbol::new(s)
    }
}

/// A top-of-book quote. All numeric fields are optional because upstream
/// feeds occasionally omit one side during illiquid sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub last: Option<Decimal>,
    pub volume: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    /// Enforces the `bid <= ask` invariant when both sides are present.
    pub fn is_valid(&self) -> bool {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) => b <= a,
            _ => true,
        }
    }

    pub fn mid(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) => Some((b + a) / Decimal::from(2)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionSide {
    Call,
    Put,
}

/// A single listed option contract, Greeks included.
///
/// Invariants enforced by adapters at construction time (not re-validated on
/// every access): `strike > 0`, `expiration_date >= today`,
/// `0 <= |delta| <= 1`, `dte` consistent with `expiration_date`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionContract {
    pub option_symbol: String,
    pub underlying: Symbol,
    pub side: OptionSide,
    pub strike: Decimal,
    pub expiration_date: NaiveDate,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub last: Option<Decimal>,
    pub volume: Option<i64>,
    pub open_interest: Option<i64>,
    pub delta: Option<Decimal>,
    pub gamma: Option<Decimal>,
    pub theta: Option<Decimal>,
    pub vega: Option<Decimal>,
    pub iv: Option<Decimal>,
    pub dte: i64,
    pub updated_at: DateTime<Utc>,
    /// True when the upstream feed marks this contract as adjusted (e.g. for
    /// a stock split or special dividend), making its deliverable non-standard
    /// (not 100 shares of the named underlying). Excluded from candidate
    /// pairing unless `allow_non_standard` is set.
    pub adjusted: bool,
}

impl OptionContract {
    /// `mid = (bid + ask) / 2` when both sides are present.
    pub fn mid(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) => Some((b + a) / Decimal::from(2)),
            _ => None,
        }
    }

    /// Bid-ask spread as a fraction of mid price. `None` if mid is zero or
    /// either side is missing.
    pub fn spread_pct(&self) -> Option<Decimal> {
        let (bid, ask) = (self.bid?, self.ask?);
        let mid = self.mid()?;
        if mid.is_zero() {
            return None;
        }
        Some((ask - bid) / mid)
    }

    pub fn abs_delta(&self) -> Option<Decimal> {
        self.delta.map(|d| d.abs())
    }

    pub fn is_liquid(&self, min_open_interest: i64, max_spread_pct: Decimal) -> bool {
        let oi_ok = self.open_interest.unwrap_or(0) >= min_open_interest;
        let bid_positive = self.bid.map(|b| b > Decimal::ZERO).unwrap_or(false);
        let ask_gt_bid = match (self.bid, self.ask) {
            (Some(b), Some(a)) => a > b,
            _ => false,
        };
        let spread_ok = self
            .spread_pct()
            .map(|s| s <= max_spread_pct)
            .unwrap_or(false);
        oi_ok && bid_positive && ask_gt_bid && spread_ok
    }
}

/// An immutable snapshot of a symbol's option chain, as returned by the
/// options provider. Lookup views are computed on demand; the chain itself
/// is never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionChain {
    pub underlying: Symbol,
    pub underlying_price: Decimal,
    pub updated_at: DateTime<Utc>,
    pub contracts: Vec<OptionContract>,
}

impl OptionChain {
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    pub fn calls(&self) -> impl Iterator<Item = &OptionContract> {
        self.contracts.iter().filter(|c| c.side == OptionSide::Call)
    }

    pub fn puts(&self) -> impl Iterator<Item = &OptionContract> {
        self.contracts.iter().filter(|c| c.side == OptionSide::Put)
    }

    pub fn by_expiration(&self, date: NaiveDate) -> impl Iterator<Item = &OptionContract> {
        self.contracts.iter().filter(move |c| c.expiration_date == date)
    }

    pub fn by_dte_range(&self, min_dte: i64, max_dte: i64) -> impl Iterator<Item = &OptionContract> {
        self.contracts
            .iter()
            .filter(move |c| c.dte >= min_dte && c.dte <= max_dte)
    }

    pub fn by_delta_range(&self, min: Decimal, max: Decimal) -> impl Iterator<Item = &OptionContract> {
        self.contracts.iter().filter(move |c| {
            c.abs_delta().map(|d| d >= min && d <= max).unwrap_or(false)
        })
    }
}

/// Selection criteria for the long (LEAPS) leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LEAPSCriteria {
    pub min_dte: i64,
    pub max_dte: i64,
    pub min_delta: Decimal,
    pub max_delta: Decimal,
    pub min_open_interest: i64,
    pub max_bid_ask_spread_pct: Decimal,
}

impl Default for LEAPSCriteria {
    fn default() -> Self {
        Self {
            min_dte: 270,
            max_dte: 720,
            min_delta: Decimal::new(75, 2),
            max_delta: Decimal::new(90, 2),
            min_open_interest: 10,
            max_bid_ask_spread_pct: Decimal::new(15, 2),
        }
    }
}

/// Selection criteria for the short near-term call leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortCallCriteria {
    pub min_dte: i64,
    pub max_dte: i64,
    pub min_delta: Decimal,
    pub max_delta: Decimal,
    pub min_open_interest: i64,
    pub max_bid_ask_spread_pct: Decimal,
}

impl Default for ShortCallCriteria {
    fn default() -> Self {
        Self {
            min_dte: 21,
            max_dte: 45,
            min_delta: Decimal::new(20, 2),
            max_delta: Decimal::new(35, 2),
            min_open_interest: 10,
            max_bid_ask_spread_pct: Decimal::new(15, 2),
        }
    }
}

/// A warning attached to a candidate that does not exclude it from results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateWarning {
    EarlyAssignmentRisk,
}

/// A two-leg PMCC position: long a deep-ITM LEAPS call, short a near-term
/// OTM call. Every field here is derived at construction time and the
/// invariants below are re-verified in `PMCCCandidate::new` — construction
/// fails with `ProviderError::InvariantViolation` rather than silently
/// producing an inconsistent candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PMCCCandidate {
    pub symbol: Symbol,
    pub underlying_price: Decimal,
    pub long_leaps: OptionContract,
    pub short_call: OptionContract,
    pub net_debit: Decimal,
    pub credit_received: Decimal,
    pub max_profit: Decimal,
    pub max_loss: Decimal,
    pub breakeven_price: Decimal,
    pub risk_reward_ratio: Decimal,
    pub strategy_greeks: StrategyGreeks,
    pub liquidity_score: Decimal,
    pub traditional_score: Decimal,
    pub warnings: Vec<CandidateWarning>,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StrategyGreeks {
    pub delta: Decimal,
    pub gamma: Decimal,
    pub theta: Decimal,
    pub vega: Decimal,
}

/// Per-contract share multiplier. 100 unless overridden by config (never
/// overridden for standard US equity options, but kept explicit per the
/// strict invariant list in the economics formulas).
pub const DEFAULT_CONTRACT_MULTIPLIER: i64 = 100;

impl PMCCCandidate {
    /// Construct a candidate from a long/short pair, computing and
    /// re-verifying every invariant from the data model:
    ///
    /// - both legs are calls
    /// - `long.strike <= underlying_price` (ITM)
    /// - `short.strike > long.strike`
    /// - `short.strike > long.strike + net_debit` (profitability guard)
    /// - `long.expiration > short.expiration`
    /// - `net_debit = long.ask - short.bid > 0`
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        underlying_price: Decimal,
        long_leaps: OptionContract,
        short_call: OptionContract,
        multiplier: i64,
        liquidity_score: Decimal,
        traditional_score: Decimal,
        warnings: Vec<CandidateWarning>,
        now: DateTime<Utc>,
    ) -> Result<Self, ProviderError> {
        let violation = |message: &str| ProviderError::InvariantViolation {
            what: "PMCCCandidate".to_string(),
            message: message.to_string(),
        };

        if long_leaps.side != OptionSide::Call || short_call.side != OptionSide::Call {
            return Err(violation("both legs must be calls"));
        }
        if long_leaps.strike > underlying_price {
            return Err(violation("long leg must be in-the-money (strike <= underlying_price)"));
        }
        if short_call.strike <= long_leaps.strike {
            return Err(violation("short strike must exceed long strike"));
        }
        if long_leaps.expiration_date <= short_call.expiration_date {
            return Err(violation("long expiration must be after short expiration"));
        }

        let long_ask = long_leaps
            .ask
            .ok_or_else(|| violation("long leg missing ask price"))?;
        let short_bid = short_call
            .bid
            .ok_or_else(|| violation("short leg missing bid price"))?;
        let net_debit = long_ask - short_bid;
        if net_debit <= Decimal::ZERO {
            return Err(violation("net debit must be strictly positive"));
        }
        if short_call.strike <= long_leaps.strike + net_debit {
            return Err(violation("short strike must exceed long strike plus net debit"));
        }

        let multiplier_dec = Decimal::from(multiplier);
        let max_loss = net_debit * multiplier_dec;
        let max_profit = (short_call.strike - long_leaps.strike - net_debit) * multiplier_dec;
        let breakeven_price = long_leaps.strike + net_debit;
        if max_loss <= Decimal::ZERO {
            return Err(violation("max loss must be strictly positive"));
        }
        if max_profit <= Decimal::ZERO {
            return Err(violation("max profit must be strictly positive"));
        }

        let risk_reward_ratio = if max_loss.is_zero() {
            Decimal::ZERO
        } else {
            max_profit / max_loss
        };

        let strategy_greeks = StrategyGreeks {
            delta: long_leaps.delta.unwrap_or_default() - short_call.delta.unwrap_or_default(),
            gamma: long_leaps.gamma.unwrap_or_default() - short_call.gamma.unwrap_or_default(),
            theta: long_leaps.theta.unwrap_or_default() - short_call.theta.unwrap_or_default(),
            vega: long_leaps.vega.unwrap_or_default() - short_call.vega.unwrap_or_default(),
        };

        let credit_received = short_bid * multiplier_dec;

        Ok(Self {
            symbol,
            underlying_price,
            long_leaps,
            short_call,
            net_debit,
            credit_received,
            max_profit,
            max_loss,
            breakeven_price,
            risk_reward_ratio,
            strategy_greeks,
            liquidity_score,
            traditional_score,
            warnings,
            analyzed_at: now,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fundamentals {
    pub market_cap: Option<Decimal>,
    pub pe_ratio: Option<Decimal>,
    pub revenue_growth_pct: Option<Decimal>,
    pub profit_margin_pct: Option<Decimal>,
    pub dividend_yield_pct: Option<Decimal>,
    pub sector: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub kind: CalendarEventKind,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalendarEventKind {
    Earnings,
    ExDividend,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Technicals {
    pub rsi_14: Option<Decimal>,
    pub sma_50: Option<Decimal>,
    pub sma_200: Option<Decimal>,
    pub realized_volatility_30d: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub beta: Option<Decimal>,
    pub short_interest_pct: Option<Decimal>,
}

/// Everything the enhanced data collector (C7) gathers for a candidate
/// symbol before the LLM enrichment stage runs. Every sub-object is
/// independently optional; `completeness_score` records the fraction of the
/// expected fields (fundamentals, calendar_events, technicals, risk_metrics
/// — 4 total) that were actually populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedStockData {
    pub symbol: Symbol,
    pub fundamentals: Option<Fundamentals>,
    pub calendar_events: Option<Vec<CalendarEvent>>,
    pub technicals: Option<Technicals>,
    pub risk_metrics: Option<RiskMetrics>,
    pub completeness_score: Decimal,
    pub collected_at: DateTime<Utc>,
}

impl EnhancedStockData {
    pub fn compute_completeness(
        fundamentals: &Option<Fundamentals>,
        calendar_events: &Option<Vec<CalendarEvent>>,
        technicals: &Option<Technicals>,
        risk_metrics: &Option<RiskMetrics>,
    ) -> Decimal {
        let total = 4u32;
        let populated = [
            fundamentals.is_some(),
            calendar_events.is_some(),
            technicals.is_some(),
            risk_metrics.is_some(),
        ]
        .iter()
        .filter(|x| **x)
        .count() as u32;
        Decimal::from(populated) * Decimal::from(100) / Decimal::from(total)
    }

    /// Whether this symbol's earnings fall within `days` of today — used to
    /// flag `EarlyAssignmentRisk` on the short leg.
    pub fn has_earnings_within(&self, today: NaiveDate, days: i64) -> bool {
        self.calendar_events
            .as_ref()
            .map(|events| {
                events.iter().any(|e| {
                    e.kind == CalendarEventKind::Earnings
                        && (e.date - today).num_days().abs() <= days
                })
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ComponentScores {
    pub risk: Decimal,
    pub strategy: Decimal,
    pub liquidity: Decimal,
    pub fundamental: Decimal,
    pub technical: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Hold,
    Avoid,
}

/// A single LLM-generated qualitative review of one candidate. Produced once
/// per (scan, candidate) and persisted verbatim in the exported artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIAnalysis {
    pub symbol: Symbol,
    pub ai_score: Decimal,
    pub component_scores: ComponentScores,
    pub recommendation: Recommendation,
    pub confidence: Decimal,
    pub reasoning: String,
    pub key_strengths: Vec<String>,
    pub key_risks: Vec<String>,
    pub model_id: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost_estimate: Decimal,
    pub completed_at: DateTime<Utc>,
}

/// A `PMCCCandidate` enriched with optional fundamentals/technicals and an
/// optional AI review. `combined_score` is `0.6*traditional + 0.4*ai` when
/// `ai` is present, else exactly `traditional_score`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedOpportunity {
    pub pmcc: PMCCCandidate,
    pub enhanced: Option<EnhancedStockData>,
    pub ai: Option<AIAnalysis>,
    pub combined_score: Decimal,
}

/// Weights for blending traditional and AI scores. Exposed as config so the
/// 0.6/0.4 split from the spec can be tuned without a code change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreBlendWeights {
    pub traditional: Decimal,
    pub ai: Decimal,
}

impl Default for ScoreBlendWeights {
    fn default() -> Self {
        Self {
            traditional: Decimal::new(6, 1),
            ai: Decimal::new(4, 1),
        }
    }
}

impl RankedOpportunity {
    pub fn new(pmcc: PMCCCandidate, enhanced: Option<EnhancedStockData>, ai: Option<AIAnalysis>) -> Self {
        let combined_score = match &ai {
            None => pmcc.traditional_score,
            Some(analysis) => {
                let weights = ScoreBlendWeights::default();
                (weights.traditional * pmcc.traditional_score + weights.ai * analysis.ai_score)
                    .round_dp(2)
            }
        };
        Self {
            pmcc,
            enhanced,
            ai,
            combined_score,
        }
    }

    pub fn recompute_combined_score(&mut self) {
        self.combined_score = match &self.ai {
            None => self.pmcc.traditional_score,
            Some(analysis) => {
                let weights = ScoreBlendWeights::default();
                (weights.traditional * self.pmcc.traditional_score + weights.ai * analysis.ai_score)
                    .round_dp(2)
            }
        };
    }
}

/// Per-symbol/candidate error recorded during a scan. Errors local to one
/// symbol never abort the whole scan; they accumulate here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanErrorRecord {
    pub phase: ScanPhase,
    pub symbol: Option<Symbol>,
    pub kind: String,
    pub message: String,
    pub provider_id: Option<String>,
    pub retryable: bool,
    pub at: DateTime<Utc>,
}

impl ScanErrorRecord {
    pub fn from_provider_error(phase: ScanPhase, symbol: Option<Symbol>, err: &ProviderError) -> Self {
        Self {
            phase,
            symbol,
            kind: variant_name(err),
            message: err.to_string(),
            provider_id: err.provider_id().map(|s| s.to_string()),
            retryable: err.retryable(),
            at: Utc::now(),
        }
    }
}

fn variant_name(err: &ProviderError) -> String {
    // thiserror's Display is message-shaped; a short discriminant name is
    // more useful for grouping in the exported artifact.
    match err {
        ProviderError::ConfigError(_) => "ConfigError",
        ProviderError::UnsupportedOperation { .. } => "UnsupportedOperation",
        ProviderError::NoProviderAvailable { .. } => "NoProviderAvailable",
        ProviderError::RateLimited { .. } => "RateLimited",
        ProviderError::DailyLimitExceeded { .. } => "DailyLimitExceeded",
        ProviderError::BudgetExceeded { .. } => "BudgetExceeded",
        ProviderError::CircuitOpen { .. } => "CircuitOpen",
        ProviderError::UpstreamTransient { .. } => "UpstreamTransient",
        ProviderError::UpstreamClientError { .. } => "UpstreamClientError",
        ProviderError::AuthError { .. } => "AuthError",
        ProviderError::ParseError { .. } => "ParseError",
        ProviderError::NoChain { .. } => "NoChain",
        ProviderError::NoData { .. } => "NoData",
        ProviderError::InvariantViolation { .. } => "InvariantViolation",
        ProviderError::NotificationFailure { .. } => "NotificationFailure",
        ProviderError::Cancelled => "Cancelled",
    }
    .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Screening,
    ChainFetch,
    PairEnumeration,
    Scoring,
    Enhancement,
    AiAnalysis,
    Notification,
}

/// Per-provider call accounting, accumulated across the whole scan.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProviderUsage {
    pub calls: u64,
    pub credits: u64,
    pub errors: u64,
    pub total_latency_ms: u64,
}

impl ProviderUsage {
    pub fn avg_latency_ms(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.calls as f64
        }
    }

    pub fn record(&mut self, credits: u64, latency_ms: u64, is_error: bool) {
        self.calls += 1;
        self.credits += credits;
        self.total_latency_ms += latency_ms;
        if is_error {
            self.errors += 1;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanStats {
    pub screened: usize,
    pub passed_screening: usize,
    pub chains_analyzed: usize,
    pub candidates_found: usize,
    pub ai_analyzed: usize,
    /// Pairs that were rejected at `PMCCCandidate::new` construction time
    /// because upstream data violated a structural invariant (e.g. a
    /// mislabeled deep-ITM contract with `strike > underlying_price`).
    pub invariant_violations: usize,
}

/// The full output of one scan run. `opportunities` is always sorted by
/// `combined_score` descending and truncated to the configured `top_k`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResults {
    pub scan_id: uuid::Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub config_snapshot: serde_json::Value,
    pub stats: ScanStats,
    pub provider_usage: HashMap<String, ProviderUsage>,
    pub opportunities: Vec<RankedOpportunity>,
    pub errors: Vec<ScanErrorRecord>,
    pub warnings: Vec<String>,
}

impl ScanResults {
    pub fn new(config_snapshot: serde_json::Value) -> Self {
        Self {
            scan_id: uuid::Uuid::new_v4(),
            started_at: Utc::now(),
            completed_at: None,
            config_snapshot,
            stats: ScanStats::default(),
            provider_usage: HashMap::new(),
            opportunities: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Sort by `combined_score` descending and truncate to `top_k`.
    pub fn finalize_opportunities(&mut self, top_k: usize) {
        self.opportunities.sort_by(|a, b| {
            b.combined_score
                .cmp(&a.combined_score)
                .then_with(|| tie_break(a, b))
        });
        self.opportunities.truncate(top_k);
    }

    pub fn record_usage(&mut self, provider_id: &str, credits: u64, latency_ms: u64, is_error: bool) {
        self.provider_usage
            .entry(provider_id.to_string())
            .or_default()
            .record(credits, latency_ms, is_error);
    }
}

/// Tie-break order for equal `combined_score`: higher profit/loss ratio,
/// then higher summed open interest, then earlier short expiration.
fn tie_break(a: &RankedOpportunity, b: &RankedOpportunity) -> std::cmp::Ordering {
    let rr = b.pmcc.risk_reward_ratio.cmp(&a.pmcc.risk_reward_ratio);
    if rr != std::cmp::Ordering::Equal {
        return rr;
    }
    let oi_a = a.pmcc.long_leaps.open_interest.unwrap_or(0) + a.pmcc.short_call.open_interest.unwrap_or(0);
    let oi_b = b.pmcc.long_leaps.open_interest.unwrap_or(0) + b.pmcc.short_call.open_interest.unwrap_or(0);
    let oi = oi_b.cmp(&oi_a);
    if oi != std::cmp::Ordering::Equal {
        return oi;
    }
    a.pmcc.short_call.expiration_date.cmp(&b.pmcc.short_call.expiration_date)
}
