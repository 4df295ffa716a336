use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use market_data_provider::Operation;
use pmcc_core::{EnhancedStockData, PMCCCandidate, RankedOpportunity, ScanErrorRecord, ScanPhase};
use provider_registry::ProviderRegistry;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub max_concurrent_analyses: usize,
    pub daily_cost_limit_usd: Decimal,
    /// Assumed prompt size for the pre-call budget estimate; the true cost
    /// (from the provider's actual token usage) is what's recorded against
    /// the budget once a call completes.
    pub estimated_prompt_tokens: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_analyses: 3,
            daily_cost_limit_usd: Decimal::from(50),
            estimated_prompt_tokens: 600,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MarketContext {
    pub scan_id: Uuid,
    pub as_of: DateTime<Utc>,
}

/// Atomic running-cost counter shared by every worker, in USD cents to avoid
/// floating point. Mirrors the teacher's move away from mutable class
/// variables: a single `AtomicU64` owned by the orchestrator, snapshot via
/// `spent_usd()`.
pub struct CostTracker {
    spent_cents: AtomicU64,
    limit_cents: u64,
}

impl CostTracker {
    pub fn new(limit_usd: Decimal) -> Self {
        let limit_cents = (limit_usd * Decimal::from(100)).round().to_u64().unwrap_or(0);
        Self {
            spent_cents: AtomicU64::new(0),
            limit_cents,
        }
    }

    /// Reserve `estimate_cents` against the budget if doing so would not
    /// exceed the daily limit. Returns `false` (no reservation made) when it
    /// would — the budget check happens atomically so two concurrent
    /// workers can't both squeeze past the ceiling.
    pub fn try_reserve(&self, estimate_cents: u64) -> bool {
        let mut current = self.spent_cents.load(Ordering::SeqCst);
        loop {
            if current.saturating_add(estimate_cents) > self.limit_cents {
                return false;
            }
            match self.spent_cents.compare_exchange_weak(
                current,
                current + estimate_cents,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Reconcile a reservation with the actual cost once known: remove the
    /// estimate, add the real figure. May under- or over-shoot briefly under
    /// concurrent updates, but converges to the true total.
    pub fn reconcile(&self, estimate_cents: u64, actual_cents: u64) {
        self.spent_cents.fetch_sub(estimate_cents, Ordering::SeqCst);
        self.spent_cents.fetch_add(actual_cents, Ordering::SeqCst);
    }

    pub fn release(&self, estimate_cents: u64) {
        self.spent_cents.fetch_sub(estimate_cents, Ordering::SeqCst);
    }

    pub fn spent_usd(&self) -> Decimal {
        Decimal::from(self.spent_cents.load(Ordering::SeqCst)) / Decimal::from(100)
    }
}

#[derive(Debug, Default)]
pub struct EnrichmentOutcome {
    pub opportunities: Vec<RankedOpportunity>,
    pub errors: Vec<ScanErrorRecord>,
    pub ai_analyzed: usize,
    pub budget_exceeded: usize,
}

/// C8: one worker pool of size `max_concurrent_analyses` consumes eligible
/// candidates, enforcing the daily cost ceiling before each call and
/// merging successful `AIAnalysis` results back into `RankedOpportunity`.
/// Dispatch order is FIFO but completion order is not; the coordinator
/// re-sorts by `combined_score` afterward.
pub struct LlmEnrichmentOrchestrator {
    registry: Arc<ProviderRegistry>,
}

impl LlmEnrichmentOrchestrator {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub async fn enrich(
        &self,
        eligible: Vec<(PMCCCandidate, Option<EnhancedStockData>)>,
        config: &OrchestratorConfig,
        market: &MarketContext,
        cancellation: &CancellationToken,
    ) -> EnrichmentOutcome {
        let mut outcome = EnrichmentOutcome::default();
        let cost_tracker = Arc::new(CostTracker::new(config.daily_cost_limit_usd));
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_analyses.max(1)));

        let mut tasks = JoinSet::new();
        for (candidate, enhanced) in eligible {
            let registry = Arc::clone(&self.registry);
            let cost_tracker = Arc::clone(&cost_tracker);
            let semaphore = Arc::clone(&semaphore);
            let market = market.clone();
            let estimated_tokens = config.estimated_prompt_tokens;
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                analyze_one(registry, cost_tracker, candidate, enhanced, market, estimated_tokens).await
            });
        }

        loop {
            if tasks.is_empty() {
                break;
            }
            tokio::select! {
                _ = cancellation.cancelled() => {
                    tasks.abort_all();
                    outcome.errors.push(ScanErrorRecord {
                        phase: ScanPhase::AiAnalysis,
                        symbol: None,
                        kind: "Cancelled".to_string(),
                        message: "LLM enrichment cancelled; remaining candidates left unanalyzed".to_string(),
                        provider_id: None,
                        retryable: false,
                        at: Utc::now(),
                    });
                    break;
                }
                joined = tasks.join_next() => {
                    match joined {
                        None => break,
                        Some(Ok(WorkerOutcome::Analyzed { opportunity })) => {
                            outcome.ai_analyzed += 1;
                            outcome.opportunities.push(opportunity);
                        }
                        Some(Ok(WorkerOutcome::BudgetExceeded { opportunity })) => {
                            outcome.budget_exceeded += 1;
                            outcome.opportunities.push(opportunity);
                        }
                        Some(Ok(WorkerOutcome::Failed { opportunity, error })) => {
                            outcome.errors.push(error);
                            outcome.opportunities.push(opportunity);
                        }
                        Some(Err(join_err)) => {
                            tracing::error!(error = %join_err, "LLM analysis task panicked");
                        }
                    }
                }
            }
        }

        outcome
    }
}

enum WorkerOutcome {
    Analyzed { opportunity: RankedOpportunity },
    BudgetExceeded { opportunity: RankedOpportunity },
    Failed { opportunity: RankedOpportunity, error: ScanErrorRecord },
}

async fn analyze_one(
    registry: Arc<ProviderRegistry>,
    cost_tracker: Arc<CostTracker>,
    candidate: PMCCCandidate,
    enhanced: Option<EnhancedStockData>,
    market: MarketContext,
    estimated_tokens: u64,
) -> WorkerOutcome {
    let symbol = candidate.symbol.clone();

    let estimate_cents = registry
        .estimate_credits(Operation::AnalyzePmccOpportunity, estimated_tokens)
        .unwrap_or(0);

    if !cost_tracker.try_reserve(estimate_cents) {
        return WorkerOutcome::BudgetExceeded {
            opportunity: RankedOpportunity::new(candidate, enhanced, None),
        };
    }

    let dossier = build_dossier(&candidate, &enhanced, &market);
    let result = registry.analyze_pmcc_opportunity(dossier).await;

    match result {
        Ok(analysis) => {
            let actual_cents = (analysis.cost_estimate * Decimal::from(100)).round().to_u64().unwrap_or(0);
            cost_tracker.reconcile(estimate_cents, actual_cents);
            WorkerOutcome::Analyzed {
                opportunity: RankedOpportunity::new(candidate, enhanced, Some(analysis)),
            }
        }
        Err(e) => {
            cost_tracker.release(estimate_cents);
            let error = ScanErrorRecord::from_provider_error(ScanPhase::AiAnalysis, Some(symbol), &e);
            WorkerOutcome::Failed {
                opportunity: RankedOpportunity::new(candidate, enhanced, None),
                error,
            }
        }
    }
}

#[derive(Serialize)]
struct Dossier<'a> {
    symbol: &'a str,
    underlying_price: Decimal,
    long_leaps: DossierLeg<'a>,
    short_call: DossierLeg<'a>,
    net_debit: Decimal,
    max_profit: Decimal,
    max_loss: Decimal,
    breakeven_price: Decimal,
    risk_reward_ratio: Decimal,
    traditional_score: Decimal,
    enhanced: Option<&'a EnhancedStockData>,
    scan_id: Uuid,
    as_of: DateTime<Utc>,
}

#[derive(Serialize)]
struct DossierLeg<'a> {
    strike: Decimal,
    expiration_date: chrono::NaiveDate,
    delta: Option<Decimal>,
    open_interest: Option<i64>,
    option_symbol: &'a str,
}

fn build_dossier(candidate: &PMCCCandidate, enhanced: &Option<EnhancedStockData>, market: &MarketContext) -> serde_json::Value {
    let dossier = Dossier {
        symbol: candidate.symbol.as_str(),
        underlying_price: candidate.underlying_price,
        long_leaps: DossierLeg {
            strike: candidate.long_leaps.strike,
            expiration_date: candidate.long_leaps.expiration_date,
            delta: candidate.long_leaps.delta,
            open_interest: candidate.long_leaps.open_interest,
            option_symbol: &candidate.long_leaps.option_symbol,
        },
        short_call: DossierLeg {
            strike: candidate.short_call.strike,
            expiration_date: candidate.short_call.expiration_date,
            delta: candidate.short_call.delta,
            open_interest: candidate.short_call.open_interest,
            option_symbol: &candidate.short_call.option_symbol,
        },
        net_debit: candidate.net_debit,
        max_profit: candidate.max_profit,
        max_loss: candidate.max_loss,
        breakeven_price: candidate.breakeven_price,
        risk_reward_ratio: candidate.risk_reward_ratio,
        traditional_score: candidate.traditional_score,
        enhanced: enhanced.as_ref(),
        scan_id: market.scan_id,
        as_of: market.as_of,
    };
    serde_json::to_value(dossier).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_tracker_rejects_reservation_past_limit() {
        let tracker = CostTracker::new(Decimal::new(100, 2));
        assert!(tracker.try_reserve(60));
        assert!(tracker.try_reserve(40));
        assert!(!tracker.try_reserve(1));
    }

    #[test]
    fn cost_tracker_reconcile_adjusts_spent() {
        let tracker = CostTracker::new(Decimal::from(10));
        assert!(tracker.try_reserve(100));
        tracker.reconcile(100, 50);
        assert_eq!(tracker.spent_usd(), Decimal::new(50, 2));
    }

    #[test]
    fn cost_tracker_release_frees_reservation() {
        let tracker = CostTracker::new(Decimal::new(100, 2));
        assert!(tracker.try_reserve(100));
        tracker.release(100);
        assert!(tracker.try_reserve(100));
    }
}
