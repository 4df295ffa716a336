use std::sync::Arc;

use pmcc_core::{EnhancedStockData, ScanErrorRecord, ScanPhase, Symbol};
use provider_registry::ProviderRegistry;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Earnings within this many days of today are flagged in `warnings`.
    pub earnings_flag_window_days: i64,
    /// Below this completeness score, `RankedOpportunity.ai` stays `nil`.
    pub min_completeness_for_ai: Decimal,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            earnings_flag_window_days: 21,
            min_completeness_for_ai: Decimal::from(60),
        }
    }
}

#[derive(Debug, Default)]
pub struct CollectionOutcome {
    pub data: std::collections::HashMap<Symbol, EnhancedStockData>,
    pub errors: Vec<ScanErrorRecord>,
    pub warnings: Vec<String>,
}

/// C7: gathers fundamentals, calendar events, and a technical summary for
/// the top-M candidates in parallel, bounded by provider F's own rate
/// limiter (the registry's admission control already caps concurrency, so
/// this collector just fans out one task per symbol via `JoinSet`).
pub struct EnhancedDataCollector {
    registry: Arc<ProviderRegistry>,
}

impl EnhancedDataCollector {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub async fn collect_many(
        &self,
        symbols: &[Symbol],
        config: &CollectorConfig,
        cancellation: &CancellationToken,
    ) -> CollectionOutcome {
        let mut outcome = CollectionOutcome::default();
        let mut tasks = JoinSet::new();

        for symbol in symbols {
            let registry = Arc::clone(&self.registry);
            let symbol = symbol.clone();
            let window = config.earnings_flag_window_days;
            tasks.spawn(async move { collect_one(registry, symbol, window).await });
        }

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    tasks.abort_all();
                    outcome.warnings.push("enhanced data collection cancelled before completion".to_string());
                    break;
                }
                joined = tasks.join_next() => {
                    match joined {
                        None => break,
                        Some(Ok((symbol, enhanced, errors, earnings_soon))) => {
                            if earnings_soon {
                                outcome.warnings.push(format!("{symbol}: earnings within {} days", config.earnings_flag_window_days));
                            }
                            outcome.errors.extend(errors);
                            outcome.data.insert(symbol, enhanced);
                        }
                        Some(Err(join_err)) => {
                            tracing::error!(error = %join_err, "enhanced data collection task panicked");
                        }
                    }
                }
            }
        }

        outcome
    }
}

async fn collect_one(
    registry: Arc<ProviderRegistry>,
    symbol: Symbol,
    earnings_window_days: i64,
) -> (Symbol, EnhancedStockData, Vec<ScanErrorRecord>, bool) {
    let (fundamentals_res, calendar_res, technicals_res) = tokio::join!(
        registry.get_fundamentals(symbol.clone()),
        registry.get_calendar_events(symbol.clone()),
        registry.get_technicals(symbol.clone()),
    );

    let mut errors = Vec::new();

    let fundamentals = fundamentals_res
        .map_err(|e| errors.push(ScanErrorRecord::from_provider_error(ScanPhase::Enhancement, Some(symbol.clone()), &e)))
        .ok();
    let calendar_events = calendar_res
        .map_err(|e| errors.push(ScanErrorRecord::from_provider_error(ScanPhase::Enhancement, Some(symbol.clone()), &e)))
        .ok();
    let technicals = technicals_res
        .map_err(|e| errors.push(ScanErrorRecord::from_provider_error(ScanPhase::Enhancement, Some(symbol.clone()), &e)))
        .ok();

    // `risk_metrics` has no dedicated provider operation in the spec's
    // catalog (no beta/short-interest endpoint on F or O), so it is always
    // `None` here; completeness is computed over the three fields this
    // collector can actually populate plus the always-absent fourth.
    let risk_metrics: Option<pmcc_core::RiskMetrics> = None;
    let completeness = EnhancedStockData::compute_completeness(&fundamentals, &calendar_events, &technicals, &risk_metrics);

    let earnings_soon = calendar_events
        .as_ref()
        .map(|events| {
            let today = chrono::Utc::now().date_naive();
            events.iter().any(|e| {
                e.kind == pmcc_core::CalendarEventKind::Earnings
                    && (e.date - today).num_days() >= 0
                    && (e.date - today).num_days() <= earnings_window_days
            })
        })
        .unwrap_or(false);

    let enhanced = EnhancedStockData {
        symbol: symbol.clone(),
        fundamentals,
        calendar_events,
        technicals,
        risk_metrics,
        completeness_score: completeness,
        collected_at: chrono::Utc::now(),
    };

    (symbol, enhanced, errors, earnings_soon)
}
