use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use market_data_provider::ScreenFilter;
use pmcc_core::{Quote, ScanErrorRecord, ScanPhase, Symbol};
use provider_registry::ProviderRegistry;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Universe {
    PredefinedList(Vec<Symbol>),
    CustomSymbols(Vec<Symbol>),
}

impl Universe {
    fn symbols(&self) -> Vec<Symbol> {
        match self {
            Universe::PredefinedList(s) | Universe::CustomSymbols(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningCriteria {
    pub universe: Universe,
    pub min_market_cap: Option<Decimal>,
    pub max_market_cap: Option<Decimal>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub min_avg_volume: Option<i64>,
    pub exchanges: Option<Vec<String>>,
    pub max_symbols_per_scan: usize,
    pub quote_batch_size: usize,
}

impl Default for ScreeningCriteria {
    fn default() -> Self {
        Self {
            universe: Universe::PredefinedList(Vec::new()),
            min_market_cap: None,
            max_market_cap: None,
            min_price: None,
            max_price: None,
            min_avg_volume: None,
            exchanges: None,
            max_symbols_per_scan: 500,
            quote_batch_size: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScreenedCandidate {
    pub symbol: Symbol,
    pub quote: Quote,
    pub market_cap: Option<Decimal>,
}

#[derive(Debug, Default)]
pub struct ScreeningOutcome {
    pub candidates: Vec<ScreenedCandidate>,
    pub screened: usize,
    pub errors: Vec<ScanErrorRecord>,
}

/// C4: resolves a symbol universe, applies provider-side filters, attaches
/// quotes, and returns a market-cap-sorted candidate list capped at
/// `max_symbols_per_scan`.
pub struct StockScreener {
    registry: Arc<ProviderRegistry>,
}

impl StockScreener {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub async fn screen(&self, criteria: &ScreeningCriteria) -> ScreeningOutcome {
        let mut outcome = ScreeningOutcome::default();

        let filter = ScreenFilter {
            min_market_cap: criteria.min_market_cap,
            max_market_cap: criteria.max_market_cap,
            exchanges: criteria.exchanges.clone(),
            sectors: None,
            min_avg_volume: criteria.min_avg_volume,
            min_price: criteria.min_price,
            max_price: criteria.max_price,
        };

        let base = match &criteria.universe {
            Universe::CustomSymbols(symbols) => {
                // Custom lists skip the screen_stocks call entirely; the
                // caller already decided the universe.
                symbols
                    .iter()
                    .map(|s| market_data_provider::ScreenedSymbol {
                        symbol: s.clone(),
                        market_cap: None,
                        exchange: None,
                        sector: None,
                    })
                    .collect::<Vec<_>>()
            }
            Universe::PredefinedList(_) => match self.registry.screen_stocks(filter).await {
                Ok(rows) => rows,
                Err(e) => {
                    outcome
                        .errors
                        .push(ScanErrorRecord::from_provider_error(ScanPhase::Screening, None, &e));
                    Vec::new()
                }
            },
        };

        let universe_symbols = if matches!(criteria.universe, Universe::PredefinedList(ref s) if !s.is_empty()) {
            criteria.universe.symbols()
        } else {
            Vec::new()
        };

        let mut rows = base;
        if !universe_symbols.is_empty() {
            let allowed: std::collections::HashSet<Symbol> = universe_symbols.into_iter().collect();
            rows.retain(|r| allowed.contains(&r.symbol));
        }

        outcome.screened = rows.len();

        // Deduplicate by symbol, keep first occurrence.
        let mut seen = std::collections::HashSet::new();
        rows.retain(|r| seen.insert(r.symbol.clone()));

        let market_cap_by_symbol: std::collections::HashMap<Symbol, Option<Decimal>> =
            rows.iter().map(|r| (r.symbol.clone(), r.market_cap)).collect();

        let symbols: Vec<Symbol> = rows.into_iter().map(|r| r.symbol).collect();
        let quotes = self.fetch_quotes_batched(&symbols, criteria.quote_batch_size, &mut outcome).await;

        let stale_cutoff = Utc::now() - ChronoDuration::days(1);
        let mut candidates: Vec<ScreenedCandidate> = quotes
            .into_iter()
            .filter(|(_, quote)| quote.updated_at >= stale_cutoff)
            .filter(|(_, quote)| price_in_bounds(quote, criteria.min_price, criteria.max_price))
            .map(|(symbol, quote)| {
                let market_cap = market_cap_by_symbol.get(&symbol).copied().flatten();
                ScreenedCandidate { symbol, quote, market_cap }
            })
            .collect();

        candidates.sort_by(|a, b| b.market_cap.cmp(&a.market_cap));
        candidates.truncate(criteria.max_symbols_per_scan);

        outcome.candidates = candidates;
        outcome
    }

    /// Fetches quotes for all symbols using bounded-concurrency batches via
    /// `get_quotes_batch`, each batch its own registry call so a single
    /// provider hiccup only drops that batch's symbols.
    async fn fetch_quotes_batched(
        &self,
        symbols: &[Symbol],
        batch_size: usize,
        outcome: &mut ScreeningOutcome,
    ) -> Vec<(Symbol, Quote)> {
        let mut tasks = JoinSet::new();
        for chunk in symbols.chunks(batch_size.max(1)) {
            let registry = Arc::clone(&self.registry);
            let chunk = chunk.to_vec();
            tasks.spawn(async move {
                let result = registry.get_quotes_batch(chunk.clone()).await;
                (chunk, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((chunk, Ok(quotes))) => {
                    for (symbol, quote) in chunk.into_iter().zip(quotes.into_iter()) {
                        results.push((symbol, quote));
                    }
                }
                Ok((chunk, Err(e))) => {
                    for symbol in chunk {
                        outcome.errors.push(ScanErrorRecord::from_provider_error(
                            ScanPhase::Screening,
                            Some(symbol),
                            &e,
                        ));
                    }
                }
                Err(join_err) => {
                    tracing::error!(error = %join_err, "quote batch task panicked");
                }
            }
        }
        results
    }
}

/// Applies `min_price`/`max_price` against a quote's last trade price
/// (falling back to the bid/ask midpoint). A quote with no usable price is
/// excluded whenever either bound is configured, since it cannot be
/// verified to fall inside the requested range.
fn price_in_bounds(quote: &Quote, min_price: Option<Decimal>, max_price: Option<Decimal>) -> bool {
    if min_price.is_none() && max_price.is_none() {
        return true;
    }
    let Some(price) = quote.last.or_else(|| quote.mid()) else {
        return false;
    };
    min_price.map(|min| price >= min).unwrap_or(true) && max_price.map(|max| price <= max).unwrap_or(true)
}
