use async_trait::async_trait;
use chrono::NaiveDate;
use pmcc_core::{
    AIAnalysis, CalendarEvent, Fundamentals, OptionChain, ProviderError, Quote, Symbol, Technicals,
};
use serde::{Deserialize, Serialize};

use crate::{ChainFilter, Operation, ScreenFilter, ScreenedSymbol};

/// Uniform envelope every provider handler returns, success or failure alike.
/// `credits_consumed` and `latency_ms` are recorded even on failure so the
/// registry's usage accounting stays accurate.
#[derive(Debug)]
pub struct ProviderResult<T> {
    pub outcome: Result<T, ProviderError>,
    pub credits_consumed: u64,
    pub latency_ms: u64,
    pub cached: bool,
}

impl<T> ProviderResult<T> {
    pub fn ok(data: T, credits_consumed: u64, latency_ms: u64, cached: bool) -> Self {
        Self {
            outcome: Ok(data),
            credits_consumed,
            latency_ms,
            cached,
        }
    }

    pub fn err(error: ProviderError, credits_consumed: u64, latency_ms: u64) -> Self {
        Self {
            outcome: Err(error),
            credits_consumed,
            latency_ms,
            cached: false,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Point-in-time health snapshot for one provider, as surfaced by
/// `ProviderRegistry::status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub provider_id: String,
    pub enabled: bool,
    pub circuit_state: CircuitState,
    pub consecutive_failures: u32,
    pub last_success_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_failure_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// A concrete upstream market-data adapter (F, O, or L). Each adapter
/// implements only the operations it actually supports; the default method
/// bodies return `UnsupportedOperation` so a partial implementation compiles
/// and fails loudly at the registry boundary rather than silently.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn provider_id(&self) -> &str;

    fn supported_ops(&self) -> &'static [Operation];

    fn supports(&self, op: Operation) -> bool {
        self.supported_ops().contains(&op)
    }

    /// Estimate the upstream credit cost of an operation before calling it.
    /// `unit_count` is the number of symbols/contracts the call will touch
    /// (1 for single-symbol ops); providers charge per-symbol, per-contract,
    /// or a flat fee per call, and each adapter knows its own billing model.
    fn estimate_credits(&self, op: Operation, unit_count: u64) -> u64;

    async fn health_probe(&self) -> ProviderResult<()> {
        unsupported(self.provider_id(), "health_probe")
    }

    async fn screen_stocks(&self, _filter: &ScreenFilter) -> ProviderResult<Vec<ScreenedSymbol>> {
        unsupported(self.provider_id(), Operation::ScreenStocks.as_str())
    }

    async fn get_quote(&self, _symbol: &Symbol) -> ProviderResult<Quote> {
        unsupported(self.provider_id(), Operation::GetQuote.as_str())
    }

    async fn get_quotes_batch(&self, _symbols: &[Symbol]) -> ProviderResult<Vec<Quote>> {
        unsupported(self.provider_id(), Operation::GetQuotesBatch.as_str())
    }

    async fn get_option_chain(&self, _underlying: &Symbol, _filter: &ChainFilter) -> ProviderResult<OptionChain> {
        unsupported(self.provider_id(), Operation::GetOptionChain.as_str())
    }

    async fn get_expirations(&self, _underlying: &Symbol) -> ProviderResult<Vec<NaiveDate>> {
        unsupported(self.provider_id(), Operation::GetExpirations.as_str())
    }

    async fn get_strikes(&self, _underlying: &Symbol, _expiration: NaiveDate) -> ProviderResult<Vec<rust_decimal::Decimal>> {
        unsupported(self.provider_id(), Operation::GetStrikes.as_str())
    }

    async fn get_fundamentals(&self, _symbol: &Symbol) -> ProviderResult<Fundamentals> {
        unsupported(self.provider_id(), Operation::GetFundamentals.as_str())
    }

    async fn get_calendar_events(&self, _symbol: &Symbol) -> ProviderResult<Vec<CalendarEvent>> {
        unsupported(self.provider_id(), Operation::GetCalendarEvents.as_str())
    }

    async fn get_technicals(&self, _symbol: &Symbol) -> ProviderResult<Technicals> {
        unsupported(self.provider_id(), Operation::GetTechnicals.as_str())
    }

    async fn analyze_pmcc_opportunity(&self, _dossier: &serde_json::Value) -> ProviderResult<AIAnalysis> {
        unsupported(self.provider_id(), Operation::AnalyzePmccOpportunity.as_str())
    }
}

fn unsupported<T>(provider_id: &str, op: &str) -> ProviderResult<T> {
    ProviderResult::err(
        ProviderError::UnsupportedOperation {
            op: op.to_string(),
            provider_id: provider_id.to_string(),
        },
        0,
        0,
    )
}
