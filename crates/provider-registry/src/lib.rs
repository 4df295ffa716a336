pub mod breaker;
pub mod config;
pub mod rate_limiter;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use market_data_provider::{
    ChainFilter, MarketDataProvider, Operation, ProviderResult, ProviderStatus, ScreenFilter, ScreenedSymbol,
};
use pmcc_core::{AIAnalysis, CalendarEvent, Fundamentals, OptionChain, ProviderError, ProviderUsage, Quote, Symbol, Technicals};
use rand::Rng;
use rate_limiter::TokenBucketLimiter;
use tokio::sync::Mutex;

pub use breaker::CircuitBreaker;
pub use config::RegistryConfig;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

struct ProviderHandle {
    provider: Arc<dyn MarketDataProvider>,
    enabled: bool,
    breaker: Mutex<CircuitBreaker>,
    limiter: TokenBucketLimiter,
    last_success_at: Mutex<Option<DateTime<Utc>>>,
    last_failure_at: Mutex<Option<DateTime<Utc>>>,
    usage: Mutex<ProviderUsage>,
}

/// Dispatches each named operation to a healthy provider, honouring
/// preference order, circuit breakers, rate limiting, and single-fallback
/// re-dispatch on terminal failure.
pub struct ProviderRegistry {
    config: RegistryConfig,
    handles: HashMap<String, ProviderHandle>,
}

pub struct ProviderRegistration {
    pub provider: Arc<dyn MarketDataProvider>,
    pub enabled: bool,
    pub refill_rate_per_sec: f64,
    pub bucket_capacity: f64,
    pub max_in_flight: usize,
    pub daily_capacity: Option<u64>,
    pub daily_reset_tz: chrono_tz::Tz,
}

impl ProviderRegistry {
    pub fn new(config: RegistryConfig, registrations: Vec<ProviderRegistration>) -> Self {
        let mut handles = HashMap::new();
        for reg in registrations {
            let provider_id = reg.provider.provider_id().to_string();
            handles.insert(
                provider_id,
                ProviderHandle {
                    provider: reg.provider,
                    enabled: reg.enabled,
                    breaker: Mutex::new(CircuitBreaker::new(config.failure_threshold, config.cooldown)),
                    limiter: TokenBucketLimiter::new(
                        reg.refill_rate_per_sec,
                        reg.bucket_capacity,
                        reg.max_in_flight,
                        reg.daily_capacity,
                        reg.daily_reset_tz,
                    ),
                    last_success_at: Mutex::new(None),
                    last_failure_at: Mutex::new(None),
                    usage: Mutex::new(ProviderUsage::default()),
                },
            );
        }
        Self { config, handles }
    }

    pub async fn status(&self) -> HashMap<String, ProviderStatus> {
        let mut out = HashMap::new();
        for (id, handle) in &self.handles {
            let breaker = handle.breaker.lock().await;
            out.insert(
                id.clone(),
                ProviderStatus {
                    provider_id: id.clone(),
                    enabled: handle.enabled,
                    circuit_state: breaker.state(),
                    consecutive_failures: breaker.consecutive_failures(),
                    last_success_at: *handle.last_success_at.lock().await,
                    last_failure_at: *handle.last_failure_at.lock().await,
                },
            );
        }
        out
    }

    /// Estimate the credit cost of `op` via the first preferred provider
    /// that supports it, without dispatching the call. Used by the LLM
    /// enrichment orchestrator to check the daily budget before calling out.
    pub fn estimate_credits(&self, op: Operation, unit_count: u64) -> Option<u64> {
        self.candidates(op).first().map(|h| h.provider.estimate_credits(op, unit_count))
    }

    /// Per-provider call accounting accumulated since the registry was
    /// constructed. The coordinator drains this into `ScanResults.provider_usage`
    /// once per scan rather than threading credit/latency figures through
    /// every `dispatch` call site.
    pub async fn usage_snapshot(&self) -> HashMap<String, ProviderUsage> {
        let mut out = HashMap::new();
        for (id, handle) in &self.handles {
            out.insert(id.clone(), *handle.usage.lock().await);
        }
        out
    }

    pub async fn health_check(&self) {
        for handle in self.handles.values() {
            let result = handle.provider.health_probe().await;
            self.record_outcome(handle, result.outcome.is_ok()).await;
        }
    }

    async fn record_outcome(&self, handle: &ProviderHandle, success: bool) {
        let mut breaker = handle.breaker.lock().await;
        if success {
            breaker.record_success();
            *handle.last_success_at.lock().await = Some(Utc::now());
        } else {
            breaker.record_failure();
            *handle.last_failure_at.lock().await = Some(Utc::now());
        }
    }

    /// Ordered list of candidate handles for `op`: enabled, declares support,
    /// breaker not open. Rate-limiter admission is checked at call time.
    fn candidates(&self, op: Operation) -> Vec<&ProviderHandle> {
        self.config
            .preference_for(op)
            .iter()
            .filter_map(|id| self.handles.get(id))
            .filter(|h| h.enabled && h.provider.supports(op))
            .collect()
    }

    async fn backoff(&self, attempt: u32) {
        let base = self.config.base_backoff.as_millis() as f64;
        let exp = base * 2f64.powi(attempt as i32);
        let jitter = rand::thread_rng().gen_range(0.0..self.config.max_jitter_pct);
        let wait_ms = (exp * (1.0 + jitter)) as u64;
        tokio::time::sleep(std::time::Duration::from_millis(wait_ms)).await;
    }

    /// Core dispatch loop shared by every typed operation method: walk the
    /// preference list, retry within a provider for retryable errors, and
    /// fall back once to the next live provider on terminal failure.
    async fn dispatch<T, F>(&self, op: Operation, credit_hint: u64, call: F) -> Result<T, ProviderError>
    where
        T: Send,
        F: for<'a> Fn(&'a dyn MarketDataProvider) -> BoxFuture<'a, ProviderResult<T>>,
    {
        let candidates = self.candidates(op);
        if candidates.is_empty() {
            return Err(ProviderError::NoProviderAvailable { op: op.as_str().to_string() });
        }

        let mut fallback_used = false;
        let mut last_err: Option<ProviderError> = None;

        for handle in candidates {
            {
                let mut breaker = handle.breaker.lock().await;
                if !breaker.allow_request() {
                    last_err = Some(ProviderError::CircuitOpen {
                        provider_id: handle.provider.provider_id().to_string(),
                    });
                    continue;
                }
            }

            let permit = handle
                .limiter
                .acquire(handle.provider.provider_id(), credit_hint.max(1), self.config.acquire_deadline)
                .await;
            if let Err(e) = permit {
                last_err = Some(e);
                continue;
            }
            let _permit = permit.unwrap();

            for attempt in 0..=self.config.retry_attempts {
                let started = Instant::now();
                let result = call(handle.provider.as_ref()).await;
                let latency_ms = started.elapsed().as_millis() as u64;
                match result.outcome {
                    Ok(data) => {
                        self.record_outcome(handle, true).await;
                        handle.usage.lock().await.record(credit_hint.max(1), latency_ms, false);
                        return Ok(data);
                    }
                    Err(e) => {
                        if e.counts_toward_breaker() {
                            self.record_outcome(handle, false).await;
                        }
                        handle.usage.lock().await.record(credit_hint.max(1), latency_ms, true);
                        let retry_eligible = e.retryable() && attempt < self.config.retry_attempts;
                        last_err = Some(e);
                        if retry_eligible {
                            self.backoff(attempt).await;
                            continue;
                        }
                        break;
                    }
                }
            }

            if fallback_used {
                break;
            }
            fallback_used = true;
        }

        Err(last_err.unwrap_or(ProviderError::NoProviderAvailable { op: op.as_str().to_string() }))
    }

    pub async fn screen_stocks(&self, filter: ScreenFilter) -> Result<Vec<ScreenedSymbol>, ProviderError> {
        self.dispatch(Operation::ScreenStocks, 1, move |p| {
            let filter = filter.clone();
            Box::pin(async move { p.screen_stocks(&filter).await })
        })
        .await
    }

    pub async fn get_quote(&self, symbol: Symbol) -> Result<Quote, ProviderError> {
        self.dispatch(Operation::GetQuote, 1, move |p| {
            let symbol = symbol.clone();
            Box::pin(async move { p.get_quote(&symbol).await })
        })
        .await
    }

    pub async fn get_quotes_batch(&self, symbols: Vec<Symbol>) -> Result<Vec<Quote>, ProviderError> {
        let count = symbols.len() as u64;
        self.dispatch(Operation::GetQuotesBatch, count, move |p| {
            let symbols = symbols.clone();
            Box::pin(async move { p.get_quotes_batch(&symbols).await })
        })
        .await
    }

    pub async fn get_option_chain(&self, underlying: Symbol, filter: ChainFilter) -> Result<OptionChain, ProviderError> {
        self.dispatch(Operation::GetOptionChain, 200, move |p| {
            let underlying = underlying.clone();
            let filter = filter.clone();
            Box::pin(async move { p.get_option_chain(&underlying, &filter).await })
        })
        .await
    }

    pub async fn get_expirations(&self, underlying: Symbol) -> Result<Vec<chrono::NaiveDate>, ProviderError> {
        self.dispatch(Operation::GetExpirations, 1, move |p| {
            let underlying = underlying.clone();
            Box::pin(async move { p.get_expirations(&underlying).await })
        })
        .await
    }

    pub async fn get_strikes(&self, underlying: Symbol, expiration: chrono::NaiveDate) -> Result<Vec<rust_decimal::Decimal>, ProviderError> {
        self.dispatch(Operation::GetStrikes, 1, move |p| {
            let underlying = underlying.clone();
            Box::pin(async move { p.get_strikes(&underlying, expiration).await })
        })
        .await
    }

    pub async fn get_fundamentals(&self, symbol: Symbol) -> Result<Fundamentals, ProviderError> {
        self.dispatch(Operation::GetFundamentals, 1, move |p| {
            let symbol = symbol.clone();
            Box::pin(async move { p.get_fundamentals(&symbol).await })
        })
        .await
    }

    pub async fn get_calendar_events(&self, symbol: Symbol) -> Result<Vec<CalendarEvent>, ProviderError> {
        self.dispatch(Operation::GetCalendarEvents, 1, move |p| {
            let symbol = symbol.clone();
            Box::pin(async move { p.get_calendar_events(&symbol).await })
        })
        .await
    }

    pub async fn get_technicals(&self, symbol: Symbol) -> Result<Technicals, ProviderError> {
        self.dispatch(Operation::GetTechnicals, 1, move |p| {
            let symbol = symbol.clone();
            Box::pin(async move { p.get_technicals(&symbol).await })
        })
        .await
    }

    /// `L` has no fallback by contract (spec §4.2); budget enforcement is
    /// the caller's responsibility (the enrichment orchestrator checks
    /// `estimate_credits` before calling this).
    pub async fn analyze_pmcc_opportunity(&self, dossier: serde_json::Value) -> Result<AIAnalysis, ProviderError> {
        self.dispatch(Operation::AnalyzePmccOpportunity, 1, move |p| {
            let dossier = dossier.clone();
            Box::pin(async move { p.analyze_pmcc_opportunity(&dossier).await })
        })
        .await
    }
}
