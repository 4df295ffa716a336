pub mod http;
pub mod rate_limiter;

use std::time::{Duration, Instant as StdInstant};

use async_trait::async_trait;
use market_data_provider::{MarketDataProvider, Operation, ProviderResult, ScreenFilter, ScreenedSymbol};
use pmcc_core::{CalendarEvent, CalendarEventKind, Fundamentals, ProviderError, Quote, Symbol, Technicals};
use rate_limiter::RateLimiter;
use rust_decimal::Decimal;
use serde::Deserialize;

const SUPPORTED: &[Operation] = &[
    Operation::ScreenStocks,
    Operation::GetQuote,
    Operation::GetQuotesBatch,
    Operation::GetFundamentals,
    Operation::GetCalendarEvents,
    Operation::GetTechnicals,
];

/// Provider F: fundamentals, screening, calendar, technicals. Deliberately
/// does not implement `get_option_chain` or `get_strikes` even though the
/// upstream API this adapter targets exposes an options endpoint — keeping
/// option-chain routing exclusive to provider O simplifies cost accounting.
pub struct FundamentalsClient {
    provider_id: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    rate_limiter: RateLimiter,
}

impl FundamentalsClient {
    pub fn new(provider_id: impl Into<String>, api_key: String, base_url: String) -> Self {
        let rate_limit: usize = std::env::var("FUNDAMENTALS_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            provider_id: provider_id.into(),
            api_key,
            base_url,
            client,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        let request = builder
            .build()
            .map_err(|e| ProviderError::ParseError {
                provider_id: self.provider_id.clone(),
                message: e.to_string(),
            })?;

        for attempt in 0..3u32 {
            self.rate_limiter.acquire().await;
            let cloned = request.try_clone().ok_or_else(|| ProviderError::ParseError {
                provider_id: self.provider_id.clone(),
                message: "request body not cloneable for retry".to_string(),
            })?;
            let response = self.client.execute(cloned).await.map_err(|e| ProviderError::UpstreamTransient {
                provider_id: self.provider_id.clone(),
                message: e.to_string(),
            })?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }
            tracing::warn!(provider = %self.provider_id, attempt, "429 rate limited, backing off");
            tokio::time::sleep(Duration::from_secs(5 * (attempt as u64 + 1))).await;
        }

        Err(ProviderError::RateLimited {
            provider_id: self.provider_id.clone(),
            retry_after_secs: None,
        })
    }

    async fn run<T, F>(&self, op: Operation, fut: F) -> ProviderResult<T>
    where
        F: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let started = StdInstant::now();
        let outcome = fut.await;
        let latency_ms = started.elapsed().as_millis() as u64;
        let credits = self.estimate_credits(op, 1);
        match outcome {
            Ok(data) => ProviderResult::ok(data, credits, latency_ms, false),
            Err(e) => ProviderResult::err(e, 0, latency_ms),
        }
    }
}

#[async_trait]
impl MarketDataProvider for FundamentalsClient {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn supported_ops(&self) -> &'static [Operation] {
        SUPPORTED
    }

    fn estimate_credits(&self, op: Operation, unit_count: u64) -> u64 {
        match op {
            Operation::ScreenStocks => 1,
            Operation::GetQuote
            | Operation::GetQuotesBatch
            | Operation::GetFundamentals
            | Operation::GetCalendarEvents
            | Operation::GetTechnicals => unit_count.max(1),
            _ => 0,
        }
    }

    async fn health_probe(&self) -> ProviderResult<()> {
        self.run(Operation::GetQuote, async {
            let url = format!("{}/v1/status", self.base_url);
            let response = self.send(self.client.get(&url).query(&[("apiKey", &self.api_key)])).await?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(http::status_to_error(&self.provider_id, response.status(), String::new()))
            }
        })
        .await
    }

    async fn screen_stocks(&self, filter: &ScreenFilter) -> ProviderResult<Vec<ScreenedSymbol>> {
        self.run(Operation::ScreenStocks, async {
            let url = format!("{}/v1/screener/stocks", self.base_url);
            let mut query = vec![("apiKey".to_string(), self.api_key.clone())];
            if let Some(v) = filter.min_market_cap {
                query.push(("market_cap.gte".to_string(), v.to_string()));
            }
            if let Some(v) = filter.max_market_cap {
                query.push(("market_cap.lte".to_string(), v.to_string()));
            }
            if let Some(exchanges) = &filter.exchanges {
                query.push(("exchanges".to_string(), exchanges.join(",")));
            }
            if let Some(sectors) = &filter.sectors {
                query.push(("sectors".to_string(), sectors.join(",")));
            }
            if let Some(v) = filter.min_avg_volume {
                query.push(("volume.gte".to_string(), v.to_string()));
            }

            let response = self.send(self.client.get(&url).query(&query)).await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(http::status_to_error(&self.provider_id, status, body));
            }
            let parsed: ScreenerResponse = response.json().await.map_err(|e| ProviderError::ParseError {
                provider_id: self.provider_id.clone(),
                message: e.to_string(),
            })?;
            Ok(parsed
                .results
                .into_iter()
                .map(|r| ScreenedSymbol {
                    symbol: Symbol::new(r.symbol),
                    market_cap: r.market_cap.and_then(Decimal::from_f64_retain),
                    exchange: r.exchange,
                    sector: r.sector,
                })
                .collect())
        })
        .await
    }

    async fn get_quote(&self, symbol: &Symbol) -> ProviderResult<Quote> {
        self.run(Operation::GetQuote, async {
            let url = format!("{}/v1/quote/{}", self.base_url, symbol.as_str());
            let response = self.send(self.client.get(&url).query(&[("apiKey", &self.api_key)])).await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(http::status_to_error(&self.provider_id, status, body));
            }
            let parsed: QuoteResponse = response.json().await.map_err(|e| ProviderError::ParseError {
                provider_id: self.provider_id.clone(),
                message: e.to_string(),
            })?;
            Ok(Quote {
                symbol: symbol.clone(),
                bid: parsed.bid.and_then(Decimal::from_f64_retain),
                ask: parsed.ask.and_then(Decimal::from_f64_retain),
                last: parsed.last.and_then(Decimal::from_f64_retain),
                volume: parsed.volume,
                updated_at: chrono::Utc::now(),
            })
        })
        .await
    }

    /// The upstream API has no multi-symbol quote endpoint; this just fans
    /// the batch out into individual `get_quote` calls, bounded by the same
    /// rate limiter every other call on this client goes through.
    async fn get_quotes_batch(&self, symbols: &[Symbol]) -> ProviderResult<Vec<Quote>> {
        let started = StdInstant::now();
        let mut quotes = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let url = format!("{}/v1/quote/{}", self.base_url, symbol.as_str());
            let result = async {
                let response = self.send(self.client.get(&url).query(&[("apiKey", &self.api_key)])).await?;
                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(http::status_to_error(&self.provider_id, status, body));
                }
                let parsed: QuoteResponse = response.json().await.map_err(|e| ProviderError::ParseError {
                    provider_id: self.provider_id.clone(),
                    message: e.to_string(),
                })?;
                Ok(Quote {
                    symbol: symbol.clone(),
                    bid: parsed.bid.and_then(Decimal::from_f64_retain),
                    ask: parsed.ask.and_then(Decimal::from_f64_retain),
                    last: parsed.last.and_then(Decimal::from_f64_retain),
                    volume: parsed.volume,
                    updated_at: chrono::Utc::now(),
                })
            }
            .await;
            match result {
                Ok(quote) => quotes.push(quote),
                Err(e) => {
                    let credits = self.estimate_credits(Operation::GetQuotesBatch, symbols.len() as u64);
                    return ProviderResult::err(e, credits, started.elapsed().as_millis() as u64);
                }
            }
        }
        let credits = self.estimate_credits(Operation::GetQuotesBatch, symbols.len() as u64);
        ProviderResult::ok(quotes, credits, started.elapsed().as_millis() as u64, false)
    }

    async fn get_fundamentals(&self, symbol: &Symbol) -> ProviderResult<Fundamentals> {
        self.run(Operation::GetFundamentals, async {
            let url = format!("{}/v1/fundamentals/{}", self.base_url, symbol.as_str());
            let response = self.send(self.client.get(&url).query(&[("apiKey", &self.api_key)])).await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(http::status_to_error(&self.provider_id, status, body));
            }
            let parsed: FundamentalsResponse = response.json().await.map_err(|e| ProviderError::ParseError {
                provider_id: self.provider_id.clone(),
                message: e.to_string(),
            })?;
            Ok(Fundamentals {
                market_cap: parsed.market_cap.and_then(Decimal::from_f64_retain),
                pe_ratio: parsed.pe_ratio.and_then(Decimal::from_f64_retain),
                revenue_growth_pct: parsed.revenue_growth_pct.and_then(Decimal::from_f64_retain),
                profit_margin_pct: parsed.profit_margin_pct.and_then(Decimal::from_f64_retain),
                dividend_yield_pct: parsed.dividend_yield_pct.and_then(Decimal::from_f64_retain),
                sector: parsed.sector,
            })
        })
        .await
    }

    async fn get_calendar_events(&self, symbol: &Symbol) -> ProviderResult<Vec<CalendarEvent>> {
        self.run(Operation::GetCalendarEvents, async {
            let url = format!("{}/v1/calendar/{}", self.base_url, symbol.as_str());
            let response = self.send(self.client.get(&url).query(&[("apiKey", &self.api_key)])).await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(http::status_to_error(&self.provider_id, status, body));
            }
            let parsed: CalendarResponse = response.json().await.map_err(|e| ProviderError::ParseError {
                provider_id: self.provider_id.clone(),
                message: e.to_string(),
            })?;
            Ok(parsed
                .events
                .into_iter()
                .filter_map(|e| {
                    let kind = match e.kind.as_str() {
                        "earnings" => Some(CalendarEventKind::Earnings),
                        "ex_dividend" => Some(CalendarEventKind::ExDividend),
                        _ => None,
                    }?;
                    let date = chrono::NaiveDate::parse_from_str(&e.date, "%Y-%m-%d").ok()?;
                    Some(CalendarEvent { kind, date })
                })
                .collect())
        })
        .await
    }

    async fn get_technicals(&self, symbol: &Symbol) -> ProviderResult<Technicals> {
        self.run(Operation::GetTechnicals, async {
            let url = format!("{}/v1/technicals/{}", self.base_url, symbol.as_str());
            let response = self.send(self.client.get(&url).query(&[("apiKey", &self.api_key)])).await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(http::status_to_error(&self.provider_id, status, body));
            }
            let parsed: TechnicalsResponse = response.json().await.map_err(|e| ProviderError::ParseError {
                provider_id: self.provider_id.clone(),
                message: e.to_string(),
            })?;
            Ok(Technicals {
                rsi_14: parsed.rsi_14.and_then(Decimal::from_f64_retain),
                sma_50: parsed.sma_50.and_then(Decimal::from_f64_retain),
                sma_200: parsed.sma_200.and_then(Decimal::from_f64_retain),
                realized_volatility_30d: parsed.realized_volatility_30d.and_then(Decimal::from_f64_retain),
            })
        })
        .await
    }
}

#[derive(Debug, Deserialize)]
struct ScreenerResponse {
    results: Vec<ScreenerRow>,
}

#[derive(Debug, Deserialize)]
struct ScreenerRow {
    symbol: String,
    market_cap: Option<f64>,
    exchange: Option<String>,
    sector: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    bid: Option<f64>,
    ask: Option<f64>,
    last: Option<f64>,
    volume: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct FundamentalsResponse {
    market_cap: Option<f64>,
    pe_ratio: Option<f64>,
    revenue_growth_pct: Option<f64>,
    profit_margin_pct: Option<f64>,
    dividend_yield_pct: Option<f64>,
    sector: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalendarResponse {
    events: Vec<CalendarRow>,
}

#[derive(Debug, Deserialize)]
struct CalendarRow {
    kind: String,
    date: String,
}

#[derive(Debug, Deserialize)]
struct TechnicalsResponse {
    rsi_14: Option<f64>,
    sma_50: Option<f64>,
    sma_200: Option<f64>,
    realized_volatility_30d: Option<f64>,
}
