pub mod http;
pub mod rate_limiter;

use std::time::{Duration, Instant as StdInstant};

use async_trait::async_trait;
use chrono::NaiveDate;
use market_data_provider::{ChainFilter, MarketDataProvider, Operation, OptionFeed, ProviderResult};
use pmcc_core::{OptionChain, OptionContract, OptionSide, ProviderError, Quote, Symbol};
use rate_limiter::RateLimiter;
use rust_decimal::Decimal;
use serde::Deserialize;

const SUPPORTED: &[Operation] = &[
    Operation::GetOptionChain,
    Operation::GetExpirations,
    Operation::GetStrikes,
    Operation::GetQuote,
];

/// Provider O: option chains (with Greeks), expirations, strikes, quotes.
/// Authenticates with a bearer token rather than an API-key query param.
pub struct OptionsClient {
    provider_id: String,
    bearer_token: String,
    base_url: String,
    client: reqwest::Client,
    rate_limiter: RateLimiter,
}

impl OptionsClient {
    pub fn new(provider_id: impl Into<String>, bearer_token: String, base_url: String) -> Self {
        let rate_limit: usize = std::env::var("OPTIONS_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(45))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            provider_id: provider_id.into(),
            bearer_token,
            base_url,
            client,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        let request = builder
            .bearer_auth(&self.bearer_token)
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

    async fn run<T, F>(&self, credits: u64, fut: F) -> ProviderResult<T>
    where
        F: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let started = StdInstant::now();
        let outcome = fut.await;
        let latency_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(data) => ProviderResult::ok(data, credits, latency_ms, false),
            Err(e) => ProviderResult::err(e, 0, latency_ms),
        }
    }
}

#[async_trait]
impl MarketDataProvider for OptionsClient {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn supported_ops(&self) -> &'static [Operation] {
        SUPPORTED
    }

    /// Chain endpoints are billed per contract returned in the response, so
    /// this is only an upper-bound estimate before the call is made; cached
    /// feed reads cost a flat single credit regardless of size.
    fn estimate_credits(&self, op: Operation, unit_count: u64) -> u64 {
        match op {
            Operation::GetOptionChain => unit_count.max(1),
            Operation::GetExpirations | Operation::GetStrikes | Operation::GetQuote => 1,
            _ => 0,
        }
    }

    async fn health_probe(&self) -> ProviderResult<()> {
        self.run(0, async {
            let url = format!("{}/v1/status", self.base_url);
            let response = self.send(self.client.get(&url)).await?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(http::status_to_error(&self.provider_id, response.status(), String::new()))
            }
        })
        .await
    }

    async fn get_option_chain(&self, underlying: &Symbol, filter: &ChainFilter) -> ProviderResult<OptionChain> {
        let cached = matches!(filter.feed, Some(OptionFeed::Cached));
        let estimate = if cached { 1 } else { self.estimate_credits(Operation::GetOptionChain, 200) };
        self.run(estimate, async {
            let url = format!("{}/v1/options/chain/{}", self.base_url, underlying.as_str());
            let mut query: Vec<(String, String)> = Vec::new();
            if let Some(side) = filter.side {
                query.push(("side".to_string(), match side {
                    OptionSide::Call => "call".to_string(),
                    OptionSide::Put => "put".to_string(),
                }));
            }
            if let Some(v) = filter.min_dte {
                query.push(("dte.gte".to_string(), v.to_string()));
            }
            if let Some(v) = filter.max_dte {
                query.push(("dte.lte".to_string(), v.to_string()));
            }
            if let Some(v) = filter.min_strike {
                query.push(("strike.gte".to_string(), v.to_string()));
            }
            if let Some(v) = filter.max_strike {
                query.push(("strike.lte".to_string(), v.to_string()));
            }
            if let Some(v) = filter.min_delta {
                query.push(("delta.gte".to_string(), v.to_string()));
            }
            if let Some(v) = filter.max_delta {
                query.push(("delta.lte".to_string(), v.to_string()));
            }
            if let Some(v) = filter.min_open_interest {
                query.push(("open_interest.gte".to_string(), v.to_string()));
            }
            if cached {
                query.push(("feed".to_string(), "cached".to_string()));
            }

            let response = self.send(self.client.get(&url).query(&query)).await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(http::status_to_error(&self.provider_id, status, body));
            }
            let parsed: ChainResponse = response.json().await.map_err(|e| ProviderError::ParseError {
                provider_id: self.provider_id.clone(),
                message: e.to_string(),
            })?;

            let now = chrono::Utc::now();
            let today = now.date_naive();
            let contracts = parsed
                .contracts
                .into_iter()
                .filter_map(|c| {
                    let expiration_date = NaiveDate::parse_from_str(&c.expiration_date, "%Y-%m-%d").ok()?;
                    let side = match c.side.as_str() {
                        "call" => OptionSide::Call,
                        "put" => OptionSide::Put,
                        _ => return None,
                    };
                    Some(OptionContract {
                        option_symbol: c.option_symbol,
                        underlying: underlying.clone(),
                        side,
                        strike: Decimal::from_f64_retain(c.strike).unwrap_or_default(),
                        expiration_date,
                        bid: c.bid.and_then(Decimal::from_f64_retain),
                        ask: c.ask.and_then(Decimal::from_f64_retain),
                        last: c.last.and_then(Decimal::from_f64_retain),
                        volume: c.volume,
                        open_interest: c.open_interest,
                        delta: c.delta.and_then(Decimal::from_f64_retain),
                        gamma: c.gamma.and_then(Decimal::from_f64_retain),
                        theta: c.theta.and_then(Decimal::from_f64_retain),
                        vega: c.vega.and_then(Decimal::from_f64_retain),
                        iv: c.iv.and_then(Decimal::from_f64_retain),
                        dte: (expiration_date - today).num_days(),
                        updated_at: now,
                        adjusted: c.adjusted.unwrap_or(false),
                    })
                })
                .collect();

            Ok(OptionChain {
                underlying: underlying.clone(),
                underlying_price: Decimal::from_f64_retain(parsed.underlying_price).unwrap_or_default(),
                updated_at: now,
                contracts,
            })
        })
        .await
    }

    async fn get_expirations(&self, underlying: &Symbol) -> ProviderResult<Vec<NaiveDate>> {
        self.run(1, async {
            let url = format!("{}/v1/options/expirations/{}", self.base_url, underlying.as_str());
            let response = self.send(self.client.get(&url)).await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(http::status_to_error(&self.provider_id, status, body));
            }
            let parsed: ExpirationsResponse = response.json().await.map_err(|e| ProviderError::ParseError {
                provider_id: self.provider_id.clone(),
                message: e.to_string(),
            })?;
            Ok(parsed
                .expirations
                .into_iter()
                .filter_map(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok())
                .collect())
        })
        .await
    }

    async fn get_strikes(&self, underlying: &Symbol, expiration: NaiveDate) -> ProviderResult<Vec<Decimal>> {
        self.run(1, async {
            let url = format!("{}/v1/options/strikes/{}", self.base_url, underlying.as_str());
            let response = self
                .send(
                    self.client
                        .get(&url)
                        .query(&[("expiration", expiration.format("%Y-%m-%d").to_string())]),
                )
                .await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(http::status_to_error(&self.provider_id, status, body));
            }
            let parsed: StrikesResponse = response.json().await.map_err(|e| ProviderError::ParseError {
                provider_id: self.provider_id.clone(),
                message: e.to_string(),
            })?;
            Ok(parsed
                .strikes
                .into_iter()
                .filter_map(Decimal::from_f64_retain)
                .collect())
        })
        .await
    }

    async fn get_quote(&self, symbol: &Symbol) -> ProviderResult<Quote> {
        self.run(1, async {
            let url = format!("{}/v1/quote/{}", self.base_url, symbol.as_str());
            let response = self.send(self.client.get(&url)).await?;
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
}

#[derive(Debug, Deserialize)]
struct ChainResponse {
    underlying_price: f64,
    contracts: Vec<ChainRow>,
}

#[derive(Debug, Deserialize)]
struct ChainRow {
    option_symbol: String,
    side: String,
    strike: f64,
    expiration_date: String,
    bid: Option<f64>,
    ask: Option<f64>,
    last: Option<f64>,
    volume: Option<i64>,
    open_interest: Option<i64>,
    delta: Option<f64>,
    gamma: Option<f64>,
    theta: Option<f64>,
    vega: Option<f64>,
    iv: Option<f64>,
    #[serde(default)]
    adjusted: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ExpirationsResponse {
    expirations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StrikesResponse {
    strikes: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    bid: Option<f64>,
    ask: Option<f64>,
    last: Option<f64>,
    volume: Option<i64>,
}
