use thiserror::Error;

/// The full error taxonomy shared by every provider adapter, the registry,
/// the analysis engine, and the notification layer.
///
/// Each variant carries enough context for the caller to decide whether to
/// retry, fall back, or give up. `retryable()` and `provider_id()` are the
/// two properties the circuit breaker and registry retry loop key off of.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("invalid configuration: {0}")]
    ConfigError(String),

    #[error("operation {op} not supported by provider {provider_id}")]
    UnsupportedOperation { op: String, provider_id: String },

    #[error("no healthy provider available for operation {op}")]
    NoProviderAvailable { op: String },

    #[error("rate limited by {provider_id}{}", retry_after_secs.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited {
        provider_id: String,
        retry_after_secs: Option<u64>,
    },

    #[error("daily rate limit exceeded for {provider_id}")]
    DailyLimitExceeded { provider_id: String },

    #[error("cost budget exceeded: would spend {estimated}, {remaining} remaining")]
    BudgetExceeded { estimated: f64, remaining: f64 },

    #[error("circuit open for provider {provider_id}")]
    CircuitOpen { provider_id: String },

    #[error("upstream transient error from {provider_id}: {message}")]
    UpstreamTransient { provider_id: String, message: String },

    #[error("upstream client error from {provider_id}: {message}")]
    UpstreamClientError { provider_id: String, message: String },

    #[error("authentication error with {provider_id}: {message}")]
    AuthError { provider_id: String, message: String },

    #[error("failed to parse response from {provider_id}: {message}")]
    ParseError { provider_id: String, message: String },

    #[error("no option chain for {symbol}")]
    NoChain { symbol: String },

    #[error("no data returned for {symbol}")]
    NoData { symbol: String },

    #[error("invariant violated while constructing {what}: {message}")]
    InvariantViolation { what: String, message: String },

    #[error("notification delivery failed on channel {channel}: {message}")]
    NotificationFailure { channel: String, message: String },

    #[error("scan cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Whether this error should count toward a provider's circuit-breaker
    /// failure tally and be eligible for the registry's internal retry loop.
    /// Only retryable/server-class errors count; client errors (bad input,
    /// auth, non-408/429 4xx) do not trip the breaker.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::UpstreamTransient { .. }
                | ProviderError::CircuitOpen { .. }
        )
    }

    /// True for errors that should trip the circuit breaker's failure
    /// counter (retryable/server errors), distinct from `retryable()` which
    /// also covers `CircuitOpen` (a caller-side rejection, not an upstream
    /// failure, so it must not itself count toward opening the breaker).
    pub fn counts_toward_breaker(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. } | ProviderError::UpstreamTransient { .. }
        )
    }

    pub fn provider_id(&self) -> Option<&str> {
        match self {
            ProviderError::UnsupportedOperation { provider_id, .. }
            | ProviderError::RateLimited { provider_id, .. }
            | ProviderError::DailyLimitExceeded { provider_id }
            | ProviderError::CircuitOpen { provider_id }
            | ProviderError::UpstreamTransient { provider_id, .. }
            | ProviderError::UpstreamClientError { provider_id, .. }
            | ProviderError::AuthError { provider_id, .. }
            | ProviderError::ParseError { provider_id, .. } => Some(provider_id),
            _ => None,
        }
    }
}
