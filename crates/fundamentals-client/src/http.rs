use pmcc_core::ProviderError;

/// Translate an HTTP status code into the shared error taxonomy. 408/429 are
/// treated as retryable; other 4xx are terminal client errors that must not
/// trip the circuit breaker.
pub fn status_to_error(provider_id: &str, status: reqwest::StatusCode, body: String) -> ProviderError {
    let code = status.as_u16();
    if code == 429 {
        ProviderError::RateLimited {
            provider_id: provider_id.to_string(),
            retry_after_secs: None,
        }
    } else if code == 401 || code == 403 {
        ProviderError::AuthError {
            provider_id: provider_id.to_string(),
            message: body,
        }
    } else if code == 408 || (500..600).contains(&code) {
        ProviderError::UpstreamTransient {
            provider_id: provider_id.to_string(),
            message: format!("HTTP {code}: {body}"),
        }
    } else {
        ProviderError::UpstreamClientError {
            provider_id: provider_id.to_string(),
            message: format!("HTTP {code}: {body}"),
        }
    }
}
