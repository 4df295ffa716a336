use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use provider_registry::ProviderRegistry;

#[derive(Clone)]
struct HealthState {
    registry: Arc<ProviderRegistry>,
}

/// Minimal liveness/readiness server for container orchestration: `/healthz`
/// reports the process is up, `/readyz` reports whether the provider
/// registry has at least one provider whose breaker isn't open.
pub fn router(registry: Arc<ProviderRegistry>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(HealthState { registry })
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn readyz(State(state): State<HealthState>) -> (StatusCode, Json<serde_json::Value>) {
    let status = state.registry.status().await;
    let any_closed = status
        .values()
        .any(|s| !matches!(s.circuit_state, market_data_provider::CircuitState::Open));

    let code = if any_closed { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(serde_json::json!({ "providers": status })))
}
