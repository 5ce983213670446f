use crate::AppState;
use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde_json::json;

/// GET /health — liveness probe.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "uptime_seconds": state.start_time.elapsed().as_secs(),
    }))
}

/// GET /metrics — engine counters snapshot.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "translations": state.registry.get_translation_stats(),
        "avg_duration_ms": state.registry.get_performance_metrics(),
        "cache": state.cache.stats(),
        "buffer_pool": state.pool.stats(),
        "uptime_seconds": state.start_time.elapsed().as_secs(),
    }))
}
