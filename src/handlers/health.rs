use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};

use crate::state::AppState;

// Health check - never rate limited
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "vision-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "vision_endpoint": state.vision.endpoint(),
        "rate_limiting": {
            "algorithm": "fixed_window",
            "limit": state.limiter.limit(),
            "window_seconds": state.limiter.window().as_secs(),
            "tracked_clients": state.limiter.tracked_clients(),
        },
        "cache_entries": state.cache.len(),
    }))
}
