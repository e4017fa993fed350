use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    response::IntoResponse,
};
use chrono::Utc;

use crate::middleware::client_key;
use crate::state::AppState;

// Current quota snapshot for the caller. Reads the record without
// consuming any quota; the admission middleware has already counted
// this request by the time we get here.
pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> impl IntoResponse {
    let client = client_key(&request);
    let decision = state.limiter.status(&client);
    let reset_at = Utc::now() + chrono::Duration::seconds(decision.reset_after.as_secs() as i64);

    Json(serde_json::json!({
        "client": client,
        "rate_limit": {
            "limit": decision.limit,
            "window_seconds": state.limiter.window().as_secs(),
            "remaining": decision.remaining,
            "reset_at": reset_at.to_rfc3339(),
        },
    }))
}

// Rate-limited probe endpoint
pub async fn test_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "this endpoint is rate limited",
        "timestamp": Utc::now().to_rfc3339(),
        "tip": "call it rapidly to watch the quota drain",
    }))
}
