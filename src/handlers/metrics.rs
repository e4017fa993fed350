use axum::response::IntoResponse;
use prometheus::{Encoder, TextEncoder};
use tracing::error;

pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!(%err, "failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}
