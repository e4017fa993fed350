mod cache;
mod config;
mod error;
mod handlers;
mod metrics;
mod middleware;
mod models;
mod rate_limit;
mod state;
mod vision;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware::from_fn_with_state,
    routing::{get, post},
};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Args;
use crate::handlers::{
    analyze_upload, analyze_url, health_handler, metrics_handler, status_handler, test_handler,
};
use crate::state::AppState;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vision_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if args.vision_key.is_empty() {
        warn!("no vision API key configured; upstream calls will be rejected");
    }

    let state = Arc::new(AppState::from_args(&args));

    // background sweep: stale quota records and expired cache entries
    let sweeper = state.clone();
    let sweep_every = Duration::from_secs(args.sweep_interval.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_every);
        loop {
            ticker.tick().await;
            let dropped = sweeper.limiter.sweep();
            sweeper.cache.purge_expired();
            metrics::TRACKED_CLIENTS.set(sweeper.limiter.tracked_clients() as f64);
            if dropped > 0 {
                debug!(dropped, "evicted lapsed quota records");
            }
        }
    });

    let app = app(state, &args);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind port");

    info!(port = args.port, endpoint = %args.vision_endpoint, "gateway listening");
    info!(
        limit = args.rate_limit,
        window_seconds = args.rate_window,
        "rate limiting enabled"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server error");
}

// Router assembly. The /api routes sit behind the rate limiter;
// health and metrics stay outside of it.
fn app(state: Arc<AppState>, args: &Args) -> Router {
    let api = Router::new()
        .route("/api/test", get(test_handler))
        .route("/api/status", get(status_handler))
        .route("/api/analyze", post(analyze_upload))
        .route("/api/analyze/url", post(analyze_url))
        .layer(DefaultBodyLimit::max(args.max_image_bytes() + 64 * 1024))
        .route_layer(from_fn_with_state(state.clone(), middleware::rate_limit));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(api)
        .layer(cors_layer(&args.cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app(extra: &[&str]) -> Router {
        let mut argv = vec!["vision-gateway"];
        argv.extend_from_slice(extra);
        let args = Args::parse_from(argv);
        app(Arc::new(AppState::from_args(&args)), &args)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_from(uri: &str, ip: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn health_bypasses_the_rate_limiter() {
        // limit 0 denies every /api request, health must still answer
        let app = test_app(&["--rate-limit", "0"]);

        let response = app
            .clone()
            .oneshot(get_from("/health", "1.1.1.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["rate_limiting"]["algorithm"], "fixed_window");

        let response = app
            .clone()
            .oneshot(get_from("/api/test", "1.1.1.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn metrics_endpoint_is_not_throttled() {
        let app = test_app(&["--rate-limit", "0"]);
        let response = app
            .clone()
            .oneshot(get_from("/metrics", "1.1.1.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn status_reflects_middleware_consumption_only() {
        let app = test_app(&["--rate-limit", "5"]);

        // each /api/status call consumes one unit in the middleware,
        // the handler itself only peeks
        let response = app
            .clone()
            .oneshot(get_from("/api/status", "8.8.8.8"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["client"], "8.8.8.8");
        assert_eq!(json["rate_limit"]["limit"], 5);
        assert_eq!(json["rate_limit"]["remaining"], 4);

        let response = app
            .clone()
            .oneshot(get_from("/api/status", "8.8.8.8"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["rate_limit"]["remaining"], 3);
    }

    #[tokio::test]
    async fn analyze_url_rejects_non_http_urls() {
        let app = test_app(&[]);
        let request = Request::builder()
            .uri("/api/analyze/url")
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"image_url": "ftp://example.com/cat.jpg"}"#))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn analyze_requires_key_when_configured() {
        let app = test_app(&["--api-keys", "secret"]);
        let request = Request::builder()
            .uri("/api/analyze/url")
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"image_url": "https://example.com/cat.jpg"}"#))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
