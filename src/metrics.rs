use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("vision_gateway_requests_total", "Total number of API requests").unwrap();
    pub static ref RATE_LIMITED_TOTAL: Counter = register_counter!(
        "vision_gateway_rate_limited_total",
        "Requests rejected by the rate limiter"
    )
    .unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("vision_gateway_cache_hits_total", "Total cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("vision_gateway_cache_misses_total", "Total cache misses").unwrap();
    pub static ref UPSTREAM_FAILURES: Counter = register_counter!(
        "vision_gateway_upstream_failures_total",
        "Failed calls to the vision backend"
    )
    .unwrap();
    pub static ref ANALYZE_LATENCY: Histogram = register_histogram!(
        "vision_gateway_analyze_latency_seconds",
        "Image analysis latency in seconds"
    )
    .unwrap();
    pub static ref CACHE_SIZE: Gauge = register_gauge!(
        "vision_gateway_cache_size",
        "Current number of cached analysis responses"
    )
    .unwrap();
    pub static ref TRACKED_CLIENTS: Gauge = register_gauge!(
        "vision_gateway_rate_limit_clients",
        "Client quota records currently tracked"
    )
    .unwrap();
}
