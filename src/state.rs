use std::time::{Duration, Instant};

use crate::cache::AnalysisCache;
use crate::config::Args;
use crate::rate_limit::RateLimiter;
use crate::vision::VisionClient;

// App's shared state, built once in main and handed out as Arc
pub struct AppState {
    pub vision: VisionClient,
    pub limiter: RateLimiter,
    pub cache: AnalysisCache,
    pub api_keys: Vec<String>,
    pub max_image_bytes: usize,
    pub started_at: Instant,
}

impl AppState {
    pub fn from_args(args: &Args) -> Self {
        Self {
            vision: VisionClient::from_args(args),
            limiter: RateLimiter::new(args.rate_limit, Duration::from_secs(args.rate_window)),
            cache: AnalysisCache::new(Duration::from_secs(args.cache_ttl)),
            api_keys: args.api_keys.clone(),
            max_image_bytes: args.max_image_bytes(),
            started_at: Instant::now(),
        }
    }
}
