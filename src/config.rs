use clap::Parser;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "vision-gateway")]
#[command(about = "Rate-limited gateway for the Azure Computer Vision API")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    // Computer Vision resource endpoint
    #[arg(
        long,
        env = "AZURE_VISION_ENDPOINT",
        default_value = "https://demo.cognitiveservices.azure.com"
    )]
    pub vision_endpoint: String,

    // Subscription key for the Computer Vision resource
    #[arg(long, env = "AZURE_VISION_KEY", default_value = "", hide_env_values = true)]
    pub vision_key: String,

    // Vision API version path segment
    #[arg(long, default_value = "v3.2")]
    pub api_version: String,

    // Rate limit max requests per window
    #[arg(long, default_value_t = 10)]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, default_value_t = 60)]
    pub rate_window: u64,

    // Interval between sweeps of stale quota records, in seconds
    #[arg(long, default_value_t = 60)]
    pub sweep_interval: u64,

    // Response cache TTL in seconds (0 disables caching)
    #[arg(long, default_value_t = 30)]
    pub cache_ttl: u64,

    // Largest accepted upload in megabytes
    #[arg(long, default_value_t = 10)]
    pub max_image_mb: usize,

    // Timeout for calls to the vision backend, in seconds
    #[arg(long, default_value_t = 30)]
    pub request_timeout: u64,

    // Retries for transient vision backend failures
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    // Delay between retries in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub retry_delay_ms: u64,

    // Accepted API keys, comma-separated. Empty disables auth.
    #[arg(long, value_delimiter = ',')]
    pub api_keys: Vec<String>,

    // Allowed CORS origins. Empty means allow any origin.
    #[arg(long = "cors-origin")]
    pub cors_origins: Vec<String>,
}

impl Args {
    pub fn max_image_bytes(&self) -> usize {
        self.max_image_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_demo_profile() {
        let args = Args::parse_from(["vision-gateway"]);
        assert_eq!(args.port, 8080);
        assert_eq!(args.rate_limit, 10);
        assert_eq!(args.rate_window, 60);
        assert_eq!(args.max_image_bytes(), 10 * 1024 * 1024);
        assert!(args.api_keys.is_empty());
        assert!(args.cors_origins.is_empty());
    }

    #[test]
    fn api_keys_split_on_commas() {
        let args = Args::parse_from(["vision-gateway", "--api-keys", "alpha,beta"]);
        assert_eq!(args.api_keys, ["alpha", "beta"]);
    }
}
