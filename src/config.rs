use std::net::SocketAddr;

use clap::Parser;

/// Command-line and environment configuration for the relay binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "flipcast",
    about = "Real-time event relay for resale-arbitrage tooling",
    version
)]
pub struct Config {
    /// Address the HTTP listener binds to.
    #[arg(long, env = "FLIPCAST_BIND", default_value = "127.0.0.1:4078")]
    pub bind: SocketAddr,

    /// Static bearer token required on /events. Unset leaves the endpoint
    /// open (development mode).
    #[arg(long, env = "FLIPCAST_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Seconds between keepalive pings.
    #[arg(long, env = "FLIPCAST_PING_INTERVAL", default_value_t = 25)]
    pub ping_interval: u64,

    /// Seconds a single subscriber write may take before that subscriber is
    /// evicted.
    #[arg(long, env = "FLIPCAST_WRITE_TIMEOUT", default_value_t = 5)]
    pub write_timeout: u64,

    /// Frames buffered per subscriber before a slow client is evicted.
    #[arg(long, env = "FLIPCAST_QUEUE_CAPACITY", default_value_t = 64)]
    pub queue_capacity: usize,

    /// Search keywords for the marketplace scan pipeline. Setting this
    /// enables the pipeline.
    #[arg(long, env = "FLIPCAST_SCAN_KEYWORDS")]
    pub scan_keywords: Option<String>,

    /// Mercari API key for authenticated search requests.
    #[arg(long, env = "FLIPCAST_MERCARI_API_KEY")]
    pub mercari_api_key: Option<String>,

    /// Seconds between scan passes.
    #[arg(long, env = "FLIPCAST_SCAN_INTERVAL", default_value_t = 300)]
    pub scan_interval: u64,

    /// Mercari category id filter for the scan.
    #[arg(long, env = "FLIPCAST_SCAN_CATEGORY")]
    pub scan_category: Option<String>,

    /// Condition filter for the scan (new, like_new, good, fair).
    #[arg(long, env = "FLIPCAST_SCAN_CONDITION")]
    pub scan_condition: Option<String>,

    /// Minimum listing price for the scan.
    #[arg(long, env = "FLIPCAST_SCAN_MIN_PRICE")]
    pub scan_min_price: Option<f64>,

    /// Maximum listing price for the scan.
    #[arg(long, env = "FLIPCAST_SCAN_MAX_PRICE")]
    pub scan_max_price: Option<f64>,

    /// Assumed resale value used by the profitability score. Without it the
    /// scan still reports listings but skips scoring.
    #[arg(long, env = "FLIPCAST_REFERENCE_PRICE")]
    pub reference_price: Option<f64>,

    /// Score at or above which a listing becomes a tracked opportunity.
    #[arg(long, env = "FLIPCAST_OPPORTUNITY_SCORE", default_value_t = 0.15)]
    pub opportunity_score: f64,

    /// Score at or above which a high-value alert is emitted.
    #[arg(long, env = "FLIPCAST_ALERT_SCORE", default_value_t = 0.4)]
    pub alert_score: f64,
}
