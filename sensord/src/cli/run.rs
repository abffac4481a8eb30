//! run サブコマンド
//!
//! 監視エージェントを起動します。

use crate::config::{
    get_env_with_fallback, get_env_with_fallback_or, AgentConfig, BatchTarget, Credentials,
    DeliveryMode, FeedConfig, LaneConfig,
};
use crate::error::ConfigError;
use clap::Args;
use std::time::Duration;

/// run サブコマンドの引数
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Check manifest location (http, https or file URL)
    #[arg(long, env = "SENSORD_MANIFEST_URL")]
    pub manifest_url: Option<String>,

    /// Location tag attached to every sample
    #[arg(long, env = "SENSORD_LOCATION")]
    pub location: Option<String>,

    /// Sampling interval per check in milliseconds
    #[arg(long, default_value = "1000", env = "SENSORD_SAMPLE_INTERVAL_MS")]
    pub sample_interval_ms: u64,

    /// Manifest refresh interval in seconds
    #[arg(long, default_value = "10", env = "SENSORD_MANIFEST_INTERVAL_SECS")]
    pub manifest_interval_secs: u64,

    /// Delivery mode
    #[arg(long, value_enum, default_value_t = DeliveryMode::Stream, env = "SENSORD_MODE")]
    pub mode: DeliveryMode,

    /// Batch flush interval in milliseconds
    #[arg(long, default_value = "1000", env = "SENSORD_FLUSH_INTERVAL_MS")]
    pub flush_interval_ms: u64,

    /// Batch POST destination (repeatable or comma-separated)
    #[arg(long = "batch-url", env = "SENSORD_BATCH_URLS", value_delimiter = ',')]
    pub batch_urls: Vec<String>,

    /// UDP destination host:port (repeatable or comma-separated)
    #[arg(long = "udp-addr", env = "SENSORD_UDP_ADDRS", value_delimiter = ',')]
    pub udp_addrs: Vec<String>,

    /// Write one logfmt line per sample to stdout
    #[arg(long, default_value_t = false, env = "SENSORD_LOGFMT")]
    pub logfmt: bool,

    /// Streaming feed bind address
    #[arg(long, env = "SENSORD_FEED_ADDR")]
    pub feed_addr: Option<String>,

    /// Feed basic auth user
    #[arg(long, env = "SENSORD_FEED_USER", requires = "feed_password")]
    pub feed_user: Option<String>,

    /// Feed basic auth password
    #[arg(
        long,
        env = "SENSORD_FEED_PASSWORD",
        hide_env_values = true,
        requires = "feed_user"
    )]
    pub feed_password: Option<String>,

    /// Number of channel consumers
    #[arg(long, default_value = "1", env = "SENSORD_FORWARDER_COUNT")]
    pub forwarder_count: usize,

    /// Per-destination queue capacity
    #[arg(long, default_value = "1024", env = "SENSORD_LANE_QUEUE_CAPACITY")]
    pub lane_queue_capacity: usize,

    /// Per-destination concurrent deliveries
    #[arg(long, default_value = "4", env = "SENSORD_LANE_CONCURRENCY")]
    pub lane_concurrency: usize,

    /// Probe timeout in seconds
    #[arg(long, default_value = "10", env = "SENSORD_PROBE_TIMEOUT_SECS")]
    pub probe_timeout_secs: u64,

    /// Timeout in seconds for batch POSTs and manifest fetches
    #[arg(long, default_value = "10", env = "SENSORD_DELIVERY_TIMEOUT_SECS")]
    pub delivery_timeout_secs: u64,
}

impl RunArgs {
    /// 引数を検証済みのエージェント設定に変換
    ///
    /// 新しい環境変数名が未設定なら、旧名（`MANIFEST_URL`, `LOCATION`）を読む。
    pub fn into_config(self) -> Result<AgentConfig, ConfigError> {
        let manifest_url = self
            .manifest_url
            .or_else(|| get_env_with_fallback("SENSORD_MANIFEST_URL", "MANIFEST_URL"))
            .ok_or(ConfigError::Invalid {
                name: "manifest_url",
                reason: "required (--manifest-url or SENSORD_MANIFEST_URL)".to_string(),
            })?;

        let location = self
            .location
            .unwrap_or_else(|| get_env_with_fallback_or("SENSORD_LOCATION", "LOCATION", "undefined"));

        let batch_targets = self
            .batch_urls
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(BatchTarget::parse)
            .collect::<Result<Vec<_>, _>>()?;

        let udp_addrs = self
            .udp_addrs
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let credentials = match (self.feed_user, self.feed_password) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            _ => None,
        };
        let feed = self.feed_addr.map(|bind_addr| FeedConfig {
            bind_addr,
            credentials,
        });

        let config = AgentConfig {
            manifest_url,
            location,
            sample_interval: Duration::from_millis(self.sample_interval_ms),
            manifest_interval: Duration::from_secs(self.manifest_interval_secs),
            mode: self.mode,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            batch_targets,
            udp_addrs,
            logfmt: self.logfmt,
            feed,
            forwarder_count: self.forwarder_count,
            lane: LaneConfig {
                queue_capacity: self.lane_queue_capacity,
                concurrency: self.lane_concurrency,
            },
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            delivery_timeout: Duration::from_secs(self.delivery_timeout_secs),
        };
        config.validate()?;
        Ok(config)
    }
}
