//! Configuration management
//!
//! Provides helper functions for reading environment variables with fallback
//! to deprecated variable names, and the validated agent configuration.

use crate::error::ConfigError;
use percent_encoding::percent_decode_str;
use std::time::Duration;

/// Get an environment variable with fallback to a deprecated name
///
/// If the new variable name is set, returns its value.
/// If only the old (deprecated) variable name is set, returns its value
/// and logs a deprecation warning.
///
/// # Example
/// ```
/// use sensord::config::get_env_with_fallback;
///
/// let location = get_env_with_fallback("SENSORD_LOCATION", "LOCATION");
/// ```
pub fn get_env_with_fallback(new_name: &str, old_name: &str) -> Option<String> {
    if let Ok(val) = std::env::var(new_name) {
        return Some(val);
    }
    if let Ok(val) = std::env::var(old_name) {
        tracing::warn!(
            "Environment variable '{}' is deprecated, use '{}' instead",
            old_name,
            new_name
        );
        return Some(val);
    }
    None
}

/// Get an environment variable with fallback and default value
pub fn get_env_with_fallback_or(new_name: &str, old_name: &str, default: &str) -> String {
    get_env_with_fallback(new_name, old_name).unwrap_or_else(|| default.to_string())
}

/// 配送モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DeliveryMode {
    /// サンプルを1件ずつ全レーンへ配送
    #[default]
    Stream,
    /// フラッシュ間隔ごとにまとめて配送
    Batch,
}

/// Basic認証の資格情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// ユーザー名
    pub username: String,
    /// パスワード
    pub password: String,
}

/// ストリーミングフィードのリスナー設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// バインドアドレス
    pub bind_addr: String,
    /// 接続時に要求する資格情報（Noneなら認証なし）
    pub credentials: Option<Credentials>,
}

/// 配送レーン設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneConfig {
    /// レーンごとのキュー長
    pub queue_capacity: usize,
    /// レーンごとの同時配送数
    pub concurrency: usize,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            concurrency: 4,
        }
    }
}

/// HTTPバッチ配送先
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTarget {
    /// 資格情報を除去したURL
    pub url: String,
    /// URLに埋め込まれていた資格情報
    pub credentials: Option<Credentials>,
}

impl BatchTarget {
    /// URLをパースし、ユーザー情報をBasic認証として分離する
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut url = reqwest::Url::parse(raw).map_err(|e| ConfigError::Invalid {
            name: "batch_url",
            reason: format!("{raw}: {e}"),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                name: "batch_url",
                reason: format!("{raw}: scheme must be http or https"),
            });
        }

        let credentials = if url.username().is_empty() {
            None
        } else {
            Some(Credentials {
                username: decode_userinfo(url.username()),
                password: decode_userinfo(url.password().unwrap_or_default()),
            })
        };
        // set_username/set_password only fail for cannot-be-a-base URLs, excluded above
        let _ = url.set_username("");
        let _ = url.set_password(None);

        Ok(Self {
            url: url.to_string(),
            credentials,
        })
    }
}

/// URLのユーザー情報はパーセントエンコードされたまま返る
fn decode_userinfo(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// エージェント設定
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// マニフェスト取得先（http/https/file）
    pub manifest_url: String,
    /// サンプルに付与するロケーション
    pub location: String,
    /// サンプリング間隔
    pub sample_interval: Duration,
    /// マニフェスト再取得間隔
    pub manifest_interval: Duration,
    /// 配送モード
    pub mode: DeliveryMode,
    /// バッチのフラッシュ間隔
    pub flush_interval: Duration,
    /// HTTPバッチ配送先
    pub batch_targets: Vec<BatchTarget>,
    /// UDP配送先
    pub udp_addrs: Vec<String>,
    /// logfmt出力の有効化
    pub logfmt: bool,
    /// ストリーミングフィード
    pub feed: Option<FeedConfig>,
    /// チャネルから読み出すフォワーダー数
    pub forwarder_count: usize,
    /// 配送レーン設定
    pub lane: LaneConfig,
    /// プローブのタイムアウト
    pub probe_timeout: Duration,
    /// 配送・マニフェスト取得のHTTPタイムアウト
    pub delivery_timeout: Duration,
}

impl AgentConfig {
    /// デフォルト値で設定を作成（配送先は未設定）
    pub fn new(manifest_url: impl Into<String>) -> Self {
        Self {
            manifest_url: manifest_url.into(),
            location: "undefined".to_string(),
            sample_interval: Duration::from_secs(1),
            manifest_interval: Duration::from_secs(10),
            mode: DeliveryMode::Stream,
            flush_interval: Duration::from_secs(1),
            batch_targets: Vec::new(),
            udp_addrs: Vec::new(),
            logfmt: false,
            feed: None,
            forwarder_count: 1,
            lane: LaneConfig::default(),
            probe_timeout: Duration::from_secs(10),
            delivery_timeout: Duration::from_secs(10),
        }
    }

    /// 設定値を検証
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !["http://", "https://", "file://"]
            .iter()
            .any(|scheme| self.manifest_url.starts_with(scheme))
        {
            return Err(ConfigError::Invalid {
                name: "manifest_url",
                reason: format!("{}: expected http, https or file URL", self.manifest_url),
            });
        }

        for (name, value) in [
            ("sample_interval", self.sample_interval),
            ("manifest_interval", self.manifest_interval),
            ("flush_interval", self.flush_interval),
            ("probe_timeout", self.probe_timeout),
            ("delivery_timeout", self.delivery_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid {
                    name,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        for (name, value) in [
            ("forwarder_count", self.forwarder_count),
            ("lane_queue_capacity", self.lane.queue_capacity),
            ("lane_concurrency", self.lane.concurrency),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    name,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        for addr in &self.udp_addrs {
            validate_host_port(addr)?;
        }

        if self.batch_targets.is_empty()
            && self.udp_addrs.is_empty()
            && !self.logfmt
            && self.feed.is_none()
        {
            return Err(ConfigError::NoDestination);
        }

        Ok(())
    }
}

fn validate_host_port(addr: &str) -> Result<(), ConfigError> {
    let valid = addr
        .rsplit_once(':')
        .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
        .unwrap_or(false);
    if valid {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            name: "udp_addr",
            reason: format!("{addr}: expected host:port"),
        })
    }
}
