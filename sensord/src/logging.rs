//! ロギング初期化ユーティリティ
//!
//! `SENSORD_LOG_LEVEL`（旧: `LOG_LEVEL`、なければ `RUST_LOG`）でフィルタを指定する。
//! `SENSORD_LOG_FORMAT=json` でJSON Lines形式に切り替わる。

use crate::config::get_env_with_fallback;
use crate::error::SensordError;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LOG_LEVEL: &str = "info";

/// ログ出力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 人間向けテキスト
    Text,
    /// JSON Lines
    Json,
}

impl LogFormat {
    fn from_env() -> Self {
        match std::env::var("SENSORD_LOG_FORMAT") {
            Ok(value) if value.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

/// フィルタ文字列を決定
fn filter_directive() -> String {
    get_env_with_fallback("SENSORD_LOG_LEVEL", "LOG_LEVEL")
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}

/// グローバルサブスクライバーを初期化
///
/// 返される `WorkerGuard` がドロップされるとバッファ済みのログが失われるため、
/// 呼び出し側はプロセス終了まで保持すること。
pub fn init() -> Result<WorkerGuard, SensordError> {
    let filter = EnvFilter::try_new(filter_directive())
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_LEVEL))
        .map_err(|e| SensordError::Logging(e.to_string()))?;
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    let registry = tracing_subscriber::registry().with(filter);
    let result = match LogFormat::from_env() {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(writer))
            .try_init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false).with_writer(writer))
            .try_init(),
    };
    result.map_err(|e| SensordError::Logging(e.to_string()))?;

    Ok(guard)
}
