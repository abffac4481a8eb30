//! エラー型定義
//!
//! 統一エラー型（thiserror使用）
//!
//! プローブ単位の通信失敗はエラーではなく `Measurement::exit_status` で表現する。
//! ここに定義するのは、ステージ単位で握りつぶすか（マニフェスト取得・配送）、
//! プロセスを終了させる（設定・起動・致命的なプローブ失敗）エラーのみ。

use thiserror::Error;

/// 設定エラー
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 値が不正
    #[error("Invalid value for {name}: {reason}")]
    Invalid {
        /// 設定項目名
        name: &'static str,
        /// 理由
        reason: String,
    },

    /// 配送先が1つも設定されていない
    #[error("No delivery destination configured (set --batch-url, --udp-addr, --logfmt or --feed-addr)")]
    NoDestination,
}

/// マニフェスト取得エラー
#[derive(Debug, Error)]
pub enum ManifestError {
    /// HTTP通信エラー
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// 成功以外のHTTPステータス
    #[error("Unexpected HTTP status {status} from {url}")]
    Status {
        /// 取得先URL
        url: String,
        /// HTTPステータス
        status: u16,
    },

    /// JSONパースエラー
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// ファイル読み込みエラー
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 未対応のスキーム
    #[error("Unsupported manifest location: {0}")]
    UnsupportedScheme(String),
}

/// プローブの致命的エラー
///
/// ローカル環境の問題でプローブ自体が実行できない場合のみ発生する。
/// リモート側の失敗（名前解決・接続・タイムアウト）はこのエラーにならない。
#[derive(Debug, Error)]
pub enum ProbeError {
    /// TLSコネクタの構築に失敗
    #[error("Failed to build TLS connector: {0}")]
    Tls(String),
}

/// 配送エラー
#[derive(Debug, Error)]
pub enum SinkError {
    /// HTTP通信エラー
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// 成功以外のHTTPステータス
    #[error("HTTP {0}")]
    Status(u16),

    /// ソケットエラー
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// シリアライズエラー
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 配送先設定が不正
    #[error("Invalid target: {0}")]
    Target(#[from] ConfigError),
}

/// エージェント全体のエラー型
#[derive(Debug, Error)]
pub enum SensordError {
    /// 設定エラー
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// マニフェストエラー
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// プローブエラー
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// 配送エラー
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// リスナーのバインド失敗
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// バインド先
        addr: String,
        /// 原因
        #[source]
        source: std::io::Error,
    },

    /// サーバー実行中のエラー
    #[error("Server error: {0}")]
    Server(#[source] std::io::Error),

    /// ロギング初期化失敗
    #[error("Logging error: {0}")]
    Logging(String),

    /// ワーカーの致命的失敗
    #[error("Fatal worker failure: {0}")]
    Fatal(String),
}

/// エージェントの結果型
pub type SensordResult<T> = Result<T, SensordError>;
