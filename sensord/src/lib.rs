//! sensord
//!
//! エンドポイント監視エージェント。マニフェストに合わせてチェックワーカーを増減させ、
//! 計測したサンプルを複数の配送先へ独立に配送する。

#![warn(missing_docs)]

/// 共通型定義（チェック・マニフェスト・サンプル）
pub mod types;

/// エラー型
pub mod error;

/// 設定管理（環境変数ヘルパー）
pub mod config;

/// ロギング初期化ユーティリティ
pub mod logging;

/// CLIインターフェース
pub mod cli;

/// プローブ実行
pub mod probe;

/// チェックワーカー
pub mod worker;

/// ワーカーレジストリ（マニフェストとの突き合わせ）
pub mod registry;

/// 計測チャネル
pub mod channel;

/// 配送パイプライン（バッチバッファ・ファンアウト）
pub mod pipeline;

/// 配送先アダプタ
pub mod sink;

/// サービスルーティング
pub mod router;

/// マニフェスト取得
pub mod manifest;

/// メトリクス
pub mod metrics;

/// REST APIハンドラー
pub mod api;

/// axumサーバー
pub mod server;

/// 協調シャットダウン
pub mod shutdown;

/// エージェント組み立て
pub mod agent;

pub use agent::Agent;
pub use error::{SensordError, SensordResult};
