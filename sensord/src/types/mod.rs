//! 型定義モジュール
//!
//! ドメインエンティティの型定義を提供

/// チェック・マニフェスト関連の型定義
pub mod check;

/// サンプル（計測結果）関連の型定義
pub mod sample;

pub use check::{Check, Manifest, ServiceDefinition, ServiceKind};
pub use sample::{Measurement, Sample};
