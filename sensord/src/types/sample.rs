//! サンプル（計測結果）型定義
//!
//! サンプルは1回のプローブ実行につき1つだけ生成され、生成後は変更されない。

use crate::types::Check;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// プローブ実行結果（タイミング・ステータス）
///
/// 時間はすべて秒単位で、プローブ開始からの累積値。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Measurement {
    /// 0 = 通信成功、それ以外は通信レベルの失敗コード
    pub exit_status: i32,
    /// HTTPステータスコード（通信失敗時は0）
    pub http_status: u16,
    /// 接続完了までの時間
    pub connect_time: f64,
    /// 名前解決完了までの時間
    pub namelookup_time: f64,
    /// 最初のレスポンス受信までの時間
    pub starttransfer_time: f64,
    /// 全体の所要時間
    pub total_time: f64,
    /// 接続先IPアドレス
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// 受信したボディのバイト数
    pub size_download: u64,
}

impl Measurement {
    /// 通信失敗を表す計測結果
    pub fn failed(exit_status: i32) -> Self {
        Self {
            exit_status,
            ..Default::default()
        }
    }

    /// 通信が成功したか
    pub fn is_success(&self) -> bool {
        self.exit_status == 0
    }
}

/// サンプル
///
/// `check_id` は参照のみで所有関係はない。チェックがマニフェストから
/// 削除された後に届いたサンプルも正当なサンプルとして扱う。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    /// サンプルID
    pub id: Uuid,
    /// チェックID
    pub check_id: String,
    /// 計測元ロケーション
    pub location: String,
    /// 計測対象URL
    pub url: String,
    /// 計測開始時刻
    pub t: DateTime<Utc>,
    /// 計測結果
    #[serde(flatten)]
    pub measurement: Measurement,
}

impl Sample {
    /// チェックと計測結果からサンプルを作成
    pub fn new(check: &Check, location: &str, t: DateTime<Utc>, measurement: Measurement) -> Self {
        Self {
            id: Uuid::new_v4(),
            check_id: check.id.clone(),
            location: check
                .location
                .clone()
                .unwrap_or_else(|| location.to_string()),
            url: check.url.clone(),
            t,
            measurement,
        }
    }
}
