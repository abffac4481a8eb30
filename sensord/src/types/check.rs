//! チェック・マニフェスト型定義
//!
//! マニフェストは外部から定期的に取得されるチェック一覧のスナップショット。
//! 取得のたびに丸ごと置き換えられ、フィールド単位のマージは行わない。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// 監視対象のエンドポイント定義
///
/// 同一性は `id` のみで判定する。URLが変わってもIDが同じなら同じチェックとみなす。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Check {
    /// チェックID
    pub id: String,
    /// 計測対象URL
    pub url: String,
    /// 計測元ロケーション（未指定時はエージェント設定値を使用）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// サンプルの配送先サービスID一覧
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
}

impl Check {
    /// IDとURLからチェックを作成
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            location: None,
            services: Vec::new(),
        }
    }

    /// 配送先サービスを設定
    pub fn with_services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.services = services.into_iter().map(Into::into).collect();
        self
    }
}

/// 下流サービスの種類
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServiceKind {
    /// 標準出力へのlogfmt出力
    Logfmt,
    /// HTTP POST（JSON配列）
    Http {
        /// 送信先URL
        url: String,
    },
    /// UDPデータグラム
    Udp {
        /// 送信先アドレス（host:port）
        addr: String,
    },
}

/// 名前付き下流サービス定義
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceDefinition {
    /// サービスID
    pub id: String,
    /// サービス種別と設定
    #[serde(flatten)]
    pub kind: ServiceKind,
}

/// マニフェストスナップショット
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// チェック一覧
    #[serde(default)]
    pub checks: Vec<Check>,
    /// サービス一覧
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceDefinition>,
}

/// 受け付けるマニフェストのJSON形式
#[derive(Deserialize)]
#[serde(untagged)]
enum RawManifest {
    /// `{"checks": [...], "services": [...]}`
    Full(Manifest),
    /// `[{"id": ..., "url": ...}]`
    List(Vec<Check>),
    /// `{"<id>": "<url>"}`
    Map(BTreeMap<String, String>),
}

impl Manifest {
    /// チェック一覧からマニフェストを作成
    pub fn from_checks(checks: Vec<Check>) -> Self {
        Self {
            checks,
            services: Vec::new(),
        }
        .dedup()
    }

    /// JSONバイト列をパース
    ///
    /// 3つの形式（完全形式・配列・ID→URLマップ）を受け付け、
    /// いずれも同じ `Manifest` に正規化する。
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: RawManifest = serde_json::from_slice(bytes)?;
        let manifest = match raw {
            RawManifest::Full(manifest) => manifest,
            RawManifest::List(checks) => Manifest {
                checks,
                services: Vec::new(),
            },
            RawManifest::Map(map) => Manifest {
                checks: map
                    .into_iter()
                    .map(|(id, url)| Check::new(id, url))
                    .collect(),
                services: Vec::new(),
            },
        };
        Ok(manifest.dedup())
    }

    /// スナップショット内のチェックID集合
    pub fn check_ids(&self) -> HashSet<&str> {
        self.checks.iter().map(|c| c.id.as_str()).collect()
    }

    /// ID重複を除去（先勝ち）
    fn dedup(mut self) -> Self {
        let mut seen = HashSet::new();
        self.checks.retain(|c| {
            let fresh = seen.insert(c.id.clone());
            if !fresh {
                debug!(check_id = %c.id, "Duplicate check id in manifest ignored");
            }
            fresh
        });
        let mut seen = HashSet::new();
        self.services.retain(|s| seen.insert(s.id.clone()));
        self
    }
}
