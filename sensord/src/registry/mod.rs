//! フリートレジストリ
//!
//! チェックID → 稼働中ワーカーの対応を所有し、最新のマニフェストと一致させる。
//!
//! 照合はIDのみで行う。IDが同じままURLだけ変わったチェックは変更として
//! 検出しない（既知の制約）。

use crate::types::{Check, Manifest};
use crate::worker::{CheckWorker, WorkerContext, WorkerHandle, WorkerState};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 1回の照合結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// 新たに開始したチェックID
    pub added: Vec<String>,
    /// 停止を要求したチェックID
    pub removed: Vec<String>,
}

impl ReconcileReport {
    /// 変更がなかったか
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// ワーカー一覧の要素
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WorkerSummary {
    /// チェックID
    pub id: String,
    /// 計測対象URL
    pub url: String,
    /// ワーカー状態
    pub state: &'static str,
}

/// フリートレジストリ
///
/// ワーカーのライフサイクルはレジストリが排他的に所有する。
/// ロックはマップの読み書きの間だけ保持し、チャネル送信を待つことはない
/// （`start`/`stop` はどちらもブロックしない）。
#[derive(Clone)]
pub struct FleetRegistry {
    /// チェックID → ワーカー
    workers: Arc<RwLock<HashMap<String, CheckWorker>>>,
    /// ワーカー共通の実行環境
    ctx: WorkerContext,
    /// 全ワーカーの親トークン
    root: CancellationToken,
}

impl FleetRegistry {
    /// 空のレジストリを作成
    pub fn new(ctx: WorkerContext, root: CancellationToken) -> Self {
        Self {
            workers: Arc::new(RwLock::new(HashMap::new())),
            ctx,
            root,
        }
    }

    /// マニフェストに合わせてワーカーを追加・停止する
    ///
    /// 追加と削除の1回分は単一の書き込みロックの下で直列に行う。
    /// 削除したワーカーは停止を要求した時点でマップから外し、終了は待たない。
    pub async fn reconcile(&self, manifest: &Manifest) -> ReconcileReport {
        let desired: HashSet<&str> = manifest.check_ids();
        let mut report = ReconcileReport::default();

        let mut workers = self.workers.write().await;

        for check in &manifest.checks {
            match workers.get(&check.id) {
                Some(existing) => {
                    if existing.check().url != check.url {
                        debug!(
                            check_id = %check.id,
                            running_url = %existing.check().url,
                            manifest_url = %check.url,
                            "URL changed under a tracked check id, keeping running worker"
                        );
                    }
                }
                None => {
                    // 挿入してから開始するため、同一IDの二重起動は起こらない
                    let worker = self.spawn_worker(check);
                    workers
                        .entry(check.id.clone())
                        .or_insert(worker)
                        .start();
                    report.added.push(check.id.clone());
                }
            }
        }

        let stale: Vec<String> = workers
            .keys()
            .filter(|id| !desired.contains(id.as_str()))
            .cloned()
            .collect();
        for id in stale {
            if let Some(worker) = workers.remove(&id) {
                worker.stop();
                report.removed.push(id);
            }
        }

        self.ctx.metrics.active_workers().set(workers.len() as i64);
        drop(workers);

        if !report.is_noop() {
            info!(
                added = report.added.len(),
                removed = report.removed.len(),
                total = manifest.checks.len(),
                "Fleet reconciled"
            );
        }
        report
    }

    fn spawn_worker(&self, check: &Check) -> CheckWorker {
        CheckWorker::new(check.clone(), self.ctx.clone(), self.root.child_token())
    }

    /// 稼働中ワーカーのチェックID（昇順）
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workers.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// 登録ワーカー数
    pub async fn len(&self) -> usize {
        self.workers.read().await.len()
    }

    /// ワーカーが1つもないか
    pub async fn is_empty(&self) -> bool {
        self.workers.read().await.is_empty()
    }

    /// 指定IDのワーカーハンドル
    pub async fn handle(&self, id: &str) -> Option<WorkerHandle> {
        self.workers.read().await.get(id).map(CheckWorker::handle)
    }

    /// ワーカー一覧（ID昇順）
    pub async fn list(&self) -> Vec<WorkerSummary> {
        let workers = self.workers.read().await;
        let mut list: Vec<WorkerSummary> = workers
            .values()
            .map(|w| WorkerSummary {
                id: w.check().id.clone(),
                url: w.check().url.clone(),
                state: w.state().as_str(),
            })
            .collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// 全ワーカーに停止を要求し、マップを空にする
    pub async fn stop_all(&self) {
        let mut workers = self.workers.write().await;
        for (_, worker) in workers.drain() {
            worker.stop();
        }
        self.root.cancel();
        self.ctx.metrics.active_workers().set(0);
    }

    /// 指定IDのワーカーが稼働中か
    pub async fn is_running(&self, id: &str) -> bool {
        self.workers
            .read()
            .await
            .get(id)
            .map(|w| w.state() == WorkerState::Running)
            .unwrap_or(false)
    }
}
