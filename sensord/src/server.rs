//! axumサーバー起動・シャットダウンハンドリング

use crate::api::{create_app, ApiState};
use crate::error::{SensordError, SensordResult};
use crate::shutdown::ShutdownController;
use tokio::net::TcpListener;
use tracing::info;

/// フィードリスナーをバインドする
///
/// バインドできない場合は起動失敗として扱う。
pub async fn bind(addr: &str) -> SensordResult<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| SensordError::Bind {
            addr: addr.to_string(),
            source,
        })
}

/// axumサーバーを起動し、シャットダウン要求まで待機する
pub async fn run(
    listener: TcpListener,
    state: ApiState,
    shutdown: ShutdownController,
) -> SensordResult<()> {
    let local_addr = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_default();
    info!(addr = %local_addr, "Feed server listening");

    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
        .map_err(SensordError::Server)?;

    info!("Feed server shutdown complete");
    Ok(())
}

/// シャットダウンシグナルを待機
///
/// Ctrl+C・SIGTERM・コントローラーへの要求のいずれかで戻る。
pub async fn shutdown_signal(shutdown: ShutdownController) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
        _ = shutdown.wait() => {
            info!("Shutdown requested, shutting down...");
        }
    }
}
