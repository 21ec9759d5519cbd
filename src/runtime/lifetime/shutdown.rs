use std::time::Duration;

use tokio::signal;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::transfer::TransferScheduler;

/// 关闭超时时间（秒）
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// 等待 Ctrl+C
pub async fn listen_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received, forwarding staged rows...");
        }
        Err(e) => {
            warn!(
                "Failed to listen for Ctrl+C: {}. Proceeding with shutdown anyway.",
                e
            );
        }
    }
}

/// 最后一次转发；失败的行留在暂存表，下次启动后继续
pub async fn final_transfer(transfer: &TransferScheduler, limit: Duration) {
    match timeout(limit, transfer.run_once()).await {
        Ok(Ok(report)) if report.is_complete() => {
            info!("Final transfer forwarded {} rows", report.succeeded);
        }
        Ok(Ok(report)) => {
            warn!(
                "Final transfer left all {} rows staged ({} failed)",
                report.total, report.failed
            );
        }
        Ok(Err(e)) => {
            error!("Final transfer failed: {}", e);
        }
        Err(_) => {
            error!(
                "Final transfer timed out after {} seconds, rows stay staged",
                limit.as_secs()
            );
        }
    }
}
