//! Bulk transfer of staging rows to the remote analytics service.
//!
//! Each run reads every staging row, sends them one by one through the
//! crypto envelope, and deletes the rows it read only when every single one
//! was accepted. A partial failure leaves the store untouched so the next
//! run re-sends all of them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::services::remote::{RemoteClient, TRANSFER_DATE_FORMAT, TransferPayload};
use crate::staging::{StagingRecord, StagingSnapshot};
use crate::utils::text::normalize_page_title;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// the rows read by this run were deleted
    pub truncated: bool,
}

impl TransferReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.succeeded == self.total
    }
}

pub struct TransferScheduler {
    snapshot: StagingSnapshot,
    remote: Arc<RemoteClient>,
    customer_name: String,
    run_lock: Mutex<()>,
}

impl TransferScheduler {
    pub fn new(snapshot: StagingSnapshot, remote: Arc<RemoteClient>, customer_name: String) -> Self {
        Self {
            snapshot,
            remote,
            customer_name,
            run_lock: Mutex::new(()),
        }
    }

    pub fn customer_name(&self) -> &str {
        &self.customer_name
    }

    /// Runs one transfer, waiting for a run already in progress to finish.
    pub async fn run_once(&self) -> Result<TransferReport> {
        let _guard = self.run_lock.lock().await;
        self.transfer(Local::now().date_naive()).await
    }

    /// Runs one transfer unless another run holds the lock.
    pub async fn try_run(&self) -> Option<Result<TransferReport>> {
        let _guard = self.run_lock.try_lock().ok()?;
        Some(self.transfer(Local::now().date_naive()).await)
    }

    async fn transfer(&self, today: NaiveDate) -> Result<TransferReport> {
        let rows = self.snapshot.read_all().await?;
        let mut report = TransferReport {
            total: rows.len(),
            ..TransferReport::default()
        };

        if rows.is_empty() {
            debug!("Bulk transfer: staging store is empty");
            return Ok(report);
        }

        for (index, record) in rows.iter().enumerate() {
            let payload = build_payload(record, &self.customer_name, today);
            match self.remote.upsert_main_data(&payload).await {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(
                        "Failed to transfer record {}. Error: {}",
                        index + 1,
                        e.message()
                    );
                }
            }
        }

        if report.succeeded == report.total {
            let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
            let deleted = self.snapshot.store().delete_ids(&ids).await?;
            self.snapshot.invalidate().await;
            report.truncated = true;
            info!(
                "Bulk transfer sent {} records, removed {} staging rows",
                report.succeeded, deleted
            );
        } else {
            warn!(
                "Transfer completed with {} successes and {} failures.",
                report.succeeded, report.failed
            );
        }

        Ok(report)
    }

    /// Spawns the recurring transfer. The first run happens one `period`
    /// after start.
    pub fn spawn_background_task(self: Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        info!("Bulk transfer scheduled every {}s", period.as_secs());
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match self.try_run().await {
                    Some(Ok(report)) => debug!("Scheduled transfer finished: {:?}", report),
                    Some(Err(e)) => error!("Scheduled transfer failed: {}", e),
                    None => warn!("Previous transfer still running, skipping this tick"),
                }
            }
        })
    }
}

/// Normalises one staging row for the upsert endpoint.
pub fn build_payload(record: &StagingRecord, customer_name: &str, today: NaiveDate) -> TransferPayload {
    TransferPayload {
        customer_name: customer_name.to_string(),
        page_title: normalize_page_title(&record.page_title),
        time_spent: i64::from(record.time_spent.max(0)),
        page_view: i64::from(record.page_view.max(0)),
        visitor_ip: record.visitor_ip.clone(),
        visitor_city: record.visitor_city.clone(),
        visitor_country: record.visitor_country.clone(),
        visitor_company: record.visitor_company.clone(),
        account_id: record.account_id.clone(),
        last_update: today.format(TRANSFER_DATE_FORMAT).to_string(),
        header_ip: Some(record.header_ip.trim())
            .filter(|ip| !ip.is_empty())
            .map(str::to_string),
    }
}
