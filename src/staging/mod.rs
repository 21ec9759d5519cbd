//! Staging store: per-day visitor activity held locally until the bulk
//! transfer forwards it.
//!
//! At most one row exists per (page_title, visitor_ip, last_update). The
//! store is injected into the reconciler and the transfer scheduler as a
//! `StagingStore` trait object scoped to one site.

mod connection;
mod database;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use crate::cache::TtlCache;
use crate::errors::Result;

pub use connection::{Backend, connect, connect_pooled, connect_sqlite, infer_backend, run_migrations};
pub use database::SeaOrmStagingStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingRecord {
    pub id: i64,
    pub page_title: String,
    pub time_spent: i32,
    pub page_view: i32,
    pub visitor_ip: String,
    pub header_ip: String,
    pub visitor_city: String,
    pub visitor_country: String,
    pub visitor_company: String,
    pub account_id: String,
    pub last_update: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStagingRecord {
    pub page_title: String,
    pub time_spent: i32,
    pub page_view: i32,
    pub visitor_ip: String,
    pub header_ip: String,
    pub visitor_city: String,
    pub visitor_country: String,
    pub visitor_company: String,
    pub account_id: String,
    pub last_update: NaiveDate,
}

#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Row for the (page, ip, day) key, if any.
    async fn find(
        &self,
        page_title: &str,
        visitor_ip: &str,
        day: NaiveDate,
    ) -> Result<Option<StagingRecord>>;

    async fn insert(&self, record: NewStagingRecord) -> Result<StagingRecord>;

    /// Overwrites the counters of row `id` (last write wins).
    async fn update_counters(
        &self,
        id: i64,
        time_spent: i32,
        page_view: i32,
        day: NaiveDate,
    ) -> Result<()>;

    async fn all(&self) -> Result<Vec<StagingRecord>>;

    /// First non-empty account id seen for this page from either address.
    ///
    /// An empty `header_ip` only matches on `visitor_ip`.
    async fn find_account_id(
        &self,
        visitor_ip: &str,
        header_ip: &str,
        page_title: &str,
    ) -> Result<Option<String>>;

    /// Deletes exactly the given rows; returns how many were removed.
    async fn delete_ids(&self, ids: &[i64]) -> Result<u64>;

    async fn count(&self) -> Result<u64>;
}

const SNAPSHOT_KEY: &str = "staging:all";

/// Cached full read of the staging table used by the bulk transfer.
///
/// Every reconciler mutation calls [`StagingSnapshot::invalidate`] so the next
/// transfer sees fresh rows.
#[derive(Clone)]
pub struct StagingSnapshot {
    store: Arc<dyn StagingStore>,
    cache: Arc<dyn TtlCache<Arc<Vec<StagingRecord>>>>,
    ttl: Duration,
}

impl StagingSnapshot {
    pub fn new(
        store: Arc<dyn StagingStore>,
        cache: Arc<dyn TtlCache<Arc<Vec<StagingRecord>>>>,
        ttl: Duration,
    ) -> Self {
        Self { store, cache, ttl }
    }

    pub fn store(&self) -> &Arc<dyn StagingStore> {
        &self.store
    }

    pub async fn read_all(&self) -> Result<Arc<Vec<StagingRecord>>> {
        if let Some(rows) = self.cache.get(SNAPSHOT_KEY).await {
            debug!("Staging snapshot served from cache ({} rows)", rows.len());
            return Ok(rows);
        }

        let rows = Arc::new(self.store.all().await?);
        self.cache
            .set(SNAPSHOT_KEY, Arc::clone(&rows), self.ttl)
            .await;
        Ok(rows)
    }

    pub async fn invalidate(&self) {
        self.cache.delete(SNAPSHOT_KEY).await;
    }
}
