//! Staging reconciler.
//!
//! Merges a visitor's activity batch into the staging store. At most one
//! row exists per (page_title, visitor_ip, day); a repeated key overwrites
//! the counters when the batch carries the account id already on file.
//! Hits dated any day but today are dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tracing::{debug, error, info, trace};

use super::geoip::{GeoInfo, GeoIpProvider};
use crate::cache::{TtlCache, cache_key};
use crate::errors::{Result, TrackerError};
use crate::staging::{NewStagingRecord, StagingRecord, StagingSnapshot, StagingStore};
use crate::structs::ActivityHit;
use crate::utils::text::normalize_page_title;

/// Per-batch tally. Never reported to the visitor.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub inserted: usize,
    pub updated: usize,
    /// dated another day, or undated
    pub skipped_stale: usize,
    /// a row exists for the key under another account id
    pub skipped_foreign: usize,
    pub failed: usize,
}

impl ReconcileOutcome {
    pub fn is_partial(&self) -> bool {
        self.failed > 0
    }

    pub fn mutations(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Who sent the batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchOrigin<'a> {
    pub account_id: &'a str,
    pub visitor_ip: &'a str,
    pub header_ip: &'a str,
}

pub struct StagingReconciler {
    snapshot: StagingSnapshot,
    geo: GeoIpProvider,
    records: Arc<dyn TtlCache<StagingRecord>>,
    record_ttl: Duration,
}

enum Step {
    Inserted,
    Updated,
    Foreign,
}

impl StagingReconciler {
    pub fn new(
        snapshot: StagingSnapshot,
        geo: GeoIpProvider,
        records: Arc<dyn TtlCache<StagingRecord>>,
        record_ttl: Duration,
    ) -> Self {
        Self {
            snapshot,
            geo,
            records,
            record_ttl,
        }
    }

    fn store(&self) -> &Arc<dyn StagingStore> {
        self.snapshot.store()
    }

    /// Reconciles against the server's local date.
    pub async fn reconcile(
        &self,
        hits: &[ActivityHit],
        origin: BatchOrigin<'_>,
    ) -> Result<ReconcileOutcome> {
        self.reconcile_for_date(hits, origin, Local::now().date_naive())
            .await
    }

    /// Fails only for an empty batch; per-hit storage errors are logged and
    /// counted in `failed`.
    pub async fn reconcile_for_date(
        &self,
        hits: &[ActivityHit],
        origin: BatchOrigin<'_>,
        today: NaiveDate,
    ) -> Result<ReconcileOutcome> {
        if hits.is_empty() {
            return Err(TrackerError::validation("No hits data received"));
        }

        let mut outcome = ReconcileOutcome::default();
        let mut geo: Option<GeoInfo> = None;

        for hit in hits {
            if hit.day() != Some(today) {
                trace!(
                    "Dropping hit for '{}' dated {:?}",
                    hit.page_title, hit.last_update
                );
                outcome.skipped_stale += 1;
                continue;
            }

            let page_title = normalize_page_title(&hit.page_title);
            match self
                .apply(hit, &page_title, origin, today, &mut geo)
                .await
            {
                Ok(Step::Inserted) => outcome.inserted += 1,
                Ok(Step::Updated) => outcome.updated += 1,
                Ok(Step::Foreign) => outcome.skipped_foreign += 1,
                Err(e) => {
                    error!(
                        "Staging operation for page '{}' from {} failed: {}",
                        page_title, origin.visitor_ip, e
                    );
                    outcome.failed += 1;
                }
            }
        }

        if outcome.mutations() > 0 {
            self.snapshot.invalidate().await;
        }

        if outcome.is_partial() {
            info!(
                "Reconciled batch from {} with {} failures: {:?}",
                origin.visitor_ip, outcome.failed, outcome
            );
        } else {
            debug!("Reconciled batch from {}: {:?}", origin.visitor_ip, outcome);
        }
        Ok(outcome)
    }

    async fn apply(
        &self,
        hit: &ActivityHit,
        page_title: &str,
        origin: BatchOrigin<'_>,
        today: NaiveDate,
        geo: &mut Option<GeoInfo>,
    ) -> Result<Step> {
        let key = record_key(page_title, origin.visitor_ip, today);

        if let Some(existing) = self.existing(&key, page_title, origin.visitor_ip, today).await? {
            if origin.account_id.is_empty() || existing.account_id != origin.account_id {
                return Ok(Step::Foreign);
            }

            match self
                .store()
                .update_counters(existing.id, hit.time_spent, hit.page_view, today)
                .await
            {
                Ok(()) => {
                    let updated = StagingRecord {
                        time_spent: hit.time_spent,
                        page_view: hit.page_view,
                        last_update: today,
                        ..existing
                    };
                    self.records.set(&key, updated, self.record_ttl).await;
                    return Ok(Step::Updated);
                }
                // 行已被批量传输删除，按新记录重新写入
                Err(TrackerError::NotFound(_)) => {
                    debug!("Cached staging row {} is gone, inserting anew", existing.id);
                    self.records.delete(&key).await;
                }
                Err(e) => return Err(e),
            }
        }

        if geo.is_none() {
            *geo = Some(self.geo.lookup(origin.visitor_ip).await);
        }
        let info = geo.clone().unwrap_or_default();

        let inserted = self
            .store()
            .insert(NewStagingRecord {
                page_title: page_title.to_string(),
                time_spent: hit.time_spent,
                page_view: hit.page_view,
                visitor_ip: origin.visitor_ip.to_string(),
                header_ip: origin.header_ip.to_string(),
                visitor_city: info.city,
                visitor_country: info.country,
                visitor_company: info.company,
                account_id: origin.account_id.to_string(),
                last_update: today,
            })
            .await?;
        self.records.set(&key, inserted, self.record_ttl).await;
        Ok(Step::Inserted)
    }

    async fn existing(
        &self,
        key: &str,
        page_title: &str,
        visitor_ip: &str,
        today: NaiveDate,
    ) -> Result<Option<StagingRecord>> {
        if let Some(record) = self.records.get(key).await {
            return Ok(Some(record));
        }

        let found = self.store().find(page_title, visitor_ip, today).await?;
        if let Some(record) = &found {
            self.records
                .set(key, record.clone(), self.record_ttl)
                .await;
        }
        Ok(found)
    }
}

fn record_key(page_title: &str, visitor_ip: &str, day: NaiveDate) -> String {
    let day = day.to_string();
    cache_key("record", &[page_title, visitor_ip, &day])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MokaTtlCache, NullTtlCache};
    use crate::services::geoip::GeoIpLookup;
    use crate::structs::format_client_date;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<StagingRecord>>,
        next_id: AtomicUsize,
    }

    #[async_trait]
    impl StagingStore for MemoryStore {
        async fn find(
            &self,
            page_title: &str,
            visitor_ip: &str,
            day: NaiveDate,
        ) -> Result<Option<StagingRecord>> {
            Ok(self
                .rows
                .lock()
                .iter()
                .find(|r| {
                    r.page_title == page_title && r.visitor_ip == visitor_ip && r.last_update == day
                })
                .cloned())
        }

        async fn insert(&self, record: NewStagingRecord) -> Result<StagingRecord> {
            let row = StagingRecord {
                id: self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1,
                page_title: record.page_title,
                time_spent: record.time_spent,
                page_view: record.page_view,
                visitor_ip: record.visitor_ip,
                header_ip: record.header_ip,
                visitor_city: record.visitor_city,
                visitor_country: record.visitor_country,
                visitor_company: record.visitor_company,
                account_id: record.account_id,
                last_update: record.last_update,
            };
            self.rows.lock().push(row.clone());
            Ok(row)
        }

        async fn update_counters(
            &self,
            id: i64,
            time_spent: i32,
            page_view: i32,
            day: NaiveDate,
        ) -> Result<()> {
            let mut rows = self.rows.lock();
            let row = rows
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| TrackerError::not_found(format!("staging record {}", id)))?;
            row.time_spent = time_spent;
            row.page_view = page_view;
            row.last_update = day;
            Ok(())
        }

        async fn all(&self) -> Result<Vec<StagingRecord>> {
            Ok(self.rows.lock().clone())
        }

        async fn find_account_id(&self, _: &str, _: &str, _: &str) -> Result<Option<String>> {
            Ok(None)
        }

        async fn delete_ids(&self, ids: &[i64]) -> Result<u64> {
            let mut rows = self.rows.lock();
            let before = rows.len();
            rows.retain(|r| !ids.contains(&r.id));
            Ok((before - rows.len()) as u64)
        }

        async fn count(&self) -> Result<u64> {
            Ok(self.rows.lock().len() as u64)
        }
    }

    struct CountingGeo(AtomicUsize);

    #[async_trait]
    impl GeoIpLookup for CountingGeo {
        async fn lookup(&self, _ip: &str) -> Option<GeoInfo> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Some(GeoInfo {
                city: "Berlin".into(),
                country: "Germany".into(),
                company: "Example ISP".into(),
            })
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn hit(title: &str, time_spent: i32, page_view: i32, day: NaiveDate) -> ActivityHit {
        ActivityHit {
            page_title: title.into(),
            time_spent,
            page_view,
            last_update: format_client_date(day),
        }
    }

    fn origin(account_id: &str) -> BatchOrigin<'_> {
        BatchOrigin {
            account_id,
            visitor_ip: "203.0.113.5",
            header_ip: "",
        }
    }

    fn reconciler() -> (StagingReconciler, Arc<MemoryStore>, Arc<CountingGeo>) {
        let store = Arc::new(MemoryStore::default());
        let geo = Arc::new(CountingGeo(AtomicUsize::new(0)));
        let snapshot = StagingSnapshot::new(
            store.clone(),
            Arc::new(NullTtlCache),
            Duration::from_secs(60),
        );
        let provider = GeoIpProvider::new(
            geo.clone(),
            Arc::new(MokaTtlCache::new("geo-test", 100)),
            Duration::from_secs(3600),
        );
        let reconciler = StagingReconciler::new(
            snapshot,
            provider,
            Arc::new(MokaTtlCache::new("record-test", 100)),
            Duration::from_secs(60),
        );
        (reconciler, store, geo)
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let (r, _, _) = reconciler();
        let err = r
            .reconcile_for_date(&[], origin("abm_a"), today())
            .await
            .unwrap_err();
        assert_eq!(err.message(), "No hits data received");
    }

    #[tokio::test]
    async fn test_same_key_overwrites_instead_of_summing() {
        let (r, store, geo) = reconciler();
        r.reconcile_for_date(&[hit("Pricing", 10, 1, today())], origin("abm_a"), today())
            .await
            .unwrap();
        let second = r
            .reconcile_for_date(&[hit("Pricing", 20, 1, today())], origin("abm_a"), today())
            .await
            .unwrap();

        assert_eq!(second.updated, 1);
        let rows = store.all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].time_spent, rows[0].page_view), (20, 1));
        assert_eq!(rows[0].visitor_city, "Berlin");
        assert_eq!(geo.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_foreign_account_leaves_row_untouched() {
        let (r, store, _) = reconciler();
        r.reconcile_for_date(&[hit("Pricing", 10, 1, today())], origin("abm_a"), today())
            .await
            .unwrap();

        let other = r
            .reconcile_for_date(&[hit("Pricing", 90, 3, today())], origin("abm_b"), today())
            .await
            .unwrap();
        let anonymous = r
            .reconcile_for_date(&[hit("Pricing", 90, 3, today())], origin(""), today())
            .await
            .unwrap();

        assert_eq!(other.skipped_foreign, 1);
        assert_eq!(anonymous.skipped_foreign, 1);
        let rows = store.all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].time_spent, 10);
    }

    #[tokio::test]
    async fn test_stale_hits_are_dropped() {
        let (r, store, geo) = reconciler();
        let yesterday = today().pred_opt().unwrap();
        let outcome = r
            .reconcile_for_date(
                &[
                    hit("Pricing", 10, 1, yesterday),
                    ActivityHit {
                        last_update: "not a date".into(),
                        ..hit("Blog", 10, 1, today())
                    },
                ],
                origin("abm_a"),
                today(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.skipped_stale, 2);
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(geo.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_row_deleted_behind_cache_is_reinserted() {
        let (r, store, _) = reconciler();
        r.reconcile_for_date(&[hit("Pricing", 10, 1, today())], origin("abm_a"), today())
            .await
            .unwrap();
        let ids: Vec<i64> = store.all().await.unwrap().iter().map(|r| r.id).collect();
        store.delete_ids(&ids).await.unwrap();

        let outcome = r
            .reconcile_for_date(&[hit("Pricing", 30, 2, today())], origin("abm_a"), today())
            .await
            .unwrap();
        assert_eq!(outcome.inserted, 1);
        let rows = store.all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].time_spent, 30);
    }
}
