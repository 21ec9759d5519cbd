//! Activity batcher.
//!
//! Runs in the visitor's tab on one thread. Three scheduled actions share the
//! page-title keyed activity map held in client storage:
//!
//! - tick: every 10 s, adds 10 s to the current page and stamps it today
//! - flush: 10 s after load, then every 30 s, sends every entry
//! - teardown: on unload, one final flush
//!
//! Entries are never cleared after a send; each flush carries the latest
//! cumulative counters and the server keeps the last write.
//!
//! [`ConsentPrompt`] holds the visitor's consent flag next to the activity map.

mod consent;
mod storage;

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, interval_at, sleep};
use tracing::{debug, error, warn};

use crate::errors::Result;
use crate::structs::{ActivityHit, format_client_date};
use crate::utils::generate_lowercase_code;

pub use consent::{CONSENT_STORAGE_KEY, ConsentPrompt, ConsentSender};
pub use storage::{ClientStorage, CookieJar, MemoryCookieJar, MemoryStorage, StoredCookie};

pub const STORAGE_KEY: &str = "vr_activity";
pub const IDENTITY_COOKIE: &str = "account_id";
/// Roughly a hundred years.
pub const IDENTITY_COOKIE_DAYS: i64 = 36500;
const IDENTITY_PREFIX: &str = "abm_";
const IDENTITY_SUFFIX_LEN: usize = 13;

pub const TICK_INTERVAL: Duration = Duration::from_secs(10);
pub const FIRST_FLUSH_DELAY: Duration = Duration::from_secs(10);
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(30);
pub const IDENTITY_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const TIME_SPENT_STEP: i32 = 10;

/// Body of one send to the batch endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitBatch {
    pub hits: Vec<ActivityHit>,
    pub account_id: String,
}

impl HitBatch {
    /// Form fields of the batch endpoint: `hits` travels as a JSON string.
    pub fn to_form_fields(&self, security: &str) -> Result<Vec<(String, String)>> {
        Ok(vec![
            ("hits".to_string(), serde_json::to_string(&self.hits)?),
            ("account_id".to_string(), self.account_id.clone()),
            ("security".to_string(), security.to_string()),
        ])
    }
}

/// Transport to the server's batch endpoint.
#[async_trait(?Send)]
pub trait BatchSender {
    async fn send(&self, batch: &HitBatch) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Sent(usize),
    Empty,
    /// still no identity cookie after the single retry
    MissingIdentity,
    Failed(String),
}

pub fn new_identity() -> String {
    format!("{}{}", IDENTITY_PREFIX, generate_lowercase_code(IDENTITY_SUFFIX_LEN))
}

type ActivityMap = BTreeMap<String, ActivityHit>;

pub struct ActivityBatcher<S, C, B> {
    storage: S,
    cookies: C,
    sender: B,
    page_title: String,
    today: Box<dyn Fn() -> NaiveDate>,
}

impl<S, C, B> ActivityBatcher<S, C, B>
where
    S: ClientStorage,
    C: CookieJar,
    B: BatchSender,
{
    pub fn new(storage: S, cookies: C, sender: B, page_title: impl Into<String>) -> Self {
        Self {
            storage,
            cookies,
            sender,
            page_title: page_title.into(),
            today: Box::new(|| Local::now().date_naive()),
        }
    }

    /// Replaces the visitor-local calendar.
    pub fn with_clock(mut self, today: impl Fn() -> NaiveDate + 'static) -> Self {
        self.today = Box::new(today);
        self
    }

    pub fn page_title(&self) -> &str {
        &self.page_title
    }

    fn load(&self) -> ActivityMap {
        self.storage
            .get_item(STORAGE_KEY)
            .and_then(|raw| match serde_json::from_str(&raw) {
                Ok(map) => Some(map),
                Err(e) => {
                    warn!("Discarding unreadable activity map: {}", e);
                    None
                }
            })
            .unwrap_or_default()
    }

    fn save(&self, map: &ActivityMap) {
        match serde_json::to_string(map) {
            Ok(raw) => self.storage.set_item(STORAGE_KEY, raw),
            Err(e) => error!("Failed to persist activity map: {}", e),
        }
    }

    /// Current entries, in page title order.
    pub fn snapshot(&self) -> Vec<ActivityHit> {
        self.load().into_values().collect()
    }

    pub fn ensure_identity(&self) -> String {
        if let Some(id) = self.cookies.get(IDENTITY_COOKIE) {
            return id;
        }
        let id = new_identity();
        self.cookies.set(IDENTITY_COOKIE, &id, IDENTITY_COOKIE_DAYS);
        debug!("Assigned new visitor identity {}", id);
        id
    }

    pub fn on_page_load(&self) {
        self.ensure_identity();

        let today = format_client_date((self.today)());
        let mut map = self.load();
        let hit = map
            .entry(self.page_title.clone())
            .or_insert_with(|| ActivityHit {
                page_title: self.page_title.clone(),
                time_spent: 0,
                page_view: 0,
                last_update: today.clone(),
            });
        hit.last_update = today;
        hit.page_view += 1;
        self.save(&map);
    }

    pub fn tick(&self) {
        let mut map = self.load();
        if let Some(hit) = map.get_mut(&self.page_title) {
            hit.time_spent += TIME_SPENT_STEP;
            hit.last_update = format_client_date((self.today)());
            self.save(&map);
        }
    }

    /// Sends every accumulated entry. Without an identity cookie the send is
    /// retried once after [`IDENTITY_RETRY_DELAY`].
    pub async fn flush(&self) -> FlushOutcome {
        if self.load().is_empty() {
            return FlushOutcome::Empty;
        }

        let account_id = match self.cookies.get(IDENTITY_COOKIE) {
            Some(id) => id,
            None => {
                warn!("No account_id found. Retrying...");
                sleep(IDENTITY_RETRY_DELAY).await;
                match self.cookies.get(IDENTITY_COOKIE) {
                    Some(id) => id,
                    None => return FlushOutcome::MissingIdentity,
                }
            }
        };

        // 重新读取，包含等待期间的 tick
        let hits = self.snapshot();
        let count = hits.len();
        match self.sender.send(&HitBatch { hits, account_id }).await {
            Ok(()) => FlushOutcome::Sent(count),
            Err(e) => {
                error!("Batch send failed: {}", e);
                FlushOutcome::Failed(e.message())
            }
        }
    }

    pub async fn teardown(&self) -> FlushOutcome {
        self.flush().await
    }

    /// Drives the page until `unload` resolves, then tears down.
    pub async fn run<F: Future<Output = ()>>(&self, unload: F) -> FlushOutcome {
        self.on_page_load();

        let start = Instant::now();
        let mut ticks = interval_at(start + TICK_INTERVAL, TICK_INTERVAL);
        let mut flushes = interval_at(start + FIRST_FLUSH_DELAY, FLUSH_INTERVAL);
        tokio::pin!(unload);

        loop {
            tokio::select! {
                biased;
                _ = &mut unload => break,
                _ = ticks.tick() => self.tick(),
                _ = flushes.tick() => {
                    let outcome = self.flush().await;
                    debug!("Periodic flush: {:?}", outcome);
                }
            }
        }

        self.teardown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct RecordingSender {
        batches: RefCell<Vec<HitBatch>>,
    }

    #[async_trait(?Send)]
    impl BatchSender for Rc<RecordingSender> {
        async fn send(&self, batch: &HitBatch) -> Result<()> {
            self.batches.borrow_mut().push(batch.clone());
            Ok(())
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    type TestBatcher = ActivityBatcher<Rc<MemoryStorage>, Rc<MemoryCookieJar>, Rc<RecordingSender>>;

    fn batcher(
        title: &str,
    ) -> (
        TestBatcher,
        Rc<MemoryStorage>,
        Rc<MemoryCookieJar>,
        Rc<RecordingSender>,
    ) {
        let storage = Rc::new(MemoryStorage::default());
        let cookies = Rc::new(MemoryCookieJar::default());
        let sender = Rc::new(RecordingSender::default());
        let batcher = ActivityBatcher::new(storage.clone(), cookies.clone(), sender.clone(), title)
            .with_clock(day);
        (batcher, storage, cookies, sender)
    }

    #[test]
    fn test_identity_format_and_persistence() {
        let (b, _, cookies, _) = batcher("Home");
        let id = b.ensure_identity();
        assert!(id.starts_with("abm_"));
        assert_eq!(id.len(), 17);
        assert_eq!(b.ensure_identity(), id);
        assert_eq!(cookies.cookie(IDENTITY_COOKIE).unwrap().max_age_days, 36500);
    }

    #[test]
    fn test_page_loads_share_storage() {
        let (b, storage, cookies, sender) = batcher("Home");
        b.on_page_load();
        b.on_page_load();

        let other = ActivityBatcher::new(storage.clone(), cookies, sender, "Blog").with_clock(day);
        other.on_page_load();
        other.tick();

        let hits = b.snapshot();
        assert_eq!(hits.len(), 2);
        assert_eq!((hits[0].page_title.as_str(), hits[0].time_spent, hits[0].page_view), ("Blog", 10, 1));
        assert_eq!((hits[1].page_title.as_str(), hits[1].time_spent, hits[1].page_view), ("Home", 0, 2));
        assert!(storage.get_item(STORAGE_KEY).is_some());
    }

    #[test]
    fn test_batch_form_fields() {
        let batch = HitBatch {
            hits: vec![ActivityHit::new("Home", day())],
            account_id: "abm_x".into(),
        };
        let fields = batch.to_form_fields("tok").unwrap();
        assert_eq!(fields[0].0, "hits");
        assert!(fields[0].1.starts_with("[{\"page_title\":\"Home\""));
        assert_eq!(fields[1], ("account_id".to_string(), "abm_x".to_string()));
        assert_eq!(fields[2], ("security".to_string(), "tok".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_retries_once_for_missing_identity() {
        let (b, _, cookies, sender) = batcher("Home");
        b.on_page_load();
        cookies.remove(IDENTITY_COOKIE);

        assert_eq!(b.flush().await, FlushOutcome::MissingIdentity);
        assert!(sender.batches.borrow().is_empty());

        cookies.set(IDENTITY_COOKIE, "abm_later", IDENTITY_COOKIE_DAYS);
        assert_eq!(b.flush().await, FlushOutcome::Sent(1));
        assert_eq!(sender.batches.borrow()[0].account_id, "abm_later");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_unload() {
        let (b, _, _, sender) = batcher("Pricing");
        let outcome = b.run(sleep(Duration::from_secs(25))).await;

        assert_eq!(outcome, FlushOutcome::Sent(1));
        let batches = sender.batches.borrow();
        // 10 s 的首次发送 + 卸载时的发送
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].hits[0].time_spent, 10);
        assert_eq!(batches[1].hits[0].time_spent, 20);
        assert_eq!(batches[1].hits[0].page_view, 1);
    }
}
