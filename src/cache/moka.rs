use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use moka::future::Cache;
use moka::policy::Expiry;
use tracing::{debug, trace};

use super::TtlCache;

#[derive(Clone)]
struct TtlEntry<V> {
    value: V,
    ttl: Duration,
}

/// 按条目 TTL 计算过期时间，覆盖写入时重新计时
struct EntryExpiry;

impl<V> Expiry<String, TtlEntry<V>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &TtlEntry<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &TtlEntry<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// moka 后端的 TTL 缓存
pub struct MokaTtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    name: &'static str,
    inner: Cache<String, TtlEntry<V>>,
}

impl<V> MokaTtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, max_capacity: u64) -> Self {
        let inner = Cache::builder()
            .name(name)
            .max_capacity(max_capacity)
            .expire_after(EntryExpiry)
            .build();

        debug!(
            "MokaTtlCache '{}' initialized with max capacity: {}",
            name, max_capacity
        );
        Self { name, inner }
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

#[async_trait]
impl<V> TtlCache<V> for MokaTtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V> {
        let hit = self.inner.get(key).await.map(|entry| entry.value);
        trace!(
            "Cache '{}' {} for key {}",
            self.name,
            if hit.is_some() { "hit" } else { "miss" },
            key
        );
        hit
    }

    async fn set(&self, key: &str, value: V, ttl: Duration) {
        self.inner
            .insert(key.to_string(), TtlEntry { value, ttl })
            .await;
    }

    async fn delete(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    async fn clear(&self) {
        self.inner.invalidate_all();
    }

    /// get_with 自带 singleflight 语义：同一 key 的并发调用只执行一次 `load`
    async fn get_or_load(&self, key: &str, ttl: Duration, load: BoxFuture<'_, V>) -> V {
        self.inner
            .get_with(key.to_string(), async move {
                trace!("Cache '{}' miss for key {}, loading", self.name, key);
                TtlEntry {
                    value: load.await,
                    ttl,
                }
            })
            .await
            .value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache: MokaTtlCache<String> = MokaTtlCache::new("test", 100);
        cache
            .set("k", "v".to_string(), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));

        cache.delete("k").await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_entry_expires_after_its_ttl() {
        let cache: MokaTtlCache<bool> = MokaTtlCache::new("test", 100);
        cache.set("short", true, Duration::from_millis(50)).await;
        cache.set("long", true, Duration::from_secs(60)).await;

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(cache.get("short").await, None);
        assert_eq!(cache.get("long").await, Some(true));
    }

    #[tokio::test]
    async fn test_get_or_load_runs_loader_once() {
        let cache: MokaTtlCache<u32> = MokaTtlCache::new("test", 100);
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value = cache
                .get_or_load(
                    "answer",
                    Duration::from_secs(60),
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        42
                    }
                    .boxed(),
                )
                .await;
            assert_eq!(value, 42);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
