use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

/// Key-value cache with a TTL per entry.
///
/// Consulted before the source of truth (remote service, geo lookup,
/// staging store). Implementations must be safe to share between requests.
#[async_trait]
pub trait TtlCache<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V>;

    async fn set(&self, key: &str, value: V, ttl: Duration);

    async fn delete(&self, key: &str);

    async fn clear(&self);

    /// 缓存未命中时执行 `load` 并写入结果
    ///
    /// 默认实现不保证并发去重，后端可以覆盖以提供 singleflight 语义。
    async fn get_or_load(&self, key: &str, ttl: Duration, load: BoxFuture<'_, V>) -> V {
        if let Some(value) = self.get(key).await {
            return value;
        }
        let value = load.await;
        self.set(key, value.clone(), ttl).await;
        value
    }
}
