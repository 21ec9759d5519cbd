use std::time::Duration;

use async_trait::async_trait;

use super::TtlCache;

/// 不缓存任何内容，每次都回源
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTtlCache;

#[async_trait]
impl<V> TtlCache<V> for NullTtlCache
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, _key: &str) -> Option<V> {
        None
    }

    async fn set(&self, _key: &str, _value: V, _ttl: Duration) {}

    async fn delete(&self, _key: &str) {}

    async fn clear(&self) {}
}
