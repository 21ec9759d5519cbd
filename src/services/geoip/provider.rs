//! GeoIP Provider 抽象层
//!
//! `GeoIpProvider` 包装任意 `GeoIpLookup` 实现并加上按 IP 的 TTL 缓存，
//! 对调用方永远返回一个 `GeoInfo`（失败时字段为空）。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use tracing::{debug, info};

use crate::cache::{TtlCache, cache_key};
use crate::utils::ip::UNKNOWN_IP;

/// 地理位置信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoInfo {
    pub city: String,
    pub country: String,
    /// ISP / 组织名
    pub company: String,
}

/// GeoIP 查询 trait
#[async_trait]
pub trait GeoIpLookup: Send + Sync {
    /// 查询 IP 地址的地理位置，失败返回 None
    async fn lookup(&self, ip: &str) -> Option<GeoInfo>;

    /// 获取 provider 名称（用于日志）
    fn name(&self) -> &'static str;
}

/// 带缓存的 GeoIP Provider
#[derive(Clone)]
pub struct GeoIpProvider {
    inner: Arc<dyn GeoIpLookup>,
    cache: Arc<dyn TtlCache<GeoInfo>>,
    ttl: Duration,
}

impl GeoIpProvider {
    pub fn new(
        inner: Arc<dyn GeoIpLookup>,
        cache: Arc<dyn TtlCache<GeoInfo>>,
        ttl: Duration,
    ) -> Self {
        info!(
            "GeoIP: Initialized with {} provider, cache TTL {}s",
            inner.name(),
            ttl.as_secs()
        );
        Self { inner, cache, ttl }
    }

    /// 查询 IP 地址的地理位置
    ///
    /// 先查缓存；未命中时回源并缓存结果（包括空结果）。
    /// 空 IP 或未知 IP 不发起查询。
    pub async fn lookup(&self, ip: &str) -> GeoInfo {
        let ip = ip.trim();
        if ip.is_empty() || ip == UNKNOWN_IP {
            return GeoInfo::default();
        }

        let key = cache_key("geo", &[ip]);
        let inner = Arc::clone(&self.inner);
        let owned_ip = ip.to_string();
        self.cache
            .get_or_load(
                &key,
                self.ttl,
                async move {
                    inner.lookup(&owned_ip).await.unwrap_or_else(|| {
                        debug!("GeoIP: no result for {}, using empty fields", owned_ip);
                        GeoInfo::default()
                    })
                }
                .boxed(),
            )
            .await
    }

    /// 获取当前使用的 provider 名称
    pub fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MokaTtlCache;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLookup {
        calls: AtomicUsize,
        answer: Option<GeoInfo>,
    }

    #[async_trait]
    impl GeoIpLookup for CountingLookup {
        async fn lookup(&self, _ip: &str) -> Option<GeoInfo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }

        fn name(&self) -> &'static str {
            "Counting"
        }
    }

    fn provider(answer: Option<GeoInfo>) -> (GeoIpProvider, Arc<CountingLookup>) {
        let lookup = Arc::new(CountingLookup {
            calls: AtomicUsize::new(0),
            answer,
        });
        let provider = GeoIpProvider::new(
            lookup.clone(),
            Arc::new(MokaTtlCache::new("geo-test", 100)),
            Duration::from_secs(3600),
        );
        (provider, lookup)
    }

    #[tokio::test]
    async fn test_lookup_is_cached_per_ip() {
        let geo = GeoInfo {
            city: "Sydney".into(),
            country: "Australia".into(),
            company: "Cloudflare, Inc".into(),
        };
        let (provider, lookup) = provider(Some(geo.clone()));

        assert_eq!(provider.lookup("1.1.1.1").await, geo);
        assert_eq!(provider.lookup("1.1.1.1").await, geo);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);

        provider.lookup("8.8.8.8").await;
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_yields_empty_fields() {
        let (provider, _) = provider(None);
        assert_eq!(provider.lookup("1.1.1.1").await, GeoInfo::default());
    }

    #[tokio::test]
    async fn test_unknown_ip_skips_lookup() {
        let (provider, lookup) = provider(None);
        provider.lookup("").await;
        provider.lookup(UNKNOWN_IP).await;
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }
}
