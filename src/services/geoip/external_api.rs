//! 外部 GeoIP API 实现
//!
//! 单次无认证 GET，响应为 CSV：`country,city,org`（ip-api.com 按其字段顺序输出）。
//! 缓存由 `GeoIpProvider` 负责。

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{trace, warn};
use ureq::Agent;

use super::provider::{GeoInfo, GeoIpLookup};

/// HTTP 请求超时时间
const HTTP_TIMEOUT_SECS: u64 = 5;

/// 全局 HTTP Agent（ureq 的 Agent 是 Send + Sync）
static HTTP_AGENT: OnceLock<Agent> = OnceLock::new();

fn get_agent() -> &'static Agent {
    HTTP_AGENT.get_or_init(|| {
        Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(HTTP_TIMEOUT_SECS)))
            .build()
            .into()
    })
}

/// 解析 CSV 响应，空响应或无记录返回 None
pub fn parse_csv_response(body: &str) -> Option<GeoInfo> {
    if body.trim().is_empty() {
        return None;
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());
    let record = reader.records().next()?.ok()?;
    let field = |i: usize| record.get(i).unwrap_or_default().trim().to_string();

    Some(GeoInfo {
        country: field(0),
        city: field(1),
        company: field(2),
    })
}

/// 外部 API GeoIP Provider
pub struct ExternalApiProvider {
    api_url_template: String,
}

impl ExternalApiProvider {
    /// `api_url_template` 使用 `{ip}` 作为占位符
    /// 例如: `http://ip-api.com/csv/{ip}?fields=city,country,org`
    pub fn new(api_url_template: &str) -> Self {
        Self {
            api_url_template: api_url_template.to_string(),
        }
    }

    /// 从外部 API 获取 GeoIP 信息（同步，在 spawn_blocking 中调用）
    fn fetch_from_api_sync(url: String) -> Option<GeoInfo> {
        let resp = match get_agent().get(&url).call() {
            Ok(r) => r,
            Err(e) => {
                warn!("GeoIP API request to \"{}\" failed: {}", url, e);
                return None;
            }
        };

        let body = match resp.into_body().read_to_string() {
            Ok(b) => b,
            Err(e) => {
                warn!("GeoIP API response from \"{}\" unreadable: {}", url, e);
                return None;
            }
        };

        let info = parse_csv_response(&body);
        trace!("External API lookup: {:?}", info);
        info
    }
}

#[async_trait]
impl GeoIpLookup for ExternalApiProvider {
    async fn lookup(&self, ip: &str) -> Option<GeoInfo> {
        let url = self
            .api_url_template
            .replace("{ip}", &urlencoding::encode(ip));

        // 使用 spawn_blocking 在线程池中执行同步 HTTP 请求
        tokio::task::spawn_blocking(move || Self::fetch_from_api_sync(url))
            .await
            .unwrap_or_else(|e| {
                warn!("GeoIP spawn_blocking failed: {}", e);
                None
            })
    }

    fn name(&self) -> &'static str {
        "ExternalAPI"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv_response() {
        let info = parse_csv_response("United States,Mountain View,Google LLC\n").unwrap();
        assert_eq!(info.country, "United States");
        assert_eq!(info.city, "Mountain View");
        assert_eq!(info.company, "Google LLC");
    }

    #[test]
    fn test_parse_quoted_org_with_comma() {
        let info = parse_csv_response("Australia,Sydney,\"Cloudflare, Inc\"").unwrap();
        assert_eq!(info.company, "Cloudflare, Inc");
    }

    #[test]
    fn test_parse_short_and_empty_bodies() {
        assert_eq!(parse_csv_response(""), None);
        assert_eq!(parse_csv_response("  \n"), None);

        let partial = parse_csv_response("fail").unwrap();
        assert_eq!(partial.country, "fail");
        assert_eq!(partial.city, "");
    }

    /// 依赖外部网络服务，CI 环境可能失败
    #[tokio::test]
    #[ignore]
    async fn test_external_api_provider_lookup() {
        let provider = ExternalApiProvider::new("http://ip-api.com/csv/{ip}?fields=city,country,org");
        let result = provider.lookup("8.8.8.8").await;
        assert!(result.is_some());
    }
}
