//! GeoIP 服务模块
//!
//! 通过外部 CSV 接口（ip-api.com）查询 IP 的城市、国家和 ISP 组织，
//! 结果按 IP 缓存。

mod external_api;
mod provider;

pub use external_api::{ExternalApiProvider, parse_csv_response};
pub use provider::{GeoInfo, GeoIpLookup, GeoIpProvider};
