//! IP 地址处理工具
//!
//! - 按固定优先级扫描代理转发头，取第一个公网 IP
//! - 私有 / 保留地址段判定（CIDR 匹配）
//! - 直连 IP 提取

use std::net::IpAddr;

use actix_web::HttpRequest;
use actix_web::http::header::HeaderMap;
use tracing::trace;

/// Placeholder stored when the direct connection address is unavailable.
pub const UNKNOWN_IP: &str = "UNKNOWN";

/// 代理转发头，按优先级排列
pub const PROXY_HEADERS: [&str; 16] = [
    "x-forwarded-for",
    "client-ip",
    "x-client-ip",
    "x-cluster-client-ip",
    "forwarded-for",
    "forwarded",
    "cf-connecting-ip",
    "x-real-ip",
    "x-forwarded",
    "x-forwarded-host",
    "x-forwarded-server",
    "true-client-ip",
    "x-anonymous-ip",
    "x-original-for",
    "fastly-client-ip",
    "x-azure-clientip",
];

/// 私有地址段
const PRIVATE_RANGES: &[&str] = &["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16", "fc00::/7"];

/// 保留地址段
const RESERVED_RANGES: &[&str] = &[
    "0.0.0.0/8",
    "127.0.0.0/8",
    "169.254.0.0/16",
    "240.0.0.0/4",
    "::1/128",
    "::/128",
    "::ffff:0:0/96",
    "fe80::/10",
];

/// CIDR 检查
pub fn ip_in_cidr(ip: &IpAddr, cidr: &str) -> bool {
    let Some((network, prefix_len)) = cidr.split_once('/') else {
        return false;
    };

    let Ok(prefix_len): Result<u8, _> = prefix_len.parse() else {
        return false;
    };

    let Ok(network_addr) = network.parse::<IpAddr>() else {
        return false;
    };

    match (ip, network_addr) {
        (IpAddr::V4(ip), IpAddr::V4(net)) => {
            if prefix_len > 32 {
                return false;
            }
            let mask = u32::MAX.checked_shl(32 - prefix_len as u32).unwrap_or(0);
            let ip_bits = u32::from_be_bytes(ip.octets());
            let net_bits = u32::from_be_bytes(net.octets());
            (ip_bits & mask) == (net_bits & mask)
        }
        (IpAddr::V6(ip), IpAddr::V6(net)) => {
            if prefix_len > 128 {
                return false;
            }
            let mask = u128::MAX.checked_shl(128 - prefix_len as u32).unwrap_or(0);
            let ip_bits = u128::from_be_bytes(ip.octets());
            let net_bits = u128::from_be_bytes(net.octets());
            (ip_bits & mask) == (net_bits & mask)
        }
        _ => false,
    }
}

/// 是否为公网地址（既不在私有段也不在保留段）
pub fn is_public_ip(ip: &IpAddr) -> bool {
    !PRIVATE_RANGES
        .iter()
        .chain(RESERVED_RANGES)
        .any(|cidr| ip_in_cidr(ip, cidr))
}

fn candidate_from_header(name: &str, value: &str) -> Option<String> {
    let candidate = if name == "x-forwarded-for" {
        value.split(',').next().unwrap_or_default().trim()
    } else {
        value.trim()
    };

    let ip: IpAddr = candidate.parse().ok()?;
    is_public_ip(&ip).then(|| candidate.to_string())
}

/// Resolves the originating client IP from proxy headers.
///
/// Headers are scanned in [`PROXY_HEADERS`] order; the first one whose value
/// is a public IP wins. For `X-Forwarded-For` only the first entry of the
/// chain is considered. Returns an empty string when nothing qualifies.
pub fn resolve_header_ip(headers: &HeaderMap) -> String {
    for name in PROXY_HEADERS {
        let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) else {
            continue;
        };
        if let Some(ip) = candidate_from_header(name, value) {
            trace!("Resolved client IP {} from header {}", ip, name);
            return ip;
        }
    }
    String::new()
}

/// 直连 IP，无法获取时返回 [`UNKNOWN_IP`]
pub fn resolve_visitor_ip(req: &HttpRequest) -> String {
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_IP.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::header::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
        map
    }

    #[test]
    fn test_private_forwarded_for_yields_empty() {
        let map = headers(&[("x-forwarded-for", "10.1.2.3")]);
        assert_eq!(resolve_header_ip(&map), "");
    }

    #[test]
    fn test_forwarded_for_uses_first_hop() {
        let map = headers(&[("x-forwarded-for", "203.0.113.5, 10.0.0.1")]);
        assert_eq!(resolve_header_ip(&map), "203.0.113.5");
    }

    #[test]
    fn test_falls_through_to_later_headers() {
        let map = headers(&[
            ("x-forwarded-for", "192.168.0.4"),
            ("cf-connecting-ip", "not-an-ip"),
            ("true-client-ip", " 198.51.100.7 "),
        ]);
        assert_eq!(resolve_header_ip(&map), "198.51.100.7");
    }

    #[test]
    fn test_priority_order_is_respected() {
        let map = headers(&[
            ("x-azure-clientip", "8.8.8.8"),
            ("client-ip", "1.1.1.1"),
        ]);
        assert_eq!(resolve_header_ip(&map), "1.1.1.1");
    }

    #[test]
    fn test_no_headers_yields_empty() {
        assert_eq!(resolve_header_ip(&HeaderMap::new()), "");
    }

    #[test]
    fn test_public_ip_classification() {
        let public = ["8.8.8.8", "203.0.113.5", "2001:4860:4860::8888"];
        let rejected = [
            "10.0.0.1",
            "172.20.1.1",
            "192.168.1.1",
            "127.0.0.1",
            "169.254.10.10",
            "0.1.2.3",
            "250.0.0.1",
            "::1",
            "fd12::1",
            "fe80::1",
            "::ffff:8.8.8.8",
        ];
        for ip in public {
            assert!(is_public_ip(&ip.parse().unwrap()), "{} should be public", ip);
        }
        for ip in rejected {
            assert!(!is_public_ip(&ip.parse().unwrap()), "{} should be rejected", ip);
        }
    }

    #[test]
    fn test_ip_in_cidr() {
        let ip: IpAddr = "172.31.255.255".parse().unwrap();
        assert!(ip_in_cidr(&ip, "172.16.0.0/12"));
        assert!(!ip_in_cidr(&ip, "172.16.0.0/16"));
        assert!(!ip_in_cidr(&ip, "garbage"));
        assert!(!ip_in_cidr(&ip, "fc00::/7"));
    }
}
