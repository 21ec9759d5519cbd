//! API 模块常量定义

/// Admin 路由前缀
pub const ADMIN_PREFIX: &str = "/admin";

/// 访客跟踪路由前缀
pub const TRACK_PREFIX: &str = "/track";

/// 健康检查路由前缀
pub const HEALTH_PREFIX: &str = "/health";

/// 请求体上限（批量提交的 hits 也在此范围内）
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024;

/// 确认同意后返回给浏览器的消息
pub const CONSENT_RECORDED: &str = "Consent recorded";
