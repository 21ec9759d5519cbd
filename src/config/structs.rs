use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, EnumString};

/// 远程服务发布的 RSA 公钥（PEM）
pub const DEFAULT_PUBLIC_KEY: &str = "-----BEGIN PUBLIC KEY-----
MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEA0fLuSwYCux6/wmjrPBCm
3W28MRK/Tdbcb5d9yGCGbMapFnanigIaChNJvUs/Nn/vIHpF19cx9jyt80RkFPIT
Pj8aQfEn/WVaw6gLohOgnlAHooGZhXNuC2hBQYpIMaDsVUU5NunJaaW1JuRMiI0i
8nNdZd4WnAQaUhhWcOzuBUj2RIdiewgdbnW9CJCESFoAjgDMP7etmqN96MgZKttE
VsVoBuVy4KlnKDdCibvJh8XVaiwtY9gqsIRXsOnC/ttfAOYRfFOTVcJj3NwSED2R
lQvq+M9asXu1K9iTSeRL2DiPIhp77NJff1khrz4SUrhr57uVlTZPOY7E5F1IgpAP
wwIDAQAB
-----END PUBLIC KEY-----
";

/// 报告发送频率
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Default,
    EnumIter,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ReportFrequency {
    Daily,
    Weekly,
    #[default]
    Monthly,
}

impl ReportFrequency {
    /// Unknown values fall back to monthly.
    pub fn parse_lenient(value: &str) -> Self {
        value.trim().parse().unwrap_or_default()
    }
}

impl std::fmt::Display for ReportFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// 静态配置（从 TOML 加载，启动时使用）
///
/// 包含：
/// - server: 服务器地址、端口、CPU 数量
/// - database: 暂存表所在数据库
/// - logging: 日志配置
/// - remote: 远程分析服务端点与公钥
/// - tracking: 站点标识、缓存时长、转发周期
/// - security: 会话与防伪令牌
/// - customer: 客户注册信息
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StaticConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub customer: CustomerConfig,
}

impl StaticConfig {
    /// 从 TOML 文件和环境变量加载配置
    ///
    /// 优先级：ENV > config.toml > 默认值
    /// ENV 前缀：VR，分隔符：__
    /// 示例：VR__SERVER__PORT=9999
    pub fn load(path: &str) -> Self {
        use config::{Config, Environment, File};

        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("VR")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("tracking.excluded_paths")
                    .try_parsing(true),
            );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<StaticConfig>() {
                Ok(config) => {
                    if std::path::Path::new(path).exists() {
                        eprintln!("[INFO] Configuration loaded from: {}", path);
                    }
                    config
                }
                Err(e) => {
                    eprintln!("[ERROR] Failed to deserialize config: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("[ERROR] Failed to build config: {}", e);
                Self::default()
            }
        }
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config)
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }

    /// 保存配置到 TOML 文件
    pub fn save_to_file<P: AsRef<std::path::Path>>(
        &self,
        path: P,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_cpu_count")]
    pub cpu_count: usize,
}

/// 数据库连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_enable_rotation")]
    pub enable_rotation: bool,
}

/// 远程分析服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_upsert_url")]
    pub upsert_url: String,
    #[serde(default = "default_customer_details_url")]
    pub customer_details_url: String,
    #[serde(default = "default_consent_check_url")]
    pub consent_check_url: String,
    #[serde(default = "default_export_url")]
    pub export_url: String,
    #[serde(default = "default_public_key")]
    pub public_key: String,
    /// 访客侧调用超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// 管理侧调用（注册、导出）超时（秒）
    #[serde(default = "default_admin_timeout_secs")]
    pub admin_timeout_secs: u64,
}

/// 访客跟踪配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// 客户站点标识，为空时使用请求的 Host
    #[serde(default)]
    pub site_name: String,
    #[serde(default = "default_transfer_interval_secs")]
    pub transfer_interval_secs: u64,
    #[serde(default = "default_consent_cache_ttl_secs")]
    pub consent_cache_ttl_secs: u64,
    #[serde(default = "default_geo_cache_ttl_secs")]
    pub geo_cache_ttl_secs: u64,
    #[serde(default = "default_record_cache_ttl_secs")]
    pub record_cache_ttl_secs: u64,
    #[serde(default = "default_account_cache_ttl_secs")]
    pub account_cache_ttl_secs: u64,
    /// 外部 GeoIP API，{ip} 为占位符，返回 CSV（city,country,org）
    #[serde(default = "default_geoip_api_url")]
    pub geoip_api_url: String,
    #[serde(default = "default_excluded_paths")]
    pub excluded_paths: Vec<String>,
}

/// 会话与防伪令牌配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// 防伪令牌签名密钥，为空时启动时随机生成
    #[serde(default)]
    pub token_secret: String,
    #[serde(default = "default_token_minutes")]
    pub token_minutes: u64,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// 管理 API 令牌，为空时禁用 /admin
    #[serde(default)]
    pub admin_token: String,
    #[serde(default)]
    pub cookie_secure: bool,
}

/// 客户注册信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerConfig {
    #[serde(default)]
    pub report_email: String,
    #[serde(default = "default_report_frequency")]
    pub report_frequency: String,
    /// 原样上报，为空时使用当天（YYYY-MM-DD）
    #[serde(default)]
    pub date_registered: String,
    #[serde(default)]
    pub is_consent: bool,
    #[serde(default = "default_sku")]
    pub sku: String,
}

// ============================================================
// Default value functions for static config
// ============================================================

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_cpu_count() -> usize {
    num_cpus::get()
}

fn default_database_url() -> String {
    "visitor_relay.db".to_string()
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_max_backups() -> u32 {
    5
}

fn default_enable_rotation() -> bool {
    true
}

fn default_upsert_url() -> String {
    "https://api.abmsense.com/upsert_abmsense_main_data".to_string()
}

fn default_customer_details_url() -> String {
    "https://api.abmsense.com/upsert_abmsense_our_customers_details".to_string()
}

fn default_consent_check_url() -> String {
    "https://api.abmsense.com/check_consent_enabled".to_string()
}

fn default_export_url() -> String {
    "https://api.abmsense.com/export_data".to_string()
}

fn default_public_key() -> String {
    DEFAULT_PUBLIC_KEY.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_admin_timeout_secs() -> u64 {
    60
}

fn default_transfer_interval_secs() -> u64 {
    3600
}

fn default_consent_cache_ttl_secs() -> u64 {
    86400
}

fn default_geo_cache_ttl_secs() -> u64 {
    3600
}

fn default_record_cache_ttl_secs() -> u64 {
    60
}

fn default_account_cache_ttl_secs() -> u64 {
    3600
}

fn default_geoip_api_url() -> String {
    "http://ip-api.com/csv/{ip}?fields=city,country,org".to_string()
}

fn default_excluded_paths() -> Vec<String> {
    [
        "/wp-admin/",
        "/yoast/",
        "/google-site-kit/",
        "/wp-json/",
        "/admin-ajax.php",
        "/wp-login.php",
        "/wp-cron.php",
        "/xmlrpc.php",
        "/plugins/",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_token_minutes() -> u64 {
    60
}

fn default_session_ttl_secs() -> u64 {
    86400
}

fn default_report_frequency() -> String {
    ReportFrequency::Monthly.to_string()
}

fn default_sku() -> String {
    "ABM-1000-ID-MONTHLY-FREE-TIER".to_string()
}

// ============================================================
// Default implementations
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            cpu_count: default_cpu_count(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool_size: default_database_pool_size(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            max_backups: default_max_backups(),
            enable_rotation: default_enable_rotation(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            upsert_url: default_upsert_url(),
            customer_details_url: default_customer_details_url(),
            consent_check_url: default_consent_check_url(),
            export_url: default_export_url(),
            public_key: default_public_key(),
            timeout_secs: default_timeout_secs(),
            admin_timeout_secs: default_admin_timeout_secs(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            site_name: String::new(),
            transfer_interval_secs: default_transfer_interval_secs(),
            consent_cache_ttl_secs: default_consent_cache_ttl_secs(),
            geo_cache_ttl_secs: default_geo_cache_ttl_secs(),
            record_cache_ttl_secs: default_record_cache_ttl_secs(),
            account_cache_ttl_secs: default_account_cache_ttl_secs(),
            geoip_api_url: default_geoip_api_url(),
            excluded_paths: default_excluded_paths(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            token_secret: String::new(),
            token_minutes: default_token_minutes(),
            session_ttl_secs: default_session_ttl_secs(),
            admin_token: String::new(),
            cookie_secure: false,
        }
    }
}

impl Default for CustomerConfig {
    fn default() -> Self {
        Self {
            report_email: String::new(),
            report_frequency: default_report_frequency(),
            date_registered: String::new(),
            is_consent: false,
            sku: default_sku(),
        }
    }
}
