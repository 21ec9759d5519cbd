//! Request and response shapes of the remote analytics service.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, EnumString};

/// Date format of `last_update` in bulk payloads.
pub const TRANSFER_DATE_FORMAT: &str = "%Y-%m-%d";
/// Timestamp format of `last_update` in real-time payloads.
pub const REALTIME_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One staging record, normalised for the bulk upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPayload {
    pub customer_name: String,
    pub page_title: String,
    pub time_spent: i64,
    pub page_view: i64,
    pub visitor_ip: String,
    pub visitor_city: String,
    pub visitor_country: String,
    pub visitor_company: String,
    pub account_id: String,
    pub last_update: String,
    /// null when no proxy header yielded an address
    pub header_ip: Option<String>,
}

/// Single page view sent straight to the upsert endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimePayload {
    pub customer_name: String,
    pub visitor_ip: String,
    pub header_ip: String,
    pub account_id: String,
    pub visitor_city: String,
    pub visitor_country: String,
    pub visitor_company: String,
    pub page_title: String,
    pub time_spent: i64,
    pub page_view: i64,
    pub last_update: String,
    pub is_isp_tested: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentCheckRequest {
    pub customer_name: String,
}

/// Registration / settings record of the installing customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub customer_name: String,
    pub report_email: String,
    pub report_frequency: String,
    /// "1" or "0"
    pub is_consent: String,
    pub date_registered: String,
    pub version_installed: String,
    pub sku: String,
}

/// 导出时间范围
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, EnumString, AsRefStr,
)]
pub enum ExportPeriod {
    Today,
    Yesterday,
    #[serde(rename = "This_week")]
    #[strum(serialize = "This_week")]
    ThisWeek,
    #[serde(rename = "Last_week")]
    #[strum(serialize = "Last_week")]
    LastWeek,
    #[serde(rename = "Last_7_days")]
    #[strum(serialize = "Last_7_days")]
    Last7Days,
    #[serde(rename = "Last_30_days")]
    #[strum(serialize = "Last_30_days")]
    Last30Days,
    #[serde(rename = "All_time")]
    #[strum(serialize = "All_time")]
    AllTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub customer_name: String,
    pub report_email: String,
    pub export_period: ExportPeriod,
}

/// Raw HTTP reply before classification.
#[derive(Debug, Clone)]
pub struct RemoteReply {
    pub status: u16,
    pub body: String,
}

/// Envelope every endpoint answers with.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub is_consent_enabled: Option<bool>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl RemoteResponse {
    pub fn error_message(&self) -> String {
        match &self.error {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => "Unknown error".to_string(),
            Some(other) => other.to_string(),
        }
    }
}
