//! Customer registration, settings sync and report export.
//!
//! These are the admin-facing flows; their errors are surfaced to the
//! operator as plain messages.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::consent::ConsentGate;
use super::remote::{CustomerDetails, ExportPeriod, ExportRequest, RemoteClient};
use crate::config::{ReportFrequency, StaticConfig};
use crate::errors::{Result, TrackerError};
use crate::utils::text::validate_email_list;

/// Header and row key of every export column, in output order.
pub const EXPORT_COLUMNS: [(&str, &str); 14] = [
    ("Company name", "company_name"),
    ("Lead Score", "lead_score"),
    ("Visit Duration", "visit_duration"),
    ("Number of Visits", "number_of_visits"),
    ("Number of employees", "number_of_employees"),
    ("HQ", "hq"),
    ("Company Email", "company_email"),
    ("Company Phone", "company_phone"),
    ("Web Domain", "web_domain"),
    ("Industry", "industry"),
    ("Revenue", "revenue"),
    ("LinkedIn", "linkedin"),
    ("Top 3 Journey pages", "top_3_journey_pages"),
    ("Last visited date", "last_visited_date"),
];

/// Settings submitted by the operator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerSettings {
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub report_email: String,
    #[serde(default)]
    pub report_frequency: String,
    #[serde(default)]
    pub is_consent: bool,
    #[serde(default)]
    pub date_registered: Option<String>,
}

impl CustomerSettings {
    pub fn from_config(config: &StaticConfig, customer_name: &str) -> Self {
        Self {
            customer_name: customer_name.to_string(),
            report_email: config.customer.report_email.clone(),
            report_frequency: config.customer.report_frequency.clone(),
            is_consent: config.customer.is_consent,
            date_registered: Some(config.customer.date_registered.clone())
                .filter(|d| !d.trim().is_empty()),
        }
    }
}

pub struct CustomerService {
    remote: Arc<RemoteClient>,
    consent: Arc<ConsentGate>,
    sku: String,
}

impl CustomerService {
    pub fn new(remote: Arc<RemoteClient>, consent: Arc<ConsentGate>, sku: String) -> Self {
        Self {
            remote,
            consent,
            sku,
        }
    }

    /// Validates, normalises and sends the settings. On success the cached
    /// consent answer for the customer is dropped.
    pub async fn sync(&self, settings: &CustomerSettings) -> Result<CustomerDetails> {
        let details = self.details(settings, Utc::now().date_naive())?;
        self.remote.sync_customer(&details).await?;
        self.consent.forget_site(&details.customer_name).await;
        info!(
            "Customer settings for {} synced, consent cache cleared",
            details.customer_name
        );
        Ok(details)
    }

    /// Startup registration; failures are logged and otherwise ignored.
    pub async fn activation_sync(&self, config: &StaticConfig, customer_name: &str) -> bool {
        let settings = CustomerSettings::from_config(config, customer_name);
        match self.sync(&settings).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Activation sync for {} failed: {}", customer_name, e);
                false
            }
        }
    }

    pub fn details(&self, settings: &CustomerSettings, today: NaiveDate) -> Result<CustomerDetails> {
        let customer_name = settings.customer_name.trim();
        if customer_name.is_empty() {
            return Err(TrackerError::validation("customer_name cannot be empty"));
        }

        Ok(CustomerDetails {
            customer_name: customer_name.to_string(),
            report_email: normalize_report_email(&settings.report_email)?,
            report_frequency: ReportFrequency::parse_lenient(&settings.report_frequency)
                .to_string(),
            is_consent: if settings.is_consent { "1" } else { "0" }.to_string(),
            date_registered: settings
                .date_registered
                .clone()
                .unwrap_or_else(|| today.format("%Y-%m-%d").to_string()),
            version_installed: env!("CARGO_PKG_VERSION").to_string(),
            sku: self.sku.clone(),
        })
    }

    pub async fn export(
        &self,
        customer_name: &str,
        report_email: &str,
        period: ExportPeriod,
    ) -> Result<Vec<Value>> {
        let request = ExportRequest {
            customer_name: customer_name.to_string(),
            report_email: report_email.to_string(),
            export_period: period,
        };
        let rows = self.remote.export(&request).await?;
        info!("Export for {} ({}) returned {} rows", customer_name, period.as_ref(), rows.len());
        Ok(rows)
    }
}

/// Empty stays empty; otherwise every comma-separated address must be valid.
pub fn normalize_report_email(raw: &str) -> Result<String> {
    if raw.trim().is_empty() {
        return Ok(String::new());
    }
    validate_email_list(raw)
        .map(|addrs| addrs.join(","))
        .map_err(|e| TrackerError::validation(e.to_string()))
}

pub fn export_file_name(period: ExportPeriod, today: NaiveDate) -> String {
    format!("visitor_export_{}_{}.csv", period.as_ref(), today.format("%Y-%m-%d"))
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| cell(Some(v)))
            .collect::<Vec<_>>()
            .join(","),
        Some(other) => other.to_string(),
    }
}

/// Renders report rows with the fixed export column set.
pub fn render_export_csv(rows: &[Value]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(EXPORT_COLUMNS.iter().map(|(header, _)| *header))
        .map_err(|e| TrackerError::serialization(format!("CSV write failed: {}", e)))?;

    for row in rows {
        let record: Vec<String> = EXPORT_COLUMNS
            .iter()
            .map(|(_, key)| cell(row.get(key)))
            .collect();
        writer
            .write_record(&record)
            .map_err(|e| TrackerError::serialization(format!("CSV write failed: {}", e)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| TrackerError::serialization(format!("CSV flush failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| TrackerError::serialization(e.to_string()))
}
