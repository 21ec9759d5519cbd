use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::utils::CLIENT_DATE_FORMAT;

/// Per-page counters accumulated in the visitor's browser.
///
/// `last_update` travels in the visitor-local `MM-DD-YYYY` format.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ActivityHit {
    pub page_title: String,
    #[serde(default, deserialize_with = "lenient_count")]
    pub time_spent: i32,
    #[serde(default, deserialize_with = "lenient_count")]
    pub page_view: i32,
    pub last_update: String,
}

impl ActivityHit {
    pub fn new(page_title: impl Into<String>, day: NaiveDate) -> Self {
        Self {
            page_title: page_title.into(),
            time_spent: 0,
            page_view: 0,
            last_update: format_client_date(day),
        }
    }

    /// `None` when the date is not a valid `MM-DD-YYYY` string.
    pub fn day(&self) -> Option<NaiveDate> {
        parse_client_date(&self.last_update)
    }
}

pub fn format_client_date(day: NaiveDate) -> String {
    day.format(CLIENT_DATE_FORMAT).to_string()
}

pub fn parse_client_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), CLIENT_DATE_FORMAT).ok()
}

/// Counters arrive as JSON numbers or numeric strings; anything else is zero.
fn lenient_count<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(|v| v.clamp(0, i32::MAX as i64) as i32)
            .unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse::<i32>().unwrap_or(0).max(0),
        _ => 0,
    })
}
