//! Response envelope and request bodies shared by the HTTP handlers.

use actix_web::HttpResponse;
use actix_web::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::errors::TrackerError;
use crate::services::remote::ExportPeriod;

/// `{success, data?, error?}`, the shape every endpoint answers with.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: Option<T>) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

/// Site-wide settings the tracking handlers need.
#[derive(Clone, Debug)]
pub struct SiteSettings {
    /// empty: use the request host
    pub site_name: String,
    pub excluded_paths: Vec<String>,
    pub cookie_secure: bool,
    pub report_email: String,
}

impl SiteSettings {
    pub fn customer_name(&self, request_host: &str) -> String {
        if self.site_name.trim().is_empty() {
            strip_port(request_host).to_string()
        } else {
            self.site_name.trim().to_string()
        }
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths
            .iter()
            .any(|fragment| !fragment.is_empty() && path.contains(fragment.as_str()))
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // [::1]:8080
        return host
            .split_once(']')
            .map(|(addr, _)| addr.trim_start_matches('['))
            .unwrap_or(host);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Form of the batch endpoint.
#[derive(Deserialize, Debug, Default)]
pub struct HitsForm {
    pub hits: Option<String>,
    pub account_id: Option<String>,
    pub security: Option<String>,
}

/// Body of the per-page hook.
#[derive(Deserialize, Debug, Default)]
pub struct PageViewRequest {
    #[serde(default)]
    pub page_title: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct PageViewResponse {
    pub tracking: bool,
    pub consent_prompt: bool,
    /// anti-forgery token for the batch endpoint
    pub security: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ExportQuery {
    pub export_period: ExportPeriod,
}

pub fn status_for(err: &TrackerError) -> StatusCode {
    match err {
        TrackerError::Validation(_) => StatusCode::BAD_REQUEST,
        TrackerError::NotFound(_) => StatusCode::NOT_FOUND,
        TrackerError::Transport(_) | TrackerError::Application(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn success_response<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(Some(data)))
}

/// Admin-facing failure: `{success: false, error}`.
pub fn error_response(err: &TrackerError) -> HttpResponse {
    HttpResponse::build(status_for(err)).json(ApiResponse::<()> {
        success: false,
        data: None,
        error: Some(err.message()),
    })
}

/// Visitor-facing failure: `{success: false, data: message}`.
pub fn visitor_error(status: StatusCode, message: &str) -> HttpResponse {
    HttpResponse::build(status).json(ApiResponse {
        success: false,
        data: Some(message.to_string()),
        error: None,
    })
}
