use actix_web::http::StatusCode;
use actix_web::{HttpResponse, Responder, web};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, trace};

use crate::api::constants::HEALTH_PREFIX;
use crate::api::types::ApiResponse;
use crate::staging::StagingStore;

// 应用启动时间
#[derive(Clone, Debug)]
pub struct AppStartTime {
    pub start_datetime: chrono::DateTime<chrono::Utc>,
}

#[derive(Serialize, Debug)]
pub struct HealthStagingCheck {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_records: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct HealthReport {
    pub status: String,
    pub timestamp: String,
    pub uptime: u64,
    pub staging: HealthStagingCheck,
    pub response_time_ms: u64,
}

/// Health Service
///
/// 直接查询 staging store 的行数，不经过 reconciler。
pub struct HealthService;

impl HealthService {
    pub async fn health_check(
        store: web::Data<Arc<dyn StagingStore>>,
        app_start_time: web::Data<AppStartTime>,
    ) -> impl Responder {
        let start_time = Instant::now();
        trace!("Received health check request");

        let staging = match tokio::time::timeout(Duration::from_secs(5), store.count()).await {
            Ok(Ok(count)) => {
                trace!("Staging health check passed, {} rows pending", count);
                HealthStagingCheck {
                    status: "healthy".to_string(),
                    pending_records: Some(count),
                    error: None,
                }
            }
            Ok(Err(e)) => {
                error!("Staging health check failed: {}", e);
                HealthStagingCheck {
                    status: "unhealthy".to_string(),
                    pending_records: None,
                    error: Some(format!("database error: {}", e)),
                }
            }
            Err(_) => {
                error!("Staging health check timeout");
                HealthStagingCheck {
                    status: "unhealthy".to_string(),
                    pending_records: None,
                    error: Some("timeout".to_string()),
                }
            }
        };

        let now = chrono::Utc::now();
        let uptime = (now - app_start_time.start_datetime).num_seconds().max(0) as u64;
        let is_healthy = staging.status == "healthy";
        let status = if is_healthy { "healthy" } else { "unhealthy" };

        let report = HealthReport {
            status: status.to_string(),
            timestamp: now.to_rfc3339(),
            uptime,
            staging,
            response_time_ms: start_time.elapsed().as_millis() as u64,
        };

        info!(
            "Health check completed in {:?}, status: {}, uptime: {}s",
            start_time.elapsed(),
            status,
            uptime
        );

        let code = if is_healthy {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        HttpResponse::build(code).json(ApiResponse {
            success: is_healthy,
            data: Some(report),
            error: None,
        })
    }

    // 就绪检查
    pub async fn readiness_check() -> impl Responder {
        trace!("Received readiness check request");

        HttpResponse::Ok()
            .append_header(("Content-Type", "text/plain"))
            .body("OK")
    }

    pub async fn liveness_check() -> impl Responder {
        trace!("Received liveness check request");

        HttpResponse::NoContent().finish()
    }
}

/// Health 路由 `/health`
pub fn health_routes() -> actix_web::Scope {
    web::scope(HEALTH_PREFIX)
        .route("", web::get().to(HealthService::health_check))
        .route("", web::head().to(HealthService::health_check))
        .route("/ready", web::get().to(HealthService::readiness_check))
        .route("/ready", web::head().to(HealthService::readiness_check))
        .route("/live", web::get().to(HealthService::liveness_check))
        .route("/live", web::head().to(HealthService::liveness_check))
}
