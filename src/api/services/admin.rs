//! Admin API: customer sync, report export, on-demand transfer.

use actix_web::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use actix_web::{HttpRequest, HttpResponse, web};
use chrono::Utc;
use tracing::{error, info};

use crate::api::constants::ADMIN_PREFIX;
use crate::api::types::{ExportQuery, SiteSettings, error_response, success_response};
use crate::errors::TrackerError;
use crate::services::customer::{
    CustomerService, CustomerSettings, export_file_name, render_export_csv,
};
use crate::transfer::TransferScheduler;

/// POST /admin/customer
pub async fn post_customer(
    req: HttpRequest,
    body: web::Json<CustomerSettings>,
    customer: web::Data<CustomerService>,
    settings: web::Data<SiteSettings>,
) -> HttpResponse {
    let mut submitted = body.into_inner();
    if submitted.customer_name.trim().is_empty() {
        submitted.customer_name = settings.customer_name(req.connection_info().host());
    }

    match customer.sync(&submitted).await {
        Ok(details) => success_response(details),
        Err(e) => error_response(&e),
    }
}

/// POST /admin/export
pub async fn post_export(
    req: HttpRequest,
    body: web::Json<ExportQuery>,
    customer: web::Data<CustomerService>,
    settings: web::Data<SiteSettings>,
) -> HttpResponse {
    let customer_name = settings.customer_name(req.connection_info().host());
    match customer
        .export(&customer_name, &settings.report_email, body.export_period)
        .await
    {
        Ok(rows) => success_response(rows),
        Err(e) => error_response(&e),
    }
}

/// GET /admin/export.csv?export_period=...
pub async fn get_export_csv(
    req: HttpRequest,
    query: web::Query<ExportQuery>,
    customer: web::Data<CustomerService>,
    settings: web::Data<SiteSettings>,
) -> HttpResponse {
    let customer_name = settings.customer_name(req.connection_info().host());
    let rows = match customer
        .export(&customer_name, &settings.report_email, query.export_period)
        .await
    {
        Ok(rows) => rows,
        Err(e) => return error_response(&e),
    };

    if rows.is_empty() {
        return error_response(&TrackerError::not_found("No Results"));
    }

    match render_export_csv(&rows) {
        Ok(csv) => {
            let file_name = export_file_name(query.export_period, Utc::now().date_naive());
            info!("Exported {} rows as {}", rows.len(), file_name);
            HttpResponse::Ok()
                .insert_header((CONTENT_TYPE, "text/csv; charset=utf-8"))
                .insert_header((
                    CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", file_name),
                ))
                .body(csv)
        }
        Err(e) => {
            error!("CSV rendering failed: {}", e);
            error_response(&e)
        }
    }
}

/// POST /admin/transfer
pub async fn post_transfer(transfer: web::Data<TransferScheduler>) -> HttpResponse {
    match transfer.run_once().await {
        Ok(report) => success_response(report),
        Err(e) => error_response(&e),
    }
}

/// Admin 路由 `/admin`，需要外层包裹 `AdminAuth`
pub fn admin_routes() -> actix_web::Scope {
    web::scope(ADMIN_PREFIX)
        .route("/customer", web::post().to(post_customer))
        .route("/export", web::post().to(post_export))
        .route("/export.csv", web::get().to(get_export_csv))
        .route("/transfer", web::post().to(post_transfer))
}
