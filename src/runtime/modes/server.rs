//! Server mode
//!
//! Configures and starts the HTTP server, the recurring bulk transfer and
//! the shutdown listener.

use actix_web::{
    App, HttpServer,
    middleware::{Compress, DefaultHeaders},
    web,
};
use anyhow::Result;
use std::time::Duration;
use tracing::{info, warn};

use crate::api::constants::MAX_PAYLOAD_BYTES;
use crate::api::middleware::AdminAuth;
use crate::api::services::{AppStartTime, admin_routes, health_routes, track_routes};
use crate::runtime::lifetime;
use crate::runtime::lifetime::startup::StartupContext;

/// Registers shared state and every route on an actix `App`.
///
/// Used by the server factory and by the HTTP integration tests.
pub fn configure_app(
    context: &StartupContext,
    app_start_time: &AppStartTime,
) -> impl FnOnce(&mut web::ServiceConfig) + use<> {
    let context = context.clone();
    let app_start_time = app_start_time.clone();

    move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(web::Data::new(context.store.clone()))
            .app_data(web::Data::from(context.reconciler.clone()))
            .app_data(web::Data::from(context.tracker.clone()))
            .app_data(web::Data::from(context.consent.clone()))
            .app_data(web::Data::from(context.customer.clone()))
            .app_data(web::Data::from(context.transfer.clone()))
            .app_data(web::Data::from(context.anti_forgery.clone()))
            .app_data(web::Data::new(context.sessions.clone()))
            .app_data(web::Data::new(context.site.clone()))
            .app_data(web::Data::new(app_start_time))
            .app_data(web::PayloadConfig::new(MAX_PAYLOAD_BYTES))
            .app_data(web::FormConfig::default().limit(MAX_PAYLOAD_BYTES))
            .app_data(web::JsonConfig::default().limit(MAX_PAYLOAD_BYTES))
            .service(admin_routes().wrap(AdminAuth::new(&context.admin_token)))
            .service(track_routes())
            .service(health_routes());
    }
}

/// Run the HTTP server
///
/// 1. Prepares the shared context (database, caches, remote client)
/// 2. Starts the hourly bulk transfer
/// 3. Serves until Ctrl+C, then runs one final transfer
///
/// **Note**: Logging system must be initialized before calling this function
pub async fn run_server() -> Result<()> {
    let app_start_time = AppStartTime {
        start_datetime: chrono::Utc::now(),
    };

    let context = lifetime::startup::prepare_server_startup()
        .await
        .map_err(|e| {
            tracing::error!("Server startup failed: {}", e);
            e
        })?;

    let config = crate::config::get_config();
    let cpu_count = config.server.cpu_count.clamp(1, 32);
    warn!("Using {} CPU cores for the server", cpu_count);

    if context.admin_token.is_empty() {
        info!("Admin API is disabled (security.admin_token not set)");
    }

    let transfer_task = context
        .transfer
        .clone()
        .spawn_background_task(Duration::from_secs(
            config.tracking.transfer_interval_secs.max(1),
        ));

    let transfer = context.transfer.clone();
    let factory_context = context.clone();
    let server = HttpServer::new(move || {
        App::new()
            .wrap(Compress::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("Cache-Control", "no-cache, no-store, must-revalidate")),
            )
            .configure(configure_app(&factory_context, &app_start_time))
    })
    .keep_alive(Duration::from_secs(30))
    .client_request_timeout(Duration::from_millis(5000))
    .client_disconnect_timeout(Duration::from_millis(1000))
    .disable_signals()
    .workers(cpu_count);

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    warn!("Starting server at http://{}", bind_address);
    let server = server.bind(bind_address)?.run();
    let handle = server.handle();

    // Ctrl+C 先停止接收请求，服务器退出后再做最后一次转发
    actix_web::rt::spawn(async move {
        lifetime::shutdown::listen_for_shutdown().await;
        handle.stop(true).await;
    });

    server.await?;

    transfer_task.abort();
    lifetime::shutdown::final_transfer(
        &transfer,
        Duration::from_secs(lifetime::shutdown::SHUTDOWN_TIMEOUT_SECS),
    )
    .await;
    warn!("Graceful shutdown: all tasks completed");
    Ok(())
}
