use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sea_orm::DatabaseConnection;
use tracing::{debug, info, warn};

use crate::api::types::SiteSettings;
use crate::cache::{MokaTtlCache, TtlCache};
use crate::config::{StaticConfig, get_config};
use crate::services::geoip::{ExternalApiProvider, GeoIpLookup, GeoIpProvider};
use crate::services::remote::{RemoteClient, RemoteTransport, UreqTransport};
use crate::services::{
    AntiForgery, ConsentGate, CustomerService, SessionStore, StagingReconciler, VisitorTracker,
};
use crate::staging::retry::RetryConfig;
use crate::staging::{SeaOrmStagingStore, StagingRecord, StagingSnapshot, StagingStore, connect};
use crate::transfer::TransferScheduler;

// 各缓存容量上限
const GEO_CACHE_CAPACITY: u64 = 50_000;
const CONSENT_CACHE_CAPACITY: u64 = 1_024;
const RECORD_CACHE_CAPACITY: u64 = 100_000;
const ACCOUNT_CACHE_CAPACITY: u64 = 100_000;

/// Everything the HTTP layer and the background tasks share.
#[derive(Clone)]
pub struct StartupContext {
    pub store: Arc<dyn StagingStore>,
    pub remote: Arc<RemoteClient>,
    pub consent: Arc<ConsentGate>,
    pub reconciler: Arc<StagingReconciler>,
    pub tracker: Arc<VisitorTracker>,
    pub customer: Arc<CustomerService>,
    pub transfer: Arc<TransferScheduler>,
    pub sessions: SessionStore,
    pub anti_forgery: Arc<AntiForgery>,
    pub site: SiteSettings,
    pub admin_token: String,
}

impl StartupContext {
    /// Wires the services on top of an open staging database.
    ///
    /// Remote calls and geo lookups go through the given trait objects so
    /// tests can run the whole stack without network access.
    pub fn assemble(
        config: &StaticConfig,
        db: DatabaseConnection,
        transport: Arc<dyn RemoteTransport>,
        lookup: Arc<dyn GeoIpLookup>,
    ) -> Result<Self> {
        let tracking = &config.tracking;
        let secs = Duration::from_secs;

        let store: Arc<dyn StagingStore> = Arc::new(SeaOrmStagingStore::new(
            db,
            RetryConfig::from(&config.database),
        ));

        let remote = Arc::new(
            RemoteClient::new(transport, config.remote.clone())
                .context("Failed to load the remote service public key")?,
        );

        let geo = GeoIpProvider::new(
            lookup,
            Arc::new(MokaTtlCache::new("geo", GEO_CACHE_CAPACITY)),
            secs(tracking.geo_cache_ttl_secs),
        );

        let consent = Arc::new(ConsentGate::new(
            remote.clone(),
            Arc::new(MokaTtlCache::new("consent", CONSENT_CACHE_CAPACITY)),
            secs(tracking.consent_cache_ttl_secs),
        ));

        // 全表快照只在两次转发之间有效
        let snapshot_cache: Arc<dyn TtlCache<Arc<Vec<StagingRecord>>>> =
            Arc::new(MokaTtlCache::new("staging", 4));
        let snapshot = StagingSnapshot::new(
            store.clone(),
            snapshot_cache,
            secs(tracking.transfer_interval_secs),
        );

        let reconciler = Arc::new(StagingReconciler::new(
            snapshot.clone(),
            geo.clone(),
            Arc::new(MokaTtlCache::new("record", RECORD_CACHE_CAPACITY)),
            secs(tracking.record_cache_ttl_secs),
        ));

        let tracker = Arc::new(VisitorTracker::new(
            store.clone(),
            geo,
            remote.clone(),
            Arc::new(MokaTtlCache::new("account", ACCOUNT_CACHE_CAPACITY)),
            secs(tracking.account_cache_ttl_secs),
        ));

        let customer = Arc::new(CustomerService::new(
            remote.clone(),
            consent.clone(),
            config.customer.sku.clone(),
        ));

        let transfer = Arc::new(TransferScheduler::new(
            snapshot,
            remote.clone(),
            transfer_customer_name(config),
        ));

        let sessions = SessionStore::new(secs(config.security.session_ttl_secs));
        let anti_forgery = Arc::new(AntiForgery::from_secret_or_random(
            &config.security.token_secret,
            config.security.token_minutes,
        ));

        let site = SiteSettings {
            site_name: tracking.site_name.clone(),
            excluded_paths: tracking.excluded_paths.clone(),
            cookie_secure: config.security.cookie_secure,
            report_email: config.customer.report_email.clone(),
        };

        Ok(Self {
            store,
            remote,
            consent,
            reconciler,
            tracker,
            customer,
            transfer,
            sessions,
            anti_forgery,
            site,
            admin_token: config.security.admin_token.clone(),
        })
    }
}

/// 后台转发没有请求 Host，站点名为空时退回监听地址
pub fn transfer_customer_name(config: &StaticConfig) -> String {
    let site = config.tracking.site_name.trim();
    if site.is_empty() {
        warn!(
            "tracking.site_name is not set, bulk transfers will report as '{}'",
            config.server.host
        );
        config.server.host.clone()
    } else {
        site.to_string()
    }
}

/// 打开暂存数据库并组装服务（生产环境：ureq + ip-api）
pub async fn prepare_context() -> Result<StartupContext> {
    let config = get_config();

    let db = connect(&config.database.database_url, config.database.pool_size)
        .await
        .context("Failed to open the staging database")?;

    let transport: Arc<dyn RemoteTransport> = Arc::new(UreqTransport::new());
    let lookup: Arc<dyn GeoIpLookup> =
        Arc::new(ExternalApiProvider::new(&config.tracking.geoip_api_url));

    StartupContext::assemble(&config, db, transport, lookup)
}

/// 准备服务器启动的上下文
///
/// 在 `prepare_context` 之上执行一次客户激活同步（失败只记录日志）。
pub async fn prepare_server_startup() -> Result<StartupContext> {
    let start_time = std::time::Instant::now();
    debug!("Starting pre-startup processing...");

    let context = prepare_context().await?;

    let config = get_config();
    let customer_name = context.transfer.customer_name().to_string();
    if context
        .customer
        .activation_sync(&config, &customer_name)
        .await
    {
        info!("Activation sync completed for '{}'", customer_name);
    }

    match context.store.count().await {
        Ok(pending) => info!("{} staged rows waiting for transfer", pending),
        Err(e) => warn!("Could not count staged rows: {}", e),
    }

    debug!("Pre-startup processing completed in {:?}", start_time.elapsed());
    Ok(context)
}
