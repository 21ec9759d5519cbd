//! Shared fixtures for the integration tests: a temporary SQLite staging
//! database, a scripted remote transport and a fixed geo lookup.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sea_orm::DatabaseConnection;
use tempfile::TempDir;
use tokio::sync::Notify;

use visitor_relay::config::StaticConfig;
use visitor_relay::errors::{Result, TrackerError};
use visitor_relay::runtime::lifetime::startup::StartupContext;
use visitor_relay::services::geoip::{GeoInfo, GeoIpLookup};
use visitor_relay::services::remote::{RemoteReply, RemoteTransport};
use visitor_relay::staging::connect;

pub const SITE: &str = "shop.example";

/// Opens a fresh SQLite staging database inside its own temp dir.
pub async fn temp_database() -> (TempDir, DatabaseConnection) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("staging.db");
    let db = connect(&path.display().to_string(), 1)
        .await
        .expect("Failed to open staging database");
    (dir, db)
}

/// Replies from a queue, falling back to `{"success":true}` once it is empty.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<RemoteReply>>>,
    sent: Mutex<Vec<(String, serde_json::Value)>>,
    hold_next: AtomicBool,
    entered: Notify,
    released: Notify,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_reply(&self, status: u16, body: &str) {
        self.replies.lock().push_back(Ok(RemoteReply {
            status,
            body: body.to_string(),
        }));
    }

    pub fn push_ok(&self) {
        self.push_reply(200, r#"{"success":true}"#);
    }

    pub fn push_network_error(&self) {
        self.replies
            .lock()
            .push_back(Err(TrackerError::transport("connection reset")));
    }

    /// The next call blocks until [`release`](Self::release).
    pub fn hold_next_call(&self) {
        self.hold_next.store(true, Ordering::SeqCst);
    }

    /// Resolves once a held call is waiting inside the transport.
    pub async fn wait_until_held(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }

    pub fn sent(&self) -> Vec<(String, serde_json::Value)> {
        self.sent.lock().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.sent.lock().iter().filter(|(u, _)| u == url).count()
    }
}

#[async_trait]
impl RemoteTransport for ScriptedTransport {
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        _timeout: Duration,
    ) -> Result<RemoteReply> {
        self.sent.lock().push((url.to_string(), body.clone()));
        if self.hold_next.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.released.notified().await;
        }
        self.replies.lock().pop_front().unwrap_or_else(|| {
            Ok(RemoteReply {
                status: 200,
                body: r#"{"success":true}"#.to_string(),
            })
        })
    }
}

/// Answers every lookup with the same location.
pub struct FixedGeo;

#[async_trait]
impl GeoIpLookup for FixedGeo {
    async fn lookup(&self, _ip: &str) -> Option<GeoInfo> {
        Some(GeoInfo {
            city: "Lisbon".into(),
            country: "Portugal".into(),
            company: "Example ISP".into(),
        })
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

pub fn test_config() -> StaticConfig {
    let mut config = StaticConfig::default();
    config.tracking.site_name = SITE.to_string();
    config.security.token_secret = "integration-test-secret".to_string();
    config.security.admin_token = "admin-secret".to_string();
    config
}

/// Full service stack over a temp database with a scripted transport.
pub async fn test_context(
    config: &StaticConfig,
    transport: Arc<ScriptedTransport>,
) -> (TempDir, StartupContext) {
    let (dir, db) = temp_database().await;
    let context = StartupContext::assemble(config, db, transport, Arc::new(FixedGeo))
        .expect("Failed to assemble context");
    (dir, context)
}
