//! Visitor tracking trigger.
//!
//! Fires once per tracked page view and, when the visitor's account id is
//! already known from the staging store, sends a single real-time record
//! straight to the remote service.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tracing::{debug, trace, warn};

use super::geoip::GeoIpProvider;
use super::remote::{REALTIME_TIMESTAMP_FORMAT, RealtimePayload, RemoteClient};
use crate::cache::{TtlCache, cache_key};
use crate::errors::Result;
use crate::staging::StagingStore;
use crate::utils::text::normalize_page_title;

/// One server-rendered page view.
#[derive(Debug, Clone, Default)]
pub struct PageView {
    pub customer_name: String,
    pub visitor_ip: String,
    pub header_ip: String,
    pub page_title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    Sent { account_id: String },
    /// no account id on file for this visitor and page yet
    NoIdentity,
    Failed(String),
}

pub struct VisitorTracker {
    store: Arc<dyn StagingStore>,
    geo: GeoIpProvider,
    remote: Arc<RemoteClient>,
    accounts: Arc<dyn TtlCache<String>>,
    account_ttl: Duration,
}

impl VisitorTracker {
    pub fn new(
        store: Arc<dyn StagingStore>,
        geo: GeoIpProvider,
        remote: Arc<RemoteClient>,
        accounts: Arc<dyn TtlCache<String>>,
        account_ttl: Duration,
    ) -> Self {
        Self {
            store,
            geo,
            remote,
            accounts,
            account_ttl,
        }
    }

    /// Never fails the page render: every error is logged and reported as
    /// `TrackOutcome::Failed`.
    pub async fn track_page_view(&self, view: &PageView) -> TrackOutcome {
        let page_title = normalize_page_title(&view.page_title);

        let account_id = match self
            .resolve_account_id(&view.visitor_ip, &view.header_ip, &page_title)
            .await
        {
            Ok(Some(id)) => id,
            Ok(None) => {
                trace!(
                    "No account id for {} on '{}', skipping real-time record",
                    view.visitor_ip, page_title
                );
                return TrackOutcome::NoIdentity;
            }
            Err(e) => {
                warn!("Account id lookup failed: {}", e);
                return TrackOutcome::Failed(e.message());
            }
        };

        let geo = self.geo.lookup(&view.visitor_ip).await;
        let payload = RealtimePayload {
            customer_name: view.customer_name.clone(),
            visitor_ip: view.visitor_ip.clone(),
            header_ip: view.header_ip.clone(),
            account_id: account_id.clone(),
            visitor_city: geo.city,
            visitor_country: geo.country,
            visitor_company: geo.company,
            page_title,
            time_spent: 0,
            page_view: 1,
            last_update: Local::now().format(REALTIME_TIMESTAMP_FORMAT).to_string(),
            is_isp_tested: 0,
        };

        match self.remote.upsert_realtime(&payload).await {
            Ok(()) => {
                debug!("Real-time record sent for {}", account_id);
                TrackOutcome::Sent { account_id }
            }
            Err(e) => {
                warn!("Real-time upsert failed: {}", e);
                TrackOutcome::Failed(e.message())
            }
        }
    }

    /// Only found ids are cached, so a visitor whose first batch lands later
    /// is picked up on the next page view.
    async fn resolve_account_id(
        &self,
        visitor_ip: &str,
        header_ip: &str,
        page_title: &str,
    ) -> Result<Option<String>> {
        let key = cache_key("acct", &[visitor_ip, header_ip, page_title]);
        if let Some(id) = self.accounts.get(&key).await {
            return Ok(Some(id));
        }

        let found = self
            .store
            .find_account_id(visitor_ip, header_ip, page_title)
            .await?;
        match found {
            Some(id) if !id.is_empty() => {
                self.accounts.set(&key, id.clone(), self.account_ttl).await;
                Ok(Some(id))
            }
            _ => Ok(None),
        }
    }
}
