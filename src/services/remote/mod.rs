//! Client for the remote analytics service.
//!
//! Every call seals its payload with the crypto envelope right before
//! sending, then classifies the reply: a transport failure is
//! `TrackerError::Transport`; a non-200 status or `success != true` is
//! `TrackerError::Application` carrying the service's error text.

mod transport;
mod types;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, error};

use crate::config::RemoteConfig;
use crate::crypto::EnvelopeKey;
use crate::errors::{Result, TrackerError};

pub use transport::{RemoteTransport, UreqTransport};
pub use types::*;

pub struct RemoteClient {
    transport: Arc<dyn RemoteTransport>,
    key: EnvelopeKey,
    config: RemoteConfig,
}

impl RemoteClient {
    /// Fails with `Encryption(KeyLoad)` when the configured public key is unusable.
    pub fn new(transport: Arc<dyn RemoteTransport>, config: RemoteConfig) -> Result<Self> {
        let key = EnvelopeKey::from_pem(&config.public_key)?;
        Ok(Self {
            transport,
            key,
            config,
        })
    }

    fn visitor_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    fn admin_timeout(&self) -> Duration {
        Duration::from_secs(self.config.admin_timeout_secs)
    }

    fn seal<T: Serialize>(&self, payload: &T) -> Result<serde_json::Value> {
        let envelope = self.key.seal(payload)?;
        Ok(serde_json::to_value(envelope)?)
    }

    async fn post(
        &self,
        url: &str,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<RemoteResponse> {
        let reply = self.transport.post_json(url, &body, timeout).await?;
        let response: RemoteResponse = serde_json::from_str(&reply.body).unwrap_or_else(|e| {
            debug!("Undecodable response from {}: {}", url, e);
            RemoteResponse::default()
        });

        if reply.status != 200 || response.success != Some(true) {
            let message = response.error_message();
            return Err(TrackerError::application(message));
        }
        Ok(response)
    }

    /// Asks whether the site requires opt-in consent before tracking.
    pub async fn check_consent(&self, customer_name: &str) -> Result<bool> {
        let body = self.seal(&ConsentCheckRequest {
            customer_name: customer_name.to_string(),
        })?;
        let response = self
            .post(&self.config.consent_check_url, body, self.visitor_timeout())
            .await?;
        Ok(response.is_consent_enabled.unwrap_or(false))
    }

    /// Bulk path: the body is the bare envelope.
    pub async fn upsert_main_data(&self, payload: &TransferPayload) -> Result<()> {
        let body = self.seal(payload)?;
        self.post(&self.config.upsert_url, body, self.visitor_timeout())
            .await
            .map(|_| ())
    }

    /// Real-time path: the envelope is wrapped as `{"data": envelope}`.
    pub async fn upsert_realtime(&self, payload: &RealtimePayload) -> Result<()> {
        let body = json!({ "data": self.seal(payload)? });
        self.post(&self.config.upsert_url, body, self.visitor_timeout())
            .await
            .map(|_| ())
    }

    pub async fn sync_customer(&self, details: &CustomerDetails) -> Result<()> {
        let body = self.seal(details)?;
        self.post(&self.config.customer_details_url, body, self.admin_timeout())
            .await
            .map(|_| ())
            .inspect_err(|e| error!("Customer details sync failed: {}", e))
    }

    /// Returns the report rows; a missing or non-array `data` yields no rows.
    pub async fn export(&self, request: &ExportRequest) -> Result<Vec<serde_json::Value>> {
        let body = self.seal(request)?;
        let response = self
            .post(&self.config.export_url, body, self.admin_timeout())
            .await?;
        Ok(match response.data {
            Some(serde_json::Value::Array(rows)) => rows,
            _ => Vec::new(),
        })
    }
}
