//! HTTP transport to the remote analytics service.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{trace, warn};
use ureq::Agent;

use super::types::RemoteReply;
use crate::errors::{Result, TrackerError};

/// POSTs a JSON body and hands back status + raw body.
///
/// Implementations must honour `timeout`; any network failure is a
/// `TrackerError::Transport`.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<RemoteReply>;
}

/// ureq 实现，同步请求放到 blocking 线程池执行
#[derive(Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        // 非 2xx 也返回响应体，由调用方按 success 字段分类
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .user_agent(concat!("visitor-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .into();
        Self { agent }
    }

    fn post_sync(
        agent: Agent,
        url: String,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<RemoteReply> {
        let resp = agent
            .post(&url)
            .config()
            .timeout_global(Some(timeout))
            .build()
            .send_json(&body)
            .map_err(|e| {
                warn!("Remote request to \"{}\" failed: {}", url, e);
                TrackerError::transport(format!("{}: {}", url, e))
            })?;

        let status = resp.status().as_u16();
        let body = resp.into_body().read_to_string().map_err(|e| {
            warn!("Remote response from \"{}\" unreadable: {}", url, e);
            TrackerError::transport(format!("{}: {}", url, e))
        })?;

        trace!("Remote {} replied {} ({} bytes)", url, status, body.len());
        Ok(RemoteReply { status, body })
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteTransport for UreqTransport {
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<RemoteReply> {
        let agent = self.agent.clone();
        let url = url.to_string();
        let body = body.clone();

        tokio::task::spawn_blocking(move || Self::post_sync(agent, url, body, timeout))
            .await
            .map_err(|e| TrackerError::transport(format!("request task failed: {}", e)))?
    }
}
