//! Consent gate.
//!
//! Tracking may run when the site does not require opt-in consent, or when
//! the visitor has explicitly granted it in this session.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::remote::RemoteClient;
use super::session::VisitorSession;
use crate::cache::{TtlCache, cache_key};

/// Per-session consent: starts `Unset`, one transition to `Granted`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConsentState {
    #[default]
    Unset,
    Granted,
}

impl ConsentState {
    pub fn grant(self) -> Self {
        ConsentState::Granted
    }

    pub fn is_granted(self) -> bool {
        self == ConsentState::Granted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingDecision {
    pub tracking_permitted: bool,
    /// Deliver the consent prompt script to the browser.
    pub consent_prompt: bool,
}

pub struct ConsentGate {
    remote: Arc<RemoteClient>,
    cache: Arc<dyn TtlCache<bool>>,
    ttl: Duration,
}

impl ConsentGate {
    pub fn new(remote: Arc<RemoteClient>, cache: Arc<dyn TtlCache<bool>>, ttl: Duration) -> Self {
        Self { remote, cache, ttl }
    }

    fn key(site: &str) -> String {
        cache_key("consent", &[site])
    }

    /// Cached for the configured TTL. Remote failures answer `false` and are
    /// not cached, so the next page view asks again.
    pub async fn is_consent_required_for_site(&self, site: &str) -> bool {
        let key = Self::key(site);
        if let Some(required) = self.cache.get(&key).await {
            return required;
        }

        match self.remote.check_consent(site).await {
            Ok(required) => {
                debug!("Consent required for {}: {}", site, required);
                self.cache.set(&key, required, self.ttl).await;
                required
            }
            Err(e) => {
                warn!("Consent check for {} failed, assuming not required: {}", site, e);
                false
            }
        }
    }

    pub fn has_visitor_consented(&self, session: &VisitorSession) -> bool {
        session.consent.is_granted()
    }

    pub async fn decide(&self, site: &str, session: &VisitorSession) -> TrackingDecision {
        if self.has_visitor_consented(session) {
            return TrackingDecision {
                tracking_permitted: true,
                consent_prompt: false,
            };
        }

        let required = self.is_consent_required_for_site(site).await;
        TrackingDecision {
            tracking_permitted: !required,
            consent_prompt: required,
        }
    }

    /// Drops the cached answer so the next check goes to the remote service.
    pub async fn forget_site(&self, site: &str) {
        self.cache.delete(&Self::key(site)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MokaTtlCache;
    use crate::config::RemoteConfig;
    use crate::errors::{Result, TrackerError};
    use crate::services::remote::{RemoteReply, RemoteTransport};
    use async_trait::async_trait;
    use rsa::RsaPrivateKey;
    use rsa::pkcs8::{EncodePublicKey, LineEnding};
    use std::sync::OnceLock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn public_pem() -> String {
        static PEM: OnceLock<String> = OnceLock::new();
        PEM.get_or_init(|| {
            RsaPrivateKey::new(&mut rsa::rand_core::OsRng, 2048)
                .unwrap()
                .to_public_key()
                .to_public_key_pem(LineEnding::LF)
                .unwrap()
        })
        .clone()
    }

    enum Behaviour {
        Answer(&'static str),
        Hang,
    }

    struct FakeRemote {
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteTransport for FakeRemote {
        async fn post_json(
            &self,
            _url: &str,
            _body: &serde_json::Value,
            timeout: Duration,
        ) -> Result<RemoteReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Answer(body) => Ok(RemoteReply {
                    status: 200,
                    body: body.to_string(),
                }),
                Behaviour::Hang => {
                    tokio::time::timeout(timeout, std::future::pending::<()>())
                        .await
                        .map_err(|_| TrackerError::transport("timed out"))?;
                    unreachable!()
                }
            }
        }
    }

    fn gate(behaviour: Behaviour) -> (ConsentGate, Arc<FakeRemote>) {
        let transport = Arc::new(FakeRemote {
            behaviour,
            calls: AtomicUsize::new(0),
        });
        let config = RemoteConfig {
            public_key: public_pem(),
            timeout_secs: 1,
            ..RemoteConfig::default()
        };
        let remote = Arc::new(RemoteClient::new(transport.clone(), config).unwrap());
        let gate = ConsentGate::new(
            remote,
            Arc::new(MokaTtlCache::new("consent-test", 100)),
            Duration::from_secs(86400),
        );
        (gate, transport)
    }

    fn session(consent: ConsentState) -> VisitorSession {
        VisitorSession {
            id: "s".into(),
            consent,
        }
    }

    #[test]
    fn test_state_machine() {
        let state = ConsentState::default();
        assert!(!state.is_granted());
        assert!(state.grant().is_granted());
        assert!(state.grant().grant().is_granted());
    }

    #[tokio::test]
    async fn test_timeout_means_not_required() {
        let (gate, _) = gate(Behaviour::Hang);
        assert!(!gate.is_consent_required_for_site("example.com").await);

        let decision = gate.decide("example.com", &session(ConsentState::Unset)).await;
        assert!(decision.tracking_permitted);
        assert!(!decision.consent_prompt);
    }

    #[tokio::test]
    async fn test_answer_is_cached() {
        let (gate, remote) = gate(Behaviour::Answer(
            r#"{"success":true,"is_consent_enabled":true}"#,
        ));
        assert!(gate.is_consent_required_for_site("example.com").await);
        assert!(gate.is_consent_required_for_site("example.com").await);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);

        gate.forget_site("example.com").await;
        gate.is_consent_required_for_site("example.com").await;
        assert_eq!(remote.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let (gate, remote) = gate(Behaviour::Answer(r#"{"success":false}"#));
        assert!(!gate.is_consent_required_for_site("example.com").await);
        assert!(!gate.is_consent_required_for_site("example.com").await);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_decision_matrix() {
        let (gate, remote) = gate(Behaviour::Answer(
            r#"{"success":true,"is_consent_enabled":true}"#,
        ));

        let pending = gate.decide("example.com", &session(ConsentState::Unset)).await;
        assert_eq!(
            pending,
            TrackingDecision {
                tracking_permitted: false,
                consent_prompt: true
            }
        );

        let granted = gate.decide("example.com", &session(ConsentState::Granted)).await;
        assert!(granted.tracking_permitted);
        assert!(!granted.consent_prompt);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }
}
