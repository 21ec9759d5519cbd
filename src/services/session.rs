//! Visitor sessions and anti-forgery tokens.
//!
//! A session is identified by an opaque random id carried in an HTTP-only
//! cookie. The server keeps the consent state per session; the batch
//! endpoint only accepts requests carrying a short-lived token bound to the
//! caller's session id.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::consent::ConsentState;
use crate::errors::{Result, TrackerError};
use crate::utils::generate_random_code;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "vr_session";

const SESSION_ID_LEN: usize = 32;
const TOKEN_TYPE: &str = "anti_forgery";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitorSession {
    pub id: String,
    pub consent: ConsentState,
}

impl VisitorSession {
    fn new(id: String) -> Self {
        Self {
            id,
            consent: ConsentState::default(),
        }
    }
}

/// In-memory session store, entries expire after `ttl` of inactivity.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Cache<String, VisitorSession>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Cache::builder()
                .name("sessions")
                .max_capacity(100_000)
                .time_to_idle(ttl)
                .build(),
        }
    }

    pub async fn get(&self, id: &str) -> Option<VisitorSession> {
        self.sessions.get(id).await
    }

    /// Returns the session for `id`, or starts a new one when it is unknown.
    ///
    /// The boolean is true when a new session was created (the caller must
    /// then set the cookie).
    pub async fn resume_or_start(&self, id: Option<&str>) -> (VisitorSession, bool) {
        if let Some(id) = id
            && let Some(session) = self.sessions.get(id).await
        {
            return (session, false);
        }

        let session = VisitorSession::new(generate_random_code(SESSION_ID_LEN));
        self.sessions
            .insert(session.id.clone(), session.clone())
            .await;
        debug!("Started visitor session {}", session.id);
        (session, true)
    }

    /// The only transition of the consent state machine.
    pub async fn grant_consent(&self, id: &str) -> Result<VisitorSession> {
        let mut session = self
            .sessions
            .get(id)
            .await
            .ok_or_else(|| TrackerError::not_found("visitor session"))?;
        session.consent = session.consent.grant();
        self.sessions.insert(id.to_string(), session.clone()).await;
        Ok(session)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AntiForgeryClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub token_type: String,
}

/// Issues and verifies HS256 anti-forgery tokens bound to a session id.
pub struct AntiForgery {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_minutes: u64,
}

impl AntiForgery {
    pub fn new(secret: &str, token_minutes: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_minutes,
        }
    }

    /// Empty secret → random one; tokens then do not survive a restart.
    pub fn from_secret_or_random(secret: &str, token_minutes: u64) -> Self {
        if secret.is_empty() {
            warn!("Token secret not configured, generating a random one");
            Self::new(&generate_random_code(48), token_minutes)
        } else {
            Self::new(secret, token_minutes)
        }
    }

    pub fn issue(&self, session_id: &str) -> Result<String> {
        let now = Utc::now();
        let claims = AntiForgeryClaims {
            sub: session_id.to_string(),
            iat: now.timestamp(),
            exp: (now + chrono::Duration::minutes(self.token_minutes as i64)).timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
            token_type: TOKEN_TYPE.to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| TrackerError::serialization(format!("token encoding failed: {}", e)))
    }

    /// Rejects missing, malformed, expired or foreign-session tokens.
    pub fn verify(&self, token: Option<&str>, session_id: Option<&str>) -> Result<()> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TrackerError::validation("missing security token"))?;
        let session_id =
            session_id.ok_or_else(|| TrackerError::validation("missing visitor session"))?;

        let data = decode::<AntiForgeryClaims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| TrackerError::validation(format!("invalid security token: {}", e)))?;

        if data.claims.token_type != TOKEN_TYPE || data.claims.sub != session_id {
            return Err(TrackerError::validation(
                "security token does not belong to this session",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resume_or_start() {
        let store = SessionStore::new(Duration::from_secs(60));
        let (first, created) = store.resume_or_start(None).await;
        assert!(created);
        assert_eq!(first.consent, ConsentState::Unset);

        let (again, created) = store.resume_or_start(Some(&first.id)).await;
        assert!(!created);
        assert_eq!(again.id, first.id);

        let (other, created) = store.resume_or_start(Some("stale-id")).await;
        assert!(created);
        assert_ne!(other.id, "stale-id");
    }

    #[tokio::test]
    async fn test_grant_consent_persists() {
        let store = SessionStore::new(Duration::from_secs(60));
        let (session, _) = store.resume_or_start(None).await;

        store.grant_consent(&session.id).await.unwrap();
        let stored = store.get(&session.id).await.unwrap();
        assert!(stored.consent.is_granted());

        assert!(matches!(
            store.grant_consent("missing").await,
            Err(TrackerError::NotFound(_))
        ));
    }

    #[test]
    fn test_token_bound_to_session() {
        let tokens = AntiForgery::new("test_secret_key_32_bytes_long!!", 60);
        let token = tokens.issue("session-a").unwrap();

        assert!(tokens.verify(Some(&token), Some("session-a")).is_ok());
        assert!(tokens.verify(Some(&token), Some("session-b")).is_err());
        assert!(tokens.verify(Some(&token), None).is_err());
        assert!(tokens.verify(None, Some("session-a")).is_err());
        assert!(tokens.verify(Some("garbage"), Some("session-a")).is_err());
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let ours = AntiForgery::new("secret-one-secret-one-secret-one", 60);
        let theirs = AntiForgery::new("secret-two-secret-two-secret-two", 60);
        let token = theirs.issue("s").unwrap();
        assert!(ours.verify(Some(&token), Some("s")).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let tokens = AntiForgery::new("test_secret_key_32_bytes_long!!", 60);
        let now = Utc::now().timestamp();
        let claims = AntiForgeryClaims {
            sub: "s".into(),
            iat: now - 7200,
            exp: now - 3600,
            jti: "x".into(),
            token_type: TOKEN_TYPE.into(),
        };
        let token = encode(&Header::default(), &claims, &tokens.encoding_key).unwrap();
        assert!(tokens.verify(Some(&token), Some("s")).is_err());
    }
}
