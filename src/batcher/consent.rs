//! Client-side consent prompt.
//!
//! The acceptance is mirrored in the tab's session storage so the prompt is
//! not shown again in that browser until the flag is cleared.

use async_trait::async_trait;
use tracing::{debug, error};

use super::storage::ClientStorage;
use crate::errors::Result;

pub const CONSENT_STORAGE_KEY: &str = "vr_consent";
const CONSENT_GRANTED: &str = "true";

/// Transport to the server's consent endpoint.
#[async_trait(?Send)]
pub trait ConsentSender {
    async fn send_consent(&self) -> Result<()>;
}

pub struct ConsentPrompt<S, C> {
    storage: S,
    sender: C,
}

impl<S, C> ConsentPrompt<S, C>
where
    S: ClientStorage,
    C: ConsentSender,
{
    pub fn new(storage: S, sender: C) -> Self {
        Self { storage, sender }
    }

    pub fn consent_given(&self) -> bool {
        self.storage.get_item(CONSENT_STORAGE_KEY).as_deref() == Some(CONSENT_GRANTED)
    }

    /// `consent_prompt` is the server's page-view answer.
    pub fn should_prompt(&self, consent_prompt: bool) -> bool {
        consent_prompt && !self.consent_given()
    }

    /// Stores the flag first; a failed notification does not undo it.
    pub async fn accept(&self) -> Result<()> {
        self.storage
            .set_item(CONSENT_STORAGE_KEY, CONSENT_GRANTED.to_string());
        debug!("Visitor accepted tracking, consent flag stored");

        self.sender.send_consent().await.inspect_err(|e| {
            error!("Consent notification failed: {}", e);
        })
    }
}
