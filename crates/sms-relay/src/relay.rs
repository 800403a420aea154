//! Ingest and retrieval handlers on top of the message store.

use crate::error::RelayError;
use crate::normalize::normalize_sender;
use sms_store::{ConnectionState, Store};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Default retention window for a message.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Acknowledgement of an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    /// Canonical key the message was stored under
    pub phone: String,
}

/// A message handed to its reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub phone: String,
    pub body: String,
}

/// Relays messages from a forwarding source to readers.
#[derive(Clone)]
pub struct SmsRelay {
    store: Arc<Store>,
    ttl: Duration,
}

impl SmsRelay {
    pub fn new(store: Arc<Store>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Store `body` for the phone number in `raw_sender`, replacing any
    /// message still waiting for that number.
    pub async fn ingest(&self, raw_sender: &str, body: &str) -> Result<Ack, RelayError> {
        if body.is_empty() {
            return Err(RelayError::MalformedPayload);
        }

        let phone = normalize_sender(raw_sender);
        if phone.is_empty() {
            warn!(sender = %raw_sender, "Sender has no phone number");
            return Err(RelayError::InvalidSender(raw_sender.to_string()));
        }

        self.store.put(&phone, body, self.ttl).await?;

        info!(phone = %phone, ttl = ?self.ttl, "Message received and cached");
        Ok(Ack { phone })
    }

    /// Hand out the waiting message for `phone` and forget it.
    ///
    /// `phone` must already be canonical; it is not normalized here.
    pub async fn retrieve(&self, phone: &str) -> Result<Delivered, RelayError> {
        if phone.is_empty() {
            return Err(RelayError::NotFound(String::new()));
        }

        match self.store.take_if_present(phone).await? {
            Some(body) => {
                info!(phone = %phone, "Message delivered");
                Ok(Delivered {
                    phone: phone.to_string(),
                    body,
                })
            }
            None => Err(RelayError::NotFound(phone.to_string())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store_state(&self) -> ConnectionState {
        self.store.state()
    }

    pub fn store_backend(&self) -> &'static str {
        self.store.backend()
    }
}
