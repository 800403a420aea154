//! SMS Relay - hands forwarded text messages to on-demand readers.
//!
//! An unattended SMS forwarder posts each message to a webhook. The relay
//! keeps it in an expiring store keyed by phone number until a reader asks
//! for it once, or until the retention window runs out.

pub mod api;
pub mod config;
pub mod error;
pub mod normalize;
pub mod relay;

pub use config::Config;
pub use error::RelayError;
pub use normalize::normalize_sender;
pub use relay::{Ack, Delivered, SmsRelay};
