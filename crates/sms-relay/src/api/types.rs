//! API request and response types.

use serde::{Deserialize, Deserializer, Serialize};

/// Message pushed by the SMS forwarder, e.g.
/// `{"from": "sms_13800138000", "content": "code 123456"}`.
#[derive(Debug, Default, Deserialize)]
pub struct IngestRequest {
    /// Sender identifier, optionally prefixed with a channel tag.
    /// Some forwarders send the bare number as a JSON number.
    #[serde(default, deserialize_with = "sender_text")]
    pub from: Option<String>,

    /// Message text
    pub content: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSender {
    Text(String),
    Number(u64),
}

fn sender_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawSender>::deserialize(deserializer)?.map(|raw| match raw {
        RawSender::Text(text) => text,
        RawSender::Number(number) => number.to_string(),
    }))
}

/// A consumed message.
#[derive(Debug, Serialize)]
pub struct DeliveredResponse {
    pub status: &'static str,
    pub phone: String,
    pub msg: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
    pub backend: &'static str,
}
