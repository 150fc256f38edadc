//! Routing of the JSON envelopes the server sends.
//!
//! Every text message is expected to look like `{"Type": "standard", "Message": "..."}`.
use serde_json::Value;

const KEY_TYPE: &str = "Type";
const KEY_MESSAGE: &str = "Message";

#[derive(Debug, PartialEq, Eq)]
pub enum Routed {
    /// Text to print in the conversation.
    Standard(String),
    /// Text to raise as a user notification.
    Notification(String),
    /// A JSON object without the envelope keys.
    Ignored,
    /// Not JSON, or an unknown message type.
    Invalid,
}

pub fn route(payload: &str) -> Routed {
    let Ok(value) = serde_json::from_str::<Value>(payload) else {
        return Routed::Invalid;
    };

    let (Some(kind), Some(message)) = (value.get(KEY_TYPE), value.get(KEY_MESSAGE)) else {
        return Routed::Ignored;
    };

    let message = match message {
        Value::String(message) => message.clone(),
        other => other.to_string(),
    };

    match kind.as_str() {
        Some("standard") => Routed::Standard(message),
        Some("notification") => Routed::Notification(message),
        _ => Routed::Invalid,
    }
}
