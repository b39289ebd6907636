//! Payload decoding.

use gateway_connect_core::{ConnectorResult, Message};
use serde_json::Value;

/// Decode a payload as UTF-8 JSON
///
/// Invalid UTF-8 or invalid JSON yields `ConnectorError::Decode` carrying the
/// raw payload.
pub fn decode(message: &Message) -> ConnectorResult<Value> {
    message.payload_json()
}
