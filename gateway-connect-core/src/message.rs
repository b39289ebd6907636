//! Message and record types.
//!
//! A [`Message`] is what a connector receives from the external system. A
//! [`Record`] is the normalized shape handed to the gateway's storage sink.

use crate::{ConnectorError, ConnectorResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Message delivered by the external system on a concrete topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Concrete topic the message was published on (no wildcards)
    pub topic: String,
    /// Raw payload bytes
    pub payload: Vec<u8>,
}

impl Message {
    /// Create a new message
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Get the payload size in bytes
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }

    /// Get the payload as a UTF-8 string (if valid)
    pub fn payload_str(&self) -> ConnectorResult<&str> {
        std::str::from_utf8(&self.payload).map_err(|e| {
            ConnectorError::decode(
                format!("Payload is not valid UTF-8: {}", e),
                self.payload.clone(),
            )
        })
    }

    /// Deserialize the payload as JSON
    pub fn payload_json<T: DeserializeOwned>(&self) -> ConnectorResult<T> {
        let text = self.payload_str()?;
        serde_json::from_str(text).map_err(|e| {
            ConnectorError::decode(
                format!("Failed to deserialize JSON: {}", e),
                self.payload.clone(),
            )
        })
    }
}

/// Normalized record forwarded to the storage sink
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    /// Structured record content
    pub data: Map<String, Value>,
    /// Source metadata attached by the connector
    pub attributes: HashMap<String, String>,
}

impl Record {
    /// Create a record from a JSON object
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            data,
            attributes: HashMap::new(),
        }
    }

    /// Create a record from any JSON-serializable object
    pub fn from_json<T: Serialize>(data: &T) -> ConnectorResult<Self> {
        match serde_json::to_value(data)? {
            Value::Object(map) => Ok(Self::new(map)),
            other => Err(ConnectorError::Serialization(format!(
                "Record must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Add an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Get a field of the record content
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Get a specific attribute value
    pub fn get_attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|s| s.as_str())
    }

    /// Check whether the record carries no content
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Serialize the record content to a JSON value
    pub fn to_value(&self) -> Value {
        Value::Object(self.data.clone())
    }
}

/// Human readable JSON type name, used in error messages
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
