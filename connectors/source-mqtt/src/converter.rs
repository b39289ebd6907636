//! Built-in converters and the converter registry.

use crate::config::TopicMapping;
use gateway_connect_core::{
    json_type_name, ConnectorError, ConnectorResult, Converter, Record,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry name of the built-in JSON converter
pub const JSON_CONVERTER: &str = "json";

/// Builds a converter for a topic mapping
pub type ConverterFactory =
    Arc<dyn Fn(&TopicMapping) -> ConnectorResult<Box<dyn Converter>> + Send + Sync>;

/// Passes JSON objects through as records
///
/// `null` and `{}` produce no record; arrays and scalars are rejected.
#[derive(Debug, Default, Clone)]
pub struct JsonConverter;

impl Converter for JsonConverter {
    fn convert(&self, body: &Value) -> ConnectorResult<Option<Record>> {
        match body {
            Value::Null => Ok(None),
            Value::Object(map) if map.is_empty() => Ok(None),
            Value::Object(map) => Ok(Some(Record::new(map.clone()))),
            other => Err(ConnectorError::converter(format!(
                "expected a JSON object, got {}",
                json_type_name(other)
            ))),
        }
    }
}

/// Converter factories keyed by name
///
/// `json` is always present. Custom converters are registered by the
/// embedding application before the connector is built.
#[derive(Clone)]
pub struct ConverterRegistry {
    factories: HashMap<String, ConverterFactory>,
}

impl ConverterRegistry {
    /// Registry with the built-in converters
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register(JSON_CONVERTER, |_: &TopicMapping| {
            Ok(Box::new(JsonConverter) as Box<dyn Converter>)
        });
        registry
    }

    /// Register a factory under `name`, replacing any previous one
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&TopicMapping) -> ConnectorResult<Box<dyn Converter>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Factory for a mapping's converter
    ///
    /// Fails with a configuration error when the converter is not registered.
    pub fn resolve(&self, mapping: &TopicMapping) -> ConnectorResult<ConverterFactory> {
        let name = mapping.converter.registry_name()?;
        self.factories.get(name).cloned().ok_or_else(|| {
            ConnectorError::config(format!(
                "converter extension {:?} for topicFilter {:?} is not registered",
                name, mapping.topic_filter
            ))
        })
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
