//! MQTT source connector for the data-collection gateway.
//!
//! Connects to one broker, subscribes to the configured topic filters and
//! turns every delivered message into storage records through the converters
//! mapped to its filter.
//!
//! Custom converters are registered on a [`ConverterRegistry`] before the
//! connector is built:
//!
//! ```rust,no_run
//! use gateway_connect_core::{ConnectorResult, Converter, LoggingSink, Record};
//! use gateway_source_mqtt::{ConverterRegistry, MqttConnector, MqttConnectorConfig, TopicMapping};
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! # async fn run() -> ConnectorResult<()> {
//! let mut registry = ConverterRegistry::new();
//! registry.register("celsius", |_: &TopicMapping| {
//!     Ok(Box::new(|body: &Value| -> ConnectorResult<Option<Record>> {
//!         let Some(f) = body["f"].as_f64() else { return Ok(None) };
//!         Ok(Some(Record::from_json(&json!({"celsius": (f - 32.0) * 5.0 / 9.0}))?))
//!     }) as Box<dyn Converter>)
//! });
//!
//! let config = MqttConnectorConfig::load()?;
//! let mut connector = MqttConnector::new(config, &registry, Arc::new(LoggingSink))?;
//! connector.open().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connector;
pub mod converter;
pub mod decoder;
pub mod forwarder;
pub mod router;
pub mod session;

pub use config::{BrokerConfig, ConverterSpec, Credentials, MqttConnectorConfig, QoS, TopicMapping};
pub use connector::{ConnectionState, MqttConnector};
pub use converter::{ConverterFactory, ConverterRegistry, JsonConverter, JSON_CONVERTER};
pub use forwarder::Forwarder;
pub use router::{SubscriptionTable, TopicRouter};
pub use session::{BrokerEvent, BrokerSession, RumqttSession};
