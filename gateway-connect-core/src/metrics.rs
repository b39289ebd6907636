//! Connector metrics.
//!
//! Thin wrapper over the `metrics` facade. Without an installed recorder every
//! call is a no-op.

use ::metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Per-connector metric handles
#[derive(Debug, Clone)]
pub struct ConnectorMetrics {
    connector: String,
}

impl ConnectorMetrics {
    /// Create metrics labelled with the connector name
    pub fn new(connector: &str) -> Self {
        Self {
            connector: connector.to_string(),
        }
    }

    /// A message arrived from the external system
    pub fn record_received(&self) {
        counter!("connector_messages_received_total", "connector" => self.connector.clone())
            .increment(1);
    }

    /// A record reached the storage sink
    pub fn record_forwarded(&self) {
        counter!("connector_records_forwarded_total", "connector" => self.connector.clone())
            .increment(1);
    }

    /// A converter produced no record
    pub fn record_skipped(&self) {
        counter!("connector_records_skipped_total", "connector" => self.connector.clone())
            .increment(1);
    }

    /// A contained failure, labelled by error kind
    pub fn record_error(&self, kind: &'static str) {
        counter!(
            "connector_errors_total",
            "connector" => self.connector.clone(),
            "kind" => kind
        )
        .increment(1);
    }

    /// A reconnect attempt was scheduled
    pub fn record_reconnect(&self) {
        counter!("connector_reconnects_total", "connector" => self.connector.clone())
            .increment(1);
    }

    /// Time spent converting and forwarding one message
    pub fn record_processing_time(&self, duration: Duration) {
        histogram!(
            "connector_processing_seconds",
            "connector" => self.connector.clone()
        )
        .record(duration.as_secs_f64());
    }

    /// Current connectivity as a 0/1 gauge
    pub fn set_connected(&self, connected: bool) {
        gauge!("connector_connected", "connector" => self.connector.clone())
            .set(if connected { 1.0 } else { 0.0 });
    }
}
