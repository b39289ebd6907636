//! Forwarding of converted records to the gateway's storage sink.

use gateway_connect_core::{ConnectorMetrics, Record, StorageSink};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error};

/// Hands records to the sink, tagged with the connector's display name
pub struct Forwarder {
    connector_name: String,
    sink: Arc<dyn StorageSink>,
    metrics: ConnectorMetrics,
}

impl Forwarder {
    /// Create a forwarder for the named connector
    pub fn new(connector_name: impl Into<String>, sink: Arc<dyn StorageSink>) -> Self {
        let connector_name = connector_name.into();
        let metrics = ConnectorMetrics::new(&connector_name);
        Self {
            connector_name,
            sink,
            metrics,
        }
    }

    /// Metrics labelled with the connector name
    pub fn metrics(&self) -> &ConnectorMetrics {
        &self.metrics
    }

    /// Send a record to the sink
    ///
    /// A sink failure is logged and the record is lost; it never reaches the
    /// caller.
    pub async fn forward(&self, record: Record) {
        let start = Instant::now();

        match self.sink.ingest(&self.connector_name, record).await {
            Ok(()) => {
                self.metrics.record_forwarded();
                self.metrics.record_processing_time(start.elapsed());
                debug!("{} forwarded record to storage", self.connector_name);
            }
            Err(e) => {
                error!(
                    "{} failed to forward record to storage: {}",
                    self.connector_name, e
                );
                self.metrics.record_error(e.kind());
            }
        }
    }
}
