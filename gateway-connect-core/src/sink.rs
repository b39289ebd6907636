//! Ready-made storage sinks.

use crate::{ConnectorError, ConnectorResult, Record, StorageSink};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

/// Sink that emits every record as a structured log line
///
/// Used by the standalone binaries when no gateway storage is attached.
#[derive(Debug, Default, Clone)]
pub struct LoggingSink;

#[async_trait]
impl StorageSink for LoggingSink {
    async fn ingest(&self, connector_name: &str, record: Record) -> ConnectorResult<()> {
        let data = serde_json::to_string(&record.data)?;
        info!(
            connector = connector_name,
            attributes = ?record.attributes,
            "record: {}",
            data
        );
        Ok(())
    }
}

/// Sink that hands records to an in-process consumer over a channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<(String, Record)>,
}

impl ChannelSink {
    /// Create a sink together with the receiving end
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, Record)>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl StorageSink for ChannelSink {
    async fn ingest(&self, connector_name: &str, record: Record) -> ConnectorResult<()> {
        self.sender
            .send((connector_name.to_string(), record))
            .map_err(|_| ConnectorError::sink("Channel sink receiver was dropped"))
    }
}
