//! Core traits implemented by connectors and their collaborators.

use crate::{ConnectorResult, Record};
use async_trait::async_trait;
use serde_json::Value;

/// Lifecycle surface of a connector, driven by [`ConnectorRuntime`](crate::ConnectorRuntime)
///
/// # Example
///
/// ```rust,ignore
/// #[async_trait]
/// impl Connector for MyConnector {
///     fn name(&self) -> &str {
///         &self.name
///     }
///
///     async fn open(&mut self) {
///         // Start background work, return once connected
///     }
///
///     async fn close(&mut self) {
///         // Stop background work
///     }
///
///     fn is_connected(&self) -> bool {
///         true
///     }
/// }
/// ```
#[async_trait]
pub trait Connector: Send {
    /// Display name used for logging and for tagging forwarded records
    fn name(&self) -> &str;

    /// Start the connector
    ///
    /// Blocks until the first successful connection to the external system
    /// (or until the connector is closed), then returns while the connection
    /// keeps running in the background. Failures are logged, never returned.
    async fn open(&mut self);

    /// Stop the connector and release the external connection
    ///
    /// Must be idempotent.
    async fn close(&mut self);

    /// Current connectivity
    fn is_connected(&self) -> bool;
}

/// Maps a decoded message body to zero or one record
///
/// Returning `Ok(None)` means "nothing to forward" for this message.
pub trait Converter: Send + Sync {
    /// Convert a decoded body
    fn convert(&self, body: &Value) -> ConnectorResult<Option<Record>>;
}

impl<F> Converter for F
where
    F: Fn(&Value) -> ConnectorResult<Option<Record>> + Send + Sync,
{
    fn convert(&self, body: &Value) -> ConnectorResult<Option<Record>> {
        self(body)
    }
}

/// Storage capability owned by the gateway
///
/// Called from the connector's worker task, one record at a time.
#[async_trait]
pub trait StorageSink: Send + Sync {
    /// Store a record produced by the named connector
    async fn ingest(&self, connector_name: &str, record: Record) -> ConnectorResult<()>;
}
