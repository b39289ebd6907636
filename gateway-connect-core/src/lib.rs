//! # Gateway Connect Core
//!
//! Core SDK for building connectors that feed a data-collection gateway.
//!
//! A connector maintains a connection to an external system, turns what it
//! receives into normalized [`Record`]s and hands them to the gateway's
//! [`StorageSink`]. This crate provides the shared pieces: configuration,
//! errors, record types, the converter and sink capabilities, reconnect
//! backoff, metrics and a lifecycle runtime.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gateway_connect_core::{Connector, ConnectorConfig, ConnectorResult, ConnectorRuntime};
//! use async_trait::async_trait;
//!
//! pub struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     fn name(&self) -> &str {
//!         "my-connector"
//!     }
//!
//!     async fn open(&mut self) {
//!         // Connect and start receiving
//!     }
//!
//!     async fn close(&mut self) {
//!         // Disconnect
//!     }
//!
//!     fn is_connected(&self) -> bool {
//!         true
//!     }
//! }
//!
//! # async fn run() -> ConnectorResult<()> {
//! let mut runtime = ConnectorRuntime::new(MyConnector, ConnectorConfig::default())?;
//! runtime.run().await
//! # }
//! ```

mod config;
mod error;
mod message;
mod metrics;
mod retry;
mod runtime;
mod sink;
mod traits;

// Re-export public API
pub use config::ConnectorConfig;
pub use error::{ConnectorError, ConnectorResult};
pub use message::{json_type_name, Message, Record};
pub use crate::metrics::ConnectorMetrics;
pub use retry::ReconnectPolicy;
pub use runtime::ConnectorRuntime;
pub use sink::{ChannelSink, LoggingSink};
pub use traits::{Connector, Converter, StorageSink};

// Re-exported so connectors share the same cancellation type
pub use tokio_util::sync::CancellationToken;

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
