//! MQTT Source Connector for the data-collection gateway
//!
//! Subscribes to MQTT topic filters and hands the converted records to the
//! gateway's storage.

use gateway_connect_core::{ConnectorResult, ConnectorRuntime, LoggingSink};
use gateway_source_mqtt::{ConverterRegistry, MqttConnector, MqttConnectorConfig};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ConnectorResult<()> {
    // Initialize logging
    init_tracing();

    tracing::info!("Starting MQTT Source Connector");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = MqttConnectorConfig::load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    config.validate()?;

    tracing::info!("Configuration loaded successfully");
    tracing::info!("Broker: {}", config.broker.address());
    tracing::info!("Topic mappings: {}", config.mapping.len());
    for mapping in &config.mapping {
        tracing::info!("  - {} ({:?})", mapping.topic_filter, mapping.converter);
    }

    // Create connector instance
    let registry = ConverterRegistry::new();
    let connector = MqttConnector::new(config.clone(), &registry, Arc::new(LoggingSink))?;

    // Create and run the runtime
    let mut runtime = ConnectorRuntime::new(connector, config.core)?;

    // Run until shutdown signal
    runtime.run().await?;

    tracing::info!("MQTT Source Connector stopped");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,gateway_source_mqtt=debug"));

    // The runtime installs its own subscriber when this one is absent
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init();
}
