//! Runtime for managing connector lifecycle.
//!
//! The runtime handles:
//! - Tracing setup
//! - Opening the connector
//! - Waiting for a shutdown signal (ctrl-c or an external token)
//! - Graceful shutdown

use crate::{Connector, ConnectorConfig, ConnectorResult};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Runtime driving a single [`Connector`] from open to close
pub struct ConnectorRuntime<C: Connector> {
    connector: C,
    config: ConnectorConfig,
    shutdown: CancellationToken,
}

impl<C: Connector> ConnectorRuntime<C> {
    /// Create a new runtime
    pub fn new(connector: C, config: ConnectorConfig) -> ConnectorResult<Self> {
        // Validate configuration
        config.validate()?;

        // Initialize tracing
        Self::init_tracing(&config);

        info!("Initializing Connector Runtime");
        info!("Connector: {}", connector.name());

        Ok(Self {
            connector,
            config,
            shutdown: CancellationToken::new(),
        })
    }

    /// Token that stops the runtime when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Access the managed connector
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Run the connector until shutdown
    pub async fn run(&mut self) -> ConnectorResult<()> {
        info!("Starting Connector Runtime");
        info!(
            "Reconnect interval: {:?}",
            self.config.reconnect_interval()
        );

        // Setup shutdown handler
        self.setup_shutdown_handler();

        // Open connector, shutdown may arrive before the first connection
        tokio::select! {
            _ = self.connector.open() => {
                info!("Connector {} is running", self.connector.name());
            }
            _ = self.shutdown.cancelled() => {
                info!("Shutdown requested before {} connected", self.connector.name());
            }
        }

        self.shutdown.cancelled().await;

        // Graceful shutdown
        info!("Shutting down connector");
        self.connector.close().await;
        info!("Connector Runtime stopped");

        Ok(())
    }

    /// Setup shutdown signal handler for SIGINT
    fn setup_shutdown_handler(&self) {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    match result {
                        Ok(()) => info!("Received shutdown signal"),
                        Err(e) => error!("Failed to listen for ctrl-c: {}", e),
                    }
                    shutdown.cancel();
                }
                _ = shutdown.cancelled() => {}
            }
        });
    }

    /// Initialize tracing/logging
    fn init_tracing(config: &ConnectorConfig) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .ok(); // Ignore if already initialized
    }
}
