//! Reconnect backoff.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fixed-interval reconnect policy
///
/// Attempts are unbounded: the connector keeps retrying until it is stopped.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    interval: Duration,
}

impl ReconnectPolicy {
    /// Create a policy with the given delay between attempts
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Delay between attempts
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleep for one interval
    ///
    /// Returns `false` when `shutdown` fired before the interval elapsed.
    pub async fn wait(&self, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(self.interval) => true,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
