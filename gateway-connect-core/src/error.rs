//! Error types for connectors.
//!
//! Every failure maps to one of these variants. Connect failures are retried
//! by the connection worker; everything on the message path is logged and
//! the message dropped.

use thiserror::Error;

/// Result type alias for connector operations
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Errors produced by connectors and the runtime
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Network or authentication failure while connecting to the broker
    #[error("Connect error: {message}")]
    Connect {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Payload could not be decoded into a structured body
    #[error("Decode error: {message}")]
    Decode { message: String, payload: Vec<u8> },

    /// A converter failed while producing a record
    #[error("Converter error: {0}")]
    Converter(String),

    /// The storage sink rejected a record
    #[error("Sink error: {0}")]
    Sink(String),

    /// Invalid or unsupported configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ConnectorError {
    /// Create a connect error
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connect error with a source
    pub fn connect_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connect {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a decode error keeping the offending payload
    pub fn decode(message: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self::Decode {
            message: message.into(),
            payload: payload.into(),
        }
    }

    /// Create a converter error
    pub fn converter(message: impl Into<String>) -> Self {
        Self::Converter(message.into())
    }

    /// Create a sink error
    pub fn sink(message: impl Into<String>) -> Self {
        Self::Sink(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Decode { .. } => "decode",
            Self::Converter(_) => "converter",
            Self::Sink(_) => "sink",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
        }
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
