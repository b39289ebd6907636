//! Configuration for the MQTT Source Connector

use crate::router::validate_topic_filter;
use gateway_connect_core::{ConnectorConfig, ConnectorError, ConnectorResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Unified configuration for MQTT Source Connector
///
/// Combines the core connector settings with the broker connection and the
/// topic mappings in a single file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConnectorConfig {
    /// Core connector configuration (flattened at root level)
    #[serde(flatten)]
    pub core: ConnectorConfig,

    /// Broker connection settings
    pub broker: BrokerConfig,

    /// Topic filter to converter mappings
    #[serde(default)]
    pub mapping: Vec<TopicMapping>,
}

impl MqttConnectorConfig {
    /// Load configuration from a file with optional ENV overrides
    ///
    /// Priority: file named by `CONFIG_FILE` → environment variables
    ///
    /// # Example
    ///
    /// ```toml
    /// log_level = "info"
    ///
    /// [broker]
    /// host = "mosquitto"
    /// port = 1883
    /// name = "Site A broker"
    ///
    /// [broker.credentials]
    /// type = "basic"
    /// username = "gateway"
    /// password = "secret"
    ///
    /// [[mapping]]
    /// topicFilter = "sensors/+/temp"
    /// converter = { type = "json" }
    /// ```
    pub fn load() -> ConnectorResult<Self> {
        let mut config = if let Ok(config_file) = env::var("CONFIG_FILE") {
            Self::from_file(&config_file)?
        } else {
            Self::from_env()?
        };

        config.core.apply_env_overrides();
        config.broker.apply_env_overrides();

        Ok(config)
    }

    /// Load configuration from a TOML or JSON file (chosen by extension)
    pub fn from_file(path: &str) -> ConnectorResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConnectorError::config(format!("Failed to read config file {}: {}", path, e))
        })?;

        let is_json = Path::new(path)
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            Self::from_json_str(&content).map_err(|e| {
                ConnectorError::config(format!("Failed to parse config file {}: {}", path, e))
            })
        } else {
            toml::from_str(&content).map_err(|e| {
                ConnectorError::config(format!("Failed to parse config file {}: {}", path, e))
            })
        }
    }

    /// Parse configuration from a JSON document
    pub fn from_json_str(content: &str) -> ConnectorResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| ConnectorError::config(format!("Invalid JSON configuration: {}", e)))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> ConnectorResult<Self> {
        Ok(Self {
            core: ConnectorConfig::from_env()?,
            broker: BrokerConfig::from_env()?,
            mapping: mappings_from_env()?,
        })
    }

    /// Validate all configuration
    pub fn validate(&self) -> ConnectorResult<()> {
        self.core.validate()?;
        self.broker.validate()?;

        if self.mapping.is_empty() {
            return Err(ConnectorError::config(
                "At least one topic mapping is required",
            ));
        }

        for mapping in &self.mapping {
            mapping.validate()?;
        }

        Ok(())
    }
}

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// MQTT broker host
    pub host: String,

    /// MQTT broker port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Authentication mode
    #[serde(default)]
    pub credentials: Credentials,

    /// Display name used for logging and for tagging forwarded records
    #[serde(default)]
    pub name: Option<String>,

    /// Client ID for the MQTT session (random when absent)
    #[serde(default)]
    pub client_id: Option<String>,

    /// Keep alive interval in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Clean session on connect
    #[serde(default = "default_true")]
    pub clean_session: bool,

    /// Maximum packet size in bytes
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,

    /// Default subscription QoS
    #[serde(default)]
    pub qos: QoS,
}

fn default_port() -> u16 {
    1883
}

fn default_keep_alive() -> u64 {
    60
}

fn default_max_packet_size() -> usize {
    10 * 1024 * 1024 // 10MB
}

fn default_true() -> bool {
    true
}

impl BrokerConfig {
    /// Load broker settings from environment variables
    ///
    /// Environment variables:
    /// - `MQTT_BROKER_HOST`: Required, MQTT broker hostname
    /// - `MQTT_BROKER_PORT`: Optional, broker port (default: 1883)
    /// - `MQTT_USERNAME` / `MQTT_PASSWORD`: Optional, enables basic authentication
    /// - `MQTT_BROKER_NAME`: Optional, display name
    /// - `MQTT_CLIENT_ID`: Optional, client identifier
    /// - `MQTT_QOS`: Optional, subscription QoS 0-1 (default: 0)
    pub fn from_env() -> ConnectorResult<Self> {
        let host = env::var("MQTT_BROKER_HOST")
            .map_err(|_| ConnectorError::config("MQTT_BROKER_HOST is required"))?;

        let port = env::var("MQTT_BROKER_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1883);

        let credentials = match env::var("MQTT_USERNAME") {
            Ok(username) => Credentials::Basic {
                username,
                password: env::var("MQTT_PASSWORD").unwrap_or_default(),
            },
            Err(_) => Credentials::Anonymous,
        };

        let qos = qos_from_env().unwrap_or_default();

        Ok(Self {
            host,
            port,
            credentials,
            name: env::var("MQTT_BROKER_NAME").ok(),
            client_id: env::var("MQTT_CLIENT_ID").ok(),
            keep_alive_secs: default_keep_alive(),
            clean_session: true,
            max_packet_size: default_max_packet_size(),
            qos,
        })
    }

    /// Apply environment variable overrides to broker settings
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("MQTT_BROKER_HOST") {
            self.host = val;
        }
        if let Ok(val) = env::var("MQTT_BROKER_PORT") {
            if let Ok(port) = val.parse() {
                self.port = port;
            }
        }
        if let Ok(username) = env::var("MQTT_USERNAME") {
            let password = env::var("MQTT_PASSWORD").unwrap_or_default();
            self.credentials = Credentials::Basic { username, password };
        }
        if let Ok(val) = env::var("MQTT_BROKER_NAME") {
            self.name = Some(val);
        }
        if let Ok(val) = env::var("MQTT_CLIENT_ID") {
            self.client_id = Some(val);
        }
        if let Some(qos) = qos_from_env() {
            self.qos = qos;
        }
    }

    /// Validate the broker settings
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.host.is_empty() {
            return Err(ConnectorError::config("broker host cannot be empty"));
        }

        if self.port == 0 {
            return Err(ConnectorError::config("broker port cannot be 0"));
        }

        if let Credentials::Basic { username, .. } = &self.credentials {
            if username.is_empty() {
                return Err(ConnectorError::config(
                    "basic credentials require a username",
                ));
            }
        }

        if matches!(&self.client_id, Some(id) if id.is_empty()) {
            return Err(ConnectorError::config("client_id cannot be empty"));
        }

        Ok(())
    }

    /// Display name: the configured one, or `Mqtt Broker` plus a random suffix
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Mqtt Broker {}", random_lowercase(5)))
    }

    /// Client ID: the configured one, or 23 random lowercase letters
    pub fn session_client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| random_lowercase(23))
    }

    /// `host:port` for logging
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get MQTT connection options
    pub fn mqtt_options(&self, client_id: &str) -> rumqttc::MqttOptions {
        let mut options = rumqttc::MqttOptions::new(client_id, &self.host, self.port);

        options.set_keep_alive(Duration::from_secs(self.keep_alive_secs));
        options.set_clean_session(self.clean_session);
        options.set_max_packet_size(self.max_packet_size, self.max_packet_size);

        if let Credentials::Basic { username, password } = &self.credentials {
            options.set_credentials(username, password);
        }

        options
    }
}

/// Broker authentication mode
///
/// Any `type` other than `basic` connects anonymously.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Credentials {
    /// Username and password
    Basic {
        username: String,
        #[serde(default)]
        password: String,
    },
    /// No authentication
    #[default]
    #[serde(other)]
    Anonymous,
}

/// MQTT Quality of Service level
///
/// Exactly-once delivery is not offered.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum QoS {
    /// At most once delivery
    #[default]
    AtMostOnce = 0,
    /// At least once delivery
    AtLeastOnce = 1,
}

impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
            QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        }
    }
}

/// Which converter handles messages of a mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConverterSpec {
    /// Built-in JSON converter
    #[default]
    Json,
    /// Converter registered under `extension`
    Custom {
        #[serde(default)]
        extension: Option<String>,
    },
}

impl ConverterSpec {
    /// Registry name the converter is resolved under
    pub fn registry_name(&self) -> ConnectorResult<&str> {
        match self {
            ConverterSpec::Json => Ok(crate::converter::JSON_CONVERTER),
            ConverterSpec::Custom {
                extension: Some(name),
            } if !name.is_empty() => Ok(name.as_str()),
            ConverterSpec::Custom { .. } => Err(ConnectorError::config(
                "custom converter requires an extension name",
            )),
        }
    }
}

/// Topic mapping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicMapping {
    /// MQTT topic filter (supports wildcards: +, #)
    #[serde(rename = "topicFilter", alias = "topic_filter")]
    pub topic_filter: String,

    /// Converter for messages matching the filter
    #[serde(default)]
    pub converter: ConverterSpec,

    /// QoS for this subscription (broker default when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qos: Option<QoS>,
}

impl TopicMapping {
    /// Mapping with the default JSON converter
    pub fn json(topic_filter: impl Into<String>) -> Self {
        Self {
            topic_filter: topic_filter.into(),
            converter: ConverterSpec::Json,
            qos: None,
        }
    }

    /// Validate filter syntax and converter selection
    pub fn validate(&self) -> ConnectorResult<()> {
        validate_topic_filter(&self.topic_filter)?;
        self.converter.registry_name()?;
        Ok(())
    }
}

fn qos_from_env() -> Option<QoS> {
    match env::var("MQTT_QOS").ok()?.trim() {
        "0" => Some(QoS::AtMostOnce),
        "1" => Some(QoS::AtLeastOnce),
        _ => None,
    }
}

/// `MQTT_TOPICS` is a comma-separated list of filters, all using the JSON converter
fn mappings_from_env() -> ConnectorResult<Vec<TopicMapping>> {
    let topics =
        env::var("MQTT_TOPICS").map_err(|_| ConnectorError::config("MQTT_TOPICS is required"))?;

    let mappings: Vec<TopicMapping> = topics
        .split(',')
        .map(str::trim)
        .filter(|topic| !topic.is_empty())
        .map(TopicMapping::json)
        .collect();

    if mappings.is_empty() {
        return Err(ConnectorError::config(
            "At least one topic mapping is required",
        ));
    }

    Ok(mappings)
}

fn random_lowercase(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| rng.random_range(b'a'..=b'z') as char)
        .collect()
}
