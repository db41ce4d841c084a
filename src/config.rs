//! Configuration for the dashboard client
//!
//! Loaded from a TOML file with three sections: `[client]` (identity
//! namespace), `[broker]` (endpoint and credentials), and `[topics]`
//! (the telemetry subscription and the actuator command map). Credentials
//! are referenced by environment-variable name and resolved at connect
//! time, never stored in the file.

use crate::transport::mqtt::ConnectOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use url::Url;

/// Top-level dashboard client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardConfig {
    #[serde(default)]
    pub client: ClientSection,
    pub broker: BrokerSection,
    pub topics: TopicsSection,
}

/// Client identity settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientSection {
    /// Namespace prefix for the generated client identity
    #[serde(default = "default_id_namespace")]
    pub id_namespace: String,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            id_namespace: default_id_namespace(),
        }
    }
}

fn default_id_namespace() -> String {
    "webclient_".to_string()
}

/// Broker endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Secure WebSocket URL of the broker (wss:// only)
    pub url: String,
    /// Handshake timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable containing the username
    pub username_env: Option<String>,
    /// Environment variable containing the password
    pub password_env: Option<String>,
}

fn default_timeout_secs() -> u64 {
    10
}

impl BrokerSection {
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            use_secure_transport: true,
            timeout_secs: self.timeout_secs,
        }
    }

    /// Credentials resolved from the environment at session-open time.
    ///
    /// `None` when no username variable is configured or the variable is
    /// unset; a missing password resolves to an empty string.
    pub fn credentials(&self) -> Option<(String, String)> {
        let username_env = self.username_env.as_ref()?;
        let username = std::env::var(username_env).ok()?;
        let password = self
            .password_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
            .unwrap_or_default();
        Some((username, password))
    }
}

/// Topic bindings: one inbound telemetry topic, N outbound actuator topics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicsSection {
    /// Telemetry topic the client subscribes to
    pub telemetry: String,
    /// Actuator identifier -> command topic, fixed at configuration time
    #[serde(default)]
    pub actuators: HashMap<String, String>,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("insecure broker URL refused (wss:// is mandatory): {0}")]
    InsecureBrokerUrl(String),
}

impl DashboardConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: DashboardConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the broker endpoint. The client refuses to be configured
    /// with an insecure transport.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.broker.url)
            .map_err(|_| ConfigError::InvalidBrokerUrl(self.broker.url.clone()))?;
        if url.host_str().is_none() {
            return Err(ConfigError::InvalidBrokerUrl(self.broker.url.clone()));
        }
        if url.scheme() != "wss" {
            return Err(ConfigError::InsecureBrokerUrl(self.broker.url.clone()));
        }
        Ok(())
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[broker]
url = "wss://broker.hivemq.com:8884/mqtt"

[topics]
telemetry = "brunex/lerSensor"

[topics.actuators]
led1 = "brunex/led1"
led2 = "brunex/led2"
"#;
        toml::from_str(toml_content).expect("test config should parse")
    }
}
