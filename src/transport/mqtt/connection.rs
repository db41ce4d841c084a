//! Connection state and session configuration for the MQTT link
//!
//! Pure types and functions: the connection status enum, connect options,
//! client identity generation, and translation of broker configuration into
//! rumqttc options. No I/O happens here.

use crate::config::BrokerSection;
use rand::Rng;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Connection status of the dashboard client.
///
/// A single authoritative value per client instance, mutated only by the
/// connection manager and published to observers over a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No session is active and none is being established
    Disconnected,
    /// A connect request is in flight, waiting for broker acknowledgement
    Connecting,
    /// Session established, subscriptions issued, commands may be published
    Connected,
    /// The session dropped mid-flight; recovery requires a manual reconnect
    Lost,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Lost => "lost",
        };
        f.write_str(label)
    }
}

/// Options for a connect attempt.
///
/// Secure transport is mandatory; the flag exists so the refusal is explicit
/// rather than silent when a caller tries to turn it off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub use_secure_transport: bool,
    /// How long to wait for broker acknowledgement before giving up
    pub timeout_secs: u64,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            use_secure_transport: true,
            timeout_secs: 10,
        }
    }
}

/// Opaque broker registration identity, generated once per client instance.
///
/// The wire format is a fixed namespace prefix followed by a random integer
/// in `[0, 1_000_000)`. Not guaranteed globally unique; the collision
/// probability is accepted, not mitigated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub const DEFAULT_NAMESPACE: &'static str = "webclient_";

    pub fn generate(namespace: &str) -> Self {
        let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
        Self(format!("{namespace}{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transport-level errors for the MQTT link
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),
    #[error("publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("secure transport is mandatory, refusing: {0}")]
    InsecureTransport(String),
    #[error("not connected - current status: {status}")]
    NotConnected { status: ConnectionStatus },
    #[error("a connect attempt is already in flight")]
    AlreadyConnecting,
    #[error("a session is already active")]
    SessionActive,
}

/// Translate broker configuration into rumqttc options.
///
/// Refuses anything but a `wss://` endpoint: the client never offers an
/// insecure fallback. Credentials are resolved from the environment at
/// session-open time, not at config-load time.
pub fn configure_mqtt_options(
    identity: &ClientIdentity,
    broker: &BrokerSection,
    options: &ConnectOptions,
) -> Result<MqttOptions, MqttError> {
    if !options.use_secure_transport {
        return Err(MqttError::InsecureTransport(
            "secure transport disabled in connect options".to_string(),
        ));
    }

    let url = Url::parse(&broker.url).map_err(|_| MqttError::InvalidBrokerUrl(broker.url.clone()))?;
    if url.host_str().is_none() {
        return Err(MqttError::InvalidBrokerUrl(broker.url.clone()));
    }
    if url.scheme() != "wss" {
        return Err(MqttError::InsecureTransport(broker.url.clone()));
    }
    let port = url.port().unwrap_or(443);

    // rumqttc takes the full URL as the broker address for websocket transports
    let mut mqtt_options = MqttOptions::new(identity.as_str(), broker.url.clone(), port);
    mqtt_options.set_transport(RumqttcTransport::wss_with_default_config());
    mqtt_options.set_keep_alive(Duration::from_secs(60));

    if let Some((username, password)) = broker.credentials() {
        mqtt_options.set_credentials(&username, &password);
    }

    Ok(mqtt_options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_broker() -> BrokerSection {
        BrokerSection {
            url: "wss://broker.hivemq.com:8884/mqtt".to_string(),
            timeout_secs: 10,
            username_env: None,
            password_env: None,
        }
    }

    #[test]
    fn test_identity_has_namespace_and_numeric_suffix() {
        let identity = ClientIdentity::generate(ClientIdentity::DEFAULT_NAMESPACE);
        let suffix = identity
            .as_str()
            .strip_prefix("webclient_")
            .expect("identity should carry the namespace prefix");
        let n: u32 = suffix.parse().expect("suffix should be numeric");
        assert!(n < 1_000_000);
    }

    #[test]
    fn test_identity_custom_namespace() {
        let identity = ClientIdentity::generate("dash-");
        assert!(identity.as_str().starts_with("dash-"));
    }

    #[test]
    fn test_connect_options_default() {
        let options = ConnectOptions::default();
        assert!(options.use_secure_transport);
        assert_eq!(options.timeout_secs, 10);
    }

    #[test]
    fn test_configure_mqtt_options_accepts_wss() {
        let identity = ClientIdentity::generate(ClientIdentity::DEFAULT_NAMESPACE);
        let result = configure_mqtt_options(&identity, &test_broker(), &ConnectOptions::default());
        assert!(result.is_ok());
    }

    #[test]
    fn test_configure_mqtt_options_refuses_insecure_schemes() {
        let identity = ClientIdentity::generate(ClientIdentity::DEFAULT_NAMESPACE);
        for url in ["ws://broker.hivemq.com:8000/mqtt", "mqtt://localhost:1883"] {
            let mut broker = test_broker();
            broker.url = url.to_string();
            let result = configure_mqtt_options(&identity, &broker, &ConnectOptions::default());
            assert!(
                matches!(result, Err(MqttError::InsecureTransport(_))),
                "{url} should be refused"
            );
        }
    }

    #[test]
    fn test_configure_mqtt_options_refuses_disabled_tls() {
        let identity = ClientIdentity::generate(ClientIdentity::DEFAULT_NAMESPACE);
        let options = ConnectOptions {
            use_secure_transport: false,
            timeout_secs: 10,
        };
        let result = configure_mqtt_options(&identity, &test_broker(), &options);
        assert!(matches!(result, Err(MqttError::InsecureTransport(_))));
    }

    #[test]
    fn test_configure_mqtt_options_rejects_invalid_url() {
        let identity = ClientIdentity::generate(ClientIdentity::DEFAULT_NAMESPACE);
        let mut broker = test_broker();
        broker.url = "not a url".to_string();
        let result = configure_mqtt_options(&identity, &broker, &ConnectOptions::default());
        assert!(matches!(result, Err(MqttError::InvalidBrokerUrl(_))));
    }

    #[test]
    fn test_connection_status_equality() {
        assert_eq!(ConnectionStatus::Connected, ConnectionStatus::Connected);
        assert_ne!(ConnectionStatus::Connected, ConnectionStatus::Lost);
        assert_eq!(ConnectionStatus::Lost.to_string(), "lost");
    }

    #[test]
    fn test_mqtt_error_display() {
        let errors = vec![
            MqttError::HandshakeFailed("timeout".to_string()),
            MqttError::InvalidBrokerUrl("nope".to_string()),
            MqttError::InsecureTransport("ws://x".to_string()),
            MqttError::NotConnected {
                status: ConnectionStatus::Lost,
            },
            MqttError::AlreadyConnecting,
            MqttError::SessionActive,
        ];
        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
