//! Dashboard client core for MQTT-over-WebSocket IoT devices
//!
//! Connects to a broker over secure WebSockets, keeps the latest telemetry
//! reading from a sensor topic, and publishes on/off commands to actuator
//! topics. Delivery is fire-and-forget end to end and connection recovery
//! is always an explicit request, never automatic.
//!
//! ## Architecture
//!
//! - [`transport`] - the `Transport` seam and the MQTT-over-WSS link
//! - [`telemetry`] - topic routing and telemetry frame decoding
//! - [`command`] - actuator command dispatch and notifications
//! - [`client`] - the facade tying the pieces together
//! - [`config`] - TOML configuration with env-resolved credentials
//! - [`observability`] - structured logging setup

pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod observability;
pub mod telemetry;
pub mod testing;
pub mod transport;

pub use client::{DashboardClient, RECONNECT_SETTLE_DELAY};
pub use command::{CommandDispatcher, NotificationEvent, COMMAND_OFF, COMMAND_ON};
pub use config::DashboardConfig;
pub use error::{ClientError, ClientResult, CommandError};
pub use telemetry::{TelemetryReading, TopicRouter};
pub use transport::mqtt::{ClientIdentity, ConnectionStatus, MqttError};
pub use transport::{Transport, WssTransport};
