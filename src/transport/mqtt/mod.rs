//! MQTT-over-WSS client implementation
//!
//! Split into three focused sub-modules, pure logic separated from I/O:
//!
//! - [`connection`] - connection status, options, identity, and session
//!   configuration (pure)
//! - [`event_router`] - classification of rumqttc events (pure)
//! - [`client`] - the session-owning link and its event task (I/O)

pub mod client;
pub mod connection;
pub mod event_router;

pub use client::MqttLink;
pub use connection::{
    configure_mqtt_options, ClientIdentity, ConnectOptions, ConnectionStatus, MqttError,
};
pub use event_router::{route_event, EventRoute};
