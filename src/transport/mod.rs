//! Transport layer for broker communication
//!
//! This module provides the transport abstraction and the MQTT-over-WSS
//! implementation. The trait exists as a dependency-injection seam so the
//! client facade and command dispatcher can be exercised against a mock
//! without a broker.

use crate::transport::mqtt::{ConnectionStatus, MqttError};
use tokio::sync::{mpsc, watch};

pub mod mqtt;

/// A message delivered by the broker on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Transport trait for broker communication.
///
/// The error type is concrete rather than associated: the command path must
/// be able to tell `NotConnected` from `PublishFailed` on the other side of
/// this seam.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Open a session and wait for broker acknowledgement. The fixed
    /// subscription set is issued before `Connected` becomes observable.
    async fn connect(&mut self) -> Result<(), MqttError>;

    /// Tear down the active session, if any. Idempotent.
    async fn disconnect(&mut self) -> Result<(), MqttError>;

    /// Publish a payload, fire-and-forget. Fails with `NotConnected` unless
    /// the status is `Connected`.
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), MqttError>;

    /// Latest committed connection status
    fn status(&self) -> ConnectionStatus;

    /// Watch handle for status transitions, for observers
    fn status_watch(&self) -> watch::Receiver<ConnectionStatus>;

    /// Install the channel inbound messages are forwarded into
    fn set_inbound_sender(&self, sender: mpsc::Sender<InboundMessage>);
}

/// Type alias for the production transport
pub type WssTransport = mqtt::MqttLink;
