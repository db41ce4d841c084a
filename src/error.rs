//! Error taxonomy for the dashboard client
//!
//! Transport and decode failures are handled locally and surface only as a
//! degraded connection status or a dropped message; the command path is the
//! one place errors are returned synchronously to the caller.

use crate::config::ConfigError;
use crate::transport::mqtt::{ConnectionStatus, MqttError};
use thiserror::Error;

/// Top-level error type for client operations
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] MqttError),

    #[error("command error: {0}")]
    Command(#[from] CommandError),
}

/// Failures on the command path, surfaced synchronously to the caller.
///
/// `NotConnected` and `PublishFailed` are deliberately distinct: the first
/// means no publish was attempted, the second that the transport rejected
/// one. Neither triggers a retry.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("not connected to the broker (status: {status})")]
    NotConnected { status: ConnectionStatus },

    #[error("command publish failed")]
    PublishFailed(#[source] MqttError),

    #[error("unknown actuator: {0}")]
    UnknownActuator(String),
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
