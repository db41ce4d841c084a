//! Actuator command dispatch
//!
//! Translates a boolean intent for a named actuator into a topic publish.
//! The connectivity guard runs first: no publish is attempted unless the
//! status is `Connected`, and nothing is queued or retried on failure.

use crate::error::CommandError;
use crate::transport::mqtt::ConnectionStatus;
use crate::transport::Transport;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Wire value published to switch an actuator on
pub const COMMAND_ON: &str = "ON";
/// Wire value published to switch an actuator off
pub const COMMAND_OFF: &str = "OFF";

/// How long a notification stays visible before it auto-expires
pub const NOTIFICATION_VISIBLE_FOR: Duration = Duration::from_secs(3);

/// Transient user-facing message raised once per dispatched command.
/// Auto-expires; no acknowledgement required.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    pub message: String,
    pub raised_at: DateTime<Utc>,
    pub visible_for: Duration,
}

impl NotificationEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            raised_at: Utc::now(),
            visible_for: NOTIFICATION_VISIBLE_FOR,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.raised_at + chrono::Duration::milliseconds(self.visible_for.as_millis() as i64)
    }
}

/// Dispatches actuator commands through the transport.
///
/// The actuator -> topic map is fixed at configuration time; an unknown
/// identifier is a caller error and fails fast.
pub struct CommandDispatcher {
    actuators: HashMap<String, String>,
}

impl CommandDispatcher {
    pub fn new(actuators: HashMap<String, String>) -> Self {
        Self { actuators }
    }

    pub fn topic_for(&self, actuator: &str) -> Result<&str, CommandError> {
        self.actuators
            .get(actuator)
            .map(String::as_str)
            .ok_or_else(|| CommandError::UnknownActuator(actuator.to_string()))
    }

    /// Publish the desired state for an actuator, fire-and-forget.
    ///
    /// Returns the notification describing the action on success. Fails with
    /// `NotConnected` before any publish is attempted when the status is
    /// not `Connected`, and with `PublishFailed` on a transport rejection.
    pub async fn dispatch<T: Transport + ?Sized>(
        &self,
        transport: &T,
        actuator: &str,
        desired: bool,
    ) -> Result<NotificationEvent, CommandError> {
        let topic = self.topic_for(actuator)?;

        let status = transport.status();
        if status != ConnectionStatus::Connected {
            return Err(CommandError::NotConnected { status });
        }

        let wire = if desired { COMMAND_ON } else { COMMAND_OFF };
        transport
            .publish(topic, wire.as_bytes())
            .await
            .map_err(|e| match e {
                crate::transport::mqtt::MqttError::NotConnected { status } => {
                    CommandError::NotConnected { status }
                }
                other => CommandError::PublishFailed(other),
            })?;

        debug!(actuator, topic, wire, "command published");
        Ok(NotificationEvent::new(format!(
            "{actuator} switched {}",
            if desired { "on" } else { "off" }
        )))
    }
}
