//! Topic routing and telemetry decoding
//!
//! Maps inbound messages to typed handlers by topic name. The telemetry
//! handler decodes the device's JSON frame and replaces the latest reading
//! atomically; anything malformed is logged and dropped without touching
//! the previous reading. Messages on unbound topics are discarded quietly.

use crate::transport::InboundMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// The last successfully decoded telemetry payload.
///
/// The timestamp is assigned at receipt time, not by the sender.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryReading {
    pub temperature: f64,
    pub humidity: f64,
    pub observed_at: DateTime<Utc>,
}

/// The sensor's wire frame. Field names are what the device firmware sends.
#[derive(Debug, Deserialize)]
struct SensorFrame {
    temperatura: f64,
    umidade: f64,
}

/// Payload failed decode or validation; the message is dropped and the
/// previous reading retained.
#[derive(Debug, Error)]
#[error("malformed telemetry payload: {0}")]
pub struct MalformedPayload(#[from] serde_json::Error);

/// Decode a telemetry frame, stamping it with the given receipt time
pub fn decode_reading(
    payload: &[u8],
    observed_at: DateTime<Utc>,
) -> Result<TelemetryReading, MalformedPayload> {
    let frame: SensorFrame = serde_json::from_slice(payload)?;
    Ok(TelemetryReading {
        temperature: frame.temperatura,
        humidity: frame.umidade,
        observed_at,
    })
}

type PayloadHandler = Box<dyn Fn(&[u8]) -> Result<(), MalformedPayload> + Send + Sync>;

/// An immutable (topic, handler) pair describing one subscription.
/// Created at startup, never mutated.
pub struct TopicBinding {
    topic: String,
    handler: PayloadHandler,
}

impl TopicBinding {
    pub fn new(topic: String, handler: PayloadHandler) -> Self {
        Self { topic, handler }
    }

    /// Binding for the telemetry topic: decode, stamp receipt time, and
    /// replace the latest reading as a whole.
    pub fn telemetry(topic: String, readings: watch::Sender<Option<TelemetryReading>>) -> Self {
        Self::new(
            topic,
            Box::new(move |payload| {
                let reading = decode_reading(payload, Utc::now())?;
                debug!(
                    temperature = reading.temperature,
                    humidity = reading.humidity,
                    "telemetry reading updated"
                );
                readings.send_replace(Some(reading));
                Ok(())
            }),
        )
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn handle(&self, payload: &[u8]) -> Result<(), MalformedPayload> {
        (self.handler)(payload)
    }
}

/// Routes inbound messages to their topic bindings
pub struct TopicRouter {
    bindings: Vec<TopicBinding>,
}

impl TopicRouter {
    pub fn new(bindings: Vec<TopicBinding>) -> Self {
        Self { bindings }
    }

    /// Route one message. Unbound topics and malformed payloads are logged
    /// and dropped; neither is an error for the caller.
    pub fn route(&self, message: &InboundMessage) {
        let Some(binding) = self.bindings.iter().find(|b| b.topic() == message.topic) else {
            debug!(topic = %message.topic, "message on unbound topic dropped");
            return;
        };
        if let Err(e) = binding.handle(&message.payload) {
            warn!(topic = %message.topic, error = %e, "payload dropped, previous reading retained");
        }
    }

    /// Consume the inbound channel until the transport side closes it
    pub async fn run(self, mut inbound: mpsc::Receiver<InboundMessage>) {
        while let Some(message) = inbound.recv().await {
            self.route(&message);
        }
        debug!("inbound channel closed, topic router stopping");
    }
}
