//! Pure routing of rumqttc events
//!
//! Classifies raw MQTT v5 events into the handful of routes the connection
//! manager cares about. Keeping this a pure function makes the event loop's
//! branching testable without a broker.

use rumqttc::v5::mqttbytes::v5::{Packet, SubscribeReasonCode};
use rumqttc::v5::Event;

/// Routing decision for a single MQTT event
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// ConnAck received - issue the subscription bootstrap, then commit Connected
    ConnectionAcknowledged,
    /// Message received on a subscribed topic
    MessageReceived { topic: String, payload: Vec<u8> },
    /// Broker closed the session
    Disconnected,
    /// SubAck received for an earlier subscribe request
    SubscriptionResult {
        packet_id: u16,
        granted: usize,
        /// Reason codes the broker rejected, formatted for the log
        rejected: Vec<String>,
    },
    /// Protocol housekeeping (PingResp, PubAck, ...)
    Infrastructure(String),
    /// Outgoing event, handled by rumqttc itself
    Outgoing,
}

pub fn route_event(event: &Event) -> EventRoute {
    match event {
        Event::Incoming(incoming) => match incoming {
            Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
            Packet::Publish(publish) => EventRoute::MessageReceived {
                topic: String::from_utf8_lossy(&publish.topic).to_string(),
                payload: publish.payload.to_vec(),
            },
            Packet::Disconnect(_) => EventRoute::Disconnected,
            Packet::SubAck(suback) => {
                let rejected: Vec<String> = suback
                    .return_codes
                    .iter()
                    .filter(|code| !subscription_granted(code))
                    .map(|code| format!("{code:?}"))
                    .collect();
                EventRoute::SubscriptionResult {
                    packet_id: suback.pkid,
                    granted: suback.return_codes.len() - rejected.len(),
                    rejected,
                }
            }
            other => EventRoute::Infrastructure(format!("{other:?}")),
        },
        Event::Outgoing(_) => EventRoute::Outgoing,
    }
}

/// Only the success variants grant a subscription; the broker encodes every
/// failure as a reason code >= 0x80, surfaced here as the other variants.
fn subscription_granted(code: &SubscribeReasonCode) -> bool {
    matches!(code, SubscribeReasonCode::Success(_))
}
