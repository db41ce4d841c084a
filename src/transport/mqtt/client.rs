//! MQTT link: session ownership and the connection state machine
//!
//! `MqttLink` owns the single transport session per client instance. All
//! rumqttc events are drained by one spawned task that is the sole writer
//! of the connection status; everything else observes the status through a
//! watch channel. There is no automatic reconnection: when the session is
//! lost the event task commits `Lost` and stops polling, and recovery is an
//! explicit request from the layer above.

use super::connection::{
    configure_mqtt_options, ClientIdentity, ConnectOptions, ConnectionStatus, MqttError,
};
use super::event_router::{route_event, EventRoute};
use crate::config::BrokerSection;
use crate::transport::{InboundMessage, Transport};
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, EventLoop};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Shared slot for the inbound-message channel. A std mutex is enough: the
/// lock is only held to clone the sender, never across an await.
type InboundSlot = Arc<StdMutex<Option<mpsc::Sender<InboundMessage>>>>;

/// MQTT-over-WSS transport link for the dashboard client
pub struct MqttLink {
    identity: ClientIdentity,
    broker: BrokerSection,
    options: ConnectOptions,
    /// Fixed subscription set, re-issued on every successful handshake
    subscriptions: Vec<String>,
    client: Arc<Mutex<AsyncClient>>,
    /// Pending event loop for a session not yet started. Behind a std mutex
    /// because `EventLoop` is not `Sync`; only `connect` ever takes it.
    event_loop: StdMutex<Option<EventLoop>>,
    event_loop_handle: Option<JoinHandle<()>>,
    status_tx: watch::Sender<ConnectionStatus>,
    status_rx: watch::Receiver<ConnectionStatus>,
    shutdown_tx: Option<watch::Sender<bool>>,
    inbound_tx: InboundSlot,
}

impl MqttLink {
    pub fn new(
        identity: ClientIdentity,
        broker: BrokerSection,
        options: ConnectOptions,
        subscriptions: Vec<String>,
    ) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(&identity, &broker, &options)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);

        Ok(MqttLink {
            identity,
            broker,
            options,
            subscriptions,
            client: Arc::new(Mutex::new(client)),
            event_loop: StdMutex::new(Some(event_loop)),
            event_loop_handle: None,
            status_tx,
            status_rx,
            shutdown_tx: None,
            inbound_tx: Arc::new(StdMutex::new(None)),
        })
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Latest committed connection status
    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Replace the session pair after a teardown. The identity is reused;
    /// only the socket-level state is fresh.
    async fn open_session(&mut self) -> Result<EventLoop, MqttError> {
        let mqtt_options = configure_mqtt_options(&self.identity, &self.broker, &self.options)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);
        let mut guard = self.client.lock().await;
        *guard = client;
        Ok(event_loop)
    }

    /// Wait until the event task commits `Connected`, or fail on rejection
    /// or timeout.
    async fn wait_for_connection_confirmation(
        mut status_rx: watch::Receiver<ConnectionStatus>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let outcome = tokio::time::timeout(timeout, async {
            loop {
                match *status_rx.borrow_and_update() {
                    ConnectionStatus::Connected => return Ok(()),
                    ConnectionStatus::Disconnected | ConnectionStatus::Lost => {
                        return Err(MqttError::HandshakeFailed(
                            "connect attempt rejected by broker".to_string(),
                        ));
                    }
                    ConnectionStatus::Connecting => {}
                }
                if status_rx.changed().await.is_err() {
                    return Err(MqttError::HandshakeFailed(
                        "status channel closed".to_string(),
                    ));
                }
            }
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(MqttError::HandshakeFailed(
                "no broker acknowledgement within timeout".to_string(),
            )),
        }
    }

    /// Open the session and wait for the handshake.
    ///
    /// Only legal from `Disconnected` or `Lost`; an in-flight or active
    /// session is rejected explicitly instead of being serialized.
    pub async fn connect(&mut self) -> Result<(), MqttError> {
        match self.status() {
            ConnectionStatus::Connecting => return Err(MqttError::AlreadyConnecting),
            ConnectionStatus::Connected => return Err(MqttError::SessionActive),
            ConnectionStatus::Disconnected | ConnectionStatus::Lost => {}
        }

        let pending = match self.event_loop.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let event_loop = match pending {
            Some(event_loop) => event_loop,
            None => self.open_session().await?,
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);
        let _ = self.status_tx.send(ConnectionStatus::Connecting);

        let handle = tokio::spawn(run_event_loop(
            event_loop,
            self.client.clone(),
            self.status_tx.clone(),
            shutdown_rx,
            self.subscriptions.clone(),
            self.inbound_tx.clone(),
            self.identity.clone(),
        ));
        self.event_loop_handle = Some(handle);

        let timeout = Duration::from_secs(self.options.timeout_secs);
        match Self::wait_for_connection_confirmation(self.status_rx.clone(), timeout).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.abort_connect_attempt().await;
                Err(e)
            }
        }
    }

    /// Stop the event task of a failed connect attempt and settle the status.
    ///
    /// Waits for the task to finish before committing `Disconnected`: a
    /// ConnAck polled just before the shutdown signal could otherwise commit
    /// `Connected` afterwards, leaving the status green with nothing polling.
    async fn abort_connect_attempt(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.event_loop_handle.take() {
            match tokio::time::timeout(Duration::from_secs(2), handle).await {
                Ok(Ok(())) => debug!("event loop task stopped after failed connect"),
                Ok(Err(e)) if !e.is_cancelled() => warn!("event loop task ended with error: {e}"),
                Err(_) => warn!("event loop task did not stop after failed connect"),
                _ => {}
            }
        }
        let _ = self.status_tx.send(ConnectionStatus::Disconnected);
    }

    /// Tear down the active session. Safe to call in any state.
    pub async fn disconnect(&mut self) -> Result<(), MqttError> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }

        {
            // Best effort: the socket may already be gone
            let client = self.client.lock().await;
            let _ = client.disconnect().await;
        }

        if let Some(handle) = self.event_loop_handle.take() {
            match tokio::time::timeout(Duration::from_secs(2), handle).await {
                Ok(Ok(())) => debug!("event loop task stopped"),
                Ok(Err(e)) if !e.is_cancelled() => warn!("event loop task ended with error: {e}"),
                Err(_) => warn!("event loop task did not stop in time"),
                _ => {}
            }
        }

        let _ = self.status_tx.send(ConnectionStatus::Disconnected);
        info!(client_id = %self.identity, "disconnected from broker");
        Ok(())
    }

    fn check_connected(&self) -> Result<(), MqttError> {
        let status = self.status();
        if status != ConnectionStatus::Connected {
            return Err(MqttError::NotConnected { status });
        }
        Ok(())
    }

    /// Publish a payload, fire-and-forget (QoS 0, not retained). No delivery
    /// acknowledgement is awaited and no retry is attempted.
    pub async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
        self.check_connected()?;

        let client = self.client.lock().await;
        client
            .publish(topic, QoS::AtMostOnce, false, payload.to_vec())
            .await
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))?;

        debug!(topic, "published {} bytes", payload.len());
        Ok(())
    }
}

/// The state-owning event task.
///
/// Sole writer of the connection status while running. On ConnAck it issues
/// the subscription bootstrap before committing `Connected`, so `Connected`
/// is never observable ahead of the subscribe requests. On loss or error it
/// commits the degraded status and stops polling.
async fn run_event_loop(
    mut event_loop: EventLoop,
    client: Arc<Mutex<AsyncClient>>,
    status_tx: watch::Sender<ConnectionStatus>,
    mut shutdown_rx: watch::Receiver<bool>,
    subscriptions: Vec<String>,
    inbound_tx: InboundSlot,
    identity: ClientIdentity,
) {
    debug!(client_id = %identity, "event loop started");
    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!(client_id = %identity, "shutdown signal received");
                    break;
                }
            }
            polled = event_loop.poll() => match polled {
                Ok(event) => match route_event(&event) {
                    EventRoute::ConnectionAcknowledged => {
                        issue_subscription_bootstrap(&client, &subscriptions).await;
                        let _ = status_tx.send(ConnectionStatus::Connected);
                        info!(client_id = %identity, "connected to broker");
                    }
                    EventRoute::MessageReceived { topic, payload } => {
                        forward_inbound(&inbound_tx, topic, payload).await;
                    }
                    EventRoute::Disconnected => {
                        let next = loss_status(*status_tx.borrow());
                        warn!(client_id = %identity, "broker closed the session");
                        let _ = status_tx.send(next);
                        break;
                    }
                    EventRoute::SubscriptionResult {
                        packet_id,
                        granted,
                        rejected,
                    } => {
                        if rejected.is_empty() {
                            debug!(packet_id, granted, "subscription acknowledged");
                        } else {
                            warn!(
                                packet_id,
                                granted,
                                rejected = ?rejected,
                                "broker rejected subscription"
                            );
                        }
                    }
                    EventRoute::Infrastructure(event) => {
                        debug!(target: "mqtt_transport", "event: {event}");
                    }
                    EventRoute::Outgoing => {}
                },
                Err(e) => {
                    let next = loss_status(*status_tx.borrow());
                    match next {
                        ConnectionStatus::Lost => {
                            warn!(client_id = %identity, "connection lost: {e}");
                        }
                        _ => warn!(client_id = %identity, "handshake failed: {e}"),
                    }
                    let _ = status_tx.send(next);
                    break;
                }
            }
        }
    }
    debug!(client_id = %identity, "event loop stopped");
}

/// Degraded status after a drop: a loss mid-session is `Lost`, a failure
/// before the handshake completed is plain `Disconnected`.
fn loss_status(current: ConnectionStatus) -> ConnectionStatus {
    match current {
        ConnectionStatus::Connected => ConnectionStatus::Lost,
        _ => ConnectionStatus::Disconnected,
    }
}

/// Issue the fixed subscription set, fire-and-forget. Failures are logged;
/// the status still commits to `Connected` and telemetry simply will not
/// arrive until a manual reconnect.
async fn issue_subscription_bootstrap(client: &Arc<Mutex<AsyncClient>>, topics: &[String]) {
    let client = client.lock().await;
    for topic in topics {
        match client.subscribe(topic, QoS::AtMostOnce).await {
            Ok(()) => debug!(topic, "subscription request issued"),
            Err(e) => warn!(topic, "failed to issue subscription request: {e}"),
        }
    }
}

async fn forward_inbound(inbound_tx: &InboundSlot, topic: String, payload: Vec<u8>) {
    let sender = match inbound_tx.lock() {
        Ok(guard) => guard.clone(),
        Err(_) => None,
    };
    match sender {
        Some(tx) => {
            if tx.send(InboundMessage { topic, payload }).await.is_err() {
                warn!("inbound consumer gone; message dropped");
            }
        }
        None => debug!(topic, "no inbound consumer installed; message dropped"),
    }
}

#[async_trait]
impl Transport for MqttLink {
    async fn connect(&mut self) -> Result<(), MqttError> {
        MqttLink::connect(self).await
    }

    async fn disconnect(&mut self) -> Result<(), MqttError> {
        MqttLink::disconnect(self).await
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
        MqttLink::publish(self, topic, payload).await
    }

    fn status(&self) -> ConnectionStatus {
        MqttLink::status(self)
    }

    fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        MqttLink::status_watch(self)
    }

    fn set_inbound_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        if let Ok(mut guard) = self.inbound_tx.lock() {
            *guard = Some(sender);
        }
    }
}

impl Drop for MqttLink {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_link() -> MqttLink {
        let broker = BrokerSection {
            url: "wss://broker.hivemq.com:8884/mqtt".to_string(),
            timeout_secs: 10,
            username_env: None,
            password_env: None,
        };
        MqttLink::new(
            ClientIdentity::generate(ClientIdentity::DEFAULT_NAMESPACE),
            broker,
            ConnectOptions::default(),
            vec!["brunex/lerSensor".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_link_is_shareable_across_tasks() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MqttLink>();
    }

    #[tokio::test]
    async fn test_initial_status_is_disconnected() {
        let link = test_link();
        assert_eq!(link.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_publish_fails_when_not_connected() {
        let link = test_link();
        let result = link.publish("brunex/led1", b"ON").await;
        assert!(matches!(
            result,
            Err(MqttError::NotConnected {
                status: ConnectionStatus::Disconnected
            })
        ));
    }

    #[tokio::test]
    async fn test_connect_rejected_while_connecting() {
        let mut link = test_link();
        let _ = link.status_tx.send(ConnectionStatus::Connecting);
        let result = link.connect().await;
        assert!(matches!(result, Err(MqttError::AlreadyConnecting)));
    }

    #[tokio::test]
    async fn test_connect_rejected_while_connected() {
        let mut link = test_link();
        let _ = link.status_tx.send(ConnectionStatus::Connected);
        let result = link.connect().await;
        assert!(matches!(result, Err(MqttError::SessionActive)));
    }

    #[tokio::test]
    async fn test_aborted_connect_settles_event_task_before_disconnected() {
        let mut link = test_link();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let status_tx = link.status_tx.clone();
        // Commit Connected first, the way a ConnAck polled just before the
        // shutdown signal would, then wait for shutdown like the event task
        let handle = tokio::spawn(async move {
            let _ = status_tx.send(ConnectionStatus::Connected);
            let _ = shutdown_rx.changed().await;
        });
        link.shutdown_tx = Some(shutdown_tx);
        link.event_loop_handle = Some(handle);

        link.abort_connect_attempt().await;

        assert_eq!(link.status(), ConnectionStatus::Disconnected);
        assert!(link.shutdown_tx.is_none());
        assert!(link.event_loop_handle.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_without_session_is_ok() {
        let mut link = test_link();
        assert!(link.disconnect().await.is_ok());
        assert_eq!(link.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_wait_for_confirmation_success() {
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = status_tx.send(ConnectionStatus::Connected);
        });

        let result =
            MqttLink::wait_for_connection_confirmation(status_rx, Duration::from_millis(200)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_confirmation_rejected() {
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = status_tx.send(ConnectionStatus::Disconnected);
        });

        let result =
            MqttLink::wait_for_connection_confirmation(status_rx, Duration::from_millis(200)).await;
        assert!(matches!(result, Err(MqttError::HandshakeFailed(_))));
    }

    #[tokio::test]
    async fn test_wait_for_confirmation_timeout() {
        // Keep the sender alive so the channel never closes during the wait
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
        let _keepalive = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            drop(status_tx);
        });

        let result =
            MqttLink::wait_for_connection_confirmation(status_rx, Duration::from_millis(10)).await;
        match result {
            Err(MqttError::HandshakeFailed(reason)) => assert!(reason.contains("timeout")),
            other => panic!("expected handshake timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_loss_status_mapping() {
        assert_eq!(
            loss_status(ConnectionStatus::Connected),
            ConnectionStatus::Lost
        );
        assert_eq!(
            loss_status(ConnectionStatus::Connecting),
            ConnectionStatus::Disconnected
        );
        assert_eq!(
            loss_status(ConnectionStatus::Disconnected),
            ConnectionStatus::Disconnected
        );
    }
}
