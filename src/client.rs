//! Dashboard client facade
//!
//! Ties the transport, topic router, and command dispatcher together behind
//! one handle. Connection recovery is explicit: the facade never reconnects
//! on its own, and a requested reconnect tears the old session down fully
//! and lets the broker-side state settle before dialing again.

use crate::command::{CommandDispatcher, NotificationEvent};
use crate::config::DashboardConfig;
use crate::error::{ClientError, ClientResult};
use crate::telemetry::{TelemetryReading, TopicBinding, TopicRouter};
use crate::transport::mqtt::{ClientIdentity, ConnectionStatus, MqttError};
use crate::transport::{Transport, WssTransport};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Pause between teardown and redial on a manual reconnect, giving the
/// broker time to release the old session
pub const RECONNECT_SETTLE_DELAY: Duration = Duration::from_secs(1);

const INBOUND_CHANNEL_CAPACITY: usize = 32;

/// Client facade over a transport, a topic router, and a command dispatcher.
///
/// Generic over the transport so the whole facade can run against a mock.
pub struct DashboardClient<T: Transport> {
    transport: T,
    identity: ClientIdentity,
    dispatcher: CommandDispatcher,
    readings_rx: watch::Receiver<Option<TelemetryReading>>,
    router_handle: Option<JoinHandle<()>>,
}

impl DashboardClient<WssTransport> {
    /// Build a client with the production MQTT-over-WSS transport
    pub fn from_config(config: &DashboardConfig) -> ClientResult<Self> {
        let identity = ClientIdentity::generate(&config.client.id_namespace);
        let transport = WssTransport::new(
            identity.clone(),
            config.broker.clone(),
            config.broker.connect_options(),
            vec![config.topics.telemetry.clone()],
        )?;
        Ok(Self::new(config, identity, transport))
    }
}

impl<T: Transport> DashboardClient<T> {
    /// Wire a transport into the router and dispatcher. The router task
    /// starts immediately and runs until the inbound channel closes.
    pub fn new(config: &DashboardConfig, identity: ClientIdentity, transport: T) -> Self {
        let (readings_tx, readings_rx) = watch::channel(None);
        let router = TopicRouter::new(vec![TopicBinding::telemetry(
            config.topics.telemetry.clone(),
            readings_tx,
        )]);

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        transport.set_inbound_sender(inbound_tx);
        let router_handle = tokio::spawn(router.run(inbound_rx));

        let dispatcher = CommandDispatcher::new(config.topics.actuators.clone());

        Self {
            transport,
            identity,
            dispatcher,
            readings_rx,
            router_handle: Some(router_handle),
        }
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Latest committed connection status
    pub fn status(&self) -> ConnectionStatus {
        self.transport.status()
    }

    /// Watch handle for status transitions
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.transport.status_watch()
    }

    /// Last successfully decoded telemetry reading, if any arrived yet
    pub fn latest_reading(&self) -> Option<TelemetryReading> {
        self.readings_rx.borrow().clone()
    }

    /// Watch handle for telemetry updates
    pub fn reading_watch(&self) -> watch::Receiver<Option<TelemetryReading>> {
        self.readings_rx.clone()
    }

    /// Open the session and wait for broker acknowledgement
    pub async fn connect(&mut self) -> ClientResult<()> {
        self.transport.connect().await?;
        Ok(())
    }

    /// Tear down the session, wait for the settle delay, and dial again.
    ///
    /// Runs unconditionally from any settled state, including `Connected`;
    /// only an attempt already in flight is refused.
    pub async fn reconnect(&mut self) -> ClientResult<()> {
        if self.status() == ConnectionStatus::Connecting {
            return Err(ClientError::Transport(MqttError::AlreadyConnecting));
        }

        info!(client_id = %self.identity, "reconnect requested");
        self.transport.disconnect().await?;
        tokio::time::sleep(RECONNECT_SETTLE_DELAY).await;
        self.transport.connect().await?;
        Ok(())
    }

    /// Switch an actuator on or off, fire-and-forget. Returns the
    /// notification to surface on success.
    pub async fn send_command(
        &self,
        actuator: &str,
        desired: bool,
    ) -> ClientResult<NotificationEvent> {
        let notification = self
            .dispatcher
            .dispatch(&self.transport, actuator, desired)
            .await?;
        Ok(notification)
    }

    /// Disconnect and stop the router task. The client is not reusable
    /// afterwards.
    pub async fn shutdown(&mut self) -> ClientResult<()> {
        if let Err(e) = self.transport.disconnect().await {
            warn!("disconnect during shutdown failed: {e}");
        }
        if let Some(handle) = self.router_handle.take() {
            handle.abort();
        }
        Ok(())
    }
}

impl<T: Transport> Drop for DashboardClient<T> {
    fn drop(&mut self) {
        if let Some(handle) = &self.router_handle {
            handle.abort();
        }
    }
}
