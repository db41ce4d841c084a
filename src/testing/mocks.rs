//! Mock transport for testing
//!
//! Implements the `Transport` contract in memory: connect commits the
//! subscription bootstrap before `Connected` becomes observable, publish is
//! guarded on the status, and inbound messages can be injected through the
//! installed channel. All state is behind `Arc` so a clone taken before the
//! mock is handed to the client keeps observing it.

use crate::transport::mqtt::{ConnectionStatus, MqttError};
use crate::transport::{InboundMessage, Transport};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;

#[derive(Clone)]
pub struct MockTransport {
    /// Fixed subscription set issued on every connect
    subscriptions: Vec<String>,
    published: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    subscribe_log: Arc<Mutex<Vec<String>>>,
    connect_calls: Arc<Mutex<Vec<Instant>>>,
    disconnect_calls: Arc<Mutex<Vec<Instant>>>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    status_rx: watch::Receiver<ConnectionStatus>,
    inbound_tx: Arc<StdMutex<Option<mpsc::Sender<InboundMessage>>>>,
    fail_connect: Arc<AtomicBool>,
    fail_publish: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new(subscriptions: Vec<String>) -> Self {
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            subscriptions,
            published: Arc::new(Mutex::new(Vec::new())),
            subscribe_log: Arc::new(Mutex::new(Vec::new())),
            connect_calls: Arc::new(Mutex::new(Vec::new())),
            disconnect_calls: Arc::new(Mutex::new(Vec::new())),
            status_tx: Arc::new(status_tx),
            status_rx,
            inbound_tx: Arc::new(StdMutex::new(None)),
            fail_connect: Arc::new(AtomicBool::new(false)),
            fail_publish: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fail_connects(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Force a status, e.g. to simulate an asynchronous connection loss
    pub fn set_status(&self, status: ConnectionStatus) {
        let _ = self.status_tx.send(status);
    }

    pub async fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().await.clone()
    }

    pub async fn subscribe_log(&self) -> Vec<String> {
        self.subscribe_log.lock().await.clone()
    }

    pub async fn connect_calls(&self) -> Vec<Instant> {
        self.connect_calls.lock().await.clone()
    }

    pub async fn disconnect_calls(&self) -> Vec<Instant> {
        self.disconnect_calls.lock().await.clone()
    }

    /// Deliver a message as if it arrived from the broker. Returns false
    /// when no inbound channel is installed or the consumer is gone.
    pub async fn inject_inbound(&self, topic: &str, payload: &[u8]) -> bool {
        let sender = match self.inbound_tx.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        match sender {
            Some(tx) => tx
                .send(InboundMessage {
                    topic: topic.to_string(),
                    payload: payload.to_vec(),
                })
                .await
                .is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<(), MqttError> {
        self.connect_calls.lock().await.push(Instant::now());

        if self.fail_connect.load(Ordering::SeqCst) {
            let _ = self.status_tx.send(ConnectionStatus::Disconnected);
            return Err(MqttError::HandshakeFailed(
                "mock handshake failure".to_string(),
            ));
        }

        let _ = self.status_tx.send(ConnectionStatus::Connecting);
        // Bootstrap precedes the Connected commit, as the contract requires
        self.subscribe_log
            .lock()
            .await
            .extend(self.subscriptions.iter().cloned());
        let _ = self.status_tx.send(ConnectionStatus::Connected);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), MqttError> {
        self.disconnect_calls.lock().await.push(Instant::now());
        let _ = self.status_tx.send(ConnectionStatus::Disconnected);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
        let status = self.status();
        if status != ConnectionStatus::Connected {
            return Err(MqttError::NotConnected { status });
        }
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(MqttError::PublishFailed("mock publish failure".into()));
        }
        self.published
            .lock()
            .await
            .push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    fn set_inbound_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        if let Ok(mut guard) = self.inbound_tx.lock() {
            *guard = Some(sender);
        }
    }
}
