//! End-to-end client behavior against the mock transport
//!
//! Exercises the public facade the way an embedding dashboard would:
//! connect, receive telemetry, send commands, and recover from a lost
//! connection by explicit request.

use dashlink::config::{BrokerSection, ClientSection, DashboardConfig, TopicsSection};
use dashlink::testing::MockTransport;
use dashlink::{
    ClientError, ClientIdentity, CommandError, ConnectionStatus, DashboardClient,
    RECONNECT_SETTLE_DELAY,
};
use std::collections::HashMap;

const TELEMETRY_TOPIC: &str = "brunex/lerSensor";

fn dashboard_config() -> DashboardConfig {
    let mut actuators = HashMap::new();
    actuators.insert("led1".to_string(), "brunex/led1".to_string());
    actuators.insert("led2".to_string(), "brunex/led2".to_string());

    DashboardConfig {
        client: ClientSection::default(),
        broker: BrokerSection {
            url: "wss://broker.hivemq.com:8884/mqtt".to_string(),
            timeout_secs: 10,
            username_env: None,
            password_env: None,
        },
        topics: TopicsSection {
            telemetry: TELEMETRY_TOPIC.to_string(),
            actuators,
        },
    }
}

fn mock_client() -> (DashboardClient<MockTransport>, MockTransport) {
    let config = dashboard_config();
    let identity = ClientIdentity::generate(&config.client.id_namespace);
    let transport = MockTransport::new(vec![config.topics.telemetry.clone()]);
    let observer = transport.clone();
    (DashboardClient::new(&config, identity, transport), observer)
}

#[tokio::test]
async fn test_telemetry_flows_to_latest_reading() {
    let (mut client, broker) = mock_client();
    client.connect().await.unwrap();
    let mut readings = client.reading_watch();

    broker
        .inject_inbound(TELEMETRY_TOPIC, br#"{"temperatura":23.5,"umidade":60}"#)
        .await;
    readings.changed().await.unwrap();

    let reading = client.latest_reading().expect("reading should be present");
    assert_eq!(reading.temperature, 23.5);
    assert_eq!(reading.humidity, 60.0);
}

#[tokio::test]
async fn test_newer_reading_replaces_older_as_a_whole() {
    let (mut client, broker) = mock_client();
    client.connect().await.unwrap();
    let mut readings = client.reading_watch();

    broker
        .inject_inbound(TELEMETRY_TOPIC, br#"{"temperatura":23.5,"umidade":60}"#)
        .await;
    readings.changed().await.unwrap();
    broker
        .inject_inbound(TELEMETRY_TOPIC, br#"{"temperatura":24.1,"umidade":58}"#)
        .await;
    readings.changed().await.unwrap();

    let reading = client.latest_reading().expect("reading should be present");
    assert_eq!(reading.temperature, 24.1);
    assert_eq!(reading.humidity, 58.0);
}

#[tokio::test]
async fn test_malformed_frame_keeps_previous_reading() {
    let (mut client, broker) = mock_client();
    client.connect().await.unwrap();
    let mut readings = client.reading_watch();

    broker
        .inject_inbound(TELEMETRY_TOPIC, br#"{"temperatura":23.5,"umidade":60}"#)
        .await;
    readings.changed().await.unwrap();
    let before = client.latest_reading();

    broker.inject_inbound(TELEMETRY_TOPIC, b"not-json").await;
    broker
        .inject_inbound(TELEMETRY_TOPIC, br#"{"temperatura":"hot","umidade":60}"#)
        .await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    assert_eq!(client.latest_reading(), before);
}

#[tokio::test]
async fn test_command_publishes_expected_literal() {
    let (mut client, broker) = mock_client();
    client.connect().await.unwrap();

    client.send_command("led1", true).await.unwrap();
    client.send_command("led2", false).await.unwrap();

    assert_eq!(
        broker.published().await,
        vec![
            ("brunex/led1".to_string(), b"ON".to_vec()),
            ("brunex/led2".to_string(), b"OFF".to_vec()),
        ]
    );
}

#[tokio::test]
async fn test_command_while_disconnected_attempts_no_publish() {
    let (client, broker) = mock_client();

    let result = client.send_command("led1", true).await;

    assert!(matches!(
        result,
        Err(ClientError::Command(CommandError::NotConnected {
            status: ConnectionStatus::Disconnected
        }))
    ));
    assert!(broker.published().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_after_loss_restores_service() {
    let (mut client, broker) = mock_client();
    client.connect().await.unwrap();
    broker.set_status(ConnectionStatus::Lost);

    // Commands are refused while the connection is lost
    let refused = client.send_command("led1", true).await;
    assert!(matches!(
        refused,
        Err(ClientError::Command(CommandError::NotConnected {
            status: ConnectionStatus::Lost
        }))
    ));

    client.reconnect().await.unwrap();
    assert_eq!(client.status(), ConnectionStatus::Connected);

    // Subscriptions were re-issued and commands flow again
    assert_eq!(
        broker.subscribe_log().await,
        vec![TELEMETRY_TOPIC, TELEMETRY_TOPIC]
    );
    client.send_command("led1", true).await.unwrap();
    assert_eq!(
        broker.published().await,
        vec![("brunex/led1".to_string(), b"ON".to_vec())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_settles_before_redial() {
    let (mut client, broker) = mock_client();
    client.connect().await.unwrap();
    broker.set_status(ConnectionStatus::Lost);

    client.reconnect().await.unwrap();

    let disconnects = broker.disconnect_calls().await;
    let connects = broker.connect_calls().await;
    assert_eq!(disconnects.len(), 1);
    assert_eq!(connects.len(), 2);
    assert!(connects[1] >= disconnects[0] + RECONNECT_SETTLE_DELAY);
}

#[tokio::test]
async fn test_identity_carries_configured_namespace() {
    let (client, _broker) = mock_client();
    assert!(client.identity().as_str().starts_with("webclient_"));
}

#[tokio::test]
async fn test_failed_connect_leaves_client_usable() {
    let (mut client, broker) = mock_client();
    broker.fail_connects(true);

    assert!(client.connect().await.is_err());
    assert_eq!(client.status(), ConnectionStatus::Disconnected);

    broker.fail_connects(false);
    client.connect().await.unwrap();
    assert_eq!(client.status(), ConnectionStatus::Connected);
}
