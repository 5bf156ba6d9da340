#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

mod common;

use std::collections::HashSet;
use std::time::Duration;

use device_telemetry_client::telemetry::{
    Client, CommandStatus, MetricValue, SessionState, Severity,
};
use device_telemetry_client::ws::config::{Config, ReconnectConfig};
use futures_util::StreamExt as _;
use serde_json::{Map, Value, json};
use tokio::time::timeout;

use crate::common::payloads::{self, DEVICE_ID, OTHER_DEVICE_ID};
use crate::common::{MockWsServer, QUIET, WAIT, wait_for_state};

fn client(server: &MockWsServer) -> Client {
    let config = Config::builder()
        .endpoint(server.ws_url("/ws"))
        .reconnect(
            ReconnectConfig::builder()
                .delay(Duration::from_millis(100))
                .build(),
        )
        .build();
    Client::new(config).unwrap()
}

async fn connected(server: &mut MockWsServer) -> Client {
    let client = client(server);
    client.connect().unwrap();
    assert!(server.accepted().await);
    timeout(WAIT, wait_for_state(&client, SessionState::Open))
        .await
        .unwrap();
    client
}

fn subscribe(device_id: &str) -> Value {
    json!({ "type": "subscribe", "device_id": device_id })
}

fn unsubscribe(device_id: &str) -> Value {
    json!({ "type": "unsubscribe", "device_id": device_id })
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn connect_should_open_session() {
        let mut server = MockWsServer::start().await;
        let client = connected(&mut server).await;

        assert!(client.is_connected());
        assert_eq!(client.connection_state(), SessionState::Open);
    }

    #[tokio::test]
    async fn connection_status_replays_current_value_then_changes() {
        let mut server = MockWsServer::start().await;
        let client = client(&server);

        let mut status = Box::pin(client.connection_status());
        assert_eq!(timeout(WAIT, status.next()).await.unwrap(), Some(false));

        client.connect().unwrap();
        assert_eq!(timeout(WAIT, status.next()).await.unwrap(), Some(true));

        // A late subscriber sees the current value first
        let mut late = Box::pin(client.connection_status());
        assert_eq!(timeout(WAIT, late.next()).await.unwrap(), Some(true));

        client.disconnect().unwrap();
        assert_eq!(timeout(WAIT, status.next()).await.unwrap(), Some(false));
        assert!(server.accepted().await);
    }

    #[tokio::test]
    async fn server_drop_should_reconnect() {
        let mut server = MockWsServer::start().await;
        let client = connected(&mut server).await;
        let mut status = Box::pin(client.connection_status());
        assert_eq!(timeout(WAIT, status.next()).await.unwrap(), Some(true));

        server.close_all();
        assert_eq!(timeout(WAIT, status.next()).await.unwrap(), Some(false));

        assert!(server.accepted().await);
        assert_eq!(timeout(WAIT, status.next()).await.unwrap(), Some(true));
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn disconnect_should_stop_reconnecting() {
        let mut server = MockWsServer::start().await;
        let client = connected(&mut server).await;

        client.disconnect().unwrap();
        timeout(WAIT, wait_for_state(&client, SessionState::Closed))
            .await
            .unwrap();

        tokio::time::sleep(QUIET).await;
        assert_eq!(client.connection_state(), SessionState::Closed);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn unreachable_endpoint_keeps_retrying() {
        let config = Config::builder()
            .endpoint("ws://127.0.0.1:1/ws")
            .reconnect(
                ReconnectConfig::builder()
                    .delay(Duration::from_millis(50))
                    .build(),
            )
            .build();
        let client = Client::new(config).unwrap();
        client.connect().unwrap();

        timeout(WAIT, wait_for_state(&client, SessionState::ReconnectPending))
            .await
            .unwrap();
        assert!(!client.is_connected());

        client.disconnect().unwrap();
        timeout(WAIT, wait_for_state(&client, SessionState::Closed))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn connection_ack_sets_client_id() {
        let mut server = MockWsServer::start().await;
        let client = connected(&mut server).await;
        let mut state = client.state_receiver();

        server.send(&payloads::connection_ack("client-7").to_string());

        timeout(WAIT, async {
            while client.client_id().is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(client.client_id().as_deref(), Some("client-7"));

        client.disconnect().unwrap();
        state
            .wait_for(|current| *current == SessionState::Closed)
            .await
            .unwrap();
        assert_eq!(client.client_id(), None);
    }
}

mod subscriptions {
    use super::*;

    #[tokio::test]
    async fn subscribe_before_connect_sends_exactly_once() {
        let mut server = MockWsServer::start().await;
        let client = client(&server);

        client.subscribe_to_device(DEVICE_ID).unwrap();
        client.subscribe_to_device(DEVICE_ID).unwrap();
        client.connect().unwrap();

        assert_eq!(server.recv_request().await, Some(subscribe(DEVICE_ID)));
        assert_eq!(server.recv_request_within(QUIET).await, None);
    }

    #[tokio::test]
    async fn subscribe_while_open_sends_immediately() {
        let mut server = MockWsServer::start().await;
        let client = connected(&mut server).await;

        client.subscribe_to_device(DEVICE_ID).unwrap();

        assert_eq!(server.recv_request().await, Some(subscribe(DEVICE_ID)));
        assert_eq!(client.subscription_count(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_while_open_sends_request() {
        let mut server = MockWsServer::start().await;
        let client = connected(&mut server).await;

        client.subscribe_to_device(DEVICE_ID).unwrap();
        assert_eq!(server.recv_request().await, Some(subscribe(DEVICE_ID)));

        client.unsubscribe_from_device(DEVICE_ID).unwrap();
        assert_eq!(server.recv_request().await, Some(unsubscribe(DEVICE_ID)));
        assert_eq!(client.subscription_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_unknown_device_sends_nothing() {
        let mut server = MockWsServer::start().await;
        let client = connected(&mut server).await;

        client.unsubscribe_from_device(DEVICE_ID).unwrap();

        assert_eq!(server.recv_request_within(QUIET).await, None);
    }

    #[tokio::test]
    async fn subscriptions_are_replayed_after_reconnect() {
        let mut server = MockWsServer::start().await;
        let client = client(&server);

        client.subscribe_to_device(DEVICE_ID).unwrap();
        client.subscribe_to_device(OTHER_DEVICE_ID).unwrap();
        client.connect().unwrap();

        let expected: HashSet<String> = [subscribe(DEVICE_ID), subscribe(OTHER_DEVICE_ID)]
            .iter()
            .map(Value::to_string)
            .collect();

        let mut first = HashSet::new();
        for _ in 0..2 {
            first.insert(server.recv_request().await.unwrap().to_string());
        }
        assert_eq!(first, expected);

        server.close_all();

        let mut replayed = HashSet::new();
        for _ in 0..2 {
            replayed.insert(server.recv_request().await.unwrap().to_string());
        }
        assert_eq!(replayed, expected);
        assert_eq!(server.recv_request_within(QUIET).await, None);
    }

    #[tokio::test]
    async fn unsubscribed_devices_are_not_replayed() {
        let mut server = MockWsServer::start().await;
        let client = client(&server);

        client.subscribe_to_device(DEVICE_ID).unwrap();
        client.subscribe_to_device(OTHER_DEVICE_ID).unwrap();
        client.unsubscribe_from_device(OTHER_DEVICE_ID).unwrap();
        client.connect().unwrap();

        assert_eq!(server.recv_request().await, Some(subscribe(DEVICE_ID)));
        assert_eq!(server.recv_request_within(QUIET).await, None);
    }
}

mod commands {
    use super::*;

    #[tokio::test]
    async fn command_while_disconnected_is_not_sent() {
        let mut server = MockWsServer::start().await;
        let client = client(&server);

        client
            .send_command(DEVICE_ID, "set_mode", Map::new())
            .unwrap();
        client.connect().unwrap();
        assert!(server.accepted().await);

        assert_eq!(server.recv_request_within(QUIET).await, None);
    }

    #[tokio::test]
    async fn command_while_open_carries_params() {
        let mut server = MockWsServer::start().await;
        let client = connected(&mut server).await;

        let mut params = Map::new();
        params.insert("temperature".to_owned(), json!(55));
        client
            .send_command(DEVICE_ID, "set_temperature", params)
            .unwrap();

        assert_eq!(
            server.recv_request().await,
            Some(json!({
                "type": "command",
                "device_id": DEVICE_ID,
                "command": "set_temperature",
                "params": { "temperature": 55 }
            }))
        );
    }

    #[tokio::test]
    async fn command_response_is_delivered() {
        let mut server = MockWsServer::start().await;
        let client = connected(&mut server).await;
        let mut responses = Box::pin(client.command_responses());

        server.send(&payloads::command_response(DEVICE_ID).to_string());

        let response = timeout(WAIT, responses.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(response.command_id, "cmd-42");
        assert_eq!(response.status, CommandStatus::Success);
        assert!(response.is_success());
        assert_eq!(response.timestamp.as_str(), "2025-01-15T10:32:00+02:00");
        assert_eq!(
            response.timestamp.to_utc().unwrap().to_rfc3339(),
            "2025-01-15T08:32:00+00:00"
        );
    }
}

mod streams {
    use super::*;

    #[tokio::test]
    async fn telemetry_is_delivered_with_simulated_flag() {
        let mut server = MockWsServer::start().await;
        let client = connected(&mut server).await;
        let mut telemetry = Box::pin(client.telemetry());

        server.send(&payloads::telemetry(DEVICE_ID).to_string());

        let sample = timeout(WAIT, telemetry.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(sample.device_id, DEVICE_ID);
        assert!(sample.simulated);
        assert_eq!(sample.data.temperature_current, Some(58.5));
        assert_eq!(sample.data.mode.as_deref(), Some("eco"));
        assert_eq!(sample.metric("tank_pressure"), Some(MetricValue::Number(3.1)));
    }

    #[tokio::test]
    async fn telemetry_from_older_firmware_is_delivered() {
        let mut server = MockWsServer::start().await;
        let client = connected(&mut server).await;
        let mut telemetry = Box::pin(client.telemetry());

        let frame = json!({
            "type": "telemetry",
            "device_id": DEVICE_ID,
            "timestamp": "2025-01-15T10:30:00.250000",
            "data": {
                "temperature_current": "58.5",
                "zones": [{ "id": 1, "temp": 57.9 }]
            },
            "simulated": false
        });
        server.send(&frame.to_string());

        let sample = timeout(WAIT, telemetry.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(sample.timestamp.as_str(), "2025-01-15T10:30:00.250000");
        assert_eq!(sample.data.temperature_current, None);
        assert_eq!(sample.metric("temperature_current").unwrap().as_str(), Some("58.5"));
        assert_eq!(
            sample.metric("zones"),
            Some(MetricValue::Other(json!([{ "id": 1, "temp": 57.9 }])))
        );
    }

    #[tokio::test]
    async fn every_subscriber_receives_each_message() {
        let mut server = MockWsServer::start().await;
        let client = connected(&mut server).await;
        let mut first = Box::pin(client.events());
        let mut second = Box::pin(client.events());

        server.send(&payloads::event(DEVICE_ID).to_string());

        let a = timeout(WAIT, first.next()).await.unwrap().unwrap().unwrap();
        let b = timeout(WAIT, second.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.severity, Severity::Error);
        assert!(a.is_error());
    }

    #[tokio::test]
    async fn unknown_and_malformed_frames_do_not_block_stream() {
        let mut server = MockWsServer::start().await;
        let client = connected(&mut server).await;
        let mut events = Box::pin(client.events());

        server.send(r#"{"type":"firmware_update","device_id":"x"}"#);
        server.send("{not json");
        server.send(r#"{"device_id":"x"}"#);
        server.send(&payloads::event(DEVICE_ID).to_string());

        let event = timeout(WAIT, events.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(event.event_type, "overheat");
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn messages_go_only_to_their_kind() {
        let mut server = MockWsServer::start().await;
        let client = connected(&mut server).await;
        let mut telemetry = Box::pin(client.telemetry());
        let mut events = Box::pin(client.events());

        server.send(&payloads::event(DEVICE_ID).to_string());
        server.send(&payloads::telemetry(DEVICE_ID).to_string());

        let sample = timeout(WAIT, telemetry.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(sample.device_id, DEVICE_ID);
        let event = timeout(WAIT, events.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(event.device_id, DEVICE_ID);

        assert!(timeout(QUIET, telemetry.next()).await.is_err());
    }

    #[tokio::test]
    async fn device_filter_skips_other_devices() {
        let mut server = MockWsServer::start().await;
        let client = connected(&mut server).await;
        let mut telemetry = Box::pin(client.device_telemetry(OTHER_DEVICE_ID));

        server.send(&payloads::telemetry(DEVICE_ID).to_string());
        server.send(&payloads::telemetry(OTHER_DEVICE_ID).to_string());

        let sample = timeout(WAIT, telemetry.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(sample.device_id, OTHER_DEVICE_ID);
    }

    #[tokio::test]
    async fn slow_subscriber_observes_lag() {
        let mut server = MockWsServer::start().await;
        let config = Config::builder()
            .endpoint(server.ws_url("/ws"))
            .channel_capacity(2)
            .build();
        let client = Client::new(config).unwrap();
        client.connect().unwrap();
        assert!(server.accepted().await);
        timeout(WAIT, wait_for_state(&client, SessionState::Open))
            .await
            .unwrap();

        let mut telemetry = Box::pin(client.telemetry());
        let mut witness = Box::pin(client.events());
        for _ in 0..5 {
            server.send(&payloads::telemetry(DEVICE_ID).to_string());
        }
        // Events are sent after the telemetry burst, so once one arrives the burst is routed
        server.send(&payloads::event(DEVICE_ID).to_string());
        timeout(WAIT, witness.next()).await.unwrap().unwrap().unwrap();

        let first = timeout(WAIT, telemetry.next()).await.unwrap().unwrap();
        assert!(first.is_err());
        let next = timeout(WAIT, telemetry.next()).await.unwrap().unwrap();
        assert!(next.is_ok());
    }
}
