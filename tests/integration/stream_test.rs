//! Integration tests for the live stream transport over real HTTP.

mod helpers;

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use classhub_core::error::ErrorKind;
use classhub_realtime::{
    ConnectOptions, ConnectionState, StreamTransport, TransportEvent, TransportEventKind,
};

fn options(server: &MockServer, max_retries: u32) -> ConnectOptions {
    ConnectOptions::from_stream_config(
        &Default::default(),
        Some(helpers::api_base(server)),
        helpers::credentials(),
    )
    .with_max_retries(max_retries)
    .with_backoff(10, 20)
}

#[tokio::test]
async fn test_notifications_delivered_then_reconnect_exhausts() {
    let server = MockServer::start().await;
    helpers::mount_stream_once(
        &server,
        helpers::sse_body(&[
            ("notification", json!({"id": "n1", "type": "grade", "message": "Math: A"})),
            ("ping", json!({})),
            ("", json!({"id": "n2", "type": "task"})),
            ("notification", json!(["not", "an", "object"])),
        ]),
    )
    .await;

    let transport = StreamTransport::http(Duration::from_secs(5)).unwrap();
    let log = helpers::record_events(
        &transport,
        &[
            TransportEventKind::Open,
            TransportEventKind::Notification,
            TransportEventKind::Close,
            TransportEventKind::Log,
        ],
    );

    transport.connect(options(&server, 1)).unwrap();
    assert!(
        helpers::wait_until(|| transport.status().state == ConnectionState::Failed).await,
        "transport never reached failed, status {:?}",
        transport.status()
    );

    let events = log.lock().unwrap().clone();
    let ids: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            TransportEvent::Notification(payload) => Some(payload["id"].as_str()?.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(ids, vec!["n1", "n2"]);

    assert_eq!(
        events.iter().filter(|e| matches!(e, TransportEvent::Open)).count(),
        1
    );
    assert!(events.iter().any(|e| matches!(e, TransportEvent::Log(d) if d.source == "transport.frame")));

    let closes: Vec<bool> = events
        .iter()
        .filter_map(|e| match e {
            TransportEvent::Close { terminal } => Some(*terminal),
            _ => None,
        })
        .collect();
    assert_eq!(closes, vec![false, true]);
    assert!(transport.status().last_message_at.is_some());
}

#[tokio::test]
async fn test_unauthorized_stream_fails_without_retry_budget() {
    let server = MockServer::start().await;
    helpers::mount_stream_status(&server, 401).await;

    let transport = StreamTransport::http(Duration::from_secs(5)).unwrap();
    let log = helpers::record_events(&transport, &[TransportEventKind::Error]);

    transport.connect(options(&server, 0)).unwrap();
    assert!(helpers::wait_until(|| transport.status().state == ConnectionState::Failed).await);

    let errors = log.lock().unwrap().clone();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        TransportEvent::Error(e) if e.kind == ErrorKind::Authentication
    ));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_disconnect_while_connecting_goes_idle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let transport = StreamTransport::http(Duration::from_secs(5)).unwrap();
    let log = helpers::record_events(
        &transport,
        &[TransportEventKind::Open, TransportEventKind::Error],
    );

    transport.connect(options(&server, 3)).unwrap();
    helpers::within(async {
        while server.received_requests().await.unwrap_or_default().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert_eq!(transport.status().state, ConnectionState::Connecting);

    transport.disconnect();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(transport.status().state, ConnectionState::Idle);
    assert!(log.lock().unwrap().is_empty());
}
