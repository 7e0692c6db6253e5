//! End-to-end tests of the notification store against a mock backend.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use classhub_notify::{
    HttpNotificationApi, LogAlertSink, MemoryPreferenceStorage, NotificationStore, Source,
    StoreEvent,
};
use classhub_realtime::{ConnectionState, StreamTransport};

async fn store(server: &MockServer, max_retries: u32) -> NotificationStore {
    let api = HttpNotificationApi::new(&helpers::api_base(server), Duration::from_secs(5)).unwrap();
    NotificationStore::new(
        StreamTransport::http(Duration::from_secs(5)).unwrap(),
        Arc::new(api),
        Arc::new(MemoryPreferenceStorage::new()),
        Arc::new(LogAlertSink),
        helpers::store_settings(server, max_retries),
    )
    .await
}

/// Wait for the first event matching `pick`.
async fn next_matching<T>(
    rx: &mut broadcast::Receiver<StoreEvent>,
    mut pick: impl FnMut(StoreEvent) -> Option<T>,
) -> T {
    helpers::within(async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(found) = pick(event) {
                        return found;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("store event channel closed"),
            }
        }
    })
    .await
}

#[tokio::test]
async fn test_live_notification_becomes_toast() {
    let server = MockServer::start().await;
    helpers::mount_stream_once(
        &server,
        helpers::sse_body(&[(
            "notification",
            json!({"id": "live-1", "type": "announcement", "message": "Assembly at 10"}),
        )]),
    )
    .await;
    helpers::mount_list(&server, json!([])).await;

    let store = store(&server, 3).await;
    let mut rx = store.subscribe();
    store.start_session(helpers::credentials()).unwrap();

    let record = next_matching(&mut rx, |event| match event {
        StoreEvent::ToastShown(record) => Some(record),
        _ => None,
    })
    .await;

    assert_eq!(record.id, "live-1");
    assert_eq!(record.title, "New Announcement");
    assert_eq!(record.source, Source::Live);
    assert_eq!(store.unread_count(), 1);
    store.end_session();
}

#[tokio::test]
async fn test_stream_failure_falls_back_to_polling() {
    let server = MockServer::start().await;
    helpers::mount_stream_status(&server, 503).await;
    helpers::mount_list(
        &server,
        json!([
            {"id": 1, "type": "grade", "message": "Math: A", "created_at": "2024-03-01 08:30:00"},
            {"id": 2, "type": "task", "is_read": true},
        ]),
    )
    .await;

    let store = store(&server, 0).await;
    let mut rx = store.subscribe();
    store.start_session(helpers::credentials()).unwrap();

    next_matching(&mut rx, |event| {
        matches!(event, StoreEvent::PollingStarted).then_some(())
    })
    .await;
    let record = next_matching(&mut rx, |event| match event {
        StoreEvent::ToastShown(record) => Some(record),
        _ => None,
    })
    .await;

    assert_eq!(store.connection_status().state, ConnectionState::Failed);
    assert_eq!(record.id, "1");
    assert_eq!(record.source, Source::Polling);
    assert_eq!(record.timestamp, 1_709_281_800_000);

    // Later polls see the same ids and add nothing.
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(store.active_toasts().len(), 1);
    assert!(
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/api/notifications")
            .count()
            >= 2
    );

    store.end_session();
    assert!(!store.is_polling());
}

#[tokio::test]
async fn test_expired_token_during_polling_signals_session_expired() {
    let server = MockServer::start().await;
    helpers::mount_stream_status(&server, 503).await;
    Mock::given(method("GET"))
        .and(path("/api/notifications"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": false, "message": "Token expired"})),
        )
        .mount(&server)
        .await;

    let store = store(&server, 0).await;
    let mut rx = store.subscribe();
    store.start_session(helpers::credentials()).unwrap();

    next_matching(&mut rx, |event| {
        matches!(event, StoreEvent::SessionExpired).then_some(())
    })
    .await;
    assert!(store.active_toasts().is_empty());
    store.end_session();
}

#[tokio::test]
async fn test_mark_read_hits_backend_and_dismisses() {
    let server = MockServer::start().await;
    helpers::mount_stream_status(&server, 503).await;
    helpers::mount_list(&server, json!([{"id": "n-5", "type": "error", "message": "Upload failed"}]))
        .await;
    Mock::given(method("POST"))
        .and(path("/api/notifications/n-5/read"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let store = store(&server, 0).await;
    let mut rx = store.subscribe();
    store.start_session(helpers::credentials()).unwrap();
    next_matching(&mut rx, |event| match event {
        StoreEvent::ToastShown(record) => Some(record),
        _ => None,
    })
    .await;

    store.mark_read("n-5").await.unwrap();
    assert!(store.active_toasts().is_empty());
    assert_eq!(store.unread_count(), 0);
    store.end_session();
}
