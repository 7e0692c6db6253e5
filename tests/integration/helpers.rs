//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use classhub_core::types::{Credentials, UserRole};
use classhub_notify::StoreSettings;
use classhub_realtime::{StreamTransport, TransportEvent, TransportEventKind};

/// Token used by every test session.
pub const TOKEN: &str = "tok-123456";

/// User id used by every test session.
pub const USER_ID: &str = "42";

/// Upper bound on how long a test waits for background work.
pub const WAIT: Duration = Duration::from_secs(5);

/// Credentials of the test user.
pub fn credentials() -> Credentials {
    Credentials::new(TOKEN, USER_ID, UserRole::Student)
}

/// REST base URL on the mock server.
pub fn api_base(server: &MockServer) -> String {
    format!("{}/api", server.uri())
}

/// Render frames as a `text/event-stream` body. An empty event name
/// produces a default `message` frame.
pub fn sse_body(frames: &[(&str, Value)]) -> String {
    let mut body = String::from(": connected\n\n");
    for (event, data) in frames {
        if !event.is_empty() {
            body.push_str(&format!("event: {event}\n"));
        }
        body.push_str(&format!("data: {data}\n\n"));
    }
    body
}

/// Serve `body` once on the derived stream endpoint, then answer 503.
pub async fn mount_stream_once(server: &MockServer, body: String) {
    Mock::given(method("GET"))
        .and(path(format!("/api/notifications/stream/{TOKEN}")))
        .and(query_param("userId", USER_ID))
        .and(query_param("role", "student"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .up_to_n_times(1)
        .mount(server)
        .await;
    mount_stream_status(server, 503).await;
}

/// Answer every stream request with `status`.
pub async fn mount_stream_status(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/notifications/stream(/.*)?$"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Serve `items` from the list endpoint.
pub async fn mount_list(server: &MockServer, items: Value) {
    Mock::given(method("GET"))
        .and(path("/api/notifications"))
        .and(query_param("user_id", USER_ID))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": items,
        })))
        .mount(server)
        .await;
}

/// Store settings pointed at the mock server, with fast retries.
pub fn store_settings(server: &MockServer, max_retries: u32) -> StoreSettings {
    let mut settings = StoreSettings {
        api_base_url: Some(api_base(server)),
        poll_interval: Duration::from_millis(100),
        ..StoreSettings::default()
    };
    settings.stream.max_retries = max_retries;
    settings.stream.base_backoff_ms = 10;
    settings.stream.max_backoff_ms = 20;
    settings
}

/// Record every event of `kinds` emitted by `transport`.
pub fn record_events(
    transport: &StreamTransport,
    kinds: &[TransportEventKind],
) -> Arc<Mutex<Vec<TransportEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for kind in kinds {
        let log = log.clone();
        transport.on(*kind, move |event| log.lock().unwrap().push(event.clone()));
    }
    log
}

/// Poll `check` until it holds or [`WAIT`] elapses.
pub async fn wait_until<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Await `fut`, failing the test after [`WAIT`].
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(WAIT, fut)
        .await
        .expect("timed out waiting for background work")
}
