//! Stream connectors.
//!
//! A connector opens one stream and yields decoded frames until the peer
//! closes it or the connection breaks. The transport owns reconnecting;
//! connectors never retry.

use std::collections::VecDeque;
use std::fmt::Debug;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CACHE_CONTROL, HeaderValue};
use tracing::debug;
use url::Url;

use classhub_core::error::{AppError, ErrorKind};
use classhub_core::result::AppResult;

use crate::message::sse::{SseDecoder, SseFrame};

/// Decoded frames from one open stream. `None` means the peer closed it.
pub type FrameStream = Pin<Box<dyn Stream<Item = AppResult<SseFrame>> + Send>>;

/// Opens a server-push stream.
#[async_trait]
pub trait StreamConnector: Send + Sync + Debug + 'static {
    /// Open a stream at `url`. Resolves once the stream is established.
    async fn open(&self, url: &Url) -> AppResult<FrameStream>;
}

/// Connector that speaks `text/event-stream` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSseConnector {
    /// HTTP client.
    client: reqwest::Client,
}

impl HttpSseConnector {
    /// Build a connector with the given connect timeout.
    ///
    /// No overall request timeout is set; the response is expected to stay
    /// open indefinitely.
    pub fn new(connect_timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Internal,
                    "Failed to build HTTP client",
                    e,
                )
            })?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StreamConnector for HttpSseConnector {
    async fn open(&self, url: &Url) -> AppResult<FrameStream> {
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Transport,
                    "Stream request failed",
                    e,
                )
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(AppError::authentication("Stream rejected the session token"));
        }
        if !status.is_success() {
            return Err(AppError::transport(format!(
                "Stream endpoint answered HTTP {status}"
            )));
        }

        debug!(status = %status, "Stream response received");

        let body = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Transport,
                    "Stream body read failed",
                    e,
                )
            })
        });

        Ok(decode_frames(body))
    }
}

/// Turn a stream of byte chunks into a stream of frames.
///
/// A body error is yielded once and ends the stream.
pub fn decode_frames<S>(body: S) -> FrameStream
where
    S: Stream<Item = AppResult<Bytes>> + Send + 'static,
{
    struct DecodeState<S> {
        body: Pin<Box<S>>,
        decoder: SseDecoder,
        pending: VecDeque<SseFrame>,
        done: bool,
    }

    let state = DecodeState {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.pending.pop_front() {
                return Some((Ok(frame), state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    state.pending.extend(state.decoder.feed(&chunk));
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(e), state));
                }
                None => return None,
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_decode_frames_across_chunks() {
        let chunks: Vec<AppResult<Bytes>> = vec![
            Ok(Bytes::from_static(b"event: notif")),
            Ok(Bytes::from_static(b"ication\ndata: {\"a\":1}\n")),
            Ok(Bytes::from_static(b"\ndata: plain\n\n")),
        ];
        let frames: Vec<_> = decode_frames(stream::iter(chunks)).collect().await;

        assert_eq!(frames.len(), 2);
        let first = frames[0].as_ref().unwrap();
        assert_eq!(first.event, "notification");
        assert_eq!(first.data, "{\"a\":1}");
        assert!(frames[1].as_ref().unwrap().is_default_message());
    }

    #[tokio::test]
    async fn test_decode_frames_stops_after_body_error() {
        let chunks: Vec<AppResult<Bytes>> = vec![
            Ok(Bytes::from_static(b"data: one\n\n")),
            Err(AppError::transport("reset")),
            Ok(Bytes::from_static(b"data: never\n\n")),
        ];
        let frames: Vec<_> = decode_frames(stream::iter(chunks)).collect().await;

        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_ok());
        assert!(frames[1].is_err());
    }

    #[tokio::test]
    async fn test_http_connector_reads_event_stream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notifications/stream/tok"))
            .and(header("accept", "text/event-stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(": hello\n\nevent: notification\ndata: {\"type\":\"grade\"}\n\n"),
            )
            .mount(&server)
            .await;

        let connector = HttpSseConnector::new(Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/notifications/stream/tok", server.uri())).unwrap();
        let frames: Vec<_> = connector.open(&url).await.unwrap().collect().await;

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref().unwrap().event, "notification");
    }

    #[tokio::test]
    async fn test_http_connector_maps_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let connector = HttpSseConnector::new(Duration::from_secs(5)).unwrap();
        let url = Url::parse(&server.uri()).unwrap();
        let err = connector.open(&url).await.err().unwrap();

        assert!(err.is_authentication());
    }

    #[tokio::test]
    async fn test_http_connector_maps_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let connector = HttpSseConnector::new(Duration::from_secs(5)).unwrap();
        let url = Url::parse(&server.uri()).unwrap();
        let err = connector.open(&url).await.err().unwrap();

        assert_eq!(err.kind, ErrorKind::Transport);
    }
}
