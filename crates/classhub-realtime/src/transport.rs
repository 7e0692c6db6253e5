//! The stream transport: one logical live connection, re-established on
//! failure, with lifecycle events fanned out to subscribers.
//!
//! All timers (the reconnect driver, its backoff sleeps and the heartbeat
//! ticker) live inside a single task registered with the scheduler under
//! [`DRIVER_TASK`], so `disconnect` cancels all of them at once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use classhub_core::config::AppConfig;
use classhub_core::config::stream::StreamConfig;
use classhub_core::error::AppError;
use classhub_core::result::AppResult;
use classhub_core::scheduler::TaskScheduler;
use classhub_core::types::{Credentials, Diagnostic};

use crate::connection::backoff::BackoffPolicy;
use crate::connection::connector::{FrameStream, HttpSseConnector, StreamConnector};
use crate::connection::heartbeat::HeartbeatMonitor;
use crate::connection::status::{ConnectionState, ConnectionStatus};
use crate::connection::target::StreamTarget;
use crate::events::{EventBus, HandlerId};
use crate::message::sse::{DEFAULT_EVENT, SseFrame};
use crate::message::types::{TransportEvent, TransportEventKind, parse_notification};

/// Scheduler key of the connection driver task.
pub const DRIVER_TASK: &str = "transport:stream";

/// Named event carrying a notification payload.
pub const NOTIFICATION_EVENT: &str = "notification";

/// Parameters of one `connect` call.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Explicit stream URL.
    pub url: Option<String>,
    /// REST base URL used to derive the stream URL when `url` is absent.
    pub fallback_base: Option<String>,
    /// Session identity embedded into the stream URL.
    pub credentials: Credentials,
    /// Append the token as a trailing path segment.
    pub embed_token_in_path: bool,
    /// Consecutive non-heartbeat failures tolerated before `failed`.
    pub max_retries: u32,
    /// First reconnect delay.
    pub base_backoff_ms: u64,
    /// Reconnect delay cap.
    pub max_backoff_ms: u64,
    /// Silence tolerated before a forced reconnect.
    pub heartbeat_timeout_ms: u64,
}

impl ConnectOptions {
    /// Options with the default tuning.
    pub fn new(url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            url: Some(url.into()),
            fallback_base: None,
            credentials,
            embed_token_in_path: true,
            max_retries: 5,
            base_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            heartbeat_timeout_ms: 60_000,
        }
    }

    /// Options taken from the `[stream]` and `[api]` configuration sections.
    pub fn from_config(config: &AppConfig, credentials: Credentials) -> Self {
        Self::from_stream_config(&config.stream, Some(config.api.base_url.clone()), credentials)
    }

    /// Options taken from a `[stream]` section and an optional REST base URL.
    pub fn from_stream_config(
        stream: &StreamConfig,
        fallback_base: Option<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            url: stream.url.clone(),
            fallback_base,
            credentials,
            embed_token_in_path: stream.embed_token_in_path,
            max_retries: stream.max_retries,
            base_backoff_ms: stream.base_backoff_ms,
            max_backoff_ms: stream.max_backoff_ms,
            heartbeat_timeout_ms: stream.heartbeat_timeout_ms,
        }
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set base and cap of the reconnect backoff.
    pub fn with_backoff(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.base_backoff_ms = base_ms;
        self.max_backoff_ms = max_ms;
        self
    }

    /// Set the heartbeat timeout.
    pub fn with_heartbeat_timeout(mut self, timeout_ms: u64) -> Self {
        self.heartbeat_timeout_ms = timeout_ms;
        self
    }

    /// Choose whether the token is appended to the path.
    pub fn with_token_in_path(mut self, embed: bool) -> Self {
        self.embed_token_in_path = embed;
        self
    }

    fn validate(&self) -> AppResult<()> {
        if !self.credentials.is_complete() {
            return Err(AppError::validation(
                "A token and a user id are required to open the stream",
            ));
        }
        if self.heartbeat_timeout_ms == 0 {
            return Err(AppError::validation("heartbeat_timeout_ms must be greater than zero"));
        }
        if self.max_backoff_ms < self.base_backoff_ms {
            return Err(AppError::validation("max_backoff_ms must be >= base_backoff_ms"));
        }
        Ok(())
    }
}

/// Why a connection attempt or an open stream ended.
#[derive(Debug)]
enum Failure {
    /// Opening failed, or the stream yielded an error.
    Error(AppError),
    /// The peer ended the stream.
    Closed,
    /// No frame within the heartbeat timeout.
    HeartbeatTimeout(Duration),
    /// A newer `connect` or a `disconnect` took over.
    Superseded,
}

/// Mutable transport state, guarded by one lock.
#[derive(Debug, Default)]
struct DriverState {
    status: ConnectionStatus,
    /// Monotonic time of the last frame, for the heartbeat check.
    last_frame: Option<Instant>,
}

#[derive(Debug)]
struct TransportInner {
    connector: Arc<dyn StreamConnector>,
    state: Mutex<DriverState>,
    bus: EventBus,
    scheduler: TaskScheduler,
    /// Bumped by every `connect`/`disconnect`; a driver whose generation is
    /// stale must not touch state or emit.
    generation: AtomicU64,
}

/// Client for the server notification stream.
///
/// Cloning yields another handle to the same connection.
#[derive(Debug, Clone)]
pub struct StreamTransport {
    inner: Arc<TransportInner>,
}

impl StreamTransport {
    /// Transport using the given connector and its own scheduler.
    pub fn new(connector: Arc<dyn StreamConnector>) -> Self {
        Self::with_scheduler(connector, TaskScheduler::new())
    }

    /// Transport whose driver task is registered in `scheduler`.
    pub fn with_scheduler(connector: Arc<dyn StreamConnector>, scheduler: TaskScheduler) -> Self {
        Self {
            inner: Arc::new(TransportInner {
                connector,
                state: Mutex::new(DriverState::default()),
                bus: EventBus::new(),
                scheduler,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Transport speaking SSE over HTTP.
    pub fn http(connect_timeout: Duration) -> AppResult<Self> {
        let connector = HttpSseConnector::new(connect_timeout)?;
        Ok(Self::new(Arc::new(connector)))
    }

    /// Current status snapshot.
    pub fn status(&self) -> ConnectionStatus {
        self.inner.lock().status.clone()
    }

    /// Shorthand for `status().is_connected()`.
    pub fn is_connected(&self) -> bool {
        self.inner.lock().status.is_connected()
    }

    /// Subscribe to one event kind.
    pub fn on<F>(&self, kind: TransportEventKind, handler: F) -> HandlerId
    where
        F: Fn(&TransportEvent) + Send + Sync + 'static,
    {
        self.inner.bus.on(kind, handler)
    }

    /// Unsubscribe. Returns whether the handler was registered.
    pub fn off(&self, kind: TransportEventKind, id: HandlerId) -> bool {
        self.inner.bus.off(kind, id)
    }

    /// Open the stream, tearing down any previous connection first.
    ///
    /// Returns immediately; the connection is established in the
    /// background. Fails only when the options cannot produce a stream URL,
    /// in which case the current connection is left untouched.
    ///
    /// Valid options spawn the driver task, so this must be called from
    /// within a tokio runtime.
    pub fn connect(&self, options: ConnectOptions) -> AppResult<()> {
        options.validate()?;
        let target = StreamTarget::build(
            options.url.as_deref(),
            options.fallback_base.as_deref(),
            &options.credentials,
            options.embed_token_in_path,
        )?;

        let inner = &self.inner;
        let (generation, snapshot) = {
            let mut state = inner.lock();
            let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            inner.scheduler.cancel(DRIVER_TASK);
            state.status = ConnectionStatus {
                state: ConnectionState::Connecting,
                retry_attempt: 0,
                last_message_at: None,
            };
            state.last_frame = None;
            (generation, state.status.clone())
        };

        info!(
            url = %target,
            user_id = %options.credentials.user_id,
            max_retries = options.max_retries,
            "Connecting to notification stream"
        );
        inner.bus.emit(&TransportEvent::Status(snapshot));

        let settings = DriverSettings {
            target,
            policy: BackoffPolicy::new(options.base_backoff_ms, options.max_backoff_ms),
            heartbeat: HeartbeatMonitor::new(Duration::from_millis(options.heartbeat_timeout_ms)),
            max_retries: options.max_retries,
        };
        let driver = Arc::clone(inner);
        inner
            .scheduler
            .spawn(DRIVER_TASK, async move { driver.drive(generation, settings).await });
        Ok(())
    }

    /// Tear down the connection and every pending timer; state becomes
    /// `idle`. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let inner = &self.inner;
        let snapshot = {
            let mut state = inner.lock();
            inner.generation.fetch_add(1, Ordering::SeqCst);
            inner.scheduler.cancel(DRIVER_TASK);
            let was_idle = state.status.state == ConnectionState::Idle;
            state.status.state = ConnectionState::Idle;
            state.status.retry_attempt = 0;
            state.last_frame = None;
            (!was_idle).then(|| state.status.clone())
        };

        if let Some(snapshot) = snapshot {
            info!("Disconnected from notification stream");
            inner.bus.emit(&TransportEvent::Status(snapshot));
        }
    }
}

struct DriverSettings {
    target: StreamTarget,
    policy: BackoffPolicy,
    heartbeat: HeartbeatMonitor,
    max_retries: u32,
}

impl TransportInner {
    fn lock(&self) -> MutexGuard<'_, DriverState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Run `f` against the state if `generation` still owns it.
    fn update<R>(&self, generation: u64, f: impl FnOnce(&mut DriverState) -> R) -> Option<R> {
        let mut state = self.lock();
        self.is_current(generation).then(|| f(&mut state))
    }

    async fn drive(self: Arc<Self>, generation: u64, settings: DriverSettings) {
        loop {
            // A peer that accepts the socket but never answers counts as a
            // failed attempt against the retry budget.
            let handshake = settings.heartbeat.timeout;
            let opened =
                tokio::time::timeout(handshake, self.connector.open(settings.target.url())).await;
            let failure = match opened {
                Ok(Ok(frames)) => {
                    if self.handle_open(generation) {
                        self.pump(generation, frames, settings.heartbeat).await
                    } else {
                        Failure::Superseded
                    }
                }
                Ok(Err(e)) => Failure::Error(e),
                Err(_) => Failure::Error(AppError::transport(format!(
                    "no response from notification stream within {}ms",
                    handshake.as_millis()
                ))),
            };

            let closed = matches!(failure, Failure::Closed);
            let forced = match failure {
                Failure::Superseded => return,
                Failure::Error(e) => {
                    warn!(error = %e, url = %settings.target, "Notification stream failed");
                    self.emit_failure(e);
                    false
                }
                Failure::HeartbeatTimeout(silent) => {
                    warn!(
                        silent_ms = silent.as_millis() as u64,
                        "Notification stream went silent, forcing reconnect"
                    );
                    self.emit_failure(AppError::transport(format!(
                        "heartbeat timeout after {}ms of silence",
                        silent.as_millis()
                    )));
                    true
                }
                Failure::Closed => {
                    info!("Notification stream closed by server");
                    false
                }
            };

            match self.schedule_retry(generation, forced, closed, settings.max_retries) {
                Some(attempt) => {
                    let delay = settings.policy.delay(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
                    tokio::time::sleep(delay).await;
                }
                None => return,
            }
        }
    }

    fn handle_open(&self, generation: u64) -> bool {
        let snapshot = self.update(generation, |state| {
            state.status.state = ConnectionState::Connected;
            state.status.retry_attempt = 0;
            state.status.last_message_at = Some(Utc::now());
            state.last_frame = Some(Instant::now());
            state.status.clone()
        });

        match snapshot {
            Some(snapshot) => {
                info!("Notification stream connected");
                self.bus.emit(&TransportEvent::Status(snapshot));
                self.bus.emit(&TransportEvent::Open);
                true
            }
            None => false,
        }
    }

    async fn pump(
        &self,
        generation: u64,
        mut frames: FrameStream,
        heartbeat: HeartbeatMonitor,
    ) -> Failure {
        let check = heartbeat.check_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + check, check);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                next = frames.next() => match next {
                    Some(Ok(frame)) => {
                        if !self.handle_frame(generation, frame) {
                            return Failure::Superseded;
                        }
                    }
                    Some(Err(e)) => return Failure::Error(e),
                    None => return Failure::Closed,
                },
                _ = ticker.tick() => {
                    let last_frame = self.lock().last_frame;
                    let stale = last_frame.and_then(|last| heartbeat.stale_for(last, Instant::now()));
                    if let Some(silent) = stale {
                        return Failure::HeartbeatTimeout(silent);
                    }
                }
            }
        }
    }

    fn handle_frame(&self, generation: u64, frame: SseFrame) -> bool {
        let fresh = self.update(generation, |state| {
            state.last_frame = Some(Instant::now());
            state.status.last_message_at = Some(Utc::now());
        });
        if fresh.is_none() {
            return false;
        }

        self.bus.emit(&TransportEvent::Raw(frame.clone()));

        if frame.event == NOTIFICATION_EVENT || frame.event == DEFAULT_EVENT {
            match parse_notification(&frame) {
                Ok(payload) => self.bus.emit(&TransportEvent::Notification(payload)),
                Err(e) => {
                    debug!(event = %frame.event, error = %e, "Dropping malformed frame");
                    self.bus.emit(&TransportEvent::Log(Diagnostic::warn(
                        "transport.frame",
                        format!("dropped malformed '{}' frame: {}", frame.event, e.message),
                    )));
                }
            }
        }
        true
    }

    fn emit_failure(&self, error: AppError) {
        self.bus.emit(&TransportEvent::Log(Diagnostic::warn(
            "transport.connection",
            error.to_string(),
        )));
        self.bus.emit(&TransportEvent::Error(error));
    }

    /// Decide between retrying and giving up. Returns the retry attempt to
    /// wait for, or `None` when the driver must stop.
    fn schedule_retry(
        &self,
        generation: u64,
        forced: bool,
        closed: bool,
        max_retries: u32,
    ) -> Option<u32> {
        let outcome = self.update(generation, |state| {
            if !forced && state.status.retry_attempt >= max_retries {
                state.status.state = ConnectionState::Failed;
                (None, state.status.clone())
            } else {
                state.status.retry_attempt = state.status.retry_attempt.saturating_add(1);
                state.status.state = ConnectionState::Reconnecting;
                (Some(state.status.retry_attempt), state.status.clone())
            }
        })?;

        match outcome {
            (None, snapshot) => {
                warn!(
                    retries = snapshot.retry_attempt,
                    "Notification stream retry budget exhausted"
                );
                self.bus.emit(&TransportEvent::Status(snapshot));
                self.bus.emit(&TransportEvent::Close { terminal: true });
                None
            }
            (Some(attempt), snapshot) => {
                if closed {
                    self.bus.emit(&TransportEvent::Close { terminal: false });
                }
                self.bus.emit(&TransportEvent::Status(snapshot));
                Some(attempt)
            }
        }
    }
}
