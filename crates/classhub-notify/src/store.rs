//! The notification store.
//!
//! One store per session. It owns the stream transport, turns live and
//! polled payloads into [`NotificationRecord`]s, and enforces the display
//! policy:
//!
//! - records enter a FIFO queue that is drained straight into the visible
//!   stack, skipping ids that are already visible
//! - the stack is capped at `max_stack`; overflow evicts the oldest
//! - each visible record with a non-zero duration owns one dismiss timer,
//!   keyed `toast:{id}` in the store's scheduler
//!
//! Background work never returns errors. Failures become log lines and
//! [`StoreEvent::Diagnostic`] events.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{OnceCell, broadcast};
use tracing::{debug, info, warn};

use classhub_core::config::AppConfig;
use classhub_core::config::stream::StreamConfig;
use classhub_core::error::AppError;
use classhub_core::result::AppResult;
use classhub_core::scheduler::TaskScheduler;
use classhub_core::types::{Credentials, Diagnostic};
use classhub_realtime::{
    ConnectOptions, ConnectionState, ConnectionStatus, HandlerId, StreamTransport, TransportEvent,
    TransportEventKind,
};

use crate::alerts::{AlertSink, SoundKind};
use crate::api::NotificationApi;
use crate::dedup::SeenWindow;
use crate::events::{EVENT_CHANNEL_CAPACITY, StoreEvent};
use crate::preferences::{PreferenceStorage, Preferences, load_preferences, save_preferences};
use crate::record::{NotificationRecord, Source, is_read_flag, server_id};

/// Scheduler key of the polling loop.
pub const POLL_TASK: &str = "poll";

/// Scheduler key prefix of per-toast dismiss timers.
pub const TOAST_TASK_PREFIX: &str = "toast:";

/// Scheduler key prefix of desktop/sound alert tasks.
pub const ALERT_TASK_PREFIX: &str = "alert:";

/// Shortest polling period; smaller settings are raised to it.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Store tuning.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Stream settings used by `start_session`.
    pub stream: StreamConfig,
    /// REST base URL, used to derive the stream URL when none is configured.
    pub api_base_url: Option<String>,
    /// Polling fallback period.
    pub poll_interval: Duration,
    /// Number of server ids the poller remembers.
    pub seen_window: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            api_base_url: None,
            poll_interval: Duration::from_millis(30_000),
            seen_window: 512,
        }
    }
}

impl StoreSettings {
    /// Settings from the loaded configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            stream: config.stream.clone(),
            api_base_url: Some(config.api.base_url.clone()),
            poll_interval: Duration::from_millis(config.notifications.poll_interval_ms),
            seen_window: config.notifications.seen_window,
        }
    }

    /// `poll_interval`, raised to [`MIN_POLL_INTERVAL`].
    pub fn poll_period(&self) -> Duration {
        self.poll_interval.max(MIN_POLL_INTERVAL)
    }
}

#[derive(Debug)]
struct StoreState {
    queue: VecDeque<NotificationRecord>,
    active: VecDeque<NotificationRecord>,
    unread: u32,
    prefs: Preferences,
    seen: SeenWindow,
    polling: bool,
    session: Option<Credentials>,
    /// Bumped whenever a session starts or ends.
    epoch: u64,
}

#[derive(Debug)]
struct StoreInner {
    state: Mutex<StoreState>,
    transport: StreamTransport,
    api: Arc<dyn NotificationApi>,
    storage: Arc<dyn PreferenceStorage>,
    alerts: Arc<dyn AlertSink>,
    scheduler: TaskScheduler,
    events: broadcast::Sender<StoreEvent>,
    settings: StoreSettings,
    /// Desktop permission, requested at most once.
    permission: OnceCell<bool>,
    /// Subscriptions on the transport, removed on drop.
    handlers: Mutex<Vec<(TransportEventKind, HandlerId)>>,
}

/// Per-session notification state.
///
/// Cloning yields another handle to the same store.
#[derive(Debug, Clone)]
pub struct NotificationStore {
    inner: Arc<StoreInner>,
}

impl NotificationStore {
    /// Build a store and load persisted preferences.
    ///
    /// Missing or unreadable preferences fall back to the defaults.
    pub async fn new(
        transport: StreamTransport,
        api: Arc<dyn NotificationApi>,
        storage: Arc<dyn PreferenceStorage>,
        alerts: Arc<dyn AlertSink>,
        settings: StoreSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let prefs = match load_preferences(storage.as_ref()).await {
            Ok(prefs) => prefs,
            Err(e) => {
                warn!(error = %e, "Failed to load notification preferences, using defaults");
                Preferences::default()
            }
        };

        let inner = Arc::new(StoreInner {
            state: Mutex::new(StoreState {
                queue: VecDeque::new(),
                active: VecDeque::new(),
                unread: 0,
                prefs,
                seen: SeenWindow::new(settings.seen_window),
                polling: false,
                session: None,
                epoch: 0,
            }),
            transport,
            api,
            storage,
            alerts,
            scheduler: TaskScheduler::new(),
            events,
            settings,
            permission: OnceCell::new(),
            handlers: Mutex::new(Vec::new()),
        });
        StoreInner::bind_transport(&inner);

        Self { inner }
    }

    /// Receive every subsequent store event.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// The owned transport.
    pub fn transport(&self) -> &StreamTransport {
        &self.inner.transport
    }

    /// Connection status of the owned transport.
    pub fn connection_status(&self) -> ConnectionStatus {
        self.inner.transport.status()
    }

    /// Open the live stream for `credentials`. Any previous session's
    /// polling is stopped first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_session(&self, credentials: Credentials) -> AppResult<()> {
        let inner = &self.inner;
        inner.stop_polling();

        let options = ConnectOptions::from_stream_config(
            &inner.settings.stream,
            inner.settings.api_base_url.clone(),
            credentials.clone(),
        );
        inner.api.set_token(Some(credentials.token.clone()));
        {
            let mut state = inner.lock();
            state.session = Some(credentials.clone());
            state.epoch += 1;
        }

        if let Err(e) = inner.transport.connect(options) {
            let mut state = inner.lock();
            state.session = None;
            state.epoch += 1;
            drop(state);
            inner.api.set_token(None);
            return Err(e);
        }

        info!(
            user_id = %credentials.user_id,
            role = %credentials.role.as_str(),
            "Notification session started"
        );
        Ok(())
    }

    /// Disconnect, stop polling, cancel every timer and forget the
    /// session's notifications.
    ///
    /// Stream events still in flight when this returns are dropped.
    pub fn end_session(&self) {
        let inner = &self.inner;
        let (had_toasts, was_polling) = {
            let mut state = inner.lock();
            let had_toasts = !state.active.is_empty();
            let was_polling = std::mem::replace(&mut state.polling, false);
            state.session = None;
            state.epoch += 1;
            state.queue.clear();
            state.active.clear();
            state.unread = 0;
            state.seen.clear();
            (had_toasts, was_polling)
        };
        inner.transport.disconnect();
        inner.scheduler.cancel_all();
        inner.api.set_token(None);

        if was_polling {
            info!("Notification polling stopped");
            inner.publish(StoreEvent::PollingStopped);
        }
        if had_toasts {
            inner.publish(StoreEvent::Cleared);
        }
        info!("Notification session ended");
    }

    /// Normalize and enqueue a locally raised notification.
    ///
    /// Records with a non-zero duration get a dismiss timer, so this must be
    /// called from within a tokio runtime.
    pub fn add_notification(&self, payload: &Value) -> NotificationRecord {
        self.inner.add(payload, Source::Local)
    }

    /// Remove a visible record. Unknown ids are ignored.
    pub fn dismiss(&self, id: &str) -> bool {
        self.inner.dismiss(id)
    }

    /// Empty the visible stack and zero the unread counter.
    pub fn clear_all(&self) {
        self.inner.clear_all();
    }

    /// Replace and persist preferences. Applies to records created afterwards.
    pub async fn set_preferences(&self, prefs: Preferences) {
        self.inner.lock().prefs = prefs.clone();
        if let Err(e) = save_preferences(self.inner.storage.as_ref(), &prefs).await {
            self.inner
                .diagnose(Diagnostic::warn("store.preferences", format!("save failed: {e}")));
        }
    }

    /// Current preferences.
    pub fn preferences(&self) -> Preferences {
        self.inner.lock().prefs.clone()
    }

    /// Visible records, oldest first.
    pub fn active_toasts(&self) -> Vec<NotificationRecord> {
        self.inner.lock().active.iter().cloned().collect()
    }

    /// Records waiting for a slot.
    pub fn queue_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Session unread counter.
    pub fn unread_count(&self) -> u32 {
        self.inner.lock().unread
    }

    /// Whether the polling fallback is running.
    pub fn is_polling(&self) -> bool {
        self.inner.lock().polling
    }

    /// Mark one notification as read on the server, then dismiss it.
    pub async fn mark_read(&self, id: &str) -> AppResult<()> {
        self.inner
            .api
            .mark_notification_as_read(id)
            .await
            .inspect_err(|e| self.inner.observe_api_error(e))?;
        self.inner.dismiss(id);
        Ok(())
    }

    /// Mark everything as read on the server, then clear the stack.
    pub async fn mark_all_read(&self) -> AppResult<()> {
        let user_id = self.inner.session_user()?;
        self.inner
            .api
            .mark_all_notifications_as_read(&user_id)
            .await
            .inspect_err(|e| self.inner.observe_api_error(e))?;
        self.inner.clear_all();
        Ok(())
    }

    /// Fetch the full list for list views. The queue is not touched.
    pub async fn fetch_list(&self) -> AppResult<Vec<NotificationRecord>> {
        let user_id = self.inner.session_user()?;
        let items = self
            .inner
            .api
            .get_notifications(&user_id)
            .await
            .inspect_err(|e| self.inner.observe_api_error(e))?;

        let prefs = self.preferences();
        Ok(items
            .iter()
            .map(|item| NotificationRecord::from_server(item, &prefs, Source::Polling))
            .collect())
    }
}

impl StoreInner {
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, event: StoreEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn diagnose(&self, diagnostic: Diagnostic) {
        debug!(source = %diagnostic.source, message = %diagnostic.message, "Store diagnostic");
        self.publish(StoreEvent::Diagnostic(diagnostic));
    }

    fn observe_api_error(&self, error: &AppError) {
        if error.is_authentication() {
            self.publish(StoreEvent::SessionExpired);
        }
    }

    fn session_user(&self) -> AppResult<String> {
        self.lock()
            .session
            .as_ref()
            .map(|c| c.user_id.clone())
            .ok_or_else(|| AppError::authentication("No active notification session"))
    }

    fn bind_transport(this: &Arc<Self>) {
        let mut ids = Vec::new();

        let weak = Arc::downgrade(this);
        ids.push((
            TransportEventKind::Status,
            this.transport.on(TransportEventKind::Status, move |event| {
                if let (Some(inner), TransportEvent::Status(status)) = (weak.upgrade(), event) {
                    match status.state {
                        ConnectionState::Failed => inner.start_polling(),
                        ConnectionState::Connected => inner.stop_polling(),
                        _ => {}
                    }
                }
            }),
        ));

        let weak = Arc::downgrade(this);
        ids.push((
            TransportEventKind::Notification,
            this.transport.on(TransportEventKind::Notification, move |event| {
                if let (Some(inner), TransportEvent::Notification(payload)) = (weak.upgrade(), event)
                {
                    inner.ingest_live(payload);
                }
            }),
        ));

        let weak = Arc::downgrade(this);
        ids.push((
            TransportEventKind::Log,
            this.transport.on(TransportEventKind::Log, move |event| {
                if let (Some(inner), TransportEvent::Log(diagnostic)) = (weak.upgrade(), event) {
                    inner.publish(StoreEvent::Diagnostic(diagnostic.clone()));
                }
            }),
        ));

        *this.handlers.lock().unwrap_or_else(|e| e.into_inner()) = ids;
    }

    fn add(self: &Arc<Self>, payload: &Value, source: Source) -> NotificationRecord {
        let mut events = Vec::new();
        let record = {
            let mut state = self.lock();
            let record = NotificationRecord::normalize(payload, &state.prefs, source);
            state.queue.push_back(record.clone());
            self.drain(&mut state, &mut events);
            record
        };
        for event in events {
            self.publish(event);
        }
        record
    }

    /// Enqueue a stream payload and raise alerts when it becomes visible.
    /// Dropped when no session is active.
    fn ingest_live(self: &Arc<Self>, payload: &Value) {
        let mut events = Vec::new();
        {
            let mut state = self.lock();
            if state.session.is_none() {
                debug!("Live notification outside a session dropped");
                return;
            }

            let record = NotificationRecord::normalize(payload, &state.prefs, Source::Live);
            if server_id(payload).is_some() {
                state.seen.insert(&record.id);
            }
            state.queue.push_back(record.clone());
            self.drain(&mut state, &mut events);

            let shown = events
                .iter()
                .any(|e| matches!(e, StoreEvent::ToastShown(r) if r.id == record.id));
            if shown {
                self.raise_alerts(&state.prefs, record);
            }
        }
        for event in events {
            self.publish(event);
        }
    }

    /// Move queued records into the visible stack, enforcing the cap.
    fn drain(self: &Arc<Self>, state: &mut StoreState, events: &mut Vec<StoreEvent>) {
        while let Some(record) = state.queue.pop_front() {
            if state.active.iter().any(|r| r.id == record.id) {
                debug!(id = %record.id, "Duplicate notification ignored");
                continue;
            }

            if record.auto_dismisses() {
                self.schedule_dismiss(&record.id, Duration::from_millis(record.duration));
            }
            state.unread = state.unread.saturating_add(1);
            state.active.push_back(record.clone());
            debug!(id = %record.id, kind = %record.kind, source = %record.source, "Toast shown");
            events.push(StoreEvent::ToastShown(record));

            while state.active.len() > state.prefs.max_stack {
                if let Some(evicted) = state.active.pop_front() {
                    self.scheduler.cancel(&toast_key(&evicted.id));
                    debug!(id = %evicted.id, "Toast evicted by stack cap");
                    events.push(StoreEvent::ToastEvicted { id: evicted.id });
                }
            }
        }
    }

    fn schedule_dismiss(self: &Arc<Self>, id: &str, after: Duration) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let id_owned = id.to_string();
        self.scheduler.schedule_after(toast_key(id), after, async move {
            if let Some(inner) = weak.upgrade() {
                inner.dismiss(&id_owned);
            }
        });
    }

    fn dismiss(&self, id: &str) -> bool {
        let removed = {
            let mut state = self.lock();
            match state.active.iter().position(|r| r.id == id) {
                Some(index) => {
                    state.active.remove(index);
                    state.unread = state.unread.saturating_sub(1);
                    true
                }
                None => false,
            }
        };

        if removed {
            self.scheduler.cancel(&toast_key(id));
            self.publish(StoreEvent::ToastDismissed { id: id.to_string() });
        }
        removed
    }

    fn clear_all(&self) {
        {
            let mut state = self.lock();
            state.active.clear();
            state.unread = 0;
        }
        self.scheduler.cancel_prefix(TOAST_TASK_PREFIX);
        self.publish(StoreEvent::Cleared);
    }

    fn raise_alerts(self: &Arc<Self>, prefs: &Preferences, record: NotificationRecord) {
        if !prefs.desktop_enabled && !prefs.sound_enabled {
            return;
        }
        let prefs = prefs.clone();

        let weak = Arc::downgrade(self);
        self.scheduler
            .spawn(format!("{ALERT_TASK_PREFIX}{}", record.id), async move {
                if let Some(inner) = weak.upgrade() {
                    inner.deliver_alerts(&record, &prefs).await;
                }
            });
    }

    async fn deliver_alerts(&self, record: &NotificationRecord, prefs: &Preferences) {
        if prefs.desktop_enabled {
            let permitted = *self
                .permission
                .get_or_init(|| async {
                    match self.alerts.request_permission().await {
                        Ok(granted) => granted,
                        Err(e) => {
                            self.diagnose(Diagnostic::warn(
                                "store.alerts",
                                format!("permission request failed: {e}"),
                            ));
                            false
                        }
                    }
                })
                .await;

            if permitted {
                if let Err(e) = self.alerts.show_desktop(record).await {
                    self.diagnose(Diagnostic::warn(
                        "store.alerts",
                        format!("desktop notification failed: {e}"),
                    ));
                }
            }
        }

        if prefs.sound_enabled {
            if let Err(e) = self.alerts.play_sound(SoundKind::for_type(&record.kind)).await {
                self.diagnose(Diagnostic::warn("store.alerts", format!("sound failed: {e}")));
            }
        }
    }

    fn start_polling(self: &Arc<Self>) {
        let period = self.settings.poll_period();
        {
            // Registered under the lock so `end_session` cannot miss it.
            let mut state = self.lock();
            if state.polling || state.session.is_none() {
                return;
            }
            state.polling = true;

            let weak = Arc::downgrade(self);
            self.scheduler.schedule_every(POLL_TASK, period, move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.poll_once().await;
                    }
                }
            });
        }

        info!(
            interval_ms = period.as_millis() as u64,
            "Live stream failed, polling for notifications"
        );
        self.publish(StoreEvent::PollingStarted);
    }

    fn stop_polling(&self) {
        let was_polling = {
            let mut state = self.lock();
            let was_polling = std::mem::replace(&mut state.polling, false);
            if was_polling {
                self.scheduler.cancel(POLL_TASK);
            }
            was_polling
        };
        if was_polling {
            info!("Notification polling stopped");
            self.publish(StoreEvent::PollingStopped);
        }
    }

    async fn poll_once(self: &Arc<Self>) {
        let (user_id, epoch) = {
            let state = self.lock();
            match &state.session {
                Some(credentials) => (credentials.user_id.clone(), state.epoch),
                None => return,
            }
        };

        let items = match self.api.get_notifications(&user_id).await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Notification poll failed");
                self.observe_api_error(&e);
                self.diagnose(Diagnostic::warn("store.polling", e.to_string()));
                return;
            }
        };

        let mut events = Vec::new();
        let accepted = {
            let mut state = self.lock();
            if state.epoch != epoch {
                debug!("Poll result of an ended session dropped");
                return;
            }
            let mut accepted = 0usize;
            for item in &items {
                if is_read_flag(item) {
                    continue;
                }
                if let Some(id) = server_id(item) {
                    if !state.seen.insert(&id) {
                        continue;
                    }
                }
                let record = NotificationRecord::from_server(item, &state.prefs, Source::Polling);
                state.queue.push_back(record);
                accepted += 1;
            }
            self.drain(&mut state, &mut events);
            accepted
        };

        debug!(fetched = items.len(), accepted, "Notification poll completed");
        for event in events {
            self.publish(event);
        }
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let handlers = std::mem::take(&mut *self.handlers.lock().unwrap_or_else(|e| e.into_inner()));
        for (kind, id) in handlers {
            self.transport.off(kind, id);
        }
        self.transport.disconnect();
        self.scheduler.cancel_all();
    }
}

fn toast_key(id: &str) -> String {
    format!("{TOAST_TASK_PREFIX}{id}")
}
