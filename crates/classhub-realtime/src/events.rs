//! Handler registry for transport events.
//!
//! Handlers are plain callbacks invoked synchronously on the emitting task,
//! in registration order. A panicking handler is contained and logged; the
//! remaining handlers still run.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::error;

use classhub_core::types::Diagnostic;

use crate::message::types::{TransportEvent, TransportEventKind};

/// Callback type stored by the bus.
pub type Handler = Arc<dyn Fn(&TransportEvent) + Send + Sync>;

/// Token returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Registration {
    id: HandlerId,
    kind: TransportEventKind,
    handler: Handler,
}

/// Fan-out of transport events to subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<Mutex<Vec<Registration>>>,
    next_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.lock().len())
            .finish()
    }
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to events of `kind`.
    pub fn on<F>(&self, kind: TransportEventKind, handler: F) -> HandlerId
    where
        F: Fn(&TransportEvent) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Registration {
            id,
            kind,
            handler: Arc::new(handler),
        });
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn off(&self, kind: TransportEventKind, id: HandlerId) -> bool {
        let mut handlers = self.lock();
        let before = handlers.len();
        handlers.retain(|r| !(r.id == id && r.kind == kind));
        handlers.len() != before
    }

    /// Number of handlers subscribed to `kind`.
    pub fn handler_count(&self, kind: TransportEventKind) -> usize {
        self.lock().iter().filter(|r| r.kind == kind).count()
    }

    /// Deliver `event` to every handler subscribed to its kind.
    pub fn emit(&self, event: &TransportEvent) {
        let kind = event.kind();
        // Snapshot so handlers may call `on`/`off` without deadlocking.
        let targets: Vec<Handler> = self
            .lock()
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| Arc::clone(&r.handler))
            .collect();

        for handler in targets {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!(event = %kind, "Transport event handler panicked");
                if kind != TransportEventKind::Log {
                    self.emit(&TransportEvent::Log(Diagnostic::error(
                        "transport.handler",
                        format!("handler for '{kind}' panicked"),
                    )));
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Registration>> {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_fan_out_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            bus.on(TransportEventKind::Open, move |_| seen.lock().unwrap().push(tag));
        }
        bus.emit(&TransportEvent::Open);

        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_only_matching_kind_is_called() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        bus.on(TransportEventKind::Close, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&TransportEvent::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        bus.emit(&TransportEvent::Close { terminal: false });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_removes_handler() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let id = bus.on(TransportEventKind::Open, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!bus.off(TransportEventKind::Close, id));
        assert!(bus.off(TransportEventKind::Open, id));
        assert!(!bus.off(TransportEventKind::Open, id));

        bus.emit(&TransportEvent::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(bus.handler_count(TransportEventKind::Open), 0);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let logs = Arc::new(Mutex::new(Vec::new()));

        bus.on(TransportEventKind::Open, |_| panic!("boom"));
        let c = Arc::clone(&calls);
        bus.on(TransportEventKind::Open, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let l = Arc::clone(&logs);
        bus.on(TransportEventKind::Log, move |event| {
            if let TransportEvent::Log(d) = event {
                l.lock().unwrap().push(d.source.clone());
            }
        });

        bus.emit(&TransportEvent::Open);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*logs.lock().unwrap(), vec!["transport.handler".to_string()]);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let bus = EventBus::new();
        let slot: Arc<Mutex<Option<HandlerId>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));

        let (b, s, c) = (bus.clone(), Arc::clone(&slot), Arc::clone(&calls));
        let id = bus.on(TransportEventKind::Open, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *s.lock().unwrap() {
                b.off(TransportEventKind::Open, id);
            }
        });
        *slot.lock().unwrap() = Some(id);

        bus.emit(&TransportEvent::Open);
        bus.emit(&TransportEvent::Open);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
