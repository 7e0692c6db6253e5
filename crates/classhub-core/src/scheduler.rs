//! Keyed task scheduler.
//!
//! Every timer owned by the transport or the store (reconnect driver,
//! per-toast auto-dismiss, polling loop) is registered here under a string
//! key, so it can be cancelled by key instead of leaking a handle through
//! closures.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::trace;

/// A registered task.
#[derive(Debug)]
struct ScheduledTask {
    /// Generation number; distinguishes a replaced task from its successor.
    id: u64,
    /// Handle used to abort the task.
    handle: AbortHandle,
}

/// Map of `key → running task`.
///
/// Cloning the scheduler yields another handle to the same map.
#[derive(Debug, Clone, Default)]
pub struct TaskScheduler {
    /// Live tasks by key.
    tasks: Arc<DashMap<String, ScheduledTask>>,
    /// Generation counter.
    next_id: Arc<AtomicU64>,
}

impl TaskScheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `fut` under `key`, aborting any task previously registered
    /// under the same key.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, key: impl Into<String>, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let tasks = Arc::clone(&self.tasks);
        let own_key = key.clone();
        let (registered_tx, registered_rx) = oneshot::channel::<()>();

        let join = tokio::spawn(async move {
            // Do not run until the entry exists, otherwise a fast task could
            // finish before registration and leave a stale entry behind.
            if registered_rx.await.is_err() {
                return;
            }
            fut.await;
            tasks.remove_if(&own_key, |_, task| task.id == id);
        });

        let previous = self.tasks.insert(
            key.clone(),
            ScheduledTask {
                id,
                handle: join.abort_handle(),
            },
        );
        if let Some(previous) = previous {
            trace!(key = %key, "Replacing scheduled task");
            previous.handle.abort();
        }
        let _ = registered_tx.send(());
    }

    /// Runs `fut` once after `delay`.
    pub fn schedule_after<F>(&self, key: impl Into<String>, delay: Duration, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn(key, async move {
            tokio::time::sleep(delay).await;
            fut.await;
        });
    }

    /// Runs `f` immediately and then every `period` until cancelled.
    ///
    /// A slow iteration delays the next one instead of bursting to catch up.
    /// A zero `period` is treated as one millisecond.
    pub fn schedule_every<F, Fut>(&self, key: impl Into<String>, period: Duration, mut f: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let period = period.max(Duration::from_millis(1));
        self.spawn(key, async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                f().await;
            }
        });
    }

    /// Cancels the task registered under `key`. Returns whether one existed.
    pub fn cancel(&self, key: &str) -> bool {
        match self.tasks.remove(key) {
            Some((_, task)) => {
                task.handle.abort();
                trace!(key = %key, "Cancelled scheduled task");
                true
            }
            None => false,
        }
    }

    /// Cancels every task whose key starts with `prefix`.
    pub fn cancel_prefix(&self, prefix: &str) -> usize {
        let keys: Vec<String> = self
            .tasks
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();

        keys.iter().filter(|key| self.cancel(key)).count()
    }

    /// Cancels everything.
    pub fn cancel_all(&self) {
        let keys: Vec<String> = self.tasks.iter().map(|entry| entry.key().clone()).collect();
        for key in keys {
            self.cancel(&key);
        }
    }

    /// Whether a task is currently registered under `key`.
    pub fn is_scheduled(&self, key: &str) -> bool {
        self.tasks.contains_key(key)
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no tasks are registered.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn test_schedule_after_fires_once_and_unregisters() {
        let scheduler = TaskScheduler::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        scheduler.schedule_after("once", Duration::from_millis(500), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(scheduler.is_scheduled("once"));

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_scheduled("once"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let scheduler = TaskScheduler::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        scheduler.schedule_after("t", Duration::from_secs(1), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(scheduler.cancel("t"));
        assert!(!scheduler.cancel("t"));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_key_replaces_previous_task() {
        let scheduler = TaskScheduler::new();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = Arc::clone(&hits);
            scheduler.schedule_after("k", Duration::from_secs(1), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(scheduler.len(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_every_ticks_until_cancelled() {
        let scheduler = TaskScheduler::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        scheduler.schedule_every("poll", Duration::from_secs(10), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        // Immediate tick plus ticks at 10s and 20s.
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        scheduler.cancel("poll");
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_every_zero_period_keeps_running() {
        let scheduler = TaskScheduler::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        scheduler.schedule_every("spin", Duration::ZERO, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(hits.load(Ordering::SeqCst) >= 2);
        assert!(scheduler.is_scheduled("spin"));
        scheduler.cancel_all();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prefix_only_touches_matching_keys() {
        let scheduler = TaskScheduler::new();
        for key in ["toast:1", "toast:2", "poll"] {
            scheduler.schedule_after(key, Duration::from_secs(30), async {});
        }

        assert_eq!(scheduler.cancel_prefix("toast:"), 2);
        assert!(scheduler.is_scheduled("poll"));

        scheduler.cancel_all();
        assert!(scheduler.is_empty());
    }
}
