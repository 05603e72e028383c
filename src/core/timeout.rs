use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::AbortHandle;

/// Per-request deadline timers.
///
/// Each request id has at most one live timer: scheduling replaces (and
/// aborts) any previous timer for the same id, so a request can never have
/// both its match-timeout and acceptance-timeout armed at once.
pub struct TimeoutManager {
    timers: Mutex<HashMap<String, AbortHandle>>,
}

impl TimeoutManager {
    pub fn new() -> Self {
        Self {
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Arm a timer: after `after`, run `on_expiry` unless cancelled first.
    ///
    /// The deadline is anchored here, not at the spawned task's first
    /// poll, so a busy runtime cannot stretch the window.
    pub fn schedule<F>(&self, request_id: &str, after: Duration, on_expiry: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let deadline = tokio::time::Instant::now() + after;
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            on_expiry.await;
        });

        let mut timers = self.timers.lock().unwrap();
        if let Some(previous) = timers.insert(request_id.to_string(), handle.abort_handle()) {
            previous.abort();
        }
    }

    /// Disarm the timer for a request. Returns whether one was registered.
    pub fn cancel(&self, request_id: &str) -> bool {
        let mut timers = self.timers.lock().unwrap();
        match timers.remove(request_id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Release a timer slot without aborting its task. A fired timer uses
    /// this on its own slot; `cancel` there would flag the running task
    /// and kill it at its next await point.
    pub fn forget(&self, request_id: &str) -> bool {
        self.timers.lock().unwrap().remove(request_id).is_some()
    }

    /// Number of registered timers (fired-but-uncancelled included)
    pub fn registered(&self) -> usize {
        self.timers.lock().unwrap().len()
    }
}

impl Default for TimeoutManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_deadline() {
        let manager = TimeoutManager::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        manager.schedule("r1", Duration::from_millis(100), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::advance(Duration::from_millis(99)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    // The clock may advance before the spawned timer task is ever polled;
    // the deadline must still be counted from the schedule() call.
    #[tokio::test(start_paused = true)]
    async fn test_deadline_counts_from_schedule_call() {
        let manager = TimeoutManager::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        manager.schedule("r1", Duration::from_millis(100), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // No yield between schedule and advance: the task first polls
        // with the clock already past the deadline.
        tokio::time::advance(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forget_releases_slot_without_abort() {
        let manager = TimeoutManager::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        manager.schedule("r1", Duration::from_millis(50), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(manager.forget("r1"));
        assert!(!manager.forget("r1"));
        assert_eq!(manager.registered(), 0);

        // The task itself keeps running to completion
        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_disarms_timer() {
        let manager = TimeoutManager::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        manager.schedule("r1", Duration::from_millis(100), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(manager.cancel("r1"));
        assert!(!manager.cancel("r1"));

        tokio::time::advance(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_previous_timer() {
        let manager = TimeoutManager::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let first = Arc::clone(&fired);
        manager.schedule("r1", Duration::from_millis(50), async move {
            first.fetch_add(1, Ordering::SeqCst);
        });

        let second = Arc::clone(&fired);
        manager.schedule("r1", Duration::from_millis(100), async move {
            second.fetch_add(10, Ordering::SeqCst);
        });

        assert_eq!(manager.registered(), 1);

        tokio::time::advance(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;

        // Only the replacement fired
        assert_eq!(fired.load(Ordering::SeqCst), 10);
    }
}
