//! Background side effects
//!
//! Notifications and emails triggered by a request run here so the
//! response is never delayed by them. Each task logs its own failure;
//! nothing is retried. Shutdown waits for in-flight tasks with a deadline.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::Result;

#[derive(Default)]
struct Inner {
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Decrements the in-flight count when the task ends, including on panic
struct InFlightGuard(Arc<Inner>);

impl InFlightGuard {
    fn new(inner: Arc<Inner>) -> Self {
        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(inner)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

#[derive(Clone, Default)]
pub struct BackgroundTasks {
    inner: Arc<Inner>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` and return immediately; an error is logged at warn
    pub fn submit<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let guard = InFlightGuard::new(self.inner.clone());
        tokio::spawn(async move {
            let _guard = guard;
            match task.await {
                Ok(()) => debug!(task = name, "Background task completed"),
                Err(e) => warn!(task = name, error = %e, "Background task failed"),
            }
        });
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Resolves once no task is running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Wait for in-flight tasks up to `timeout`; returns false if some were still running
    pub async fn drain(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_idle()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let tasks = BackgroundTasks::new();
        let completed = Arc::new(AtomicU32::new(0));

        tasks.submit("fails", async { Err(PlatformError::internal("smtp down")) });
        for _ in 0..3 {
            let completed = completed.clone();
            tasks.submit("succeeds", async move {
                completed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        tasks.wait_idle().await;
        assert_eq!(completed.load(Ordering::SeqCst), 3);
        assert_eq!(tasks.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_drain_times_out() {
        let tasks = BackgroundTasks::new();
        tasks.submit("slow", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        });
        assert!(!tasks.drain(Duration::from_millis(20)).await);
        assert_eq!(tasks.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_wait_idle_when_nothing_submitted() {
        let tasks = BackgroundTasks::new();
        assert!(tasks.drain(Duration::from_millis(10)).await);
    }
}
