use std::future::Future;
use std::time::Duration;

use tokio_metrics::TaskMonitor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::context::Context;

/// Owns the shutdown signal and every connection task.
#[derive(Clone)]
pub struct Control {
    pub task_mon: TaskMonitor,
    shutdown: CancellationToken,
    /// Cancelled once the grace period after shutdown has run out.
    expired: CancellationToken,
    tracker: TaskTracker,
    grace: Duration,
}

impl Control {
    pub fn new(grace: Duration) -> Self {
        Control {
            task_mon: TaskMonitor::builder().build(),
            shutdown: CancellationToken::new(),
            expired: CancellationToken::new(),
            tracker: TaskTracker::new(),
            grace,
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Context for work running inside a session. It stays live through the
    /// shutdown grace period so in-flight pushes can still reach the database.
    pub fn session_context(&self) -> Context {
        Context::with_token(self.expired.child_token())
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Spawn a task with monitoring instrumentation. Once shutdown starts the
    /// task gets the grace period to finish and is then dropped.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let grace = self.grace;
        self.tracker.spawn(self.task_mon.instrument(async move {
            tokio::select! {
                _ = fut => {}
                _ = async {
                    shutdown.cancelled().await;
                    tokio::time::sleep(grace).await;
                } => {
                    warn!(grace_secs = grace.as_secs(), "task outlived shutdown grace period, dropping it");
                }
            }
        }));
    }

    /// Signals shutdown and waits for all tracked tasks.
    pub async fn shutdown(&self) {
        info!(tasks = self.tracker.len(), "shutting down");
        self.shutdown.cancel();
        self.tracker.close();
        tokio::select! {
            _ = self.tracker.wait() => {}
            _ = tokio::time::sleep(self.grace) => {
                self.expired.cancel();
                self.tracker.wait().await;
            }
        }
        self.expired.cancel();
        info!("all tasks finished");
    }

    /// Start collecting metrics periodically
    pub fn start_metrics_collection(&self, period: Duration) {
        let task_metrics = self.task_mon.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let metrics = task_metrics.cumulative();
                        info!(
                            instrumented = metrics.instrumented_count,
                            dropped = metrics.dropped_count,
                            polls = metrics.total_poll_count,
                            busy_ms = metrics.total_poll_duration.as_millis() as u64,
                            "task metrics"
                        );
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_quick_tasks() {
        let control = Control::new(Duration::from_secs(5));
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        control.spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            flag.store(true, Ordering::SeqCst);
        });
        control.shutdown().await;
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(control.task_mon.cumulative().instrumented_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drops_stalled_tasks() {
        let control = Control::new(Duration::from_secs(5));
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        control.spawn(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            flag.store(true, Ordering::SeqCst);
        });
        let started = tokio::time::Instant::now();
        control.shutdown().await;
        assert!(!finished.load(Ordering::SeqCst));
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(3600));
        assert!(control.is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_context_outlives_shutdown_signal() {
        let control = Control::new(Duration::from_secs(5));
        let ctx = control.session_context();
        let observed = Arc::new(AtomicBool::new(false));
        let flag = observed.clone();
        let task_ctx = ctx.clone();
        control.spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            flag.store(task_ctx.check().is_ok(), Ordering::SeqCst);
        });
        control.shutdown().await;
        assert!(observed.load(Ordering::SeqCst));
        assert!(matches!(ctx.check(), Err(crate::error::DepGitError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_context_cancelled_after_grace() {
        let control = Control::new(Duration::from_secs(5));
        let ctx = control.session_context();
        control.spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        let stop = control.clone();
        let shutdown = tokio::spawn(async move { stop.shutdown().await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(control.is_shutting_down());
        assert!(ctx.check().is_ok());
        shutdown.await.unwrap();
        assert!(ctx.check().is_err());
    }
}
