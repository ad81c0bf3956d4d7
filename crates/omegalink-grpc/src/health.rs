//! Background reconnection engine
//!
//! A single task per cluster, independent of caller tasks, that
//! periodically scans the pool and repairs degraded senders:
//!
//! - a sender is probed when its connection is down or its failure count
//!   passed the threshold
//! - no attempt is made before `reconnect_delay` has elapsed since the
//!   sender's last failure, never immediately after one
//! - every attempt is bounded by `attempt_timeout`; an overrun is recorded
//!   as a fresh failure and the scan moves on
//! - a successful attempt clears the health record, making the sender
//!   selectable again
//!
//! The monitor has its own lifecycle: [`HealthMonitor::shutdown`] signals
//! the task, interrupts any in-flight attempt and waits for the task to
//! exit, so no reconnection survives shutdown.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::pool::SenderPool;
use crate::sender::ManagedSender;

/// Timing knobs of the reconnection engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthMonitorConfig {
    /// Interval between pool scans.
    pub probe_interval: Duration,
    /// Minimum quiet period after a failure before a reconnection attempt.
    pub reconnect_delay: Duration,
    /// Upper bound on a single reconnection attempt.
    pub attempt_timeout: Duration,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(2),
            reconnect_delay: Duration::from_secs(3),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

/// Handle to the spawned reconnection task.
#[derive(Debug)]
pub struct HealthMonitor {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HealthMonitor {
    /// Spawn the monitor over a pool. Must be called within a Tokio
    /// runtime.
    pub fn spawn<S: ManagedSender>(pool: Arc<SenderPool<S>>, config: HealthMonitorConfig) -> Self {
        let (shutdown, mut signal) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.probe_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = signal.changed() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    _ = signal.changed() => break,
                    () = probe_pass(&pool, &config) => {}
                }
            }
            debug!("health monitor stopped");
        });
        Self { shutdown, task }
    }

    /// Stop the monitor and wait for the task to exit. Any in-flight
    /// reconnection attempt is abandoned.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// One scan over the pool.
async fn probe_pass<S: ManagedSender>(pool: &SenderPool<S>, config: &HealthMonitorConfig) {
    for sender in pool.senders() {
        let health = sender.health();
        if health.is_connected() && health.consecutive_failures() <= pool.failure_threshold() {
            continue;
        }
        if let Some(since) = health.since_last_failure() {
            if since < config.reconnect_delay {
                continue;
            }
        }
        debug!(target = sender.target(), "attempting reconnection");
        match tokio::time::timeout(config.attempt_timeout, sender.reconnect()).await {
            Ok(Ok(())) => {
                health.record_success();
                info!(target = sender.target(), "sender recovered");
            }
            Ok(Err(err)) => {
                health.record_failure();
                warn!(
                    target = sender.target(),
                    error = %err,
                    failures = health.consecutive_failures(),
                    "reconnection failed"
                );
            }
            Err(_) => {
                health.record_failure();
                warn!(
                    target = sender.target(),
                    failures = health.consecutive_failures(),
                    "reconnection attempt timed out"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::tests::{MockSender, ReconnectMode};

    fn config(probe_ms: u64, delay_ms: u64, timeout_ms: u64) -> HealthMonitorConfig {
        HealthMonitorConfig {
            probe_interval: Duration::from_millis(probe_ms),
            reconnect_delay: Duration::from_millis(delay_ms),
            attempt_timeout: Duration::from_millis(timeout_ms),
        }
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_waits_for_the_delay() {
        let sender = MockSender::new("a:1", ReconnectMode::Succeed);
        let pool = Arc::new(SenderPool::new(vec![sender.clone()], 3).unwrap());
        let monitor = HealthMonitor::spawn(pool.clone(), config(1_000, 5_000, 30_000));

        sender.health().record_failure();
        tokio::time::advance(Duration::from_millis(2_500)).await;
        settle().await;
        // two scans ran; the quiet period has not elapsed yet
        assert_eq!(sender.attempts(), 0);

        tokio::time::advance(Duration::from_millis(4_000)).await;
        settle().await;
        assert!(sender.attempts() >= 1);
        assert!(sender.health().is_connected());
        assert_eq!(sender.health().consecutive_failures(), 0);

        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovered_sender_is_selectable_again() {
        let a = MockSender::new("a:1", ReconnectMode::Succeed);
        let b = MockSender::new("b:1", ReconnectMode::Succeed);
        let pool = Arc::new(SenderPool::new(vec![a.clone(), b.clone()], 3).unwrap());
        let monitor = HealthMonitor::spawn(pool.clone(), config(1_000, 2_000, 30_000));

        a.health().record_failure();
        assert_eq!(pool.select_sender().target(), "b:1");

        tokio::time::advance(Duration::from_millis(4_000)).await;
        settle().await;
        assert!(a.health().is_connected());
        // b never failed, so it still wins the tie-break; a is selectable
        // again once b degrades
        b.health().record_failure();
        assert_eq!(pool.select_sender().target(), "a:1");

        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_attempt_counts_as_fresh_failure() {
        let sender = MockSender::new("a:1", ReconnectMode::Hang);
        let pool = Arc::new(SenderPool::new(vec![sender.clone()], 3).unwrap());
        let monitor = HealthMonitor::spawn(pool.clone(), config(1_000, 0, 2_000));

        sender.health().record_failure();
        let before = sender.health().last_failure_at().unwrap();

        // scan starts an attempt which hangs until the timeout fires
        tokio::time::advance(Duration::from_millis(1_500)).await;
        settle().await;
        assert_eq!(sender.attempts(), 1);
        assert_eq!(sender.health().consecutive_failures(), 1);

        tokio::time::advance(Duration::from_millis(2_500)).await;
        settle().await;
        assert_eq!(sender.health().consecutive_failures(), 2);
        assert!(sender.health().last_failure_at().unwrap() > before);

        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_attempt_is_retried_on_a_later_scan() {
        let sender = MockSender::new("a:1", ReconnectMode::Fail);
        let pool = Arc::new(SenderPool::new(vec![sender.clone()], 3).unwrap());
        let monitor = HealthMonitor::spawn(pool.clone(), config(1_000, 0, 30_000));

        sender.health().record_failure();
        tokio::time::advance(Duration::from_millis(1_500)).await;
        settle().await;
        let first = sender.attempts();
        assert!(first >= 1);

        tokio::time::advance(Duration::from_millis(2_000)).await;
        settle().await;
        assert!(sender.attempts() > first);

        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_senders_are_left_alone() {
        let sender = MockSender::new("a:1", ReconnectMode::Succeed);
        let pool = Arc::new(SenderPool::new(vec![sender.clone()], 3).unwrap());
        let monitor = HealthMonitor::spawn(pool.clone(), config(1_000, 0, 30_000));

        tokio::time::advance(Duration::from_millis(5_000)).await;
        settle().await;
        assert_eq!(sender.attempts(), 0);

        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_attempt_survives_shutdown() {
        let sender = MockSender::new("a:1", ReconnectMode::Succeed);
        let pool = Arc::new(SenderPool::new(vec![sender.clone()], 3).unwrap());
        let monitor = HealthMonitor::spawn(pool.clone(), config(1_000, 0, 30_000));
        monitor.shutdown().await;

        sender.health().record_failure();
        tokio::time::advance(Duration::from_millis(10_000)).await;
        settle().await;
        assert_eq!(sender.attempts(), 0);
    }
}
