//! Sender pool and per-sender health records
//!
//! One sender per configured address, created together at startup and torn
//! down together at shutdown. Health state is small per-entry state
//! (atomic counters plus a per-entry lock for the failure timestamp) so
//! selection by caller tasks never contends on a global lock with the
//! health monitor's scan; the entry list itself is append-only after
//! construction and iterated without locking.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::ConfigError;
use crate::sender::ManagedSender;

// Uses the tokio clock, which test code can pause and advance; outside a
// runtime it falls back to the system monotonic clock.
type Instant = tokio::time::Instant;

/// Mutable health state of one sender.
///
/// The failure timestamp only moves forward; a successful call clears the
/// failure count and marks the connection usable again.
#[derive(Debug, Default)]
pub struct SenderHealth {
    consecutive_failures: AtomicU32,
    disconnected: AtomicBool,
    // `None` = never failed
    last_failure: Mutex<Option<Instant>>,
}

impl SenderHealth {
    /// Fresh record: no failures, considered connected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed call or reconnection attempt.
    pub fn record_failure(&self) {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        self.disconnected.store(true, Ordering::Relaxed);
        let now = Instant::now();
        let mut last = self.last_failure.lock();
        *last = Some(last.map_or(now, |prev| prev.max(now)));
    }

    /// Record a successful call or reconnection; clears the record.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.disconnected.store(false, Ordering::Relaxed);
    }

    /// Failures since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Whether the underlying connection is believed usable.
    pub fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::Relaxed)
    }

    /// When the sender last failed; `None` when it never failed.
    pub fn last_failure_at(&self) -> Option<Instant> {
        *self.last_failure.lock()
    }

    /// Time elapsed since the last recorded failure.
    pub fn since_last_failure(&self) -> Option<Duration> {
        self.last_failure_at()
            .map(|at| Instant::now().saturating_duration_since(at))
    }
}

/// The set of senders for one cluster plus their health records.
#[derive(Debug)]
pub struct SenderPool<S> {
    senders: Vec<Arc<S>>,
    failure_threshold: u32,
}

impl<S: ManagedSender> SenderPool<S> {
    /// Build a pool over already-constructed senders.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyCluster`] for an empty sender list.
    pub fn new(senders: Vec<Arc<S>>, failure_threshold: u32) -> Result<Self, ConfigError> {
        if senders.is_empty() {
            return Err(ConfigError::EmptyCluster);
        }
        Ok(Self {
            senders,
            failure_threshold,
        })
    }

    /// Select the currently best sender.
    ///
    /// Fewest consecutive failures first, ties broken by the oldest last
    /// failure (a sender that never failed sorts before all others). When
    /// every sender is degraded the least-recently-failed one is still
    /// returned so the caller gets a best-effort candidate; the subsequent
    /// call surfaces the delivery error.
    pub fn select_sender(&self) -> Arc<S> {
        self.senders
            .iter()
            .min_by_key(|s| {
                let health = s.health();
                (health.consecutive_failures(), health.last_failure_at())
            })
            .cloned()
            .expect("pool construction rejects an empty sender list")
    }

    /// Record a delivery failure against a sender.
    pub fn mark_failed(&self, sender: &S) {
        sender.health().record_failure();
        debug!(
            target = sender.target(),
            failures = sender.health().consecutive_failures(),
            "sender marked failed"
        );
    }

    /// Record a successful delivery against a sender.
    pub fn mark_succeeded(&self, sender: &S) {
        sender.health().record_success();
    }

    /// All senders, in configuration order.
    pub fn senders(&self) -> &[Arc<S>] {
        &self.senders
    }

    /// Failures after which a sender is considered unhealthy.
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Close every sender; no further calls or reconnections will succeed.
    pub fn close_all(&self) {
        for sender in &self.senders {
            sender.close();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use async_trait::async_trait;

    /// How a mock sender answers reconnection attempts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum ReconnectMode {
        Succeed,
        Fail,
        Hang,
    }

    #[derive(Debug)]
    pub(crate) struct MockSender {
        target: String,
        health: SenderHealth,
        pub(crate) mode: ReconnectMode,
        pub(crate) attempts: AtomicU32,
    }

    impl MockSender {
        pub(crate) fn new(target: &str, mode: ReconnectMode) -> Arc<Self> {
            Arc::new(Self {
                target: target.to_string(),
                health: SenderHealth::new(),
                mode,
                attempts: AtomicU32::new(0),
            })
        }

        pub(crate) fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl ManagedSender for MockSender {
        fn target(&self) -> &str {
            &self.target
        }

        fn health(&self) -> &SenderHealth {
            &self.health
        }

        async fn reconnect(&self) -> Result<(), DeliveryError> {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            match self.mode {
                ReconnectMode::Succeed => Ok(()),
                ReconnectMode::Fail => Err(DeliveryError::Closed {
                    target: self.target.clone(),
                }),
                ReconnectMode::Hang => std::future::pending().await,
            }
        }

        fn close(&self) {}
    }

    fn pool_of(targets: &[&str]) -> (SenderPool<MockSender>, Vec<Arc<MockSender>>) {
        let senders: Vec<_> = targets
            .iter()
            .map(|t| MockSender::new(t, ReconnectMode::Succeed))
            .collect();
        let pool = SenderPool::new(senders.clone(), 3).unwrap();
        (pool, senders)
    }

    #[test]
    fn test_empty_pool_is_rejected() {
        let err = SenderPool::<MockSender>::new(Vec::new(), 3).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyCluster));
    }

    #[test]
    fn test_one_sender_per_address() {
        let (pool, _) = pool_of(&["a:1", "b:1", "c:1"]);
        assert_eq!(pool.senders().len(), 3);
    }

    #[test]
    fn test_mark_failed_increments_and_advances_timestamp() {
        let (pool, senders) = pool_of(&["a:1"]);
        pool.mark_failed(&senders[0]);
        let first = senders[0].health().last_failure_at().unwrap();
        assert_eq!(senders[0].health().consecutive_failures(), 1);
        pool.mark_failed(&senders[0]);
        let second = senders[0].health().last_failure_at().unwrap();
        assert_eq!(senders[0].health().consecutive_failures(), 2);
        assert!(second >= first);
        pool.mark_succeeded(&senders[0]);
        assert_eq!(senders[0].health().consecutive_failures(), 0);
        assert!(senders[0].health().is_connected());
    }

    #[test]
    fn test_selection_avoids_failed_sender() {
        let (pool, senders) = pool_of(&["a:1", "b:1"]);
        pool.mark_failed(&senders[0]);
        for _ in 0..4 {
            assert_eq!(pool.select_sender().target(), "b:1");
        }
        // a recovers and carries the older failure record; b fails twice
        pool.mark_succeeded(&senders[0]);
        pool.mark_failed(&senders[1]);
        pool.mark_failed(&senders[1]);
        assert_eq!(pool.select_sender().target(), "a:1");
    }

    #[test]
    fn test_degraded_pool_returns_least_recently_failed() {
        let (pool, senders) = pool_of(&["a:1", "b:1"]);
        for _ in 0..4 {
            pool.mark_failed(&senders[0]);
        }
        std::thread::sleep(Duration::from_millis(2));
        for _ in 0..4 {
            pool.mark_failed(&senders[1]);
        }
        // both past the threshold; the older failure wins
        assert_eq!(pool.select_sender().target(), "a:1");
    }

    #[test]
    fn test_tie_break_prefers_oldest_failure() {
        let (pool, senders) = pool_of(&["a:1", "b:1"]);
        pool.mark_failed(&senders[1]);
        std::thread::sleep(Duration::from_millis(2));
        pool.mark_failed(&senders[0]);
        // equal failure counts; b failed first so b is selected
        assert_eq!(pool.select_sender().target(), "b:1");
    }

    #[test]
    fn test_never_failed_sender_wins_ties() {
        let (pool, senders) = pool_of(&["a:1", "b:1"]);
        pool.mark_failed(&senders[0]);
        pool.mark_succeeded(&senders[0]);
        // both at zero failures, but a carries a failure timestamp
        assert_eq!(pool.select_sender().target(), "b:1");
    }
}
