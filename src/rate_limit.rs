//! Per-client sliding-window request governor.
//!
//! Each client key owns a queue of recent admission times. On every check the
//! queue is pruned to the window, and the request is admitted only while the
//! pruned count is below the ceiling. The window slides continuously; there
//! are no fixed reset boundaries, and bursts up to the ceiling are allowed.
//!
//! # Locking
//!
//! The key → queue map sits behind one short-lived lock that is only held to
//! look up or insert a key's queue. Each queue has its own lock, so traffic
//! from different clients never contends on the queue itself. The background
//! sweep takes the same map lock and drops a key only when its queue is empty
//! and no request currently holds a handle to it, so an in-flight admission
//! can never be recorded into a queue that has already been discarded.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::config::RateLimitConfig;

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: usize,
}

type Window = Arc<Mutex<VecDeque<Instant>>>;

pub struct RateGovernor {
    max_requests: usize,
    window: Duration,
    clients: Mutex<HashMap<String, Window>>,
}

impl RateGovernor {
    /// `max_requests` and `window` must be non-zero; configuration loading
    /// rejects zero values before a governor is ever built.
    pub fn new(max_requests: usize, window: Duration) -> Self {
        debug_assert!(max_requests > 0 && !window.is_zero());
        Self {
            max_requests,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window())
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check `client_key` against its window and record the request if it is
    /// admitted.
    pub fn check_and_record(&self, client_key: &str) -> RateDecision {
        self.check_and_record_at(client_key, Instant::now())
    }

    /// [`check_and_record`](Self::check_and_record) with an explicit clock.
    pub fn check_and_record_at(&self, client_key: &str, now: Instant) -> RateDecision {
        let window = {
            let mut clients = self.clients.lock();
            Arc::clone(clients.entry(client_key.to_string()).or_default())
        };

        let mut times = window.lock();
        prune(&mut times, now, self.window);

        if times.len() >= self.max_requests {
            return RateDecision {
                allowed: false,
                remaining: 0,
            };
        }

        times.push_back(now);
        RateDecision {
            allowed: true,
            remaining: self.max_requests - times.len(),
        }
    }

    /// Drop every client whose window has fully expired. Returns how many
    /// keys were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut clients = self.clients.lock();
        let before = clients.len();

        clients.retain(|_, window| {
            // A handle held elsewhere means a check is in flight for this key.
            if Arc::strong_count(window) > 1 {
                return true;
            }
            let mut times = window.lock();
            prune(&mut times, now, self.window);
            !times.is_empty()
        });

        before - clients.len()
    }

    /// Number of client keys currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.clients.lock().len()
    }

    /// Run [`sweep`](Self::sweep) every `interval` on the tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let governor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = governor.sweep();
                tracing::debug!(
                    removed,
                    remaining = governor.tracked_clients(),
                    "rate limit sweep"
                );
            }
        })
    }
}

/// Remove timestamps that are at least `window` old.
fn prune(times: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = times.front() {
        if now.saturating_duration_since(oldest) >= window {
            times.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const MINUTE: Duration = Duration::from_millis(60_000);

    #[test]
    fn test_ceiling_then_reject_then_recover() {
        let governor = RateGovernor::new(3, MINUTE);
        let t0 = Instant::now();

        for i in 0..3 {
            let d = governor.check_and_record_at("1.2.3.4", t0 + Duration::from_secs(i));
            assert!(d.allowed, "call {} should be allowed", i + 1);
        }

        let rejected = governor.check_and_record_at("1.2.3.4", t0 + Duration::from_secs(10));
        assert_eq!(
            rejected,
            RateDecision {
                allowed: false,
                remaining: 0
            }
        );

        let later = governor.check_and_record_at("1.2.3.4", t0 + MINUTE + Duration::from_secs(3));
        assert!(later.allowed);
    }

    #[test]
    fn test_remaining_decreases_by_one() {
        let governor = RateGovernor::new(5, MINUTE);
        let t0 = Instant::now();
        let remaining: Vec<usize> = (0..5)
            .map(|i| {
                governor
                    .check_and_record_at("client", t0 + Duration::from_millis(i))
                    .remaining
            })
            .collect();
        assert_eq!(remaining, vec![4, 3, 2, 1, 0]);

        let d = governor.check_and_record_at("client", t0 + Duration::from_millis(10));
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
    }

    #[test]
    fn test_rejection_does_not_record() {
        let governor = RateGovernor::new(1, MINUTE);
        let t0 = Instant::now();
        assert!(governor.check_and_record_at("k", t0).allowed);
        // Rejected calls inside the window must not extend it.
        for s in 1..50 {
            assert!(!governor.check_and_record_at("k", t0 + Duration::from_secs(s)).allowed);
        }
        assert!(governor.check_and_record_at("k", t0 + MINUTE).allowed);
    }

    #[test]
    fn test_window_slides() {
        let governor = RateGovernor::new(2, MINUTE);
        let t0 = Instant::now();
        assert!(governor.check_and_record_at("k", t0).allowed);
        assert!(governor.check_and_record_at("k", t0 + Duration::from_secs(30)).allowed);
        assert!(!governor.check_and_record_at("k", t0 + Duration::from_secs(59)).allowed);
        // The first request ages out, the second is still inside the window.
        let d = governor.check_and_record_at("k", t0 + Duration::from_secs(61));
        assert!(d.allowed);
        assert_eq!(d.remaining, 0);
    }

    #[test]
    fn test_keys_are_independent() {
        let governor = RateGovernor::new(1, MINUTE);
        let t0 = Instant::now();
        assert!(governor.check_and_record_at("a", t0).allowed);
        assert!(governor.check_and_record_at("b", t0).allowed);
        assert!(!governor.check_and_record_at("a", t0).allowed);
    }

    #[test]
    fn test_sweep_removes_only_expired_clients() {
        let governor = RateGovernor::new(3, MINUTE);
        let t0 = Instant::now();
        governor.check_and_record_at("old", t0);
        governor.check_and_record_at("fresh", t0 + Duration::from_secs(50));
        assert_eq!(governor.tracked_clients(), 2);

        let removed = governor.sweep_at(t0 + Duration::from_secs(70));
        assert_eq!(removed, 1);
        assert_eq!(governor.tracked_clients(), 1);

        // The surviving key keeps its history.
        let d = governor.check_and_record_at("fresh", t0 + Duration::from_secs(71));
        assert_eq!(d.remaining, 1);
    }

    #[test]
    fn test_no_lost_updates_under_contention() {
        let governor = Arc::new(RateGovernor::new(100, MINUTE));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let governor = governor.clone();
                thread::spawn(move || {
                    (0..25)
                        .filter(|_| governor.check_and_record("shared").allowed)
                        .count()
                })
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 100);
        assert!(!governor.check_and_record("shared").allowed);
    }

    #[tokio::test]
    async fn test_sweeper_task_runs_on_interval() {
        let governor = Arc::new(RateGovernor::new(3, Duration::from_millis(10)));
        governor.check_and_record("gone-soon");
        assert_eq!(governor.tracked_clients(), 1);

        let handle = governor.spawn_sweeper(Duration::from_millis(25));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(governor.tracked_clients(), 0);
        handle.abort();
    }
}
