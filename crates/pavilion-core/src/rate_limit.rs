//! Time-windowed request counting keyed by client identity.
//!
//! Each identity gets an independent counter that expires `window` after its
//! last allowed request. Counters live in a bounded cache: expired entries
//! age out, and once the cache exceeds its capacity the least recently
//! touched identities are dropped first. An aged-out counter is
//! indistinguishable from one that never existed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::clock::Clock;

/// Default cap on distinct identities tracked at once.
pub const DEFAULT_UNIQUE_TOKENS: usize = 500;

#[derive(Debug, Clone)]
pub struct RateLimitOptions {
    /// Length of the rolling window.
    pub window: Duration,
    /// Allowed requests per identity per window.
    pub max: u32,
    /// Cap on distinct identities tracked at once.
    pub unique_token_per_interval: usize,
}

impl RateLimitOptions {
    pub fn new(window: Duration, max: u32) -> Self {
        Self {
            window,
            max,
            unique_token_per_interval: DEFAULT_UNIQUE_TOKENS,
        }
    }
}

/// Outcome of a single [`RateLimiter::check`].
///
/// The carried values are advisory: callers surface them to clients as
/// `Retry-After` / `X-RateLimit-*` headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { limit: u32, remaining: u32 },
    Limited { limit: u32, retry_after_secs: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

struct RateEntry {
    count: u32,
    last_seen: DateTime<Utc>,
}

/// Shared, process-wide request counter.
///
/// Explicitly constructed and passed around (no hidden singleton) so tests
/// can run independent instances against a [`ManualClock`].
///
/// [`ManualClock`]: crate::clock::ManualClock
pub struct RateLimiter {
    max: u32,
    capacity: usize,
    window: chrono::Duration,
    retry_after_secs: u64,
    entries: DashMap<String, RateEntry>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(options: RateLimitOptions, clock: Arc<dyn Clock>) -> Self {
        let window = chrono::Duration::from_std(options.window).unwrap_or(chrono::Duration::MAX);
        let retry_after_secs = (options.window.as_millis() as u64).div_ceil(1000);

        Self {
            max: options.max,
            capacity: options.unique_token_per_interval,
            window,
            retry_after_secs,
            entries: DashMap::new(),
            clock,
        }
    }

    /// Counts a request from `identity` and decides whether to admit it.
    ///
    /// The read-increment-write runs under the map's per-entry lock, so
    /// concurrent checks for the same identity cannot lose increments. A
    /// rejected check leaves the entry untouched and does not refresh its
    /// TTL, so quota returns one window after the last *allowed* request.
    pub fn check(&self, identity: &str) -> RateDecision {
        let now = self.clock.now();

        let decision = {
            let mut entry = self
                .entries
                .entry(identity.to_string())
                .or_insert(RateEntry {
                    count: 0,
                    last_seen: now,
                });

            if now.signed_duration_since(entry.last_seen) >= self.window {
                entry.count = 0;
            }

            if entry.count >= self.max {
                RateDecision::Limited {
                    limit: self.max,
                    retry_after_secs: self.retry_after_secs,
                }
            } else {
                entry.count += 1;
                entry.last_seen = now;
                RateDecision::Allowed {
                    limit: self.max,
                    remaining: self.max - entry.count,
                }
            }
        };

        if self.entries.len() > self.capacity {
            self.evict(now);
        }

        decision
    }

    /// Drops expired entries, then least-recently-touched entries until the
    /// cache is back at capacity.
    fn evict(&self, now: DateTime<Utc>) {
        self.entries
            .retain(|_, e| now.signed_duration_since(e.last_seen) < self.window);

        let excess = self.entries.len().saturating_sub(self.capacity);
        if excess == 0 {
            return;
        }

        tracing::debug!("Rate limiter cache over capacity, evicting {excess} identities");

        let mut stamps: Vec<(String, DateTime<Utc>)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().last_seen))
            .collect();
        stamps.sort_by_key(|(_, last_seen)| *last_seen);

        for (key, _) in stamps.into_iter().take(excess) {
            self.entries.remove(&key);
        }
    }

    /// Sweeps entries whose window has elapsed. Correctness never depends on
    /// this being called; it only keeps idle identities from occupying cache
    /// slots between requests.
    pub fn evict_expired(&self) {
        let now = self.clock.now();
        self.entries
            .retain(|_, e| now.signed_duration_since(e.last_seen) < self.window);
    }

    /// Number of identities currently tracked.
    pub fn tracked_identities(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn manual_clock() -> Arc<ManualClock> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        Arc::new(ManualClock::new(start))
    }

    fn limiter(max: u32, window: Duration, capacity: usize) -> (Arc<ManualClock>, RateLimiter) {
        let clock = manual_clock();
        let limiter = RateLimiter::new(
            RateLimitOptions {
                window,
                max,
                unique_token_per_interval: capacity,
            },
            clock.clone(),
        );
        (clock, limiter)
    }

    #[test]
    fn allows_exactly_max_requests_per_window() {
        let (_clock, limiter) = limiter(5, Duration::from_secs(60), 500);

        for expected_remaining in (0..5).rev() {
            assert_eq!(
                limiter.check("203.0.113.7"),
                RateDecision::Allowed {
                    limit: 5,
                    remaining: expected_remaining,
                }
            );
        }

        assert_eq!(
            limiter.check("203.0.113.7"),
            RateDecision::Limited {
                limit: 5,
                retry_after_secs: 60,
            }
        );
    }

    #[test]
    fn retry_after_rounds_subsecond_windows_up() {
        let (_clock, limiter) = limiter(1, Duration::from_millis(1500), 500);

        assert!(limiter.check("a").is_allowed());
        assert_eq!(
            limiter.check("a"),
            RateDecision::Limited {
                limit: 1,
                retry_after_secs: 2,
            }
        );
    }

    #[test]
    fn counter_resets_after_window_of_inactivity() {
        let (clock, limiter) = limiter(5, Duration::from_secs(60), 500);

        for _ in 0..5 {
            assert!(limiter.check("203.0.113.7").is_allowed());
        }
        assert!(!limiter.check("203.0.113.7").is_allowed());

        clock.advance(Duration::from_secs(61));

        // Fresh window: full quota minus the request just counted.
        assert_eq!(
            limiter.check("203.0.113.7"),
            RateDecision::Allowed {
                limit: 5,
                remaining: 4,
            }
        );
    }

    #[test]
    fn rejected_checks_do_not_refresh_the_window() {
        let (clock, limiter) = limiter(2, Duration::from_secs(60), 500);

        assert!(limiter.check("a").is_allowed());
        assert!(limiter.check("a").is_allowed());

        // Hammering while limited must not push the reset further out.
        clock.advance(Duration::from_secs(30));
        assert!(!limiter.check("a").is_allowed());

        clock.advance(Duration::from_secs(31));
        assert!(limiter.check("a").is_allowed());
    }

    #[test]
    fn identities_are_counted_independently() {
        let (_clock, limiter) = limiter(1, Duration::from_secs(60), 500);

        assert!(limiter.check("a").is_allowed());
        assert!(limiter.check("b").is_allowed());
        assert!(!limiter.check("a").is_allowed());
        assert!(!limiter.check("b").is_allowed());
    }

    #[test]
    fn empty_identity_is_one_shared_bucket() {
        let (_clock, limiter) = limiter(2, Duration::from_secs(60), 500);

        assert!(limiter.check("").is_allowed());
        assert!(limiter.check("").is_allowed());
        assert!(!limiter.check("").is_allowed());
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let (clock, limiter) = limiter(5, Duration::from_secs(600), 2);

        assert!(limiter.check("first").is_allowed());
        clock.advance(Duration::from_secs(1));
        assert!(limiter.check("second").is_allowed());
        clock.advance(Duration::from_secs(1));
        assert!(limiter.check("third").is_allowed());

        assert_eq!(limiter.tracked_identities(), 2);

        // "first" was the least recently touched; it starts over.
        clock.advance(Duration::from_secs(1));
        assert_eq!(
            limiter.check("first"),
            RateDecision::Allowed {
                limit: 5,
                remaining: 4,
            }
        );
    }

    #[test]
    fn eviction_prefers_expired_entries() {
        let (clock, limiter) = limiter(5, Duration::from_secs(60), 2);

        assert!(limiter.check("stale").is_allowed());
        clock.advance(Duration::from_secs(61));

        assert!(limiter.check("a").is_allowed());
        assert!(limiter.check("b").is_allowed());
        assert!(limiter.check("c").is_allowed());

        // "stale" aged out; live entries survive the capacity pass.
        assert_eq!(limiter.tracked_identities(), 2);
    }

    #[test]
    fn evict_expired_sweeps_idle_identities() {
        let (clock, limiter) = limiter(5, Duration::from_secs(60), 500);

        assert!(limiter.check("a").is_allowed());
        assert!(limiter.check("b").is_allowed());
        assert_eq!(limiter.tracked_identities(), 2);

        clock.advance(Duration::from_secs(61));
        limiter.evict_expired();

        assert_eq!(limiter.tracked_identities(), 0);
    }

    #[test]
    fn concurrent_checks_do_not_lose_increments() {
        let clock = manual_clock();
        let limiter = Arc::new(RateLimiter::new(
            RateLimitOptions {
                window: Duration::from_secs(600),
                max: 1000,
                unique_token_per_interval: 500,
            },
            clock.clone(),
        ));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let limiter = limiter.clone();
                scope.spawn(move || {
                    for _ in 0..25 {
                        assert!(limiter.check("shared").is_allowed());
                    }
                });
            }
        });

        // 100 increments observed, none lost.
        assert_eq!(
            limiter.check("shared"),
            RateDecision::Allowed {
                limit: 1000,
                remaining: 1000 - 101,
            }
        );
    }
}
