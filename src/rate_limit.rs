use std::time::{Duration, Instant};

use dashmap::DashMap;

// Per-client quota record. Created on the first request from a key,
// mutated in place on every subsequent one, dropped by `sweep` once
// its window has lapsed.
#[derive(Debug)]
struct ClientQuota {
    count: u32,
    window_start: Instant,
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

/// Fixed-window request limiter keyed by client identifier.
///
/// Owned by the application state and shared across handlers; the
/// DashMap entry guard makes the read-modify-write of a single quota
/// record atomic, so concurrent requests from the same client cannot
/// over-admit.
pub struct RateLimiter {
    clients: DashMap<String, ClientQuota>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            clients: DashMap::new(),
            limit,
            window,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admission check: consumes one unit of quota when allowed.
    /// A lapsed window is reset in place rather than waiting for the
    /// sweeper.
    pub fn check(&self, key: &str) -> Decision {
        if self.limit == 0 {
            return self.denied(self.window);
        }

        let now = Instant::now();
        let mut entry = self
            .clients
            .entry(key.to_string())
            .or_insert(ClientQuota {
                count: 0,
                window_start: now,
            });

        let elapsed = now.saturating_duration_since(entry.window_start);
        if elapsed > self.window {
            entry.count = 1;
            entry.window_start = now;
            return Decision {
                allowed: true,
                limit: self.limit,
                remaining: self.limit - 1,
                reset_after: self.window,
            };
        }

        let reset_after = self.window - elapsed;
        if entry.count < self.limit {
            entry.count += 1;
            return Decision {
                allowed: true,
                limit: self.limit,
                remaining: self.limit - entry.count,
                reset_after,
            };
        }

        self.denied(reset_after)
    }

    /// Reports the current quota for a key without consuming any.
    /// Unknown or lapsed keys report a full window.
    pub fn status(&self, key: &str) -> Decision {
        match self.clients.get(key) {
            Some(entry) => {
                let elapsed = entry.window_start.elapsed();
                if elapsed > self.window {
                    return self.fresh();
                }
                Decision {
                    allowed: entry.count < self.limit,
                    limit: self.limit,
                    remaining: self.limit.saturating_sub(entry.count),
                    reset_after: self.window - elapsed,
                }
            }
            None => self.fresh(),
        }
    }

    /// Drops every record whose window has lapsed. Returns how many
    /// were removed. Called from the background sweep task.
    pub fn sweep(&self) -> usize {
        let before = self.clients.len();
        let window = self.window;
        self.clients
            .retain(|_, quota| quota.window_start.elapsed() <= window);
        before - self.clients.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    fn fresh(&self) -> Decision {
        Decision {
            allowed: self.limit > 0,
            limit: self.limit,
            remaining: self.limit,
            reset_after: self.window,
        }
    }

    fn denied(&self, reset_after: Duration) -> Decision {
        Decision {
            allowed: false,
            limit: self.limit,
            remaining: 0,
            reset_after,
        }
    }
}
