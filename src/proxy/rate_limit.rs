use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;

use crate::proxy::error::{ProxyError, Result};

/// Key used when neither a forwarded address nor a peer address is known.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Bounded compare-and-swap attempts before the limiter settles for best effort.
const MAX_CAS_ATTEMPTS: usize = 4;

/// Fixed-window counter for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCounter {
    pub count: u32,
    /// Window start, milliseconds since the Unix epoch
    pub window_start_ms: u64,
}

/// Storage for window counters.
///
/// The in-memory store is process-local. A shared implementation can be
/// dropped in for multi-instance deployments without touching [`RateLimiter`].
pub trait CounterStore: Send + Sync {
    fn get(&self, key: &str) -> Option<WindowCounter>;

    /// Store `new` only if the current value still equals `current`
    /// (`None` = no entry). Returns whether the swap happened.
    fn compare_and_swap(
        &self,
        key: &str,
        current: Option<WindowCounter>,
        new: WindowCounter,
    ) -> bool;

    /// Drop counters whose window started before `cutoff_ms`. Returns how many were removed.
    fn purge_expired(&self, cutoff_ms: u64) -> usize;

    fn len(&self) -> usize;
}

/// Default store backed by a concurrent hash map.
#[derive(Default)]
pub struct MemoryCounterStore {
    counters: DashMap<String, WindowCounter>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for MemoryCounterStore {
    fn get(&self, key: &str) -> Option<WindowCounter> {
        self.counters.get(key).map(|c| *c)
    }

    fn compare_and_swap(
        &self,
        key: &str,
        current: Option<WindowCounter>,
        new: WindowCounter,
    ) -> bool {
        match self.counters.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if current == Some(*occupied.get()) {
                    occupied.insert(new);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                if current.is_none() {
                    vacant.insert(new);
                    true
                } else {
                    false
                }
            }
        }
    }

    fn purge_expired(&self, cutoff_ms: u64) -> usize {
        let before = self.counters.len();
        self.counters.retain(|_, c| c.window_start_ms >= cutoff_ms);
        before.saturating_sub(self.counters.len())
    }

    fn len(&self) -> usize {
        self.counters.len()
    }
}

/// Outcome of a limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub count: u32,
    pub retry_after_secs: u64,
}

/// Best-effort fixed-window rate limiter.
///
/// Counts are exact only within one process and only as far as the store's
/// compare-and-swap allows; same-key races past the retry bound may over- or
/// under-count slightly.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    max_requests: u32,
    window_ms: u64,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self::with_store(Arc::new(MemoryCounterStore::new()), max_requests, window)
    }

    pub fn with_store(store: Arc<dyn CounterStore>, max_requests: u32, window: Duration) -> Self {
        Self {
            store,
            max_requests,
            window_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Count a request from `client` and reject it once the window is full.
    pub fn check(&self, client: &str) -> Result<Decision> {
        self.check_at(client, now_ms())
    }

    pub fn check_at(&self, client: &str, now_ms: u64) -> Result<Decision> {
        let decision = self.record(client, now_ms);
        if decision.allowed {
            Ok(decision)
        } else {
            Err(ProxyError::RateLimited {
                client: client.to_string(),
                retry_after_secs: decision.retry_after_secs,
            })
        }
    }

    fn record(&self, client: &str, now_ms: u64) -> Decision {
        let mut next = WindowCounter {
            count: 1,
            window_start_ms: now_ms,
        };

        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.store.get(client);
            next = self.advance(current, now_ms);
            if self.store.compare_and_swap(client, current, next) {
                return self.decide(next, now_ms);
            }
        }

        tracing::debug!(client, "Rate limit counter contended, using last computed value");
        self.decide(next, now_ms)
    }

    fn advance(&self, current: Option<WindowCounter>, now_ms: u64) -> WindowCounter {
        match current {
            Some(c) if now_ms.saturating_sub(c.window_start_ms) <= self.window_ms => WindowCounter {
                count: c.count.saturating_add(1),
                window_start_ms: c.window_start_ms,
            },
            _ => WindowCounter {
                count: 1,
                window_start_ms: now_ms,
            },
        }
    }

    fn decide(&self, counter: WindowCounter, now_ms: u64) -> Decision {
        let window_end = counter.window_start_ms.saturating_add(self.window_ms);
        let remaining_ms = window_end.saturating_sub(now_ms);
        Decision {
            allowed: counter.count <= self.max_requests,
            count: counter.count,
            retry_after_secs: remaining_ms.div_ceil(1000).max(1),
        }
    }

    /// Remove counters whose window has fully elapsed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(now_ms())
    }

    pub fn purge_expired_at(&self, now_ms: u64) -> usize {
        let cutoff = now_ms.saturating_sub(self.window_ms);
        let removed = self.store.purge_expired(cutoff);
        if removed > 0 {
            tracing::debug!("Purged {} expired rate limit counters", removed);
        }
        removed
    }

    pub fn tracked_clients(&self) -> usize {
        self.store.len()
    }
}

/// Derive the rate-limit key for a request.
///
/// Uses the leftmost `x-forwarded-for` entry, then the transport peer
/// address, then [`UNKNOWN_CLIENT`]. The forwarded header is trusted as-is.
pub fn client_identifier(headers: &HeaderMap, peer: Option<std::net::SocketAddr>) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return forwarded.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
