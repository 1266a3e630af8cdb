use crate::{binding::Rate, ResourceId};
use ahash::AHashMap as HashMap;
use parking_lot::{Mutex, RwLock};
use std::time::Duration;
use tokio::time::Instant;

/// Fixed-window request quotas, tracked per bound API key.
///
/// Requests are counted while the window table is locked, shared for known keys and exclusively
/// to insert a key, so a purge never discards a window that is being counted. Each window has its
/// own lock so that unrelated keys never contend.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: RwLock<HashMap<RateKey, Mutex<Window>>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RateKey {
    pub binding: ResourceId,
    pub key: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("quota exhausted; retry after {retry_after:?}")]
pub struct Exceeded {
    pub retry_after: Duration,
}

#[derive(Debug)]
struct Window {
    rate: Rate,
    started: Instant,
    count: u32,
}

// === impl RateLimiter ===

impl RateLimiter {
    /// Counts a request against `key`'s quota.
    ///
    /// A window starts with the first request after the previous window expired. Changing the
    /// rate for a key starts a new window.
    pub fn check(&self, key: &RateKey, rate: Rate) -> Result<(), Exceeded> {
        let now = Instant::now();
        if let Some(window) = self.windows.read().get(key) {
            return window.lock().count(rate, now);
        }

        let mut windows = self.windows.write();
        let window = windows
            .entry(key.clone())
            .or_insert_with(|| Mutex::new(Window::new(rate, now)));
        window.get_mut().count(rate, now)
    }

    /// Drops windows that have expired. Returns the number of windows removed.
    pub fn purge_idle(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.write();
        let before = windows.len();
        windows.retain(|_, window| !window.get_mut().is_expired(now));
        before - windows.len()
    }

    pub fn len(&self) -> usize {
        self.windows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.read().is_empty()
    }
}

// === impl Window ===

impl Window {
    fn new(rate: Rate, now: Instant) -> Self {
        Self {
            rate,
            started: now,
            count: 0,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) >= self.rate.unit.window()
    }

    fn count(&mut self, rate: Rate, now: Instant) -> Result<(), Exceeded> {
        if self.rate != rate || self.is_expired(now) {
            *self = Self::new(rate, now);
        }

        if self.count >= rate.amount.get() {
            return Err(Exceeded {
                retry_after: (self.started + rate.unit.window()).saturating_duration_since(now),
            });
        }
        self.count += 1;
        Ok(())
    }
}
