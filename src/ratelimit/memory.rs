use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{RateLimitStore, WindowState};

#[derive(Debug, Clone, Copy)]
struct Entry {
    count: u32,
    started_at_ms: i64,
    resets_at_ms: i64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    last_sweep_ms: i64,
}

/// Process-local counter store.
///
/// Expired entries are swept lazily, at most once per window length, while an
/// attempt is being recorded. The lock is never held across an await point.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn hit(&self, key: &str, now_ms: i64, window_ms: i64) -> WindowState {
        let mut inner = self.inner.lock();

        if now_ms.saturating_sub(inner.last_sweep_ms) >= window_ms {
            inner.entries.retain(|_, entry| entry.resets_at_ms > now_ms);
            inner.last_sweep_ms = now_ms;
        }

        let fresh = Entry {
            count: 1,
            started_at_ms: now_ms,
            resets_at_ms: now_ms.saturating_add(window_ms),
        };

        let entry = inner
            .entries
            .entry(key.to_string())
            .and_modify(|entry| {
                let elapsed = now_ms >= entry.resets_at_ms;
                let skewed = entry.started_at_ms > now_ms;
                if elapsed || skewed {
                    *entry = fresh;
                } else {
                    entry.count = entry.count.saturating_add(1);
                }
            })
            .or_insert(fresh);

        WindowState {
            count: entry.count,
            resets_at_ms: entry.resets_at_ms,
        }
    }

    async fn reset(&self, key: &str) {
        self.inner.lock().entries.remove(key);
    }

    async fn tracked_keys(&self) -> usize {
        self.inner.lock().entries.len()
    }
}
