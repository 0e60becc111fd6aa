//! In-memory lock store implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use resource_lock_core::error::LockResult;
use resource_lock_core::traits::{ttl_millis, LockStore, LockStoreAdmin};
use tokio::time::Instant;
use tracing::{instrument, trace};

/// Below this many keys, expired entries are only dropped when touched.
const SWEEP_THRESHOLD: usize = 64;

#[derive(Debug, Clone)]
struct Entry {
    token: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Default)]
struct Table {
    entries: HashMap<String, Entry>,
    /// Earliest expiry among stored entries. May run early after a release,
    /// never late.
    next_expiry: Option<Instant>,
}

impl Table {
    /// Returns the live entry for `key`, dropping it if it has expired.
    fn live_entry(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        if self.entries.get(key).is_some_and(|e| !e.is_live(now)) {
            trace!(lock.key = %key, "purging expired key");
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn note_expiry(&mut self, at: Instant) {
        self.next_expiry = Some(self.next_expiry.map_or(at, |next| next.min(at)));
    }

    /// Drops every expired entry once the table is large enough for
    /// abandoned keys to matter and at least one may have expired.
    fn sweep_expired(&mut self, now: Instant) {
        if self.entries.len() < SWEEP_THRESHOLD || self.next_expiry.map_or(true, |at| at > now) {
            return;
        }
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        self.next_expiry = self.entries.values().map(|e| e.expires_at).min();
        trace!(removed = before - self.entries.len(), "swept expired keys");
    }
}

/// A lock store held in process memory.
///
/// Clones share the same underlying map, so several lock primitives built
/// from clones of one store contend with each other.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockStore {
    table: Arc<Mutex<Table>>,
}

impl InMemoryLockStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unexpired keys currently stored.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.table().entries.values().filter(|e| e.is_live(now)).count()
    }

    /// Returns true when no unexpired keys are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        // A panic while holding the guard can't leave an entry half-written.
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn expiry_from(now: Instant, ttl: Duration) -> Instant {
    let ttl = Duration::from_millis(ttl_millis(ttl));
    now.checked_add(ttl)
        .unwrap_or_else(|| now + Duration::from_secs(u32::MAX as u64))
}

impl LockStore for InMemoryLockStore {
    #[instrument(skip(self, token), fields(lock.key = %key, backend = "memory"))]
    async fn acquire_if_absent(&self, key: &str, token: &str, ttl: Duration) -> LockResult<bool> {
        let now = Instant::now();
        let mut table = self.table();
        if table.live_entry(key, now).is_some() {
            return Ok(false);
        }
        table.sweep_expired(now);

        let expires_at = expiry_from(now, ttl);
        table.entries.insert(
            key.to_string(),
            Entry {
                token: token.to_string(),
                expires_at,
            },
        );
        table.note_expiry(expires_at);
        Ok(true)
    }

    #[instrument(skip(self, token), fields(lock.key = %key, backend = "memory"))]
    async fn release_if_owned(&self, key: &str, token: &str) -> LockResult<bool> {
        let now = Instant::now();
        let mut table = self.table();
        let owned = table.live_entry(key, now).is_some_and(|e| e.token == token);
        if owned {
            table.entries.remove(key);
        }
        Ok(owned)
    }

    #[instrument(skip(self, token), fields(lock.key = %key, backend = "memory"))]
    async fn extend_if_owned(&self, key: &str, token: &str, ttl: Duration) -> LockResult<bool> {
        let now = Instant::now();
        let mut table = self.table();
        let expires_at = expiry_from(now, ttl);
        match table.live_entry(key, now) {
            Some(entry) if entry.token == token => entry.expires_at = expires_at,
            _ => return Ok(false),
        }
        table.note_expiry(expires_at);
        Ok(true)
    }

    async fn owner(&self, key: &str) -> LockResult<Option<String>> {
        let now = Instant::now();
        Ok(self.table().live_entry(key, now).map(|e| e.token.clone()))
    }

    async fn remaining_ttl(&self, key: &str) -> LockResult<Option<Duration>> {
        let now = Instant::now();
        Ok(self
            .table()
            .live_entry(key, now)
            .map(|e| e.expires_at - now))
    }
}

impl LockStoreAdmin for InMemoryLockStore {
    #[instrument(skip(self), fields(prefix = %prefix, backend = "memory"))]
    async fn delete_matching(&self, prefix: &str) -> LockResult<u64> {
        let now = Instant::now();
        let mut removed = 0u64;
        self.table().entries.retain(|key, entry| {
            if !key.starts_with(prefix) {
                return true;
            }
            // Expired keys are gone as far as callers can tell; drop them
            // without counting.
            if entry.is_live(now) {
                removed += 1;
            }
            false
        });
        Ok(removed)
    }
}
