//! Idempotency registry.
//!
//! Hosts cache `idempotencyKey -> prior result` here and only invoke the
//! engine on a cache miss. Entries are opaque bytes to the registry, evicted
//! by LRU when the capacity bound is hit and by TTL on read. The engine
//! itself stays stateless across plans.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::IdempotencyConfig;
use crate::plan::validate::is_valid_idempotency_key;

struct Entry {
    value: Vec<u8>,
    inserted: Instant,
    last_used: Instant,
}

/// LRU + TTL cache of prior plan results, keyed by client-supplied strings.
pub struct IdempotencyRegistry {
    entries: Mutex<HashMap<String, Entry>>,
    capacity: usize,
    ttl: Duration,
}

impl IdempotencyRegistry {
    pub fn new(config: &IdempotencyConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: config.capacity.max(1),
            ttl: Duration::from_secs(config.ttl_secs),
        }
    }

    /// Does `key` match the accepted pattern `^[A-Za-z0-9:_-]{1,128}$`?
    pub fn is_valid_key(key: &str) -> bool {
        is_valid_idempotency_key(key)
    }

    /// Cached result for `key`, if present and not expired.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut entries = self.entries.lock();
        let expired = entries
            .get(key)
            .is_some_and(|e| e.inserted.elapsed() > self.ttl);
        if expired {
            entries.remove(key);
            return None;
        }
        let entry = entries.get_mut(key)?;
        entry.last_used = Instant::now();
        Some(entry.value.clone())
    }

    /// Store a result, evicting the least-recently-used entry when full.
    pub fn put(&self, key: &str, value: Vec<u8>) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if !entries.contains_key(key) && entries.len() >= self.capacity {
            let evict = entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            if let Some(k) = evict {
                entries.remove(&k);
            }
        }
        entries.insert(
            key.to_string(),
            Entry {
                value,
                inserted: now,
                last_used: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
