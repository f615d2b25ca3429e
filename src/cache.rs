//! Result Cache
//!
//! Session-scoped store for idempotent reads, keyed by
//! (resource kind, operation, ordered parameters). There is no expiry:
//! every mutating path invalidates exactly the keys it affects.
//!
//! `get_or_compute` is single-flight per key. Concurrent callers asking for
//! the same key while a computation is in flight wait for it and reuse its
//! result instead of issuing their own request. A failed computation stores
//! nothing; the next waiter runs its own.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;

/// Cache key: (kind, operation, ordered parameter tuple)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: String,
    pub operation: &'static str,
    pub params: Vec<String>,
}

impl CacheKey {
    pub fn new(kind: &str, operation: &'static str, params: Vec<String>) -> Self {
        Self {
            kind: kind.to_string(),
            operation,
            params,
        }
    }

    /// True when any parameter equals `value`
    pub fn references(&self, value: &str) -> bool {
        self.params.iter().any(|p| p == value)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}({})", self.kind, self.operation, self.params.join(", "))
    }
}

/// Stored result with the time it was stored
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub stored_at: DateTime<Utc>,
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

type Slot<V> = Arc<OnceCell<CacheEntry<V>>>;

/// Shared cache with manual invalidation
pub struct Cache<V> {
    slots: Mutex<HashMap<CacheKey, Slot<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V> Default for Cache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Cache<V> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<CacheKey, Slot<V>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop one key
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = self.slots().remove(key).is_some();
        if removed {
            tracing::debug!("cache invalidate {}", key);
        }
        removed
    }

    /// Drop every key matching `predicate`, returning how many were removed
    pub fn invalidate_where<P>(&self, predicate: P) -> usize
    where
        P: Fn(&CacheKey) -> bool,
    {
        let mut slots = self.slots();
        let before = slots.len();
        slots.retain(|key, _| !predicate(key));
        let removed = before - slots.len();
        if removed > 0 {
            tracing::debug!("cache invalidated {} entries", removed);
        }
        removed
    }

    /// Drop every key of one kind
    pub fn invalidate_kind(&self, kind: &str) -> usize {
        self.invalidate_where(|key| key.kind == kind)
    }

    pub fn clear(&self) {
        self.slots().clear();
    }

    /// Number of keys with a stored value
    pub fn len(&self) -> usize {
        self.slots()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.slots()
            .get(key)
            .map(|slot| slot.initialized())
            .unwrap_or(false)
    }

    /// Keys currently holding a value
    pub fn keys(&self) -> Vec<CacheKey> {
        self.slots()
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl<V> Cache<V> {
    /// Forget a slot whose computation failed, unless someone refilled or replaced it
    fn discard_empty(&self, key: &CacheKey, slot: &Slot<V>) {
        let mut slots = self.slots();
        let stale = slots
            .get(key)
            .map(|current| Arc::ptr_eq(current, slot) && !current.initialized())
            .unwrap_or(false);
        if stale {
            slots.remove(key);
        }
    }
}

impl<V: Clone> Cache<V> {
    /// Stored value for a key, if any
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        let slot = self.slots().get(key).cloned()?;
        slot.get().cloned()
    }

    /// Return the cached value or run `compute`, store and return its result
    pub async fn get_or_compute<F, Fut, E>(&self, key: CacheKey, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = {
            let mut slots = self.slots();
            Arc::clone(
                slots
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        if let Some(entry) = slot.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("cache hit {}", key);
            return Ok(entry.value.clone());
        }

        let mut computed = false;
        let entry = match slot
            .get_or_try_init(|| {
                computed = true;
                async {
                    let value = compute().await?;
                    Ok::<_, E>(CacheEntry {
                        value,
                        stored_at: Utc::now(),
                    })
                }
            })
            .await
        {
            Ok(entry) => entry,
            Err(e) => {
                self.discard_empty(&key, &slot);
                return Err(e);
            },
        };

        if computed {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("cache miss {}", key);
        } else {
            // Waited on another caller's in-flight computation
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("cache joined in-flight {}", key);
        }

        Ok(entry.value.clone())
    }
}
