//! In-process result cache keyed by a content hash.
//!
//! Identical uploads are common (a page refresh re-posts the same file), and
//! every request costs several backend calls. [`ResultCache`] keeps the last
//! `capacity` results for `ttl` and makes concurrent identical requests
//! share one computation:
//!
//! * Each key owns a slot holding a [`tokio::sync::OnceCell`]. The first
//!   caller runs the computation; later callers for the same key wait on
//!   the same cell instead of starting their own.
//! * Failed or cancelled computations are never cached. The slot is
//!   discarded as soon as no caller is waiting on it, so the next request
//!   tries again and abandoned keys never pile up.
//! * When full, the oldest completed entry is evicted. Entries still being
//!   computed are never evicted.
//!
//! A capacity of `0` disables caching entirely.

use crate::config::OutputShape;
use crate::pipeline::chunk::{Origin, TextBody};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::debug;

/// Stable key for `bodies` processed as `shape`.
///
/// Covers the shape, page boundaries and text, so the same document asked
/// for a different artifact gets a different key.
pub fn content_key(shape: OutputShape, bodies: &[TextBody]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(shape.as_str().as_bytes());
    for body in bodies {
        let origin = match body.origin() {
            Origin::WholeDocument => 0u64,
            Origin::Page(n) => n as u64,
        };
        hasher.update(origin.to_le_bytes());
        hasher.update((body.content().len() as u64).to_le_bytes());
        hasher.update(body.content().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

struct Slot<V> {
    /// Insertion order, for oldest-first eviction.
    seq: u64,
    cell: OnceCell<(V, Instant)>,
}

struct Slots<V> {
    next_seq: u64,
    entries: HashMap<String, Arc<Slot<V>>>,
}

/// Bounded, TTL-expiring, single-flight cache.
pub struct ResultCache<V> {
    capacity: usize,
    ttl: Duration,
    slots: Mutex<Slots<V>>,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            slots: Mutex::new(Slots {
                next_seq: 0,
                entries: HashMap::new(),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    /// Entries currently held, including ones still being computed.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Return the cached value for `key`, or compute it with `init`.
    ///
    /// The boolean is `true` when the value came from the cache (or from a
    /// concurrent caller's computation) rather than from this call's `init`.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: &str, init: F) -> Result<(V, bool), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if !self.is_enabled() {
            return init().await.map(|v| (v, false));
        }

        let pending = PendingSlot {
            cache: self,
            key,
            slot: self.slot_for(key),
        };
        let mut computed = false;
        let result = pending
            .slot
            .cell
            .get_or_try_init(|| {
                computed = true;
                let fut = init();
                async move { fut.await.map(|v| (v, Instant::now())) }
            })
            .await;

        match result {
            Ok((value, _)) => {
                if !computed {
                    debug!("Cache hit for {}", short(key));
                }
                Ok((value.clone(), !computed))
            }
            Err(e) => Err(e),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots<V>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot_for(&self, key: &str) -> Arc<Slot<V>> {
        let mut slots = self.lock();

        if let Some(slot) = slots.entries.get(key) {
            if !self.is_expired(slot) {
                return Arc::clone(slot);
            }
            debug!("Cache entry {} expired", short(key));
        }
        slots.entries.remove(key);

        let ttl = self.ttl;
        slots.entries.retain(|_, s| !expired(s, ttl));
        while slots.entries.len() >= self.capacity {
            let oldest = slots
                .entries
                .iter()
                .filter(|(_, s)| s.cell.initialized())
                .min_by_key(|(_, s)| s.seq)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    debug!("Cache full, evicting {}", short(&k));
                    slots.entries.remove(&k);
                }
                None => break,
            }
        }

        let slot = Arc::new(Slot {
            seq: slots.next_seq,
            cell: OnceCell::new(),
        });
        slots.next_seq += 1;
        slots.entries.insert(key.to_string(), Arc::clone(&slot));
        slot
    }

    fn is_expired(&self, slot: &Slot<V>) -> bool {
        expired(slot, self.ttl)
    }

    /// Drop `slot` if it is still the one registered under `key`, still
    /// empty, and held only by the map and the caller.
    fn discard(&self, key: &str, slot: &Arc<Slot<V>>) {
        let mut slots = self.lock();
        let abandoned = slots.entries.get(key).is_some_and(|s| {
            Arc::ptr_eq(s, slot) && !s.cell.initialized() && Arc::strong_count(s) <= 2
        });
        if abandoned {
            debug!("Discarding unfilled cache slot {}", short(key));
            slots.entries.remove(key);
        }
    }
}

/// A caller's hold on a slot for the duration of one lookup.
///
/// Dropped on every exit path: success, error, or the lookup future being
/// dropped mid-computation (request deadline, client disconnect).
struct PendingSlot<'a, V: Clone> {
    cache: &'a ResultCache<V>,
    key: &'a str,
    slot: Arc<Slot<V>>,
}

impl<V: Clone> Drop for PendingSlot<'_, V> {
    fn drop(&mut self) {
        self.cache.discard(self.key, &self.slot);
    }
}

fn expired<V>(slot: &Slot<V>, ttl: Duration) -> bool {
    slot.cell
        .get()
        .is_some_and(|(_, done)| done.elapsed() >= ttl)
}

fn short(key: &str) -> &str {
    &key[..key.len().min(12)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache(capacity: usize) -> ResultCache<String> {
        ResultCache::new(capacity, Duration::from_secs(3600))
    }

    async fn fill(c: &ResultCache<String>, key: &str) -> (String, bool) {
        c.get_or_try_insert_with(key, move || async move { Ok::<_, ()>(format!("value-{key}")) })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn second_lookup_hits() {
        let c = cache(4);
        assert_eq!(fill(&c, "a").await, ("value-a".to_string(), false));
        assert_eq!(fill(&c, "a").await, ("value-a".to_string(), true));
        assert_eq!(c.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_identical_requests_compute_once() {
        let c = cache(4);
        let counter = AtomicUsize::new(0);
        let runs = &counter;
        let compute = move || async move {
            runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, ()>("shared".to_string())
        };

        let (a, b) = tokio::join!(
            c.get_or_try_insert_with("k", compute),
            c.get_or_try_insert_with("k", compute)
        );
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.0, "shared");
        assert_eq!(b.0, "shared");
        // Exactly one of them ran the computation.
        assert!(a.1 ^ b.1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let c = cache(4);
        let err = c
            .get_or_try_insert_with("k", || async { Err::<String, _>("boom") })
            .await
            .unwrap_err();
        assert_eq!(err, "boom");
        assert!(c.is_empty());
        assert!(!fill(&c, "k").await.1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_lookups_leave_no_entries() {
        let c = cache(2);
        for i in 0..10 {
            let key = format!("k{i}");
            let lookup = c.get_or_try_insert_with(&key, || async {
                std::future::pending::<Result<String, ()>>().await
            });
            let outcome = tokio::time::timeout(Duration::from_millis(1), lookup).await;
            assert!(outcome.is_err());
        }
        assert!(c.is_empty());

        // An abandoned key is computed afresh.
        assert!(!fill(&c, "k0").await.1);
        assert_eq!(c.len(), 1);
    }

    #[tokio::test]
    async fn waiter_takes_over_when_first_caller_is_cancelled() {
        let c = cache(2);
        let first = c.get_or_try_insert_with("k", || async {
            std::future::pending::<Result<String, ()>>().await
        });
        let second = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            fill(&c, "k").await
        };
        let (first, second) = tokio::join!(
            tokio::time::timeout(Duration::from_millis(10), first),
            second
        );
        assert!(first.is_err());
        assert_eq!(second.0, "value-k");
        assert!(fill(&c, "k").await.1);
    }

    #[tokio::test]
    async fn evicts_oldest_when_full() {
        let c = cache(2);
        fill(&c, "a").await;
        fill(&c, "b").await;
        fill(&c, "c").await;
        assert_eq!(c.len(), 2);
        // "a" was evicted and is recomputed; "c" is still there.
        assert!(fill(&c, "c").await.1);
        assert!(!fill(&c, "a").await.1);
    }

    #[tokio::test]
    async fn zero_ttl_always_recomputes() {
        let c: ResultCache<String> = ResultCache::new(4, Duration::ZERO);
        fill(&c, "a").await;
        assert!(!fill(&c, "a").await.1);
    }

    #[tokio::test]
    async fn zero_capacity_disables_cache() {
        let c = cache(0);
        fill(&c, "a").await;
        assert!(!fill(&c, "a").await.1);
        assert!(c.is_empty());
    }

    #[test]
    fn content_key_depends_on_shape_and_pages() {
        let whole = [TextBody::new("abc", Origin::WholeDocument)];
        let paged = [
            TextBody::new("a", Origin::Page(1)),
            TextBody::new("bc", Origin::Page(2)),
        ];
        let k1 = content_key(OutputShape::Summary, &whole);
        assert_eq!(k1, content_key(OutputShape::Summary, &whole));
        assert_eq!(k1.len(), 64);
        assert_ne!(k1, content_key(OutputShape::Course, &whole));
        assert_ne!(
            content_key(OutputShape::Paged, &paged),
            content_key(OutputShape::Paged, &[TextBody::new("ab", Origin::Page(1)), TextBody::new("c", Origin::Page(2))])
        );
    }
}
