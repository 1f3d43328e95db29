use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::oracle::Classification;
use crate::response::OperationMode;

/// Cache key: whitespace-collapsed (case-preserving) message text plus the
/// requested operation mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    text: String,
    mode: OperationMode,
}

impl CacheKey {
    pub fn new(message: &str, mode: OperationMode) -> Self {
        Self {
            text: normalize(message),
            mode,
        }
    }
}

/// Collapse runs of whitespace to single spaces and trim. Case is preserved:
/// "URGENT" and "urgent" are different messages.
fn normalize(message: &str) -> String {
    message.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct CacheEntry {
    stored_at: Instant,
    classification: Classification,
}

/// Time- and size-bounded memoization of oracle classifications. Entries
/// expire after the TTL; over capacity, the least-recently-inserted entry is
/// evicted. Failures are never stored. Concurrent misses for the same key may
/// both invoke the oracle; the last write wins, which is harmless because the
/// oracle is deterministic per message within a window.
pub struct ClassifierCache {
    ttl: Duration,
    capacity: usize,
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<CacheKey, CacheEntry>,
    insertion_order: VecDeque<CacheKey>,
}

impl ClassifierCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Fresh entry for the key, if any. Expired entries are dropped on the
    /// way out so readers never see stale classifications.
    pub async fn get(&self, key: &CacheKey) -> Option<Classification> {
        {
            let inner = self.inner.read().await;
            match inner.entries.get(key) {
                Some(entry) if entry.stored_at.elapsed() <= self.ttl => {
                    return Some(entry.classification.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: upgrade to a write lock to remove it.
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.entries.get(key) {
            if entry.stored_at.elapsed() <= self.ttl {
                return Some(entry.classification.clone());
            }
            inner.entries.remove(key);
            inner.insertion_order.retain(|k| k != key);
        }
        None
    }

    pub async fn insert(&self, key: CacheKey, classification: Classification) {
        let mut inner = self.inner.write().await;

        // Drop expired entries first so they don't count against capacity.
        let ttl = self.ttl;
        let expired: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.stored_at.elapsed() > ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.entries.remove(key);
        }
        inner.insertion_order.retain(|k| !expired.contains(k));

        if !inner.entries.contains_key(&key) {
            while inner.entries.len() >= self.capacity {
                match inner.insertion_order.pop_front() {
                    Some(oldest) => {
                        inner.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
            inner.insertion_order.push_back(key.clone());
        }

        inner.entries.insert(
            key,
            CacheEntry {
                stored_at: Instant::now(),
                classification,
            },
        );
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{CacheKey, ClassifierCache, normalize};
    use crate::oracle::Classification;
    use crate::response::OperationMode;

    fn verdict(confidence: f64) -> Classification {
        Classification::new(true, confidence, None, "test")
    }

    #[test]
    fn normalization_collapses_whitespace_but_preserves_case() {
        assert_eq!(normalize("  Pay \t the\n fine  "), "Pay the fine");
        assert_ne!(normalize("URGENT"), normalize("urgent"));
    }

    #[tokio::test]
    async fn hit_within_ttl_returns_stored_classification() {
        let cache = ClassifierCache::new(Duration::from_secs(60), 10);
        let key = CacheKey::new("pay the fine", OperationMode::Shield);
        cache.insert(key.clone(), verdict(0.9)).await;

        let hit = cache.get(&key).await.expect("entry should be fresh");
        assert!((hit.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn whitespace_variants_share_an_entry() {
        let cache = ClassifierCache::new(Duration::from_secs(60), 10);
        cache
            .insert(CacheKey::new("pay  the   fine", OperationMode::Shield), verdict(0.8))
            .await;
        let hit = cache
            .get(&CacheKey::new("pay the fine", OperationMode::Shield))
            .await;
        assert!(hit.is_some());
    }

    #[tokio::test]
    async fn modes_are_distinct_keys() {
        let cache = ClassifierCache::new(Duration::from_secs(60), 10);
        cache
            .insert(CacheKey::new("pay", OperationMode::Shield), verdict(0.8))
            .await;
        assert!(cache.get(&CacheKey::new("pay", OperationMode::Honeypot)).await.is_none());
    }

    #[tokio::test]
    async fn expired_entry_misses_and_is_pruned() {
        let cache = ClassifierCache::new(Duration::from_millis(10), 10);
        let key = CacheKey::new("pay the fine", OperationMode::Shield);
        cache.insert(key.clone(), verdict(0.9)).await;

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(cache.get(&key).await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_inserted() {
        let cache = ClassifierCache::new(Duration::from_secs(60), 2);
        let first = CacheKey::new("first", OperationMode::Shield);
        let second = CacheKey::new("second", OperationMode::Shield);
        let third = CacheKey::new("third", OperationMode::Shield);

        cache.insert(first.clone(), verdict(0.1)).await;
        cache.insert(second.clone(), verdict(0.2)).await;
        cache.insert(third.clone(), verdict(0.3)).await;

        assert!(cache.get(&first).await.is_none());
        assert!(cache.get(&second).await.is_some());
        assert!(cache.get(&third).await.is_some());
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn reinsert_refreshes_without_duplicating_order_entry() {
        let cache = ClassifierCache::new(Duration::from_secs(60), 2);
        let key = CacheKey::new("same", OperationMode::Shield);
        cache.insert(key.clone(), verdict(0.1)).await;
        cache.insert(key.clone(), verdict(0.2)).await;
        assert_eq!(cache.len().await, 1);
        let hit = cache.get(&key).await.expect("still cached");
        assert!((hit.confidence - 0.2).abs() < f64::EPSILON);
    }
}
