// src/store/memory.rs
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::dedup::DedupKey;
use crate::error::StoreError;
use crate::insight::Insight;
use crate::query::{sort_and_page, InsightFilter};
use crate::store::InsightStore;

#[derive(Default)]
struct Inner {
    rows: Vec<Insight>,
    keys: HashSet<(String, String)>,
}

/// Process-local store. The key index and rows share one lock, so
/// check-and-insert is atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `Unavailable` while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|g| g.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every stored row, insertion order.
    pub fn all(&self) -> Vec<Insight> {
        self.inner
            .lock()
            .map(|g| g.rows.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl InsightStore for MemoryStore {
    async fn insert(&self, insight: &Insight) -> Result<(), StoreError> {
        let mut g = self.lock()?;
        let key = insight.dedup_key().storage_key();
        if !g.keys.insert((insight.source.clone(), key.clone())) {
            return Err(StoreError::ConstraintViolation {
                source_name: insight.source.clone(),
                key,
            });
        }
        g.rows.push(insight.clone());
        Ok(())
    }

    async fn contains(&self, source: &str, key: &DedupKey) -> Result<bool, StoreError> {
        let g = self.lock()?;
        Ok(g.keys.contains(&(source.to_string(), key.storage_key())))
    }

    async fn query(&self, filter: &InsightFilter) -> Result<Vec<Insight>, StoreError> {
        let now = Utc::now();
        let rows: Vec<Insight> = {
            let g = self.lock()?;
            g.rows
                .iter()
                .filter(|i| filter.matches(i, now))
                .cloned()
                .collect()
        };
        Ok(sort_and_page(rows, filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_insert_is_a_constraint_violation() {
        let store = MemoryStore::new();
        let i = Insight::sample("hn", "Same title");
        store.insert(&i).await.unwrap();
        let err = store.insert(&i).await.unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation { .. }));
        assert_eq!(store.len(), 1);
        assert!(store.contains("hn", &i.dedup_key()).await.unwrap());
        assert!(!store.contains("other", &i.dedup_key()).await.unwrap());
    }

    #[tokio::test]
    async fn offline_is_distinct_from_empty() {
        let store = MemoryStore::new();
        assert!(store.query(&InsightFilter::new()).await.unwrap().is_empty());
        store.set_offline(true);
        assert!(matches!(
            store.query(&InsightFilter::new()).await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
