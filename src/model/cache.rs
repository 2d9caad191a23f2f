//! Time-expiring cache of resolved stream variants, keyed by media id
//!
//! Eviction is FIFO on insertion order when over capacity, plus removal of
//! anything past its expiry. Recency of use is not tracked.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tokio::sync::RwLock;

use crate::error::ProviderError;
use crate::providers::StreamProvider;
use super::types::CacheEntry;

pub const DEFAULT_CAPACITY: usize = 1500;

#[derive(Clone)]
pub struct StreamCache {
    entries: Arc<RwLock<IndexMap<String, CacheEntry>>>,
    capacity: Arc<AtomicUsize>,
}

impl StreamCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(IndexMap::new())),
            capacity: Arc::new(AtomicUsize::new(capacity.max(1))),
        }
    }

    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity.max(1), Ordering::Relaxed);
    }

    /// Return the streams for `media_id`, asking the provider on a miss,
    /// on expiry, or when `force_refresh` is set.
    pub async fn resolve(
        &self,
        provider: &dyn StreamProvider,
        media_id: &str,
        force_refresh: bool,
    ) -> Result<CacheEntry, ProviderError> {
        if !force_refresh {
            let mut entries = self.entries.write().await;
            if let Some(entry) = entries.get_mut(media_id) {
                let now = Utc::now();
                if !entry.is_expired_at(now) {
                    entry.fresh = false;
                    tracing::debug!(
                        media_id,
                        mins_left = (entry.expiry - now).num_minutes(),
                        "Streams served from cache"
                    );
                    return Ok(entry.clone());
                }
            }
        }

        let resolved = match provider.resolve(media_id).await {
            Err(e) if e.is_transient() => {
                tracing::warn!(media_id, error = %e, "Stream resolution failed, retrying once");
                provider.resolve(media_id).await?
            }
            other => other?,
        };

        let entry = CacheEntry {
            media_id: media_id.to_string(),
            variants: resolved.variants,
            expiry: resolved.expiry,
            fresh: true,
        };
        tracing::info!(media_id, variants = entry.variants.len(), "Resolved new streams");

        // An existing key keeps its insertion position.
        self.entries
            .write()
            .await
            .insert(media_id.to_string(), entry.clone());
        self.prune().await;
        Ok(entry)
    }

    pub async fn get(&self, media_id: &str) -> Option<CacheEntry> {
        self.entries.read().await.get(media_id).cloned()
    }

    #[cfg(test)]
    pub async fn insert(&self, entry: CacheEntry) {
        self.entries
            .write()
            .await
            .insert(entry.media_id.clone(), entry);
    }

    /// Store a measured content length on the variant with this url
    pub async fn record_size(&self, media_id: &str, url: &str, size_bytes: u64) {
        let mut entries = self.entries.write().await;
        if let Some(variant) = entries
            .get_mut(media_id)
            .and_then(|e| e.variants.iter_mut().find(|v| v.url == url))
        {
            variant.size_bytes = Some(size_bytes);
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn prune(&self) -> usize {
        self.prune_at(Utc::now()).await
    }

    /// Evict oldest-inserted entries down to capacity, then everything
    /// expired at `now`. Returns the number of entries removed.
    pub async fn prune_at(&self, now: DateTime<Utc>) -> usize {
        let capacity = self.capacity.load(Ordering::Relaxed);
        let mut entries = self.entries.write().await;
        let before = entries.len();

        if entries.len() > capacity {
            let excess = entries.len() - capacity;
            entries.drain(..excess);
        }
        entries.retain(|_, e| !e.is_expired_at(now));

        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = entries.len(), "Stream cache pruned");
        }
        removed
    }

    pub async fn load_from_disk(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let content = std::fs::read_to_string(path)?;
        let stored: Vec<CacheEntry> = serde_json::from_str(&content)?;
        {
            let mut entries = self.entries.write().await;
            *entries = stored
                .into_iter()
                .map(|e| (e.media_id.clone(), e))
                .collect();
        }
        let removed = self.prune().await;
        tracing::info!(loaded = self.len().await, removed, "Stream cache imported");
        Ok(())
    }

    pub async fn save_to_disk(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let entries = self.entries.read().await;
        let stored: Vec<&CacheEntry> = entries.values().collect();
        std::fs::write(path, serde_json::to_string(&stored)?)?;
        tracing::debug!(count = stored.len(), path = %path.display(), "Stream cache saved");
        Ok(())
    }
}

impl Default for StreamCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::{MediaKind, StreamVariant};
    use crate::providers::ResolvedStreams;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex;

    fn entry(id: &str, expiry: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            media_id: id.to_string(),
            variants: vec![StreamVariant {
                url: format!("https://example.invalid/{}", id),
                container: "webm".into(),
                quality: "160k".into(),
                kind: MediaKind::Audio,
                size_bytes: None,
            }],
            expiry,
            fresh: true,
        }
    }

    /// Fails with the queued errors first, then succeeds
    struct FlakyProvider {
        failures: Mutex<Vec<ProviderError>>,
        calls: AtomicUsize,
    }

    impl FlakyProvider {
        fn new(failures: Vec<ProviderError>) -> Self {
            Self { failures: Mutex::new(failures), calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl StreamProvider for FlakyProvider {
        async fn resolve(&self, media_id: &str) -> Result<ResolvedStreams, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(e) = self.failures.lock().unwrap().pop() {
                return Err(e);
            }
            let e = entry(media_id, Utc::now() + Duration::hours(5));
            Ok(ResolvedStreams { variants: e.variants, expiry: e.expiry })
        }

        async fn content_length(&self, _url: &str) -> Result<u64, ProviderError> {
            Ok(1024)
        }
    }

    #[tokio::test]
    async fn hit_is_served_and_marked_consumed() {
        let cache = StreamCache::new(10);
        let provider = FlakyProvider::new(vec![]);

        let first = cache.resolve(&provider, "a", false).await.unwrap();
        assert!(first.fresh);
        let second = cache.resolve(&provider, "a", false).await.unwrap();
        assert!(!second.fresh);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        cache.resolve(&provider, "a", true).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn expired_entry_is_refetched() {
        let cache = StreamCache::new(10);
        cache.insert(entry("a", Utc::now() - Duration::seconds(1))).await;
        let provider = FlakyProvider::new(vec![]);

        let got = cache.resolve(&provider, "a", false).await.unwrap();
        assert!(got.fresh);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failure_retried_once() {
        let cache = StreamCache::new(10);
        let provider = FlakyProvider::new(vec![ProviderError::Fetch("reset".into())]);
        assert!(cache.resolve(&provider, "a", false).await.is_ok());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        let provider = FlakyProvider::new(vec![
            ProviderError::Fetch("again".into()),
            ProviderError::Fetch("reset".into()),
        ]);
        assert!(cache.resolve(&provider, "b", false).await.is_err());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        let provider = FlakyProvider::new(vec![ProviderError::Rejected("private".into())]);
        assert!(cache.resolve(&provider, "c", false).await.is_err());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn prune_respects_capacity_fifo_and_expiry() {
        let cache = StreamCache::new(3);
        let now = Utc::now();
        let later = now + Duration::hours(1);
        for id in ["a", "b", "c", "d", "e"] {
            cache.insert(entry(id, later)).await;
        }
        cache.insert(entry("stale", now)).await;

        // Refreshing an old key keeps its original position.
        cache.insert(entry("b", later)).await;
        cache.prune_at(now).await;

        assert!(cache.len().await <= 3);
        assert!(cache.get("a").await.is_none());
        assert!(cache.get("b").await.is_none());
        assert!(cache.get("stale").await.is_none());
        assert!(cache.get("e").await.is_some());

        let snapshot = cache.entries.read().await;
        assert!(snapshot.values().all(|e| e.expiry > now));
    }

    #[tokio::test]
    async fn sizes_are_recorded_in_place() {
        let cache = StreamCache::new(10);
        cache.insert(entry("a", Utc::now() + Duration::hours(1))).await;
        cache.record_size("a", "https://example.invalid/a", 4096).await;
        let e = cache.get("a").await.unwrap();
        assert_eq!(e.variants[0].size_bytes, Some(4096));
    }

    #[tokio::test]
    async fn persists_and_prunes_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("streams.json");

        let cache = StreamCache::new(10);
        cache.insert(entry("keep", Utc::now() + Duration::hours(1))).await;
        cache.insert(entry("old", Utc::now() - Duration::hours(1))).await;
        cache.save_to_disk(&path).await.unwrap();

        let restored = StreamCache::new(10);
        restored.load_from_disk(&path).await.unwrap();
        assert_eq!(restored.len().await, 1);
        assert!(restored.get("keep").await.is_some());
    }
}
