//! Speculative stream resolution for the track that plays next

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::error::{JukeboxError, Result};
use crate::model::{PlayOverride, StreamCache, Track};
use crate::providers::StreamProvider;
use super::args::{PlayMode, PlayerKind};
use super::selector::{Selection, select};

const WAIT_POLL: Duration = Duration::from_millis(100);

/// Media ids with a preload in flight
#[derive(Clone, Default)]
pub struct PreloadRegistry {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl PreloadRegistry {
    fn ids(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.ids.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim `media_id`; `None` when a preload for it is already running
    pub fn register(&self, media_id: &str) -> Option<PreloadGuard> {
        self.ids().insert(media_id.to_string()).then(|| PreloadGuard {
            registry: self.clone(),
            media_id: media_id.to_string(),
        })
    }

    pub fn contains(&self, media_id: &str) -> bool {
        self.ids().contains(media_id)
    }

    /// Poll until no preload of `media_id` is running
    pub async fn wait_until_clear(&self, media_id: &str) {
        if self.contains(media_id) {
            tracing::debug!(media_id, "Waiting for preload to finish");
        }
        while self.contains(media_id) {
            tokio::time::sleep(WAIT_POLL).await;
        }
    }
}

/// Releases the registry slot on drop, whichever way the preload ends
pub struct PreloadGuard {
    registry: PreloadRegistry,
    media_id: String,
}

impl Drop for PreloadGuard {
    fn drop(&mut self) {
        self.registry.ids().remove(&self.media_id);
    }
}

#[derive(Clone)]
pub struct Preloader {
    settings: Arc<RwLock<Settings>>,
    cache: StreamCache,
    streams: Arc<dyn StreamProvider>,
    registry: PreloadRegistry,
}

impl Preloader {
    pub fn new(
        settings: Arc<RwLock<Settings>>,
        cache: StreamCache,
        streams: Arc<dyn StreamProvider>,
        registry: PreloadRegistry,
    ) -> Self {
        Self {
            settings,
            cache,
            streams,
            registry,
        }
    }

    /// Fire-and-forget preload of `track`. Errors are logged only.
    pub fn spawn(&self, track: Track, delayed: bool) -> Option<JoinHandle<()>> {
        let guard = self.registry.register(&track.id)?;
        let preloader = self.clone();
        Some(tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = preloader.preload(&track, delayed).await {
                tracing::debug!(media_id = %track.id, error = %e, "Preload failed");
            }
        }))
    }

    async fn preload(&self, track: &Track, delayed: bool) -> Result<()> {
        let settings = self.settings.read().await.clone();
        if !settings.preload {
            return Ok(());
        }
        if delayed {
            tokio::time::sleep(Duration::from_millis(settings.preload_delay_ms)).await;
        }

        let entry = self
            .cache
            .resolve(self.streams.as_ref(), &track.id, false)
            .await?;
        let mode = PlayMode::new(settings.show_video, PlayOverride::None);
        let excluded = PlayerKind::from_path(&settings.player)
            .flags()
            .and_then(|f| f.excluded_audio);
        let variant = if mode.video {
            select(&entry, &Selection::video(0, settings.max_res))
        } else {
            select(&entry, &Selection::audio(0, excluded))
                .or_else(|| select(&entry, &Selection::video(0, settings.max_res)))
        };
        let variant = variant.ok_or_else(|| JukeboxError::NoStreamAvailable {
            media_id: track.id.clone(),
        })?;

        if variant.size_bytes.is_none() {
            let size = self.streams.content_length(&variant.url).await?;
            self.cache.record_size(&track.id, &variant.url, size).await;
        }
        tracing::debug!(media_id = %track.id, quality = %variant.quality, "Preloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::model::{MediaKind, StreamVariant};
    use crate::providers::ResolvedStreams;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};

    struct Sized;

    #[async_trait]
    impl StreamProvider for Sized {
        async fn resolve(&self, _media_id: &str) -> std::result::Result<ResolvedStreams, ProviderError> {
            Ok(ResolvedStreams {
                variants: vec![StreamVariant {
                    url: "https://media.example/a".into(),
                    container: "webm".into(),
                    quality: "160k".into(),
                    kind: MediaKind::Audio,
                    size_bytes: None,
                }],
                expiry: Utc::now() + ChronoDuration::hours(1),
            })
        }

        async fn content_length(&self, _url: &str) -> std::result::Result<u64, ProviderError> {
            Ok(4_194_304)
        }
    }

    struct Broken;

    #[async_trait]
    impl StreamProvider for Broken {
        async fn resolve(&self, _media_id: &str) -> std::result::Result<ResolvedStreams, ProviderError> {
            Err(ProviderError::Rejected("gone".into()))
        }
    }

    fn preloader(streams: Arc<dyn StreamProvider>) -> (Preloader, StreamCache, PreloadRegistry) {
        let cache = StreamCache::new(10);
        let registry = PreloadRegistry::default();
        let settings = Arc::new(RwLock::new(Settings::default()));
        (
            Preloader::new(settings, cache.clone(), streams, registry.clone()),
            cache,
            registry,
        )
    }

    #[test]
    fn registry_slot_is_exclusive_and_released_on_drop() {
        let registry = PreloadRegistry::default();
        let guard = registry.register("a").unwrap();
        assert!(registry.contains("a"));
        assert!(registry.register("a").is_none());
        drop(guard);
        assert!(!registry.contains("a"));
    }

    #[tokio::test]
    async fn preload_resolves_and_records_size() {
        let (preloader, cache, registry) = preloader(Arc::new(Sized));
        let handle = preloader.spawn(Track::new("a", "A", 10), false).unwrap();
        handle.await.unwrap();
        let entry = cache.get("a").await.unwrap();
        assert_eq!(entry.variants[0].size_bytes, Some(4_194_304));
        assert!(!registry.contains("a"));
    }

    #[tokio::test]
    async fn failed_preload_still_releases_slot() {
        let (preloader, cache, registry) = preloader(Arc::new(Broken));
        preloader.spawn(Track::new("a", "A", 10), false).unwrap().await.unwrap();
        assert!(cache.get("a").await.is_none());
        assert!(!registry.contains("a"));
        registry.wait_until_clear("a").await;
    }
}
