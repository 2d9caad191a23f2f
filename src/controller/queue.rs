//! Active queue editing

use crate::error::{JukeboxError, Result};
use crate::model::{Queue, Track};
use super::Jukebox;

impl Jukebox {
    /// Copy result `result_index` (0-based) onto the end of the active
    /// queue and start playback if idle. Returns its queue position.
    pub async fn enqueue(&self, result_index: usize) -> Result<usize> {
        let track = self.results.lock().await.get(result_index)?.clone();
        let position = self.active.lock().await.push(track.clone());
        self.state.bump_playlist_version().await;
        tracing::info!(media_id = %track.id, position, "Track enqueued");

        if position == 1 {
            self.preloader.spawn(track, true);
        }
        // No-op while a worker is draining the queue.
        self.start().await;
        Ok(position)
    }

    /// Remove the track at `index`; the front track cannot be removed while it plays
    pub async fn dequeue(&self, index: usize) -> Result<Track> {
        if index == 0 && self.state.is_playing().await {
            return Err(JukeboxError::NowPlaying);
        }
        let removed = self.active.lock().await.remove(index)?;
        self.state.bump_playlist_version().await;
        tracing::info!(media_id = %removed.id, index, "Track dequeued");
        if index <= 1 {
            self.preload_next_up().await;
        }
        Ok(removed)
    }

    pub async fn move_track(&self, from: usize, to: usize) -> Result<()> {
        self.ensure_front_untouched(&[from, to]).await?;
        self.active.lock().await.move_item(from, to)?;
        self.state.bump_playlist_version().await;
        if from <= 1 || to <= 1 {
            self.preload_next_up().await;
        }
        Ok(())
    }

    pub async fn swap_tracks(&self, a: usize, b: usize) -> Result<()> {
        self.ensure_front_untouched(&[a, b]).await?;
        self.active.lock().await.swap(a, b)?;
        self.state.bump_playlist_version().await;
        if a <= 1 || b <= 1 {
            self.preload_next_up().await;
        }
        Ok(())
    }

    pub async fn get_active_queue(&self) -> Queue {
        self.active.lock().await.clone()
    }

    pub async fn get_results(&self) -> Queue {
        self.results.lock().await.clone()
    }

    async fn ensure_front_untouched(&self, indices: &[usize]) -> Result<()> {
        if indices.contains(&0) && self.state.is_playing().await {
            return Err(JukeboxError::NowPlaying);
        }
        Ok(())
    }

    /// Preload whatever is now second in the queue
    pub(crate) async fn preload_next_up(&self) {
        let next = self.active.lock().await.tracks().get(1).cloned();
        if let Some(track) = next {
            self.preloader.spawn(track, true);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::controller::playback::tests::{jukebox, seed_results};

    #[tokio::test]
    async fn editing_bumps_version_and_validates_indices() {
        let dir = tempfile::tempdir().unwrap();
        // Missing player: the worker stops at once without touching the queue.
        let jukebox = jukebox(&dir.path().join("none"), dir.path());
        seed_results(&jukebox, &["a", "b", "c"]).await;
        {
            let mut active = jukebox.active.lock().await;
            for id in ["a", "b", "c"] {
                active.push(Track::new(id, id, 60));
            }
        }

        let before = jukebox.state.playlist_version().await;
        jukebox.swap_tracks(0, 2).await.unwrap();
        assert_ne!(jukebox.state.playlist_version().await, before);
        let ids: Vec<String> = jukebox
            .get_active_queue()
            .await
            .tracks()
            .iter()
            .map(|t| t.id.clone())
            .collect();
        assert_eq!(ids, ["c", "b", "a"]);

        assert!(matches!(
            jukebox.move_track(1, 7).await,
            Err(JukeboxError::QueueIndex { index: 7, len: 3 })
        ));
        assert_eq!(jukebox.dequeue(1).await.unwrap().id, "b");

        jukebox.state.set_playing(true).await;
        assert!(matches!(jukebox.dequeue(0).await, Err(JukeboxError::NowPlaying)));
        assert!(matches!(jukebox.move_track(1, 0).await, Err(JukeboxError::NowPlaying)));
        assert!(matches!(
            jukebox.enqueue(9).await,
            Err(JukeboxError::QueueIndex { index: 9, len: 3 })
        ));
    }
}
