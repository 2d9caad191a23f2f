//! Playback control and the queue worker loop

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::JukeboxError;
use crate::model::{ControlSignal, PlayOverride};
use crate::player::PlayOutcome;
use super::Jukebox;

const NOTHING_PLAYING: &str = "No Songs Playing";

/// What a polling client needs to redraw
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct StatusReport {
    pub playing: bool,
    pub now_playing_title: String,
    pub percent_elapsed: f64,
    pub playlist_version: u32,
}

impl Jukebox {
    /// Mark playback as wanted and make sure a worker is draining the queue
    pub async fn start(&self) {
        let mut worker = self.worker.lock().await;
        self.state.set_playing(true).await;
        if worker.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let halt = self.halt.lock().await.clone();
        let jukebox = self.clone();
        tracing::info!("Starting queue worker");
        *worker = Some(tokio::spawn(async move {
            jukebox.run_queue(halt).await;
        }));
    }

    pub async fn control(&self, signal: ControlSignal) {
        tracing::info!(?signal, "Playback control");
        match signal {
            ControlSignal::Stop => self.state.set_playing(false).await,
            ControlSignal::Skip => self.state.request_skip().await,
        }
    }

    /// Abort the running play at once, unwinding the player driver
    pub async fn halt(&self) {
        let mut halt = self.halt.lock().await;
        halt.cancel();
        *halt = CancellationToken::new();
    }

    /// Wait for the queue worker, if any, to exit
    pub async fn join_worker(&self) {
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub async fn get_status(&self) -> StatusReport {
        let info = self.state.snapshot().await;
        let title = self
            .active
            .lock()
            .await
            .front()
            .filter(|_| info.playing)
            .map(|t| t.title.clone())
            .unwrap_or_else(|| NOTHING_PLAYING.to_string());
        StatusReport {
            playing: info.playing,
            now_playing_title: title,
            percent_elapsed: info.percent_elapsed,
            playlist_version: info.playlist_version,
        }
    }

    async fn run_queue(&self, halt: CancellationToken) {
        loop {
            self.drain_queue(&halt).await;

            // Re-check under the worker slot so a concurrent `start` either
            // sees this worker gone or has its track picked up here.
            let mut slot = self.worker.lock().await;
            if self.state.is_playing().await && !self.active.lock().await.is_empty() {
                continue;
            }
            *slot = None;
            self.state.set_playing(false).await;
            tracing::info!("Queue worker stopped");
            return;
        }
    }

    async fn drain_queue(&self, halt: &CancellationToken) {
        while self.state.is_playing().await {
            let Some(track) = self.active.lock().await.front().cloned() else {
                return;
            };
            self.state.clear_skip().await;

            let outcome = tokio::select! {
                _ = halt.cancelled() => {
                    tracing::info!(media_id = %track.id, "Playback halted");
                    self.report("Playback halted").await;
                    self.state.set_playing(false).await;
                    return;
                }
                outcome = self.driver.play(&track, PlayOverride::None) => outcome,
            };

            let pop = match outcome {
                Ok(PlayOutcome::Stopped) => {
                    self.state.set_playing(false).await;
                    false
                }
                Ok(_) => true,
                Err(e @ JukeboxError::PlayerLaunch { .. }) => {
                    self.report(e.user_message()).await;
                    self.state.set_playing(false).await;
                    false
                }
                Err(e) => {
                    self.report(e.user_message()).await;
                    true
                }
            };

            if pop {
                // The front may have been edited while the track played.
                let popped = self.active.lock().await.pop_front_if(&track.id);
                if popped.is_some() {
                    self.state.bump_playlist_version().await;
                    self.preload_next_up().await;
                }
            }
        }
    }
}
