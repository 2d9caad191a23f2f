//! Process-wide playback state shared by the queue worker, driver and monitor

use serde::Serialize;
use tokio::sync::{Mutex, Notify};

/// Cooperative control request observed at monitor/worker checkpoints
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlSignal {
    Stop,
    Skip,
}

/// Snapshot of the playback fields
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct PlaybackInfo {
    pub playing: bool,
    pub paused: bool,
    pub skip_requested: bool,
    pub elapsed_seconds: u64,
    pub percent_elapsed: f64,
    pub volume: Option<u32>,
    pub playlist_version: u32,
    pub message: Option<String>,
}

/// Last-writer-wins playback fields plus a wakeup for control requests
#[derive(Default)]
pub struct PlaybackState {
    info: Mutex<PlaybackInfo>,
    control: Notify,
}

impl PlaybackState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> PlaybackInfo {
        self.info.lock().await.clone()
    }

    pub async fn is_playing(&self) -> bool {
        self.info.lock().await.playing
    }

    pub async fn set_playing(&self, playing: bool) {
        self.info.lock().await.playing = playing;
        if !playing {
            self.control.notify_one();
        }
    }

    pub async fn request_skip(&self) {
        self.info.lock().await.skip_requested = true;
        self.control.notify_one();
    }

    pub async fn clear_skip(&self) {
        self.info.lock().await.skip_requested = false;
    }

    pub async fn set_paused(&self, paused: bool) {
        self.info.lock().await.paused = paused;
    }

    /// Pending control request, stop taking precedence over skip
    pub async fn control_signal(&self) -> Option<ControlSignal> {
        let info = self.info.lock().await;
        if !info.playing {
            Some(ControlSignal::Stop)
        } else if info.skip_requested {
            Some(ControlSignal::Skip)
        } else {
            None
        }
    }

    /// Resolves after the next stop/skip request
    pub async fn control_changed(&self) {
        self.control.notified().await;
    }

    /// Record elapsed time and recompute the percentage (0 when duration is unknown)
    pub async fn update_elapsed(&self, elapsed_seconds: u64, duration_seconds: u64) -> f64 {
        let percent = if duration_seconds > 0 {
            elapsed_seconds as f64 * 100.0 / duration_seconds as f64
        } else {
            0.0
        };
        let mut info = self.info.lock().await;
        info.elapsed_seconds = elapsed_seconds;
        info.percent_elapsed = percent;
        percent
    }

    pub async fn set_volume(&self, volume: u32) {
        self.info.lock().await.volume = Some(volume);
    }

    pub async fn volume(&self) -> Option<u32> {
        self.info.lock().await.volume
    }

    pub async fn reset_progress(&self) {
        let mut info = self.info.lock().await;
        info.elapsed_seconds = 0;
        info.percent_elapsed = 0.0;
        info.paused = false;
    }

    /// Stamp a new playlist version, guaranteed to differ from the previous one
    pub async fn bump_playlist_version(&self) -> u32 {
        let mut info = self.info.lock().await;
        let mut token = rand::random_range(0..100_000);
        while token == info.playlist_version {
            token = rand::random_range(0..100_000);
        }
        info.playlist_version = token;
        token
    }

    pub async fn playlist_version(&self) -> u32 {
        self.info.lock().await.playlist_version
    }

    pub async fn set_message(&self, message: impl Into<String>) {
        self.info.lock().await.message = Some(message.into());
    }

    pub async fn take_message(&self) -> Option<String> {
        self.info.lock().await.message.take()
    }
}
