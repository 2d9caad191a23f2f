//! Ordered track lists: the search result model and the active playback queue

use serde::Serialize;

use crate::error::{JukeboxError, Result};
use super::types::Track;

/// Ordered sequence of tracks; insertion order is playback/display order
#[derive(Clone, Debug, Default, Serialize)]
pub struct Queue {
    name: String,
    tracks: Vec<Track>,
}

impl Queue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tracks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn front(&self) -> Option<&Track> {
        self.tracks.first()
    }

    pub fn get(&self, index: usize) -> Result<&Track> {
        self.tracks.get(index).ok_or(JukeboxError::QueueIndex {
            index,
            len: self.tracks.len(),
        })
    }

    /// Sum of track durations
    pub fn total_seconds(&self) -> u64 {
        self.tracks.iter().map(|t| t.duration_seconds).sum()
    }

    pub fn replace(&mut self, tracks: Vec<Track>) {
        self.tracks = tracks;
    }

    /// Append a track, returning its position
    pub fn push(&mut self, track: Track) -> usize {
        self.tracks.push(track);
        self.tracks.len() - 1
    }

    pub fn remove(&mut self, index: usize) -> Result<Track> {
        self.check(index)?;
        Ok(self.tracks.remove(index))
    }

    /// Pop the front track only if it is still `media_id`
    pub fn pop_front_if(&mut self, media_id: &str) -> Option<Track> {
        if self.front().is_some_and(|t| t.id == media_id) {
            Some(self.tracks.remove(0))
        } else {
            None
        }
    }

    pub fn move_item(&mut self, from: usize, to: usize) -> Result<()> {
        self.check(from)?;
        self.check(to)?;
        let track = self.tracks.remove(from);
        self.tracks.insert(to, track);
        Ok(())
    }

    pub fn swap(&mut self, a: usize, b: usize) -> Result<()> {
        self.check(a)?;
        self.check(b)?;
        self.tracks.swap(a, b);
        Ok(())
    }

    fn check(&self, index: usize) -> Result<()> {
        if index < self.tracks.len() {
            Ok(())
        } else {
            Err(JukeboxError::QueueIndex {
                index,
                len: self.tracks.len(),
            })
        }
    }
}

/// Format seconds as `H:MM:SS`, or `M:SS` under an hour
pub fn format_duration(seconds: u64) -> String {
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}
