//! Core type definitions shared by the cache, selector and queues

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A track as returned by the search provider. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub duration_seconds: u64,
    pub thumbnail: String,
}

impl Track {
    pub fn new(id: impl Into<String>, title: impl Into<String>, duration_seconds: u64) -> Self {
        let id = id.into();
        Self {
            thumbnail: format!("https://i.ytimg.com/vi/{}/default.jpg", id),
            id,
            title: title.into(),
            duration_seconds,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// One concrete playable encoding of a track
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamVariant {
    pub url: String,
    pub container: String,
    /// `WxH` for video, bitrate text such as `128k` for audio
    pub quality: String,
    pub kind: MediaKind,
    /// Content length in bytes, `None` until measured
    pub size_bytes: Option<u64>,
}

impl StreamVariant {
    /// Height of a video variant, parsed from its `WxH` quality label
    pub fn height(&self) -> Option<u32> {
        self.quality
            .split_once('x')
            .and_then(|(_, h)| h.trim().parse().ok())
    }
}

/// Resolved streams for one media id
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub media_id: String,
    pub variants: Vec<StreamVariant>,
    pub expiry: DateTime<Utc>,
    /// True when freshly resolved; cleared when served from cache
    #[serde(default)]
    pub fresh: bool,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }
}

/// Which kind of stream the user wants for one play
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PlayOverride {
    #[default]
    None,
    Audio,
    Fullscreen,
    Window,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_from_quality_label() {
        let mut v = StreamVariant {
            url: "u".into(),
            container: "mp4".into(),
            quality: "1280x720".into(),
            kind: MediaKind::Video,
            size_bytes: None,
        };
        assert_eq!(v.height(), Some(720));
        v.quality = "128k".into();
        assert_eq!(v.height(), None);
    }
}
