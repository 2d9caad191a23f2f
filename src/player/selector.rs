//! Choosing one stream variant from a cache entry

use crate::model::{CacheEntry, MediaKind, StreamVariant};

/// Constraints for one selection
#[derive(Clone, Copy, Debug)]
pub struct Selection {
    /// Zero-based preference index; 0 is best
    pub quality_rank: usize,
    pub want_audio: bool,
    /// Audio container the player cannot handle
    pub excluded_container: Option<&'static str>,
    pub max_height: u32,
}

impl Selection {
    pub fn audio(quality_rank: usize, excluded_container: Option<&'static str>) -> Self {
        Self {
            quality_rank,
            want_audio: true,
            excluded_container,
            max_height: u32::MAX,
        }
    }

    pub fn video(quality_rank: usize, max_height: u32) -> Self {
        Self {
            quality_rank,
            want_audio: false,
            excluded_container: None,
            max_height,
        }
    }
}

/// Pick a variant. An out-of-range nonzero rank falls back to the best
/// candidate; an empty candidate list yields `None`.
pub fn select<'a>(entry: &'a CacheEntry, selection: &Selection) -> Option<&'a StreamVariant> {
    let candidates: Vec<&StreamVariant> = if selection.want_audio {
        entry
            .variants
            .iter()
            .filter(|v| v.kind == MediaKind::Audio)
            .filter(|v| selection.excluded_container != Some(v.container.as_str()))
            .collect()
    } else {
        let mut video: Vec<&StreamVariant> = entry
            .variants
            .iter()
            .filter(|v| v.kind == MediaKind::Video)
            .filter(|v| v.height().is_some_and(|h| h <= selection.max_height))
            .collect();
        // Stable: equal heights keep provider order.
        video.sort_by(|a, b| b.height().cmp(&a.height()));
        video
    };

    tracing::trace!(
        rank = selection.quality_rank,
        audio = selection.want_audio,
        candidates = candidates.len(),
        "Selecting stream"
    );

    match candidates.get(selection.quality_rank) {
        Some(v) => Some(*v),
        None if selection.quality_rank > 0 => candidates.first().copied(),
        None => None,
    }
}
