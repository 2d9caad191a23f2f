//! Model module - jukebox state and data types
//!
//! - `types`: tracks, stream variants and cache entries
//! - `cache`: time-expiring stream cache with FIFO capacity eviction
//! - `queue`: ordered track lists (search results and the active queue)
//! - `playback`: shared playback state and control requests
//! - `pagination`: page token bookkeeping for paged search results

mod types;
mod cache;
mod queue;
mod playback;
mod pagination;

pub use types::{CacheEntry, MediaKind, PlayOverride, StreamVariant, Track};

pub use cache::StreamCache;

pub use queue::{Queue, format_duration};

pub use playback::{ControlSignal, PlaybackState};

pub use pagination::{FIRST_PAGE, PageCursorList};
