//! Controller module - the jukebox coordinator
//!
//! `Jukebox` owns the shared state and exposes the operations the command
//! interface drives. It is organized into submodules by responsibility:
//!
//! - `queue`: editing the active queue
//! - `playback`: start/stop/skip and the queue worker loop
//! - `navigation`: search and result paging
//! - `input`: line-oriented command handling

mod input;
mod navigation;
mod playback;
mod queue;

pub use input::run_command_loop;

use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::model::{PageCursorList, PlaybackState, Queue, StreamCache};
use crate::player::{PlayerDriver, PreloadRegistry, Preloader};
use crate::providers::{SearchPage, SearchProvider, StreamProvider};
use crate::view::StatusSink;

/// Memoised search pages, keyed by query text and page token
pub(crate) type SearchMemo = IndexMap<(String, String), SearchPage>;

#[derive(Clone)]
pub struct Jukebox {
    pub(crate) settings: Arc<RwLock<Settings>>,
    pub(crate) state: Arc<PlaybackState>,
    pub(crate) cache: StreamCache,
    pub(crate) results: Arc<Mutex<Queue>>,
    pub(crate) active: Arc<Mutex<Queue>>,
    search: Arc<dyn SearchProvider>,
    preloader: Preloader,
    driver: Arc<PlayerDriver>,
    pages: Arc<Mutex<PageCursorList>>,
    last_query: Arc<Mutex<Option<String>>>,
    memo: Arc<Mutex<SearchMemo>>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
    halt: Arc<Mutex<CancellationToken>>,
}

impl Jukebox {
    pub fn new(
        settings: Arc<RwLock<Settings>>,
        cache: StreamCache,
        search: Arc<dyn SearchProvider>,
        streams: Arc<dyn StreamProvider>,
        sink: Arc<dyn StatusSink>,
        config_dir: PathBuf,
    ) -> Self {
        let state = Arc::new(PlaybackState::new());
        let page_size = settings
            .try_read()
            .map(|s| s.max_results)
            .unwrap_or(Settings::default().max_results) as usize;
        let registry = PreloadRegistry::default();
        let preloader = Preloader::new(
            settings.clone(),
            cache.clone(),
            streams.clone(),
            registry.clone(),
        );
        let driver = PlayerDriver::new(
            settings.clone(),
            state.clone(),
            cache.clone(),
            streams,
            registry,
            sink,
            config_dir,
        );
        Self {
            settings,
            state,
            cache,
            results: Arc::new(Mutex::new(Queue::new("Search results"))),
            active: Arc::new(Mutex::new(Queue::new("Queue"))),
            search,
            preloader,
            driver: Arc::new(driver),
            pages: Arc::new(Mutex::new(PageCursorList::new(page_size))),
            last_query: Arc::new(Mutex::new(None)),
            memo: Arc::new(Mutex::new(IndexMap::new())),
            worker: Arc::new(Mutex::new(None)),
            halt: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    pub fn state(&self) -> &Arc<PlaybackState> {
        &self.state
    }

    /// Surface `message` in the user-visible message field
    pub(crate) async fn report(&self, message: impl Into<String>) {
        self.state.set_message(message).await;
    }
}
