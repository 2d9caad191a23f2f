//! Search and result paging

use crate::error::{JukeboxError, PageDirection, Result};
use crate::model::FIRST_PAGE;
use crate::providers::SearchPage;
use super::Jukebox;

/// Search pages kept in the memo before the oldest is dropped
pub const SEARCH_MEMO_CAPACITY: usize = 300;

impl Jukebox {
    /// Run a new search and replace the result list. Returns the number of results.
    pub async fn search(&self, text: &str) -> Result<usize> {
        let text = text.trim();
        tracing::debug!(query = text, "Performing search");
        let page = self.query(text, FIRST_PAGE).await?;

        {
            let mut pages = self.pages.lock().await;
            pages.set_page_size(self.settings.read().await.max_results as usize);
            pages.reset();
            pages.record_page(page.prev_token.as_deref(), FIRST_PAGE, page.next_token.as_deref());
        }
        *self.last_query.lock().await = Some(text.to_string());

        let count = page.tracks.len();
        if let Some(first) = page.tracks.first().cloned() {
            self.preloader.spawn(first, false);
        }
        self.results.lock().await.replace(page.tracks);
        tracing::info!(query = text, count, "Search completed");
        Ok(count)
    }

    /// Show the next or previous page of the last search
    pub async fn page(&self, direction: PageDirection) -> Result<usize> {
        let text = self
            .last_query
            .lock()
            .await
            .clone()
            .ok_or(JukeboxError::NoMorePages { direction })?;
        let shown = self.results.lock().await.len();

        let token = self.pages.lock().await.advance(direction, shown)?;
        let page = match self.query(&text, &token).await {
            Ok(page) => page,
            Err(e) => {
                // Stay on the page that is still displayed.
                let back = match direction {
                    PageDirection::Next => PageDirection::Prev,
                    PageDirection::Prev => PageDirection::Next,
                };
                let _ = self.pages.lock().await.advance(back, usize::MAX);
                return Err(e);
            }
        };
        self.pages
            .lock()
            .await
            .record_page(page.prev_token.as_deref(), &token, page.next_token.as_deref());

        let count = page.tracks.len();
        self.results.lock().await.replace(page.tracks);
        tracing::info!(query = %text, %direction, count, "Page loaded");
        Ok(count)
    }

    pub async fn page_number(&self) -> usize {
        self.pages.lock().await.page_number()
    }

    /// Query the provider through the memo; an empty page is `NoData`
    async fn query(&self, text: &str, token: &str) -> Result<SearchPage> {
        let key = (text.to_string(), token.to_string());
        if let Some(page) = self.memo.lock().await.get(&key) {
            tracing::debug!(query = text, token, "Search served from memo");
            return Ok(page.clone());
        }

        let page_token = (token != FIRST_PAGE).then_some(token);
        let result = self.search.query(text, page_token).await;
        crate::log_provider_result!("search", result);
        let page = result?;
        if page.tracks.is_empty() {
            return Err(JukeboxError::NoData(text.to_string()));
        }

        let mut memo = self.memo.lock().await;
        memo.insert(key, page.clone());
        while memo.len() > SEARCH_MEMO_CAPACITY {
            memo.shift_remove_index(0);
        }
        Ok(page)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::RwLock;

    use super::*;
    use crate::error::ProviderError;
    use crate::model::{StreamCache, Track};
    use crate::player::driver_tests::{StubStreams, test_settings};
    use crate::providers::SearchProvider;
    use crate::view::MemorySink;

    /// Three pages of two tracks for "song", nothing for anything else
    #[derive(Default)]
    struct PagedSearch {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SearchProvider for PagedSearch {
        async fn query(
            &self,
            text: &str,
            token: Option<&str>,
        ) -> std::result::Result<SearchPage, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text != "song" {
                return Ok(SearchPage::default());
            }
            let (n, prev, next) = match token {
                None => (1, None, Some("P2")),
                Some("P2") => (2, Some("P1"), Some("P3")),
                Some("P3") => (3, Some("P2"), None),
                Some(other) => return Err(ProviderError::Rejected(other.to_string())),
            };
            let per_page = if n == 3 { 1 } else { 2 };
            Ok(SearchPage {
                tracks: (0..per_page)
                    .map(|i| Track::new(format!("{}-{}", n, i), format!("Song {} {}", n, i), 100))
                    .collect(),
                prev_token: prev.map(str::to_string),
                next_token: next.map(str::to_string),
            })
        }
    }

    fn jukebox(search: Arc<PagedSearch>, dir: &std::path::Path) -> Jukebox {
        let mut settings = test_settings(&dir.join("mplayer"));
        settings.max_results = 2;
        Jukebox::new(
            Arc::new(RwLock::new(settings)),
            StreamCache::new(10),
            search,
            Arc::new(StubStreams),
            Arc::new(MemorySink::default()),
            dir.to_path_buf(),
        )
    }

    #[tokio::test]
    async fn pages_forward_and_back_using_the_memo() {
        let dir = tempfile::tempdir().unwrap();
        let search = Arc::new(PagedSearch::default());
        let jukebox = jukebox(search.clone(), dir.path());

        assert_eq!(jukebox.search("song").await.unwrap(), 2);
        assert!(matches!(
            jukebox.page(PageDirection::Prev).await,
            Err(JukeboxError::NoMorePages { direction: PageDirection::Prev })
        ));
        assert_eq!(jukebox.page(PageDirection::Next).await.unwrap(), 2);
        assert_eq!(jukebox.page(PageDirection::Next).await.unwrap(), 1);
        assert_eq!(jukebox.page_number().await, 3);
        // Short last page: nothing further.
        assert!(matches!(
            jukebox.page(PageDirection::Next).await,
            Err(JukeboxError::NoMorePages { direction: PageDirection::Next })
        ));

        assert_eq!(jukebox.page(PageDirection::Prev).await.unwrap(), 2);
        assert_eq!(jukebox.page(PageDirection::Prev).await.unwrap(), 2);
        assert_eq!(jukebox.get_results().await.tracks()[0].id, "1-0");
        assert_eq!(search.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn page_size_follows_settings_before_first_search() {
        let dir = tempfile::tempdir().unwrap();
        let jukebox = jukebox(Arc::new(PagedSearch::default()), dir.path());
        assert_eq!(jukebox.pages.lock().await.page_size(), 2);
    }

    #[tokio::test]
    async fn empty_search_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let jukebox = jukebox(Arc::new(PagedSearch::default()), dir.path());
        assert!(matches!(jukebox.search("nothing").await, Err(JukeboxError::NoData(_))));
        assert!(jukebox.get_results().await.is_empty());
    }
}
