//! Page-token bookkeeping for paged search results

use crate::error::{JukeboxError, PageDirection, Result};

/// Token of the first page of any query
pub const FIRST_PAGE: &str = "";

/// Ordered page tokens in provider iteration order. `None` marks a slot
/// whose token has not been discovered yet.
#[derive(Clone, Debug)]
pub struct PageCursorList {
    tokens: Vec<Option<String>>,
    current: Option<String>,
    page_size: usize,
}

impl PageCursorList {
    pub fn new(page_size: usize) -> Self {
        Self {
            tokens: vec![Some(FIRST_PAGE.to_string())],
            current: None,
            page_size,
        }
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size;
    }

    /// Forget everything; the next recorded page starts a fresh list
    pub fn reset(&mut self) {
        self.tokens = vec![Some(FIRST_PAGE.to_string())];
        self.current = None;
    }

    #[cfg(test)]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[cfg(test)]
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// 1-based number of the current page
    pub fn page_number(&self) -> usize {
        self.current_index().map_or(1, |i| i + 1)
    }

    #[cfg(test)]
    pub fn tokens(&self) -> &[Option<String>] {
        &self.tokens
    }

    fn current_index(&self) -> Option<usize> {
        let current = self.current.as_deref()?;
        self.tokens.iter().position(|t| t.as_deref() == Some(current))
    }

    /// Record the neighbours reported by the provider for the page `current`
    pub fn record_page(&mut self, prev: Option<&str>, current: &str, next: Option<&str>) {
        let known = self
            .current
            .as_ref()
            .and_then(|_| self.tokens.iter().position(|t| t.as_deref() == Some(current)));

        let mut idx = match known {
            Some(i) => i,
            None => {
                self.tokens = vec![Some(current.to_string())];
                0
            }
        };
        self.current = Some(current.to_string());

        if let Some(prev) = prev {
            if idx == 0 {
                self.tokens.insert(0, Some(prev.to_string()));
                idx = 1;
            } else if self.tokens[idx - 1].is_none() {
                self.tokens[idx - 1] = Some(prev.to_string());
            }
        }

        if let Some(next) = next {
            let next = Some(next.to_string());
            if idx + 1 < self.tokens.len() {
                self.tokens[idx + 1] = next;
            } else {
                self.tokens.push(next);
            }
        }
        tracing::trace!(tokens = ?self.tokens, current, "Page tokens updated");
    }

    /// Move to the adjacent page and return its token.
    ///
    /// `current_page_len` is the number of results on the current page; a
    /// short page means there is nothing after it.
    pub fn advance(&mut self, direction: PageDirection, current_page_len: usize) -> Result<String> {
        let no_more = JukeboxError::NoMorePages { direction };
        let idx = self.current_index().ok_or(JukeboxError::NoMorePages { direction })?;

        let target = match direction {
            PageDirection::Next => {
                if current_page_len < self.page_size {
                    return Err(no_more);
                }
                idx + 1
            }
            PageDirection::Prev => idx.checked_sub(1).ok_or(no_more)?,
        };

        let token = self
            .tokens
            .get(target)
            .cloned()
            .flatten()
            .ok_or(JukeboxError::NoMorePages { direction })?;
        self.current = Some(token.clone());
        Ok(token)
    }
}
