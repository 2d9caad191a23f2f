//! Interfaces to the external collaborators: search and stream discovery
//!
//! - `youtube`: search over the YouTube Data API
//! - `ytdlp`: stream discovery through the `yt-dlp` executable

pub mod youtube;
pub mod ytdlp;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ProviderError;
use crate::model::{StreamVariant, Track};

/// One page of search results with its neighbouring page tokens
#[derive(Clone, Debug, Default)]
pub struct SearchPage {
    pub tracks: Vec<Track>,
    pub prev_token: Option<String>,
    pub next_token: Option<String>,
}

/// Given a query and optional page token, returns a page of tracks
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn query(&self, text: &str, page_token: Option<&str>) -> Result<SearchPage, ProviderError>;
}

/// All variants known for a media id, valid until `expiry`
#[derive(Clone, Debug)]
pub struct ResolvedStreams {
    pub variants: Vec<StreamVariant>,
    pub expiry: DateTime<Utc>,
}

#[async_trait]
pub trait StreamProvider: Send + Sync {
    async fn resolve(&self, media_id: &str) -> Result<ResolvedStreams, ProviderError>;

    /// Size in bytes of the resource at `url`, from a HEAD request
    async fn content_length(&self, url: &str) -> Result<u64, ProviderError> {
        head_content_length(url).await
    }
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_default()
}

pub async fn head_content_length(url: &str) -> Result<u64, ProviderError> {
    let response = http_client().head(url).send().await?.error_for_status()?;
    response
        .headers()
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ProviderError::Decode(format!("no content-length for {}", url)))
}
