//! Search provider backed by the YouTube Data API v3

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::config::Settings;
use crate::error::ProviderError;
use crate::model::Track;
use super::{SearchPage, SearchProvider, http_client};

const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";
const VIDEOS_URL: &str = "https://www.googleapis.com/youtube/v3/videos";
const MUSIC_CATEGORY: &str = "10";

static ISO_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$")
        .expect("valid duration regex")
});

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    prev_page_token: Option<String>,
    next_page_token: Option<String>,
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    snippet: VideoSnippet,
    content_details: ContentDetails,
}

#[derive(Deserialize)]
struct VideoSnippet {
    title: String,
    #[serde(default)]
    thumbnails: HashMap<String, Thumbnail>,
}

#[derive(Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Deserialize)]
struct ContentDetails {
    duration: String,
}

/// Seconds in an ISO-8601 duration such as `PT4M13S`
pub fn parse_iso_duration(text: &str) -> Option<u64> {
    let caps = ISO_DURATION.captures(text)?;
    let part = |i: usize| -> u64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    Some(part(1) * 86_400 + part(2) * 3600 + part(3) * 60 + part(4))
}

pub struct YouTubeSearch {
    client: reqwest::Client,
    settings: Arc<RwLock<Settings>>,
}

impl YouTubeSearch {
    pub fn new(settings: Arc<RwLock<Settings>>) -> Self {
        Self {
            client: http_client(),
            settings,
        }
    }

    async fn search_params(&self, text: &str, page_token: Option<&str>) -> Vec<(&'static str, String)> {
        let settings = self.settings.read().await;
        let order = match settings.order.as_str() {
            "views" => "viewCount".to_string(),
            other => other.to_string(),
        };
        let mut params = vec![
            ("q", text.to_string()),
            ("maxResults", settings.max_results.to_string()),
            ("safeSearch", "none".to_string()),
            ("order", order),
            ("part", "id,snippet".to_string()),
            ("type", "video".to_string()),
            ("key", settings.api_key.clone()),
        ];
        if let Some(token) = page_token.filter(|t| !t.is_empty()) {
            params.push(("pageToken", token.to_string()));
        }
        if settings.search_music {
            params.push(("videoCategoryId", MUSIC_CATEGORY.to_string()));
        }
        params
    }

    async fn video_details(&self, ids: &[String]) -> Result<Vec<Track>, ProviderError> {
        let key = self.settings.read().await.api_key.clone();
        let joined = ids.join(",");
        let response: VideosResponse = self
            .client
            .get(VIDEOS_URL)
            .query(&[
                ("part", "contentDetails,snippet"),
                ("id", joined.as_str()),
                ("key", key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut by_id: HashMap<String, VideoItem> = response
            .items
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect();

        // Keep search order; the videos endpoint may reorder or drop items.
        Ok(ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .map(|item| {
                let mut track = Track::new(
                    item.id,
                    item.snippet.title,
                    parse_iso_duration(&item.content_details.duration).unwrap_or(0),
                );
                if let Some(thumb) = item.snippet.thumbnails.get("default") {
                    track.thumbnail = thumb.url.clone();
                }
                track
            })
            .collect())
    }
}

#[async_trait]
impl SearchProvider for YouTubeSearch {
    async fn query(&self, text: &str, page_token: Option<&str>) -> Result<SearchPage, ProviderError> {
        crate::log_provider_request!("search", query = text, page_token = ?page_token);
        let params = self.search_params(text, page_token).await;
        let response: SearchResponse = self
            .client
            .get(SEARCH_URL)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let ids: Vec<String> = response
            .items
            .into_iter()
            .filter_map(|item| item.id.video_id)
            .collect();

        let tracks = if ids.is_empty() {
            Vec::new()
        } else {
            self.video_details(&ids).await?
        };
        tracing::info!(query = text, count = tracks.len(), "Search request successful");

        Ok(SearchPage {
            tracks,
            prev_token: response.prev_page_token,
            next_token: response.next_page_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_durations() {
        assert_eq!(parse_iso_duration("PT4M13S"), Some(253));
        assert_eq!(parse_iso_duration("PT1H"), Some(3600));
        assert_eq!(parse_iso_duration("P1DT2S"), Some(86_402));
        assert_eq!(parse_iso_duration("PT0S"), Some(0));
        assert_eq!(parse_iso_duration("4:13"), None);
    }

    #[test]
    fn search_response_tokens() {
        let body = r#"{"nextPageToken":"CAoQAA","items":[{"id":{"kind":"youtube#video","videoId":"abc"}},{"id":{"kind":"youtube#channel"}}]}"#;
        let parsed: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.next_page_token.as_deref(), Some("CAoQAA"));
        assert!(parsed.prev_page_token.is_none());
        let ids: Vec<_> = parsed.items.into_iter().filter_map(|i| i.id.video_id).collect();
        assert_eq!(ids, ["abc"]);
    }
}
