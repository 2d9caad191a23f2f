//! Stream discovery by running `yt-dlp -J` and reading its format list

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use tokio::process::Command;

use crate::error::ProviderError;
use crate::model::{MediaKind, StreamVariant};
use super::{ResolvedStreams, StreamProvider};

const DEFAULT_BINARY: &str = "yt-dlp";
const WATCH_URL: &str = "https://www.youtube.com/watch?v=";
/// Lifetime assumed when a stream url carries no `expire` parameter
const DEFAULT_EXPIRY_HOURS: i64 = 5;

#[derive(Deserialize)]
struct InfoJson {
    #[serde(default)]
    formats: Vec<Format>,
}

#[derive(Deserialize)]
struct Format {
    url: Option<String>,
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    abr: Option<f64>,
    filesize: Option<u64>,
}

fn has_codec(codec: &Option<String>) -> bool {
    codec.as_deref().is_some_and(|c| c != "none")
}

/// Expiry encoded in a signed stream url, if any
fn url_expiry(url: &str) -> Option<DateTime<Utc>> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let (_, value) = parsed.query_pairs().find(|(k, _)| k == "expire")?;
    let secs: i64 = value.parse().ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

/// Map yt-dlp's info JSON to stream variants, best first.
///
/// yt-dlp lists formats worst to best; the selector treats index 0 as best.
pub fn parse_info_json(json: &str) -> Result<ResolvedStreams, ProviderError> {
    let info: InfoJson =
        serde_json::from_str(json).map_err(|e| ProviderError::Decode(e.to_string()))?;

    let mut expiry = None;
    let variants: Vec<StreamVariant> = info
        .formats
        .into_iter()
        .rev()
        .filter_map(|f| {
            let url = f.url?;
            let kind = match (has_codec(&f.vcodec), has_codec(&f.acodec)) {
                (false, true) => MediaKind::Audio,
                (true, true) => MediaKind::Video,
                _ => return None,
            };
            let quality = match kind {
                MediaKind::Audio => format!("{}k", f.abr.unwrap_or(0.0).round() as u32),
                MediaKind::Video => format!("{}x{}", f.width.unwrap_or(0), f.height?),
            };
            if expiry.is_none() {
                expiry = url_expiry(&url);
            }
            Some(StreamVariant {
                url,
                container: f.ext.unwrap_or_default(),
                quality,
                kind,
                size_bytes: f.filesize,
            })
        })
        .collect();

    Ok(ResolvedStreams {
        variants,
        expiry: expiry.unwrap_or_else(|| Utc::now() + Duration::hours(DEFAULT_EXPIRY_HOURS)),
    })
}

pub struct YtDlpStreams {
    binary: String,
}

impl YtDlpStreams {
    pub fn new() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
        }
    }
}

impl Default for YtDlpStreams {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamProvider for YtDlpStreams {
    async fn resolve(&self, media_id: &str) -> Result<ResolvedStreams, ProviderError> {
        crate::log_provider_request!("resolve", media_id, binary = %self.binary);
        let output = Command::new(&self.binary)
            .args(["-J", "--no-playlist", "--no-warnings"])
            .arg(format!("{}{}", WATCH_URL, media_id))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProviderError::Rejected(format!("{}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .find(|l| l.starts_with("ERROR"))
                .unwrap_or("stream discovery failed")
                .to_string();
            // Unavailable/private videos will not come back on retry.
            return Err(if reason.contains("unavailable") || reason.contains("Private") {
                ProviderError::Rejected(reason)
            } else {
                ProviderError::Fetch(reason)
            });
        }

        parse_info_json(&String::from_utf8_lossy(&output.stdout))
    }
}
