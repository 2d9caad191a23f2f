//! Error taxonomy for the jukebox core

use thiserror::Error;

use crate::config::ConfigError;

/// Failure reported by one of the external providers (search or stream discovery)
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network or transport failure; worth retrying
    #[error("fetch failed: {0}")]
    Fetch(String),
    /// The provider understood the request and refused it
    #[error("provider refused: {0}")]
    Rejected(String),
    /// The provider answered with something we could not interpret
    #[error("unexpected provider data: {0}")]
    Decode(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Fetch(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::Decode(e.to_string())
        } else if e.status().is_some_and(|s| s.is_client_error()) {
            ProviderError::Rejected(e.to_string())
        } else {
            ProviderError::Fetch(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDirection {
    Next,
    Prev,
}

impl std::fmt::Display for PageDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageDirection::Next => write!(f, "next"),
            PageDirection::Prev => write!(f, "previous"),
        }
    }
}

#[derive(Debug, Error)]
pub enum JukeboxError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("no playable stream for {media_id}")]
    NoStreamAvailable { media_id: String },

    #[error("cannot launch player {player}: {source}")]
    PlayerLaunch {
        player: String,
        #[source]
        source: std::io::Error,
    },

    #[error("player exited with code {code:?} after {attempts} attempt(s)")]
    ProcessExitFailure { code: Option<i32>, attempts: u32 },

    #[error("no {direction} items to display")]
    NoMorePages { direction: PageDirection },

    #[error("found nothing for {0}")]
    NoData(String),

    #[error("index {index} out of range (queue has {len} tracks)")]
    QueueIndex { index: usize, len: usize },

    #[error("the first track is currently playing")]
    NowPlaying,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl JukeboxError {
    /// Whether the driver should try again with the next quality rank
    pub fn is_retryable(&self) -> bool {
        match self {
            JukeboxError::Provider(e) => e.is_transient(),
            JukeboxError::ProcessExitFailure { .. } => true,
            _ => false,
        }
    }

    /// Text for the user-visible message field
    pub fn user_message(&self) -> String {
        match self {
            JukeboxError::NoMorePages { .. } => self.to_string(),
            JukeboxError::PlayerLaunch { player, .. } => {
                format!("Player not available: {} (use 'set player <path>')", player)
            }
            other => format!("Error: {}", other),
        }
    }
}

pub type Result<T> = std::result::Result<T, JukeboxError>;
