//! Named settings, persisted as TOML in the user's config directory

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const APP_DIR: &str = "jukebox-rs";
const CONFIG_FILE: &str = "config.toml";
const STREAM_CACHE_FILE: &str = "streams.json";

const ORDERS: &[&str] = &["relevance", "date", "views", "rating"];
const WINDOW_POSITIONS: &[&str] = &["top-left", "top-right", "bottom-left", "bottom-right"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown setting {0}")]
    UnknownSetting(String),
    #[error("{name} requires True/False, got {value}")]
    NotABool { name: String, value: String },
    #[error("{name} requires a number, got {value}")]
    NotANumber { name: String, value: String },
    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange { name: String, min: u64, max: u64, value: u64 },
    #[error("{name} must be one of {allowed} - not {value}")]
    NotAllowed { name: String, allowed: String, value: String },
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: String, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub player: String,
    pub player_args: String,
    pub show_video: bool,
    pub fullscreen: bool,
    pub window_size: String,
    pub window_pos: String,
    pub max_res: u32,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_cached_streams: usize,
    pub max_results: u32,
    pub order: String,
    pub search_music: bool,
    pub preload: bool,
    pub preload_delay_ms: u64,
    pub show_status: bool,
    pub console_width: u16,
    pub notifier: String,
    pub api_key: String,
    pub log_dir: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            player: "mpv".to_string(),
            player_args: String::new(),
            show_video: false,
            fullscreen: false,
            window_size: String::new(),
            window_pos: String::new(),
            max_res: 2160,
            max_retries: 3,
            retry_delay_ms: 1200,
            max_cached_streams: 1500,
            max_results: 15,
            order: "relevance".to_string(),
            search_music: true,
            preload: true,
            preload_delay_ms: 2000,
            show_status: true,
            console_width: 80,
            notifier: String::new(),
            api_key: String::new(),
            log_dir: ".logs".to_string(),
        }
    }
}

/// Directory holding config, cache and input mapping files
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn default_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

/// Persisted stream cache next to the config file
pub fn stream_cache_path(config_dir: &Path) -> PathBuf {
    config_dir.join(STREAM_CACHE_FILE)
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_uppercase().as_str() {
        "0" | "OFF" | "NO" | "DISABLED" | "FALSE" => Ok(false),
        "1" | "ON" | "YES" | "ENABLED" | "TRUE" => Ok(true),
        _ => Err(ConfigError::NotABool {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_ranged(name: &str, value: &str, min: u64, max: u64) -> Result<u64, ConfigError> {
    let n: u64 = value.parse().map_err(|_| ConfigError::NotANumber {
        name: name.to_string(),
        value: value.to_string(),
    })?;
    if !(min..=max).contains(&n) {
        return Err(ConfigError::OutOfRange {
            name: name.to_string(),
            min,
            max,
            value: n,
        });
    }
    Ok(n)
}

fn parse_allowed(name: &str, value: &str, allowed: &[&str]) -> Result<String, ConfigError> {
    if allowed.contains(&value) {
        Ok(value.to_string())
    } else {
        Err(ConfigError::NotAllowed {
            name: name.to_string(),
            allowed: allowed.join(", "),
            value: value.to_string(),
        })
    }
}

fn parse_window_size(value: &str) -> Result<String, ConfigError> {
    if value.is_empty() {
        return Ok(String::new());
    }
    let valid = value
        .split_once('x')
        .is_some_and(|(w, h)| w.parse::<u32>().is_ok() && h.parse::<u32>().is_ok());
    if valid {
        Ok(value.to_string())
    } else {
        Err(ConfigError::Invalid {
            name: "window_size".to_string(),
            value: value.to_string(),
        })
    }
}

impl Settings {
    /// Load settings, falling back to defaults when the file is missing
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Config loaded");
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Set a named setting from user text, returning a confirmation message
    pub fn set(&mut self, name: &str, value: &str) -> Result<String, ConfigError> {
        let value = value.trim();
        match name {
            "player" => {
                if value.is_empty() {
                    return Err(ConfigError::Invalid {
                        name: name.to_string(),
                        value: "<nothing>".to_string(),
                    });
                }
                self.player = value.to_string();
            }
            "player_args" => self.player_args = value.to_string(),
            "show_video" => self.show_video = parse_bool(name, value)?,
            "fullscreen" => self.fullscreen = parse_bool(name, value)?,
            "window_size" => self.window_size = parse_window_size(value)?,
            "window_pos" => {
                self.window_pos = if value.is_empty() {
                    String::new()
                } else {
                    parse_allowed(name, value, WINDOW_POSITIONS)?
                }
            }
            "max_res" => self.max_res = parse_ranged(name, value, 192, 2160)? as u32,
            "max_retries" => self.max_retries = parse_ranged(name, value, 0, 10)? as u32,
            "retry_delay_ms" => self.retry_delay_ms = parse_ranged(name, value, 0, 60_000)?,
            "max_cached_streams" => {
                self.max_cached_streams = parse_ranged(name, value, 1, 100_000)? as usize
            }
            "max_results" => self.max_results = parse_ranged(name, value, 1, 50)? as u32,
            "order" => self.order = parse_allowed(name, value, ORDERS)?,
            "search_music" => self.search_music = parse_bool(name, value)?,
            "preload" => self.preload = parse_bool(name, value)?,
            "preload_delay_ms" => self.preload_delay_ms = parse_ranged(name, value, 0, 60_000)?,
            "show_status" => self.show_status = parse_bool(name, value)?,
            "console_width" => self.console_width = parse_ranged(name, value, 70, 880)? as u16,
            "notifier" => self.notifier = value.to_string(),
            "api_key" => self.api_key = value.to_string(),
            "log_dir" => self.log_dir = value.to_string(),
            other => return Err(ConfigError::UnknownSetting(other.to_string())),
        }
        let shown = if value.is_empty() { "None" } else { value };
        Ok(format!("{} set to {}", name, shown))
    }

    /// Name/value pairs for display
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("player", self.player.clone()),
            ("player_args", self.player_args.clone()),
            ("show_video", self.show_video.to_string()),
            ("fullscreen", self.fullscreen.to_string()),
            ("window_size", self.window_size.clone()),
            ("window_pos", self.window_pos.clone()),
            ("max_res", format!("{}p", self.max_res)),
            ("max_retries", self.max_retries.to_string()),
            ("retry_delay_ms", self.retry_delay_ms.to_string()),
            ("max_cached_streams", self.max_cached_streams.to_string()),
            ("max_results", self.max_results.to_string()),
            ("order", self.order.clone()),
            ("search_music", self.search_music.to_string()),
            ("preload", self.preload.to_string()),
            ("preload_delay_ms", self.preload_delay_ms.to_string()),
            ("show_status", self.show_status.to_string()),
            ("console_width", self.console_width.to_string()),
            ("notifier", self.notifier.clone()),
            ("api_key", if self.api_key.is_empty() { String::new() } else { "<set>".to_string() }),
            ("log_dir", self.log_dir.clone()),
        ]
    }
}
