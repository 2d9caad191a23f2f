mod config;
mod controller;
mod error;
mod logging;
mod model;
mod player;
mod providers;
mod view;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::RwLock;

use config::Settings;
use controller::Jukebox;
use model::StreamCache;
use providers::{youtube::YouTubeSearch, ytdlp::YtDlpStreams};
use view::TerminalSink;

/// Terminal jukebox: search, queue and play tracks through mpv or mplayer
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Config file to load and save settings in
    #[arg(long)]
    config: Option<PathBuf>,

    /// Player binary for this session, overriding the saved setting
    #[arg(long)]
    player: Option<String>,

    /// Disable preloading of upcoming tracks for this session
    #[arg(long)]
    no_preload: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(config::default_config_path);
    let config_dir = config_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(config::config_dir);

    let mut settings = match Settings::load(&config_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Warning: Failed to load {}: {}", config_path.display(), e);
            Settings::default()
        }
    };

    if let Err(e) = logging::init_logging(&PathBuf::from(&settings.log_dir)) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }
    tracing::info!("=== jukebox-rs starting ===");

    if let Some(player) = args.player {
        settings.player = player;
    }
    if args.no_preload {
        settings.preload = false;
    }
    if settings.api_key.is_empty() {
        println!("No search api_key configured; use 'set api_key KEY'");
    }

    let cache = StreamCache::new(settings.max_cached_streams);
    let cache_path = config::stream_cache_path(&config_dir);
    if let Err(e) = cache.load_from_disk(&cache_path).await {
        tracing::warn!(error = %e, path = %cache_path.display(), "Ignoring unreadable stream cache");
    }

    let settings = Arc::new(RwLock::new(settings));
    let jukebox = Jukebox::new(
        settings.clone(),
        cache.clone(),
        Arc::new(YouTubeSearch::new(settings)),
        Arc::new(YtDlpStreams::new()),
        Arc::new(TerminalSink),
        config_dir,
    );

    let res = controller::run_command_loop(&jukebox, &config_path).await;

    if let Err(e) = cache.save_to_disk(&cache_path).await {
        tracing::warn!(error = %e, "Failed to save stream cache");
    }
    if let Err(err) = &res {
        tracing::error!(error = ?err, "Application error");
    }

    tracing::info!("jukebox-rs shutting down");
    res
}
