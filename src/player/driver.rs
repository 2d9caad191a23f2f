//! Runs the external player for one track, retrying with lower quality on failure

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::{Mutex, RwLock};

use crate::config::Settings;
use crate::error::{JukeboxError, Result};
use crate::model::{PlayOverride, PlaybackState, StreamCache, StreamVariant, Track};
use crate::providers::StreamProvider;
use crate::view::StatusSink;
use super::args::{
    ControlEndpoint, PlayMode, PlayerCapabilities, PlayerKind, build_args, locate_player,
};
use super::input_conf::{SUCCESS_CODES, write_mapping};
use super::preload::PreloadRegistry;
use super::selector::{Selection, select};
use super::status::{
    ControlOnly, MonitorContext, MonitorExit, StatusSource, TextStatus, TimeFormat,
    wait_for_control,
};

/// Height cap for the video stream used when no audio-only stream exists
const AUDIO_FALLBACK_MAX_HEIGHT: u32 = 1600;
/// Time the monitor gets to read buffered output after the player exits
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);
/// Time the player gets to honour a quit command before it is killed
const QUIT_GRACE: Duration = Duration::from_secs(2);
const SOCKET_FILE: &str = "mpv.sock";
const FIFO_FILE: &str = "control.fifo";
const INPUT_CONF_FILE: &str = "input.conf";

/// How a play ended, when it counts as a success
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayOutcome {
    /// The player exited with a whitelisted code, including its own quit key
    Finished(i32),
    Skipped,
    /// Interrupted because playback was stopped
    Stopped,
}

enum Event {
    Exited(std::io::Result<ExitStatus>),
    Monitor(MonitorExit),
}

pub struct PlayerDriver {
    settings: Arc<RwLock<Settings>>,
    state: Arc<PlaybackState>,
    cache: StreamCache,
    streams: Arc<dyn StreamProvider>,
    preloading: PreloadRegistry,
    sink: Arc<dyn StatusSink>,
    config_dir: PathBuf,
    capabilities: Mutex<Option<(PathBuf, PlayerCapabilities)>>,
}

impl PlayerDriver {
    pub fn new(
        settings: Arc<RwLock<Settings>>,
        state: Arc<PlaybackState>,
        cache: StreamCache,
        streams: Arc<dyn StreamProvider>,
        preloading: PreloadRegistry,
        sink: Arc<dyn StatusSink>,
        config_dir: PathBuf,
    ) -> Self {
        Self {
            settings,
            state,
            cache,
            streams,
            preloading,
            sink,
            config_dir,
            capabilities: Mutex::new(None),
        }
    }

    /// Play `track` to completion. Each failed attempt retries with the
    /// next quality rank, up to `max_retries` extra attempts.
    pub async fn play(&self, track: &Track, play_override: PlayOverride) -> Result<PlayOutcome> {
        let settings = self.settings.read().await.clone();
        let player = locate_player(&settings.player).ok_or_else(|| JukeboxError::PlayerLaunch {
            player: settings.player.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "not found in working directory or PATH",
            ),
        })?;
        let caps = self.capabilities_for(&player).await;
        spawn_notifier(&settings.notifier, &track.title);

        tracing::info!(media_id = %track.id, title = %track.title, "Playing track");
        let mut attempt = 0;
        let result = loop {
            match self
                .attempt(track, play_override, attempt, &settings, &player, &caps)
                .await
            {
                Err(e) if e.is_retryable() && attempt < settings.max_retries => {
                    tracing::warn!(
                        media_id = %track.id,
                        attempt,
                        error = %e,
                        "Play attempt failed, retrying with next quality"
                    );
                    tokio::time::sleep(Duration::from_millis(settings.retry_delay_ms)).await;
                    if let Some(signal) = self.state.control_signal().await {
                        break Ok(match MonitorExit::from(signal) {
                            MonitorExit::Stop => PlayOutcome::Stopped,
                            _ => PlayOutcome::Skipped,
                        });
                    }
                    attempt += 1;
                }
                other => break other,
            }
        };

        self.state.reset_progress().await;
        if let Err(e) = &result {
            tracing::error!(media_id = %track.id, error = %e, "Giving up on track");
        }
        result
    }

    async fn capabilities_for(&self, player: &Path) -> PlayerCapabilities {
        let mut cached = self.capabilities.lock().await;
        if let Some((path, caps)) = cached.as_ref() {
            if path == player {
                return caps.clone();
            }
        }
        let caps = PlayerCapabilities::detect(&player.to_string_lossy()).await;
        *cached = Some((player.to_path_buf(), caps.clone()));
        caps
    }

    async fn attempt(
        &self,
        track: &Track,
        play_override: PlayOverride,
        attempt: u32,
        settings: &Settings,
        player: &Path,
        caps: &PlayerCapabilities,
    ) -> Result<PlayOutcome> {
        self.preloading.wait_until_clear(&track.id).await;
        let entry = self
            .cache
            .resolve(self.streams.as_ref(), &track.id, attempt > 0)
            .await?;

        let (variant, mode) = choose_variant(&entry, attempt as usize, settings, caps, play_override)
            .ok_or_else(|| JukeboxError::NoStreamAvailable {
                media_id: track.id.clone(),
            })?;
        let size = self.probe_size(&track.id, &variant).await;

        // Removed with everything in it when this attempt returns or unwinds.
        let session = tempfile::Builder::new().prefix("jukebox-").tempdir()?;
        let input_conf = session.path().join(INPUT_CONF_FILE);
        write_mapping(caps.kind, &self.config_dir, &input_conf)?;
        let control = control_endpoint(caps, session.path())?;

        let args = build_args(settings, caps, track, &variant, &mode, &input_conf, &control);
        tracing::debug!(player = %player.display(), ?args, attempt, "Launching player");

        let scrape = match (caps.uses_socket(), caps.kind) {
            (false, PlayerKind::Mpv) => Some(TimeFormat::Clock),
            (false, PlayerKind::MPlayer) => Some(TimeFormat::Seconds),
            _ => None,
        };
        let mut command = Command::new(player);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        match scrape {
            Some(TimeFormat::Seconds) => {
                command.stdout(Stdio::piped());
            }
            Some(TimeFormat::Clock) => {
                command.stderr(Stdio::piped());
            }
            None => {}
        }
        let mut child = command.spawn().map_err(|source| JukeboxError::PlayerLaunch {
            player: settings.player.clone(),
            source,
        })?;

        let source = status_source(&mut child, scrape, &control);
        let ctx = MonitorContext {
            state: self.state.clone(),
            sink: self.sink.clone(),
            prefix: status_prefix(&track.id, &variant, size),
            duration_seconds: track.duration_seconds,
            show_status: settings.show_status,
            fallback_width: settings.console_width as usize,
        };
        let outcome = self.supervise(&mut child, source, &ctx, &control, attempt).await;
        if settings.show_status {
            self.sink.finish();
        }
        outcome
    }

    /// Race the monitor against process exit and classify the result
    async fn supervise(
        &self,
        child: &mut Child,
        source: Box<dyn StatusSource>,
        ctx: &MonitorContext,
        control: &ControlEndpoint,
        attempt: u32,
    ) -> Result<PlayOutcome> {
        let monitor = source.run(ctx);
        tokio::pin!(monitor);

        let event = tokio::select! {
            status = child.wait() => Event::Exited(status),
            exit = &mut monitor => Event::Monitor(exit),
        };

        let status = match event {
            Event::Exited(status) => {
                let _ = tokio::time::timeout(DRAIN_TIMEOUT, &mut monitor).await;
                status?
            }
            Event::Monitor(MonitorExit::Finished) => {
                let event = tokio::select! {
                    status = child.wait() => Event::Exited(status),
                    exit = wait_for_control(&self.state) => Event::Monitor(exit),
                };
                match event {
                    Event::Exited(status) => status?,
                    Event::Monitor(exit) => return Ok(interrupt(child, control, exit).await),
                }
            }
            Event::Monitor(exit) => return Ok(interrupt(child, control, exit).await),
        };

        match status.code() {
            Some(code) if SUCCESS_CODES.contains(&code) => Ok(PlayOutcome::Finished(code)),
            code => Err(JukeboxError::ProcessExitFailure {
                code,
                attempts: attempt + 1,
            }),
        }
    }

    /// Size of `variant`, probing and caching it when unknown
    async fn probe_size(&self, media_id: &str, variant: &StreamVariant) -> Option<u64> {
        if variant.size_bytes.is_some() {
            return variant.size_bytes;
        }
        match self.streams.content_length(&variant.url).await {
            Ok(size) => {
                self.cache.record_size(media_id, &variant.url, size).await;
                Some(size)
            }
            Err(e) => {
                tracing::debug!(media_id, error = %e, "Size probe failed");
                None
            }
        }
    }
}

/// Pick the stream for attempt `rank`, falling back to a video stream with
/// its picture suppressed when no audio-only stream exists.
fn choose_variant(
    entry: &crate::model::CacheEntry,
    rank: usize,
    settings: &Settings,
    caps: &PlayerCapabilities,
    play_override: PlayOverride,
) -> Option<(StreamVariant, PlayMode)> {
    let mut mode = PlayMode::new(settings.show_video, play_override);
    if mode.video {
        let variant = select(entry, &Selection::video(rank, settings.max_res))?;
        return Some((variant.clone(), mode));
    }
    let excluded = caps.kind.flags().and_then(|f| f.excluded_audio);
    if let Some(variant) = select(entry, &Selection::audio(rank, excluded)) {
        return Some((variant.clone(), mode));
    }
    let variant = select(entry, &Selection::video(rank, AUDIO_FALLBACK_MAX_HEIGHT))?;
    tracing::debug!(media_id = %entry.media_id, "No audio stream, using video without picture");
    mode.video = true;
    mode.audio_from_video = true;
    Some((variant.clone(), mode))
}

fn status_prefix(media_id: &str, variant: &StreamVariant, size: Option<u64>) -> String {
    let size = size
        .map(|bytes| format!("{:.1}", bytes as f64 / 1024.0 / 1024.0))
        .unwrap_or_else(|| "?".to_string());
    format!("{}; {} {}; {} Mb; ", media_id, variant.container, variant.quality, size)
}

fn control_endpoint(caps: &PlayerCapabilities, session: &Path) -> std::io::Result<ControlEndpoint> {
    if caps.uses_socket() {
        return Ok(ControlEndpoint::Socket(session.join(SOCKET_FILE)));
    }
    if caps.kind.flags().is_none() {
        return Ok(ControlEndpoint::None);
    }
    #[cfg(unix)]
    {
        let fifo = session.join(FIFO_FILE);
        make_fifo(&fifo)?;
        Ok(ControlEndpoint::Fifo(fifo))
    }
    #[cfg(not(unix))]
    {
        Ok(ControlEndpoint::None)
    }
}

#[cfg(unix)]
fn make_fifo(path: &Path) -> std::io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())?;
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
    if unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

fn status_source(
    child: &mut Child,
    scrape: Option<TimeFormat>,
    control: &ControlEndpoint,
) -> Box<dyn StatusSource> {
    #[cfg(unix)]
    if let ControlEndpoint::Socket(path) = control {
        return Box::new(super::status::SocketStatus::new(path.clone()));
    }
    #[cfg(not(unix))]
    let _ = control;

    let reader: Option<Box<dyn tokio::io::AsyncRead + Unpin + Send>> = match scrape {
        Some(TimeFormat::Seconds) => child
            .stdout
            .take()
            .map(|r| Box::new(r) as Box<dyn tokio::io::AsyncRead + Unpin + Send>),
        Some(TimeFormat::Clock) => child
            .stderr
            .take()
            .map(|r| Box::new(r) as Box<dyn tokio::io::AsyncRead + Unpin + Send>),
        None => None,
    };
    match (reader, scrape) {
        (Some(reader), Some(format)) => Box::new(TextStatus::new(reader, format)),
        _ => Box::new(ControlOnly),
    }
}

/// Ask the player to quit over its control channel, then kill it if it lingers
async fn interrupt(child: &mut Child, control: &ControlEndpoint, exit: MonitorExit) -> PlayOutcome {
    let (command, outcome) = match exit {
        MonitorExit::Stop => ("quit 43", PlayOutcome::Stopped),
        _ => ("quit", PlayOutcome::Skipped),
    };
    if let Err(e) = send_control(control, command).await {
        tracing::debug!(error = %e, "Control channel unavailable");
    }
    match tokio::time::timeout(QUIT_GRACE, child.wait()).await {
        Ok(Ok(status)) => tracing::debug!(?status, "Player quit on request"),
        _ => {
            tracing::debug!("Player did not quit, killing it");
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "Failed to kill player");
            }
        }
    }
    outcome
}

async fn send_control(control: &ControlEndpoint, command: &str) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    match control {
        ControlEndpoint::None => Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "player has no control channel",
        )),
        #[cfg(unix)]
        ControlEndpoint::Socket(path) => {
            let mut stream = tokio::net::UnixStream::connect(path).await?;
            let words: Vec<&str> = command.split_whitespace().collect();
            let message = serde_json::json!({ "command": words }).to_string();
            stream.write_all(message.as_bytes()).await?;
            stream.write_all(b"\n").await
        }
        #[cfg(unix)]
        ControlEndpoint::Fifo(path) => {
            let mut sender = tokio::net::unix::pipe::OpenOptions::new().open_sender(path)?;
            sender.write_all(format!("{}\n", command).as_bytes()).await
        }
        #[cfg(not(unix))]
        _ => Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "control channels need unix",
        )),
    }
}

/// Run the notifier command with the track title, without waiting on it
fn spawn_notifier(notifier: &str, title: &str) {
    let mut parts = notifier.split_whitespace();
    let Some(program) = parts.next() else {
        return;
    };
    let spawned = Command::new(program)
        .args(parts)
        .arg(title)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    match spawned {
        Ok(mut child) => {
            tokio::spawn(async move {
                let _ = child.wait().await;
            });
        }
        Err(e) => tracing::warn!(notifier = program, error = %e, "Failed to run notifier"),
    }
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::model::MediaKind;
    use crate::providers::ResolvedStreams;
    use crate::view::MemorySink;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) struct StubStreams;

    #[async_trait]
    impl StreamProvider for StubStreams {
        async fn resolve(&self, _media_id: &str) -> std::result::Result<ResolvedStreams, ProviderError> {
            Ok(ResolvedStreams {
                variants: vec![
                    StreamVariant {
                        url: "https://media.example/best".into(),
                        container: "webm".into(),
                        quality: "160k".into(),
                        kind: MediaKind::Audio,
                        size_bytes: Some(3_145_728),
                    },
                    StreamVariant {
                        url: "https://media.example/worse".into(),
                        container: "webm".into(),
                        quality: "70k".into(),
                        kind: MediaKind::Audio,
                        size_bytes: Some(1_048_576),
                    },
                ],
                expiry: Utc::now() + chrono::Duration::hours(1),
            })
        }
    }

    /// Write an executable `mplayer` shell script into `dir`
    pub(crate) fn stub_player(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("mplayer");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    pub(crate) fn test_settings(player: &Path) -> Settings {
        Settings {
            player: player.to_string_lossy().into_owned(),
            max_retries: 2,
            retry_delay_ms: 0,
            preload: false,
            ..Settings::default()
        }
    }

    /// Counts resolutions, answering like `StubStreams`
    #[derive(Default)]
    struct CountingStreams {
        resolves: AtomicUsize,
    }

    #[async_trait]
    impl StreamProvider for CountingStreams {
        async fn resolve(&self, media_id: &str) -> std::result::Result<ResolvedStreams, ProviderError> {
            self.resolves.fetch_add(1, Ordering::SeqCst);
            StubStreams.resolve(media_id).await
        }
    }

    fn driver_with(
        settings: Settings,
        streams: Arc<dyn StreamProvider>,
        registry: PreloadRegistry,
        config_dir: &Path,
    ) -> (PlayerDriver, Arc<PlaybackState>) {
        let state = Arc::new(PlaybackState::new());
        let driver = PlayerDriver::new(
            Arc::new(RwLock::new(settings)),
            state.clone(),
            StreamCache::new(10),
            streams,
            registry,
            Arc::new(MemorySink::default()),
            config_dir.to_path_buf(),
        );
        (driver, state)
    }

    fn driver(settings: Settings, sink: Arc<MemorySink>, config_dir: &Path) -> (PlayerDriver, Arc<PlaybackState>) {
        let state = Arc::new(PlaybackState::new());
        let driver = PlayerDriver::new(
            Arc::new(RwLock::new(settings)),
            state.clone(),
            StreamCache::new(10),
            Arc::new(StubStreams),
            PreloadRegistry::default(),
            sink,
            config_dir.to_path_buf(),
        );
        (driver, state)
    }

    #[tokio::test]
    async fn retries_exactly_up_to_the_bound() {
        let dir = tempfile::tempdir().unwrap();
        let count = dir.path().join("count");
        let player = stub_player(dir.path(), &format!("echo run >> '{}'\nexit 3", count.display()));
        let (driver, state) = driver(test_settings(&player), Arc::new(MemorySink::default()), dir.path());
        state.set_playing(true).await;

        let result = driver.play(&Track::new("abc", "Song", 200), PlayOverride::None).await;
        assert!(matches!(
            result,
            Err(JukeboxError::ProcessExitFailure { code: Some(3), attempts: 3 })
        ));
        let runs = std::fs::read_to_string(&count).unwrap();
        assert_eq!(runs.lines().count(), 3);
    }

    #[tokio::test]
    async fn retries_refresh_streams_and_step_down_quality() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("args");
        let player = stub_player(dir.path(), &format!("echo \"$@\" >> '{}'\nexit 3", log.display()));
        let streams = Arc::new(CountingStreams::default());
        let (driver, state) = driver_with(
            test_settings(&player),
            streams.clone(),
            PreloadRegistry::default(),
            dir.path(),
        );
        state.set_playing(true).await;

        let result = driver.play(&Track::new("abc", "Song", 200), PlayOverride::None).await;
        assert!(matches!(result, Err(JukeboxError::ProcessExitFailure { attempts: 3, .. })));

        // One resolution per attempt: every retry bypasses the cache.
        assert_eq!(streams.resolves.load(Ordering::SeqCst), 3);
        let runs = std::fs::read_to_string(&log).unwrap();
        let urls: Vec<&str> = runs
            .lines()
            .map(|l| {
                l.split_whitespace()
                    .find(|a| a.starts_with("https://"))
                    .unwrap()
            })
            .collect();
        // Rank 2 is past the two variants and falls back to the best.
        assert_eq!(
            urls,
            ["https://media.example/best", "https://media.example/worse", "https://media.example/best"]
        );
    }

    #[tokio::test]
    async fn play_waits_for_preload_of_the_same_track_only() {
        let dir = tempfile::tempdir().unwrap();
        let ran = dir.path().join("ran");
        let player = stub_player(dir.path(), &format!("touch '{}'\nexit 0", ran.display()));
        let registry = PreloadRegistry::default();
        let (driver, state) = driver_with(
            test_settings(&player),
            Arc::new(StubStreams),
            registry.clone(),
            dir.path(),
        );
        state.set_playing(true).await;

        let _other = registry.register("other").unwrap();
        let guard = registry.register("abc").unwrap();
        let track = Track::new("abc", "Song", 200);
        let play = driver.play(&track, PlayOverride::None);
        tokio::pin!(play);

        assert!(tokio::time::timeout(Duration::from_millis(400), &mut play).await.is_err());
        assert!(!ran.exists());

        drop(guard);
        let outcome = tokio::time::timeout(Duration::from_secs(5), &mut play)
            .await
            .expect("play resumed once the preload cleared")
            .unwrap();
        assert_eq!(outcome, PlayOutcome::Finished(0));
        assert!(ran.exists());
    }

    #[tokio::test]
    async fn text_status_reaches_shared_state() {
        let dir = tempfile::tempdir().unwrap();
        let player = stub_player(dir.path(), "echo 'A: 65.3'\nsleep 0.2\nexit 0");
        let sink = Arc::new(MemorySink::default());
        let (driver, state) = driver(test_settings(&player), sink.clone(), dir.path());
        state.set_playing(true).await;

        let track = Track::new("abc", "Song", 200);
        let outcome = driver.play(&track, PlayOverride::None).await.unwrap();
        assert_eq!(outcome, PlayOutcome::Finished(0));

        let line = sink.lines().pop().unwrap();
        assert!(line.starts_with("abc; webm 160k; 3.0 Mb; 00:01:05 [3"));
        // Progress is reset once the play returns.
        assert_eq!(state.snapshot().await.elapsed_seconds, 0);
    }

    #[tokio::test]
    async fn skip_interrupts_running_player() {
        let dir = tempfile::tempdir().unwrap();
        let player = stub_player(dir.path(), "while true; do echo 'A: 1.0'; sleep 0.1; done");
        let (driver, state) = driver(test_settings(&player), Arc::new(MemorySink::default()), dir.path());
        state.set_playing(true).await;

        let skipper = {
            let state = state.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                state.request_skip().await;
            })
        };
        let started = std::time::Instant::now();
        let outcome = driver.play(&Track::new("abc", "Song", 200), PlayOverride::None).await.unwrap();
        skipper.await.unwrap();
        assert_eq!(outcome, PlayOutcome::Skipped);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn missing_player_is_a_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(&dir.path().join("mplayer"));
        let (driver, _) = driver(settings, Arc::new(MemorySink::default()), dir.path());
        let result = driver.play(&Track::new("abc", "Song", 200), PlayOverride::None).await;
        assert!(matches!(result, Err(JukeboxError::PlayerLaunch { .. })));
    }

    #[test]
    fn audio_falls_back_to_muted_video() {
        let entry = crate::model::CacheEntry {
            media_id: "abc".into(),
            variants: vec![StreamVariant {
                url: "v".into(),
                container: "mp4".into(),
                quality: "1280x720".into(),
                kind: MediaKind::Video,
                size_bytes: None,
            }],
            expiry: Utc::now(),
            fresh: true,
        };
        let caps = PlayerCapabilities::for_version(PlayerKind::MPlayer, None);
        let (variant, mode) =
            choose_variant(&entry, 0, &Settings::default(), &caps, PlayOverride::None).unwrap();
        assert_eq!(variant.url, "v");
        assert!(mode.audio_from_video);
    }
}
