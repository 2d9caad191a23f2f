//! Live progress from a running player
//!
//! Two sources share one trait: the mpv JSON IPC socket, and scraping the
//! player's text output. Both push elapsed time and volume into the shared
//! [`PlaybackState`] and stop when the stream ends or a stop/skip is raised.

use std::sync::{Arc, LazyLock};
#[cfg(unix)]
use std::path::PathBuf;
#[cfg(unix)]
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

use crate::model::{ControlSignal, PlaybackState};
use crate::view::{StatusSink, make_status_line};

static MPLAYER_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^A:\s*(?P<secs>\d+)\.\d\s*").expect("valid regex"));
static MPV_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.{0,15}AV?:\s*(?P<h>\d\d):(?P<m>\d\d):(?P<s>\d\d)").expect("valid regex")
});
static VOLUME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Volume:\s*(?P<volume>\d+)\s*%").expect("valid regex"));
static ANS_VOLUME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ANS_volume=(?P<volume>\d+)").expect("valid regex"));
static PAUSED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(Paused\)|=+\s*PAUSE\s*=+").expect("valid regex"));

/// Why a monitor stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonitorExit {
    /// Output ended; the process is exiting on its own
    Finished,
    Skip,
    Stop,
}

impl From<ControlSignal> for MonitorExit {
    fn from(signal: ControlSignal) -> Self {
        match signal {
            ControlSignal::Skip => MonitorExit::Skip,
            ControlSignal::Stop => MonitorExit::Stop,
        }
    }
}

/// Everything a monitor needs to report progress for one play
pub struct MonitorContext {
    pub state: Arc<PlaybackState>,
    pub sink: Arc<dyn StatusSink>,
    /// `"<id>; <container> <quality>; <size> Mb; "`
    pub prefix: String,
    pub duration_seconds: u64,
    pub show_status: bool,
    pub fallback_width: usize,
}

impl MonitorContext {
    /// Record a new elapsed time and emit the status line if it changed
    async fn on_time(&self, elapsed_seconds: u64, last_line: &mut String) {
        self.state
            .update_elapsed(elapsed_seconds, self.duration_seconds)
            .await;
        if !self.show_status {
            return;
        }
        let volume = self.state.volume().await;
        let width = self.sink.width(self.fallback_width);
        let line = make_status_line(
            elapsed_seconds,
            &self.prefix,
            self.duration_seconds,
            volume,
            width,
        );
        if line != *last_line {
            self.sink.emit(&line);
            *last_line = line;
        }
    }
}

#[async_trait]
pub trait StatusSource: Send {
    async fn run(self: Box<Self>, ctx: &MonitorContext) -> MonitorExit;
}

/// Wait until a stop or skip is requested
pub async fn wait_for_control(state: &PlaybackState) -> MonitorExit {
    loop {
        if let Some(signal) = state.control_signal().await {
            return signal.into();
        }
        state.control_changed().await;
    }
}

/// For players with no readable progress: only reacts to stop/skip
pub struct ControlOnly;

#[async_trait]
impl StatusSource for ControlOnly {
    async fn run(self: Box<Self>, ctx: &MonitorContext) -> MonitorExit {
        wait_for_control(&ctx.state).await
    }
}

/// Which elapsed-time format the player prints
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeFormat {
    /// mplayer: `A: 65.3`
    Seconds,
    /// mpv: `AV: 00:01:05`
    Clock,
}

/// What one output line told us
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LineUpdate {
    pub elapsed_seconds: Option<u64>,
    pub volume: Option<u32>,
    /// Set when the line shows the pause marker, or cleared by a running clock
    pub paused: Option<bool>,
}

pub fn parse_status_line(line: &str, format: TimeFormat) -> LineUpdate {
    let elapsed_seconds = match format {
        TimeFormat::Seconds => MPLAYER_TIME
            .captures(line)
            .and_then(|c| c["secs"].parse().ok()),
        TimeFormat::Clock => MPV_TIME.captures(line).and_then(|c| {
            let n = |k: &str| c[k].parse::<u64>().ok();
            Some(n("h")? * 3600 + n("m")? * 60 + n("s")?)
        }),
    };
    let volume = VOLUME
        .captures(line)
        .or_else(|| ANS_VOLUME.captures(line))
        .and_then(|c| c["volume"].parse().ok());
    let paused = if PAUSED.is_match(line) {
        Some(true)
    } else {
        elapsed_seconds.map(|_| false)
    };
    LineUpdate {
        elapsed_seconds,
        volume,
        paused,
    }
}

/// Scrapes progress from the player's stdout/stderr, one byte at a time
pub struct TextStatus {
    reader: Box<dyn AsyncRead + Unpin + Send>,
    format: TimeFormat,
}

impl TextStatus {
    pub fn new(reader: Box<dyn AsyncRead + Unpin + Send>, format: TimeFormat) -> Self {
        Self { reader, format }
    }
}

#[async_trait]
impl StatusSource for TextStatus {
    async fn run(self: Box<Self>, ctx: &MonitorContext) -> MonitorExit {
        let mut reader = BufReader::new(self.reader);
        let mut buf: Vec<u8> = Vec::new();
        let mut last_line = String::new();
        let mut last_elapsed = None;

        loop {
            let byte = match reader.read_u8().await {
                Ok(b) => b,
                // EOF: the player closed its output
                Err(_) => return MonitorExit::Finished,
            };
            if byte != b'\r' && byte != b'\n' {
                buf.push(byte);
                continue;
            }

            let line = String::from_utf8_lossy(&buf).into_owned();
            buf.clear();
            let update = parse_status_line(&line, self.format);
            if let Some(volume) = update.volume {
                ctx.state.set_volume(volume).await;
            }
            if let Some(paused) = update.paused {
                ctx.state.set_paused(paused).await;
            }
            last_elapsed = update.elapsed_seconds.or(last_elapsed);
            if let Some(elapsed) = last_elapsed.filter(|_| update != LineUpdate::default()) {
                ctx.on_time(elapsed, &mut last_line).await;
            }

            // Checked per line, not per byte.
            if let Some(signal) = ctx.state.control_signal().await {
                tracing::debug!(?signal, "Text monitor observed control request");
                return signal.into();
            }
        }
    }
}

#[cfg(unix)]
pub use socket::SocketStatus;

#[cfg(unix)]
mod socket {
    use super::*;
    use serde::Deserialize;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
    use tokio::net::UnixStream;

    const CONNECT_ATTEMPTS: u32 = 10;
    const CONNECT_BACKOFF: Duration = Duration::from_millis(500);

    pub(crate) const OBSERVE_TIME: &str = r#"{"command":["observe_property",1,"time-pos"]}"#;
    pub(crate) const OBSERVE_VOLUME: &str = r#"{"command":["observe_property",2,"volume"]}"#;
    pub(crate) const OBSERVE_PAUSE: &str = r#"{"command":["observe_property",3,"pause"]}"#;

    #[derive(Deserialize)]
    struct IpcEvent {
        event: Option<String>,
        name: Option<String>,
        data: Option<serde_json::Value>,
    }

    /// mpv JSON IPC over a unix socket
    pub struct SocketStatus {
        path: PathBuf,
    }

    impl SocketStatus {
        pub fn new(path: PathBuf) -> Self {
            Self { path }
        }

        async fn connect(&self) -> Option<UnixStream> {
            for attempt in 1..=CONNECT_ATTEMPTS {
                match UnixStream::connect(&self.path).await {
                    Ok(stream) => return Some(stream),
                    Err(e) => {
                        tracing::trace!(attempt, error = %e, "Player socket not ready");
                        tokio::time::sleep(CONNECT_BACKOFF).await;
                    }
                }
            }
            tracing::warn!(path = %self.path.display(), "Gave up connecting to player socket");
            None
        }
    }

    #[async_trait]
    impl StatusSource for SocketStatus {
        async fn run(self: Box<Self>, ctx: &MonitorContext) -> MonitorExit {
            let Some(stream) = self.connect().await else {
                // No progress available; still honour stop/skip.
                return wait_for_control(&ctx.state).await;
            };
            let (read, mut write) = stream.into_split();
            let mut lines = tokio::io::BufReader::new(read).lines();
            let mut last_line = String::new();
            let mut last_elapsed = None;

            if let Err(e) = send_command(&mut write, OBSERVE_TIME).await {
                tracing::debug!(error = %e, "Failed to subscribe to time-pos");
                return wait_for_control(&ctx.state).await;
            }
            // Some mpv versions drop a combined subscription, so volume
            // is requested after the first event arrives.
            let mut volume_observed = false;

            loop {
                tokio::select! {
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            let Ok(event) = serde_json::from_str::<IpcEvent>(&line) else {
                                continue;
                            };
                            if event.event.as_deref() != Some("property-change") {
                                continue;
                            }
                            if !volume_observed {
                                volume_observed = true;
                                for command in [OBSERVE_VOLUME, OBSERVE_PAUSE] {
                                    if let Err(e) = send_command(&mut write, command).await {
                                        tracing::debug!(error = %e, command, "Failed to subscribe");
                                    }
                                }
                            }
                            if event.name.as_deref() == Some("pause") {
                                if let Some(paused) = event.data.as_ref().and_then(|d| d.as_bool()) {
                                    ctx.state.set_paused(paused).await;
                                }
                                continue;
                            }
                            let value = event.data.as_ref().and_then(|d| d.as_f64());
                            match (event.name.as_deref(), value) {
                                (Some("time-pos"), Some(secs)) => {
                                    let elapsed = secs.max(0.0) as u64;
                                    last_elapsed = Some(elapsed);
                                    ctx.on_time(elapsed, &mut last_line).await;
                                }
                                (Some("volume"), Some(vol)) => {
                                    ctx.state.set_volume(vol.round().max(0.0) as u32).await;
                                    // Redraw with the new volume before the next tick.
                                    if let Some(elapsed) = last_elapsed {
                                        ctx.on_time(elapsed, &mut last_line).await;
                                    }
                                }
                                _ => {}
                            }
                        }
                        _ => return MonitorExit::Finished,
                    },
                    _ = ctx.state.control_changed() => {}
                }

                if let Some(signal) = ctx.state.control_signal().await {
                    tracing::debug!(?signal, "Socket monitor observed control request");
                    return signal.into();
                }
            }
        }
    }

    async fn send_command(
        write: &mut tokio::net::unix::OwnedWriteHalf,
        command: &str,
    ) -> std::io::Result<()> {
        write.write_all(command.as_bytes()).await?;
        write.write_all(b"\n").await
    }
}
