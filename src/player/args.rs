//! Player identity, capability detection and command-line construction

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tokio::process::Command;

use crate::config::Settings;
use crate::model::{PlayOverride, StreamVariant, Track};

static MPV_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"mpv v?(\d+)\.(\d+)\.(\d+)").expect("valid version regex"));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerKind {
    Mpv,
    MPlayer,
    Generic,
}

/// Flag names for one known player
#[derive(Debug)]
pub struct PlayerFlags {
    pub title: &'static str,
    pub fullscreen: &'static str,
    pub no_video: &'static str,
    pub ignore_index: Option<&'static str>,
    pub geometry: &'static str,
    pub input_conf: &'static str,
    pub input_file: &'static str,
    /// Flags the player must not be given
    pub remove: &'static [&'static str],
    /// Flags always added, unless the player talks over a control socket
    pub add: &'static [&'static str],
    pub quiet: &'static str,
    /// Audio container this player cannot handle
    pub excluded_audio: Option<&'static str>,
}

const MPV_FLAGS: PlayerFlags = PlayerFlags {
    title: "--title",
    fullscreen: "--fs",
    no_video: "--no-video",
    ignore_index: Some("--demuxer-lavf-o=fflags=+ignidx"),
    geometry: "--geometry",
    input_conf: "--input-conf=",
    input_file: "--input-file=",
    remove: &["--really-quiet"],
    add: &["--msg-level=all=no:statusline=status"],
    quiet: "--really-quiet",
    excluded_audio: None,
};

const MPLAYER_FLAGS: PlayerFlags = PlayerFlags {
    title: "-title",
    fullscreen: "-fs",
    no_video: "-novideo",
    ignore_index: None,
    geometry: "-geometry",
    input_conf: "-input conf=",
    input_file: "-input file=",
    remove: &["-really-quiet"],
    add: &["-noquiet", "-prefer-ipv4"],
    quiet: "-really-quiet",
    excluded_audio: Some("m4a"),
};

impl PlayerKind {
    pub fn from_path(player: &str) -> Self {
        let name = Path::new(player)
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.contains("mpv") {
            PlayerKind::Mpv
        } else if name.contains("mplayer") {
            PlayerKind::MPlayer
        } else {
            PlayerKind::Generic
        }
    }

    pub fn flags(self) -> Option<&'static PlayerFlags> {
        match self {
            PlayerKind::Mpv => Some(&MPV_FLAGS),
            PlayerKind::MPlayer => Some(&MPLAYER_FLAGS),
            PlayerKind::Generic => None,
        }
    }
}

/// How a running player can be controlled and observed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerCapabilities {
    pub kind: PlayerKind,
    pub version: Option<(u32, u32, u32)>,
    /// Flag prefix for a JSON IPC socket, when supported
    pub socket_flag: Option<&'static str>,
}

impl PlayerCapabilities {
    pub fn for_version(kind: PlayerKind, version: Option<(u32, u32, u32)>) -> Self {
        let socket_flag = match (kind, version) {
            (PlayerKind::Mpv, _) if !cfg!(unix) => None,
            // An undetected version is assumed to be current.
            (PlayerKind::Mpv, None) => Some("--input-ipc-server="),
            (PlayerKind::Mpv, Some(v)) if v >= (0, 17, 0) => Some("--input-ipc-server="),
            (PlayerKind::Mpv, Some(v)) if v >= (0, 7, 0) => Some("--input-unix-socket="),
            _ => None,
        };
        Self {
            kind,
            version,
            socket_flag,
        }
    }

    pub async fn detect(player: &str) -> Self {
        let kind = PlayerKind::from_path(player);
        let version = if kind == PlayerKind::Mpv {
            mpv_version(player).await
        } else {
            None
        };
        let caps = Self::for_version(kind, version);
        tracing::info!(player, kind = ?caps.kind, version = ?caps.version, socket = caps.socket_flag.is_some(), "Player capabilities detected");
        caps
    }

    pub fn uses_socket(&self) -> bool {
        self.socket_flag.is_some()
    }
}

async fn mpv_version(player: &str) -> Option<(u32, u32, u32)> {
    let output = Command::new(player).arg("--version").output().await.ok()?;
    let text = String::from_utf8_lossy(&output.stdout);
    let version = parse_mpv_version(&text);
    if version.is_none() {
        tracing::debug!(player, "Failed to detect mpv version");
    }
    version
}

pub fn parse_mpv_version(text: &str) -> Option<(u32, u32, u32)> {
    let caps = MPV_VERSION.captures(text)?;
    let n = |i: usize| caps[i].parse::<u32>().ok();
    Some((n(1)?, n(2)?, n(3)?))
}

/// Search the working directory and PATH for an executable player
pub fn locate_player(player: &str) -> Option<PathBuf> {
    let direct = Path::new(player);
    if direct.components().count() > 1 {
        return is_executable(direct).then(|| direct.to_path_buf());
    }
    let mut dirs: Vec<PathBuf> = std::env::current_dir().into_iter().collect();
    if let Some(path) = std::env::var_os("PATH") {
        dirs.extend(std::env::split_paths(&path));
    }
    dirs.into_iter()
        .map(|d| d.join(player))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Stream and display choices made for one play attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayMode {
    pub video: bool,
    /// Playing a video stream with its picture suppressed
    pub audio_from_video: bool,
    pub play_override: PlayOverride,
}

impl PlayMode {
    pub fn new(show_video: bool, play_override: PlayOverride) -> Self {
        let video = match play_override {
            PlayOverride::Fullscreen | PlayOverride::Window => true,
            PlayOverride::Audio => false,
            PlayOverride::None => show_video,
        };
        Self {
            video,
            audio_from_video: false,
            play_override,
        }
    }
}

/// Per-session control endpoint handed to the player
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlEndpoint {
    None,
    Socket(PathBuf),
    Fifo(PathBuf),
}

fn set_flag(args: &mut Vec<String>, flag: &str, present: bool) {
    if flag.is_empty() {
        return;
    }
    let found = args.iter().position(|a| a == flag);
    match (present, found) {
        (true, None) => args.push(flag.to_string()),
        (false, Some(i)) => {
            args.remove(i);
        }
        _ => {}
    }
}

fn geometry(settings: &Settings) -> String {
    let mut geometry = settings.window_size.clone();
    if !settings.window_pos.is_empty() {
        let x = if settings.window_pos.contains("left") { "+1" } else { "-1" };
        let y = if settings.window_pos.contains("top") { "+1" } else { "-1" };
        geometry.push_str(x);
        geometry.push_str(y);
    }
    geometry
}

/// Arguments (without the program) for playing `variant` of `track`
pub fn build_args(
    settings: &Settings,
    caps: &PlayerCapabilities,
    track: &Track,
    variant: &StreamVariant,
    mode: &PlayMode,
    input_conf: &Path,
    control: &ControlEndpoint,
) -> Vec<String> {
    let user_args = settings.player_args.trim();
    let mut args: Vec<String> = user_args.split_whitespace().map(str::to_string).collect();

    let Some(flags) = caps.kind.flags() else {
        args.push(variant.url.clone());
        return args;
    };

    args.push(flags.title.to_string());
    args.push(track.title.clone());
    set_flag(&mut args, flags.fullscreen, settings.fullscreen);

    if !user_args.contains(flags.geometry) {
        let geometry = geometry(settings);
        if !geometry.is_empty() {
            set_flag(&mut args, flags.geometry, true);
            set_flag(&mut args, &geometry, true);
        }
    }

    if mode.audio_from_video {
        set_flag(&mut args, flags.no_video, true);
    } else {
        match mode.play_override {
            PlayOverride::Fullscreen => set_flag(&mut args, flags.fullscreen, true),
            PlayOverride::Window => set_flag(&mut args, flags.fullscreen, false),
            _ => {}
        }
    }

    if !mode.video && variant.container == "m4a" {
        if let Some(ignidx) = flags.ignore_index {
            tracing::debug!("Using ignidx flag");
            set_flag(&mut args, ignidx, true);
        }
    }

    if caps.uses_socket() {
        set_flag(&mut args, flags.quiet, true);
    } else {
        for flag in flags.remove {
            set_flag(&mut args, flag, false);
        }
        for flag in flags.add {
            set_flag(&mut args, flag, true);
        }
    }

    args.push(variant.url.clone());
    args.extend(split_prefixed(flags.input_conf, input_conf));
    match control {
        ControlEndpoint::Socket(path) => {
            if let Some(flag) = caps.socket_flag {
                args.push(format!("{}{}", flag, path.display()));
            }
        }
        ControlEndpoint::Fifo(path) => args.extend(split_prefixed(flags.input_file, path)),
        ControlEndpoint::None => {}
    }
    args
}

/// `"-input conf="` + path becomes two arguments, `"--input-conf="` + path one
fn split_prefixed(prefix: &str, path: &Path) -> Vec<String> {
    match prefix.split_once(' ') {
        Some((flag, rest)) => vec![flag.to_string(), format!("{}{}", rest, path.display())],
        None => vec![format!("{}{}", prefix, path.display())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MediaKind;

    fn variant(container: &str) -> StreamVariant {
        StreamVariant {
            url: "https://media.example/stream".into(),
            container: container.into(),
            quality: "128k".into(),
            kind: MediaKind::Audio,
            size_bytes: None,
        }
    }

    #[test]
    fn kind_from_binary_name() {
        assert_eq!(PlayerKind::from_path("/usr/bin/mpv"), PlayerKind::Mpv);
        assert_eq!(PlayerKind::from_path("mplayer.exe"), PlayerKind::MPlayer);
        assert_eq!(PlayerKind::from_path("vlc"), PlayerKind::Generic);
    }

    #[test]
    fn version_drives_socket_support() {
        assert_eq!(parse_mpv_version("mpv 0.6.2 (C) 2000-2014"), Some((0, 6, 2)));
        assert_eq!(parse_mpv_version("mpv v0.38.0 Copyright"), Some((0, 38, 0)));
        assert_eq!(parse_mpv_version("something else"), None);

        let old = PlayerCapabilities::for_version(PlayerKind::Mpv, Some((0, 6, 2)));
        assert!(!old.uses_socket());
        let unknown = PlayerCapabilities::for_version(PlayerKind::Mpv, None);
        assert_eq!(unknown.uses_socket(), cfg!(unix));
        let mplayer = PlayerCapabilities::for_version(PlayerKind::MPlayer, None);
        assert!(!mplayer.uses_socket());
    }

    #[test]
    fn mplayer_args_with_fifo() {
        let mut settings = Settings::default();
        settings.player_args = "-really-quiet -cache 1024".into();
        settings.window_size = "640x360".into();
        settings.window_pos = "top-left".into();
        let caps = PlayerCapabilities::for_version(PlayerKind::MPlayer, None);
        let mode = PlayMode::new(false, PlayOverride::None);
        let args = build_args(
            &settings,
            &caps,
            &Track::new("abc", "Song", 200),
            &variant("webm"),
            &mode,
            Path::new("/tmp/s/input.conf"),
            &ControlEndpoint::Fifo(PathBuf::from("/tmp/s/control.fifo")),
        );
        assert_eq!(
            args,
            [
                "-cache", "1024", "-title", "Song", "-geometry", "640x360+1+1", "-noquiet",
                "-prefer-ipv4", "https://media.example/stream", "-input", "conf=/tmp/s/input.conf",
                "-input", "file=/tmp/s/control.fifo",
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn mpv_socket_audio_from_video() {
        let mut settings = Settings::default();
        settings.fullscreen = true;
        let caps = PlayerCapabilities::for_version(PlayerKind::Mpv, Some((0, 35, 0)));
        let mut mode = PlayMode::new(false, PlayOverride::None);
        mode.audio_from_video = true;
        mode.video = true;
        let args = build_args(
            &settings,
            &caps,
            &Track::new("abc", "Song", 200),
            &variant("mp4"),
            &mode,
            Path::new("/tmp/s/input.conf"),
            &ControlEndpoint::Socket(PathBuf::from("/tmp/s/mpv.sock")),
        );
        assert!(args.contains(&"--fs".to_string()));
        assert!(args.contains(&"--no-video".to_string()));
        assert!(args.contains(&"--really-quiet".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--msg-level")));
        assert_eq!(args.last().unwrap(), "--input-ipc-server=/tmp/s/mpv.sock");
    }

    #[test]
    fn mpv_m4a_audio_gets_ignidx_and_window_override_drops_fs() {
        let mut settings = Settings::default();
        settings.fullscreen = true;
        let caps = PlayerCapabilities::for_version(PlayerKind::Mpv, Some((0, 5, 0)));
        let mode = PlayMode::new(false, PlayOverride::Audio);
        let args = build_args(
            &settings,
            &caps,
            &Track::new("abc", "Song", 200),
            &variant("m4a"),
            &mode,
            Path::new("/tmp/in.conf"),
            &ControlEndpoint::None,
        );
        assert!(args.contains(&"--demuxer-lavf-o=fflags=+ignidx".to_string()));
        assert!(args.contains(&"--msg-level=all=no:statusline=status".to_string()));

        let window = PlayMode::new(false, PlayOverride::Window);
        let args = build_args(
            &settings,
            &caps,
            &Track::new("abc", "Song", 200),
            &variant("webm"),
            &window,
            Path::new("/tmp/in.conf"),
            &ControlEndpoint::None,
        );
        assert!(!args.contains(&"--fs".to_string()));
    }

    #[test]
    fn generic_player_only_gets_url() {
        let caps = PlayerCapabilities::for_version(PlayerKind::Generic, None);
        let args = build_args(
            &Settings::default(),
            &caps,
            &Track::new("abc", "Song", 200),
            &variant("webm"),
            &PlayMode::new(false, PlayOverride::None),
            Path::new("/tmp/in.conf"),
            &ControlEndpoint::None,
        );
        assert_eq!(args, ["https://media.example/stream"]);
    }
}
