//! Key-mapping file given to the player so navigation keys exit with known codes

use std::path::Path;

use super::args::PlayerKind;

/// Normal end of track / skip forward
pub const EXIT_NEXT: i32 = 0;
pub const EXIT_PREV: i32 = 42;
pub const EXIT_QUIT: i32 = 43;

/// Exit codes that count as a successful play
pub const SUCCESS_CODES: &[i32] = &[EXIT_NEXT, EXIT_PREV, EXIT_QUIT];

const STANDARD_BINDINGS: &[&str] = &[
    "q quit 43",
    "> quit",
    "< quit 42",
    "NEXT quit",
    "PREV quit 42",
    "ENTER quit",
];

/// Name of the optional user mapping file for a player kind
pub fn user_file_name(kind: PlayerKind) -> Option<&'static str> {
    match kind {
        PlayerKind::Mpv => Some("mpv-input.conf"),
        PlayerKind::MPlayer => Some("mplayer-input.conf"),
        PlayerKind::Generic => None,
    }
}

/// Rewrite a user's bindings so quit/prev/next exit with our codes, then
/// add the standard bindings for keys the user left unbound.
pub fn build_mapping(user_conf: &str) -> String {
    let mut conf = String::new();
    if !user_conf.is_empty() {
        conf.push_str(user_conf);
        conf.push('\n');
    }
    let mut conf = conf
        .replace("quit", "quit 43")
        .replace("playlist_prev", "quit 42")
        .replace("pt_step -1", "quit 42")
        .replace("playlist_next", "quit")
        .replace("pt_step 1", "quit");

    let bound: Vec<String> = conf
        .lines()
        .filter_map(|l| l.split_whitespace().next())
        .map(str::to_string)
        .collect();

    for binding in STANDARD_BINDINGS {
        let key = binding.split_whitespace().next().unwrap_or_default();
        if !bound.iter().any(|b| b == key) {
            conf.push_str(binding);
            conf.push('\n');
        }
    }
    conf
}

/// Write the mapping for `kind` to `dest`, merging the user file in `config_dir`
pub fn write_mapping(kind: PlayerKind, config_dir: &Path, dest: &Path) -> std::io::Result<()> {
    let user_conf = user_file_name(kind)
        .map(|name| config_dir.join(name))
        .filter(|p| p.is_file())
        .map(|p| {
            tracing::debug!(path = %p.display(), "Using user input key file");
            std::fs::read_to_string(p)
        })
        .transpose()?
        .unwrap_or_default();
    std::fs::write(dest, build_mapping(&user_conf))
}
