//! View module - terminal output
//!
//! - `utils`: listing and truncation helpers
//! - `progress`: the single-line playback status display

mod progress;
mod utils;

use std::io::Write;

use crossterm::{
    cursor::MoveToColumn,
    execute,
    style::Print,
    terminal::{Clear, ClearType},
};

pub use progress::make_status_line;
pub use utils::render_queue;

/// Destination for status lines produced while a track plays
pub trait StatusSink: Send + Sync {
    /// Columns available for the status line
    fn width(&self, fallback: usize) -> usize {
        fallback
    }

    fn emit(&self, line: &str);

    /// Called once the track is done so following output starts on a clean line
    fn finish(&self) {}
}

/// Rewrites the current terminal line in place
pub struct TerminalSink;

impl StatusSink for TerminalSink {
    fn width(&self, fallback: usize) -> usize {
        crossterm::terminal::size()
            .map(|(cols, _)| cols as usize)
            .unwrap_or(fallback)
    }

    fn emit(&self, line: &str) {
        let mut out = std::io::stdout();
        if let Err(e) = execute!(out, MoveToColumn(0), Print(line), Clear(ClearType::UntilNewLine)) {
            tracing::debug!(error = %e, "Failed to write status line");
        }
    }

    fn finish(&self) {
        let mut out = std::io::stdout();
        let _ = writeln!(out);
    }
}

/// Keeps emitted lines in memory
#[derive(Default)]
pub struct MemorySink {
    lines: std::sync::Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl StatusSink for MemorySink {
    fn emit(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}
