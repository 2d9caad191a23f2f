//! Formatting helpers for the command-line listings

use crate::model::{Queue, format_duration};

/// Calculate width needed for index column (log10(n) + padding)
pub fn calculate_num_width(item_count: usize) -> usize {
    if item_count == 0 {
        2
    } else {
        let digits = (item_count as f64).log10().floor() as usize + 1;
        digits + 1
    }
}

pub fn truncate_string(s: &str, max_width: usize) -> String {
    if s.chars().count() > max_width {
        let truncated: String = s.chars().take(max_width.saturating_sub(3)).collect();
        format!("{:<width$}", format!("{}...", truncated), width = max_width)
    } else {
        format!("{:<width$}", s, width = max_width)
    }
}

/// One line per track: ` {num}  {title}  {duration}`, numbered from 1,
/// followed by a total line. An empty queue renders a single notice.
pub fn render_queue(queue: &Queue, width: usize) -> Vec<String> {
    if queue.is_empty() {
        return vec![format!("{} is empty", queue.name())];
    }
    let num_width = calculate_num_width(queue.len());
    let duration_width = 8;
    // leading space + num + two separators of two spaces
    let title_width = width.saturating_sub(1 + num_width + 2 + 2 + duration_width).max(10);

    let mut lines: Vec<String> = queue
        .tracks()
        .iter()
        .enumerate()
        .map(|(i, track)| {
            format!(
                " {:>num_width$}  {}  {:>duration_width$}",
                i + 1,
                truncate_string(&track.title, title_width),
                format_duration(track.duration_seconds),
            )
        })
        .collect();
    lines.push(format!(
        "{}: {} tracks, {}",
        queue.name(),
        queue.len(),
        format_duration(queue.total_seconds())
    ));
    lines
}
