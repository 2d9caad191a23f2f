//! Status line rendering: `HH:MM:SS [PP%] [====>    ] vol: V%`

/// Columns used by the bar brackets and surrounding padding
const BAR_PADDING: usize = 7;

pub fn make_status_line(
    elapsed_seconds: u64,
    prefix: &str,
    duration_seconds: u64,
    volume: Option<u32>,
    width: usize,
) -> String {
    let (h, m, s) = (
        elapsed_seconds / 3600,
        (elapsed_seconds % 3600) / 60,
        elapsed_seconds % 60,
    );
    let percent = if duration_seconds > 0 {
        elapsed_seconds as f64 * 100.0 / duration_seconds as f64
    } else {
        0.0
    };

    let mut line = format!(
        "{:02}:{:02}:{:02} {:<6}",
        h,
        m,
        s,
        format!("[{:.0}%]", percent)
    );
    let vol_suffix = volume
        .map(|v| format!(" vol: {}%", v))
        .unwrap_or_default();

    let bar_width = width.saturating_sub(
        prefix.chars().count() + line.chars().count() + vol_suffix.chars().count() + BAR_PADDING,
    );
    line.push_str(&format!(" [{}]", progress_bar(percent, bar_width)));

    format!("{}{}{}", prefix, line, vol_suffix)
}

/// `ceil(percent/100 * width)` cells: `=` fill ending in a `>` marker
fn progress_bar(percent: f64, width: usize) -> String {
    if width == 0 {
        return String::new();
    }
    let filled = ((percent / 100.0 * width as f64).ceil().max(0.0) as usize).min(width);
    let bar = format!("{}>", "=".repeat(filled.saturating_sub(1)));
    format!("{:<width$}", bar, width = width)
}
