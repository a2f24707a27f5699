//! Before/after comparison rendering.
//!
//! A finalized cluster is rendered as a fixed-width two-column table showing
//! the changed region of the file plus three lines of context:
//!
//! ```text
//! === File: src/lib.rs ===
//! === Diff view of lines 2-9 ===
//!
//! LINE | BEFORE                      | AFTER
//! -----|-----------------------------|------------------------------
//!    2 | fn add(a: i32) -> i32 {     | fn add(a: i32, b: i32) -> i32 {
//! ...
//! ```
//!
//! Changed rows are marked with `* `. The renderer yields to the scheduler
//! once per call so that rendering a large file never monopolizes a lane.

/// Width of each content column, including the `...` truncation suffix.
const CONTENT_WIDTH: usize = 60;

/// Context lines shown either side of the changed region.
const WINDOW_CONTEXT_LINES: usize = 3;

/// Fallback window height when before and after are line-identical.
const EMPTY_DIFF_WINDOW: usize = 5;

/// Render the two-column comparison of `before` vs `after`.
pub async fn render_comparison(before: &str, after: &str, file_path: &str) -> String {
    // One suspension point per render, between queue tasks this keeps a
    // burst of finalizations from starving sibling lanes.
    tokio::task::yield_now().await;

    let before_lines: Vec<&str> = before.split('\n').collect();
    let after_lines: Vec<&str> = after.split('\n').collect();
    let max_lines = before_lines.len().max(after_lines.len());

    let (first_diff, last_diff) = diff_window(&before_lines, &after_lines);

    let start_line = first_diff.saturating_sub(WINDOW_CONTEXT_LINES);
    let end_line = (max_lines - 1).min(last_diff + WINDOW_CONTEXT_LINES);
    let num_width = end_line.to_string().len();

    let mut out = format!("\n=== File: {file_path} ===\n");
    out.push_str(&format!("=== Diff view of lines {start_line}-{end_line} ===\n\n"));
    out.push_str(&format!(
        "{:<label_w$} | {:<cw$} | {:<cw$}\n",
        "LINE",
        "BEFORE",
        "AFTER",
        label_w = num_width + 2,
        cw = CONTENT_WIDTH,
    ));
    out.push_str(&format!(
        "{}-|-{}-|-{}\n",
        "-".repeat(num_width + 2),
        "-".repeat(CONTENT_WIDTH),
        "-".repeat(CONTENT_WIDTH),
    ));

    for i in start_line..=end_line {
        let before_line = before_lines.get(i).copied().unwrap_or("");
        let after_line = after_lines.get(i).copied().unwrap_or("");
        let marker = if before_line == after_line { "  " } else { "* " };
        out.push_str(&format!(
            "{}{:>num_w$} | {:<cw$} | {:<cw$}\n",
            marker,
            i,
            truncate_cell(before_line),
            truncate_cell(after_line),
            num_w = num_width,
            cw = CONTENT_WIDTH,
        ));
    }

    out.push('\n');
    out
}

/// First and last differing line indices, by full-line equality.
///
/// When no line differs, falls back to `[0, min(5, max_lines - 1)]` so the
/// rendered table still shows the top of the file.
fn diff_window(before_lines: &[&str], after_lines: &[&str]) -> (usize, usize) {
    let max_lines = before_lines.len().max(after_lines.len());
    let mut first = max_lines;
    let mut last = 0usize;

    for i in 0..max_lines {
        let b = before_lines.get(i).copied().unwrap_or("");
        let a = after_lines.get(i).copied().unwrap_or("");
        if b != a {
            first = first.min(i);
            last = last.max(i);
        }
    }

    if first > last {
        (0, EMPTY_DIFF_WINDOW.min(max_lines - 1))
    } else {
        (first, last)
    }
}

/// Truncate a line to the content column, appending `...` when it overflows.
fn truncate_cell(line: &str) -> String {
    let max = CONTENT_WIDTH - 3;
    if line.chars().count() > max {
        let mut cell: String = line.chars().take(max).collect();
        cell.push_str("...");
        cell
    } else {
        line.to_string()
    }
}
