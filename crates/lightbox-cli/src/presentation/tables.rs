//! Table formatting utilities for CLI output.

use lightbox_upload::TaskProjection;

const NAME_WIDTH: usize = 32;
const ERROR_WIDTH: usize = 48;

/// Truncates a string to at most `max_len` characters, adding "..." if needed.
///
/// # Examples
///
/// ```rust
/// use lightbox_cli::presentation::truncate_string;
///
/// assert_eq!(truncate_string("Hello", 10), "Hello");
/// assert_eq!(truncate_string("Hello World", 8), "Hello...");
/// ```
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Print a horizontal separator line.
pub fn print_separator(width: usize) {
    println!("{}", "-".repeat(width));
}

/// Print one row per task: name, status, progress, retries, error.
pub fn print_task_table(tasks: &[TaskProjection]) {
    println!(
        "{:<NAME_WIDTH$} {:<10} {:>5} {:>7}  ERROR",
        "FILE", "STATUS", "PROG", "RETRIES"
    );
    print_separator(NAME_WIDTH + 28 + ERROR_WIDTH);
    for task in tasks {
        println!(
            "{:<NAME_WIDTH$} {:<10} {:>4}% {:>7}  {}",
            truncate_string(&task.file_name, NAME_WIDTH),
            task.status,
            task.progress,
            task.retry_count,
            task.error
                .as_deref()
                .map(|e| truncate_string(e, ERROR_WIDTH))
                .unwrap_or_default(),
        );
    }
}
