//! Status command handler.
//!
//! Prints the snapshot saved by the last `lightbox upload` run.

use anyhow::Result;
use chrono::{Local, Utc};

use lightbox_upload::QueueState;

use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::print_task_table;

/// Show the persisted queue.
///
/// Stale snapshots are discarded by the queue on load, so they show up
/// here as "no saved queue".
pub async fn execute(ctx: &CliContext, json: bool) -> Result<()> {
    let Some(snapshot) = ctx.queue.restore().await else {
        println!("No saved upload queue.");
        return Ok(());
    };

    if json {
        let rendered = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| CliError::Database(format!("Failed to render snapshot: {e}")))?;
        println!("{rendered}");
        return Ok(());
    }

    let age = Utc::now().signed_duration_since(snapshot.timestamp);
    println!(
        "Saved {} ({})",
        snapshot
            .timestamp
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S"),
        format_age(age)
    );
    println!();
    print_task_table(&snapshot.queue);

    let state = QueueState::from_tasks(snapshot.queue);
    println!();
    println!(
        "{} total: {} completed, {} failed, {} unfinished ({:.0}% overall)",
        state.total,
        state.completed,
        state.failed,
        state.pending + state.uploading + state.paused,
        state.overall_progress
    );
    if state.failed + state.pending + state.uploading + state.paused > 0 {
        println!("Run `lightbox upload` with the same files to resume.");
    }

    Ok(())
}

/// Coarse, human-readable age of a snapshot.
fn format_age(age: chrono::Duration) -> String {
    let minutes = age.num_minutes();
    match minutes {
        m if m < 1 => "just now".to_string(),
        m if m < 60 => format!("{m} min ago"),
        m if m < 60 * 24 => format!("{} h ago", m / 60),
        m => format!("{} d ago", m / (60 * 24)),
    }
}
