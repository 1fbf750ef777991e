//! Upload command handler.
//!
//! Matches each file against the manifest, re-attaches unfinished uploads of
//! the same file from the saved snapshot, then renders progress until the
//! queue drains. Ctrl-C pauses the queue, flushes the snapshot and exits.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use lightbox_upload::{
    FileSource, NewUpload, PersistedSnapshot, TaskProjection, UploadStatus, WriteTarget,
};

use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::manifest::Manifest;
use crate::presentation::ProgressBoard;

/// Upload command arguments passed from CLI.
pub struct UploadArgs {
    pub manifest: PathBuf,
    pub files: Vec<PathBuf>,
}

/// One file resolved against the manifest and the saved snapshot.
#[derive(Debug)]
pub struct PlannedUpload {
    pub path: PathBuf,
    pub file_name: String,
    pub target: WriteTarget,
    /// Unfinished task from the snapshot, with the manifest's target applied.
    pub resume: Option<TaskProjection>,
}

/// Resolve `files` against the manifest and the saved snapshot.
///
/// A snapshot task is resumed when it is unfinished and has the same file
/// name and object key as the manifest entry. Its upload and public URLs
/// are replaced with the manifest's, since pre-signed URLs expire.
pub fn plan_uploads(
    manifest: &Manifest,
    files: &[PathBuf],
    snapshot: Option<&PersistedSnapshot>,
) -> Result<Vec<PlannedUpload>, CliError> {
    let mut seen = HashSet::new();
    let mut planned = Vec::with_capacity(files.len());

    for path in files {
        let file_name = path
            .file_name()
            .and_then(OsStr::to_str)
            .ok_or_else(|| {
                CliError::Arguments(format!("'{}' has no usable file name", path.display()))
            })?
            .to_string();
        if !seen.insert(file_name.clone()) {
            return Err(CliError::Arguments(format!(
                "'{file_name}' is listed more than once"
            )));
        }

        let target = manifest.target_for(&file_name).cloned().ok_or_else(|| {
            CliError::Arguments(format!("No write target for '{file_name}' in the manifest"))
        })?;

        let resume = snapshot
            .into_iter()
            .flat_map(PersistedSnapshot::unfinished)
            .find(|task| task.file_name == file_name && task.key == target.key)
            .map(|task| TaskProjection {
                upload_url: target.upload_url.clone(),
                public_url: target.public_url.clone(),
                ..task.clone()
            });

        planned.push(PlannedUpload {
            path: path.clone(),
            file_name,
            target,
            resume,
        });
    }

    Ok(planned)
}

/// Unfinished snapshot tasks that `plan` does not resume.
///
/// The snapshot lives under one key, so these are forgotten as soon as the
/// new batch is saved.
pub fn forgotten_uploads<'a>(
    snapshot: Option<&'a PersistedSnapshot>,
    plan: &[PlannedUpload],
) -> Vec<&'a TaskProjection> {
    let resumed: HashSet<_> = plan
        .iter()
        .filter_map(|item| item.resume.as_ref().map(|task| task.id))
        .collect();
    snapshot
        .into_iter()
        .flat_map(PersistedSnapshot::unfinished)
        .filter(|task| !resumed.contains(&task.id))
        .collect()
}

enum Prepared {
    Resume(TaskProjection, PathBuf),
    Fresh(NewUpload),
}

/// Execute the upload command.
pub async fn execute(ctx: &mut CliContext, args: UploadArgs) -> Result<()> {
    let manifest = Manifest::load(&args.manifest)?;
    let mut events = ctx
        .take_events()
        .ok_or_else(|| CliError::Config("Upload events are already being consumed".into()))?;
    let queue = &ctx.queue;

    let snapshot = queue.restore().await;
    let plan = plan_uploads(&manifest, &args.files, snapshot.as_ref())?;

    let forgotten = forgotten_uploads(snapshot.as_ref(), &plan);
    if !forgotten.is_empty() {
        println!(
            "⚠️  {} unfinished upload(s) from the last run are not in this batch and will be forgotten:",
            forgotten.len()
        );
        for task in &forgotten {
            println!("  {} ({}, {}%)", task.file_name, task.status, task.progress);
        }
        tracing::warn!(count = forgotten.len(), "Dropping unfinished uploads missing from this batch");
    }

    // Open every file before touching the queue so a bad path changes nothing
    let mut prepared = Vec::with_capacity(plan.len());
    for item in plan {
        match item.resume {
            Some(projection) => prepared.push(Prepared::Resume(projection, item.path)),
            None => {
                let upload = FileSource::describe(&item.path, item.target)
                    .await
                    .map_err(CliError::from)?;
                prepared.push(Prepared::Fresh(upload));
            }
        }
    }

    // Hold admission until the whole batch is queued, so an early finish
    // cannot report the queue as drained
    queue.pause().await;

    let mut board = ProgressBoard::new();
    let mut fresh = Vec::new();
    let mut resumed = 0usize;
    for item in prepared {
        match item {
            Prepared::Resume(projection, path) => {
                let was = projection.status;
                let id = queue
                    .reattach(&projection, Arc::new(FileSource::new(path)))
                    .await
                    .map_err(CliError::from)?;
                tracing::debug!(%id, status = %was, file = %projection.file_name, "Resuming upload");
                board.add(id, &projection.file_name);
                resumed += 1;
            }
            Prepared::Fresh(upload) => fresh.push(upload),
        }
    }
    for task in queue.enqueue(fresh).await {
        board.add(task.id, &task.file_name);
    }
    if resumed > 0 {
        board.println(&format!("Resuming {resumed} unfinished upload(s)"));
    }

    queue.resume().await;

    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if board.apply(&event) {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                let paused = queue.pause().await;
                queue.flush().await;
                board.finish();
                return Err(CliError::Interrupted { paused }.into());
            }
        }
    }

    board.finish();
    queue.flush().await;

    let state = queue.state().await;
    println!();
    for task in &state.tasks {
        match task.status {
            UploadStatus::Completed => println!("✓ {} → {}", task.file_name, task.public_url),
            UploadStatus::Failed => println!(
                "✗ {}: {}",
                task.file_name,
                task.error.as_deref().unwrap_or("unknown error")
            ),
            _ => {}
        }
    }
    println!();
    println!("{} uploaded, {} failed", state.completed, state.failed);

    if state.failed > 0 {
        return Err(CliError::Upload(format!(
            "{} upload(s) failed; run the same command again to retry them",
            state.failed
        ))
        .into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lightbox_upload::UploadId;

    const MANIFEST: &str = r#"{
        "a.jpg": {
            "uploadUrl": "https://put.example/a.jpg?sig=new",
            "publicUrl": "https://cdn.example/a.jpg",
            "key": "g/a.jpg"
        },
        "b.jpg": {
            "uploadUrl": "https://put.example/b.jpg?sig=new",
            "publicUrl": "https://cdn.example/b.jpg",
            "key": "g/b.jpg"
        }
    }"#;

    fn projection(name: &str, key: &str, status: UploadStatus) -> TaskProjection {
        TaskProjection {
            id: UploadId::generate(),
            file_name: name.to_string(),
            file_size: 10,
            file_type: "image/jpeg".to_string(),
            upload_url: format!("https://put.example/{name}?sig=old"),
            public_url: format!("https://cdn.example/{name}"),
            key: key.to_string(),
            status,
            progress: 40,
            error: None,
            retry_count: 1,
        }
    }

    fn snapshot(tasks: Vec<TaskProjection>) -> PersistedSnapshot {
        PersistedSnapshot {
            queue: tasks,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_plan_fresh_uploads() {
        let manifest = Manifest::from_json(MANIFEST).unwrap();
        let files = vec![PathBuf::from("/photos/a.jpg"), PathBuf::from("b.jpg")];

        let plan = plan_uploads(&manifest, &files, None).unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].file_name, "a.jpg");
        assert!(plan.iter().all(|p| p.resume.is_none()));
        assert_eq!(
            plan[1].target,
            WriteTarget::new(
                "https://put.example/b.jpg?sig=new",
                "https://cdn.example/b.jpg",
                "g/b.jpg"
            )
        );
    }

    #[test]
    fn test_plan_resumes_unfinished_with_fresh_url() {
        let manifest = Manifest::from_json(MANIFEST).unwrap();
        let paused = projection("a.jpg", "g/a.jpg", UploadStatus::Paused);
        let done = projection("b.jpg", "g/b.jpg", UploadStatus::Completed);
        let saved = snapshot(vec![paused.clone(), done]);
        let files = vec![PathBuf::from("a.jpg"), PathBuf::from("b.jpg")];

        let plan = plan_uploads(&manifest, &files, Some(&saved)).unwrap();

        let resumed = plan[0].resume.as_ref().unwrap();
        assert_eq!(resumed.id, paused.id);
        assert_eq!(resumed.upload_url, "https://put.example/a.jpg?sig=new");
        assert_eq!(resumed.status, UploadStatus::Paused);
        // Completed uploads are sent again as new tasks
        assert!(plan[1].resume.is_none());
    }

    #[test]
    fn test_plan_ignores_snapshot_task_with_other_key() {
        let manifest = Manifest::from_json(MANIFEST).unwrap();
        let saved = snapshot(vec![projection("a.jpg", "other/a.jpg", UploadStatus::Failed)]);

        let plan = plan_uploads(&manifest, &[PathBuf::from("a.jpg")], Some(&saved)).unwrap();

        assert!(plan[0].resume.is_none());
    }

    #[test]
    fn test_plan_rejects_missing_target_and_duplicates() {
        let manifest = Manifest::from_json(MANIFEST).unwrap();

        let missing = plan_uploads(&manifest, &[PathBuf::from("c.jpg")], None).unwrap_err();
        assert!(matches!(missing, CliError::Arguments(_)));

        let twice = plan_uploads(
            &manifest,
            &[PathBuf::from("x/a.jpg"), PathBuf::from("y/a.jpg")],
            None,
        )
        .unwrap_err();
        assert!(matches!(twice, CliError::Arguments(_)));
    }

    #[test]
    fn test_forgotten_uploads_lists_unmatched_unfinished() {
        let manifest = Manifest::from_json(MANIFEST).unwrap();
        let resumable = projection("a.jpg", "g/a.jpg", UploadStatus::Uploading);
        let elsewhere = projection("c.jpg", "g/c.jpg", UploadStatus::Paused);
        let done = projection("d.jpg", "g/d.jpg", UploadStatus::Completed);
        let saved = snapshot(vec![resumable, elsewhere.clone(), done]);

        let plan = plan_uploads(&manifest, &[PathBuf::from("a.jpg")], Some(&saved)).unwrap();
        let forgotten = forgotten_uploads(Some(&saved), &plan);

        assert_eq!(forgotten.len(), 1);
        assert_eq!(forgotten[0].id, elsewhere.id);
        assert!(forgotten_uploads(None, &plan).is_empty());
    }
}
