use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use ticklist_lib::storage::{FileStorage, TAG_DEFAULT};
use ticklist_lib::sync::{start_sync_scheduler, PullOutcome, SyncClient, SyncManager, SyncScheduler};

use crate::app::App;

fn client_for(app: &App) -> Result<SyncClient> {
    let settings = &app.snapshot.settings;
    anyhow::ensure!(settings.sync_enabled, "Sync is not enabled in settings");
    let client = SyncClient::new(
        &settings.sync_base_url,
        &settings.sync_token,
        &settings.sync_user,
    );
    anyhow::ensure!(client.available(), "No sync server configured");
    Ok(client)
}

/// Overwrite the local file with the remote document (backup taken first).
pub async fn run_pull(app: &App) -> Result<()> {
    let client = client_for(app)?;
    match client.pull_to_file(app.storage.path()).await? {
        PullOutcome::Updated => println!("Pulled from server (previous file backed up)"),
        PullOutcome::Unchanged => println!("Already up to date"),
        PullOutcome::Empty => println!("Nothing stored remotely yet"),
    }
    Ok(())
}

/// Send the local file to the server as-is.
pub async fn run_push(app: &App) -> Result<()> {
    let client = client_for(app)?;
    let etag = client.push_from_file(app.storage.path()).await?;
    println!("Pushed, etag {}", etag);
    Ok(())
}

/// Full manual cycle: pull, merge, save, push.
pub async fn run_sync(app: App) -> Result<()> {
    let manager = SyncManager::new(FileStorage::new(app.storage.path().to_path_buf()))?;
    let status = manager.manual_sync().await;
    println!("{}", status.message);
    anyhow::ensure!(status.ok, "sync did not complete");
    Ok(())
}

/// Long-running mode: startup pull, periodic pull/push and debounced
/// push-after-edit, with a line-based prompt for local edits. Ends with a
/// best-effort shutdown push.
pub async fn run_watch(app: App) -> Result<()> {
    let manager = Arc::new(SyncManager::new(FileStorage::new(
        app.storage.path().to_path_buf(),
    ))?);
    let scheduler = start_sync_scheduler(Arc::clone(&manager));

    println!(
        "Watching {} (add <text> | done <id> | list | sync | quit)",
        app.storage.path().display()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                match line? {
                    None => break,
                    Some(line) => {
                        if !handle_line(&manager, &scheduler, line.trim()).await? {
                            break;
                        }
                    }
                }
            }
        }
    }

    scheduler.shutdown().await;
    manager.shutdown_push().await;
    Ok(())
}

/// Returns false when the session should end.
async fn handle_line(
    manager: &Arc<SyncManager>,
    scheduler: &SyncScheduler,
    line: &str,
) -> Result<bool> {
    let (command, rest) = match line.split_once(' ') {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };

    match command {
        "" => {}
        "quit" | "exit" => return Ok(false),
        "add" if !rest.is_empty() => {
            let mut added = String::new();
            manager.edit(|s| {
                added = s.add_task(rest, TAG_DEFAULT);
            })?;
            scheduler.mark_dirty();
            println!("Added {}", &added[..8]);
        }
        "done" if !rest.is_empty() => {
            let snapshot = manager.snapshot();
            match snapshot.tasks.iter().find(|t| t.id.starts_with(rest)) {
                Some(task) => {
                    let id = task.id.clone();
                    manager.edit(|s| {
                        s.set_done(&id, true);
                    })?;
                    scheduler.mark_dirty();
                    println!("Done: {}", &id[..8]);
                }
                None => println!("No task matches id '{}'", rest),
            }
        }
        "list" => {
            for task in manager.snapshot().visible_tasks() {
                let mark = if task.done { "x" } else { " " };
                println!("[{}] {:<8} {}", mark, &task.id[..task.id.len().min(8)], task.first_line());
            }
        }
        "sync" => {
            let status = manager.manual_sync().await;
            println!("{}", status.message);
        }
        _ => println!("Commands: add <text> | done <id> | list | sync | quit"),
    }
    Ok(true)
}
