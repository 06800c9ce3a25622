use std::path::PathBuf;

use anyhow::{Context, Result};

use ticklist_lib::storage::{FileStorage, Snapshot};

/// Shared state for one-shot CLI commands: the snapshot file plus its
/// loaded contents.
pub struct App {
    pub storage: FileStorage,
    pub snapshot: Snapshot,
}

impl App {
    /// Open the given snapshot file, or the default per-user location.
    pub fn new(file: Option<PathBuf>) -> Result<Self> {
        let path = match file {
            Some(path) => path,
            None => FileStorage::default_storage_path()
                .context("Failed to resolve the data directory")?,
        };
        let storage = FileStorage::new(path);
        storage.init().context("Failed to create the data directory")?;
        let snapshot = storage.load().context("Failed to load the task list")?;
        Ok(Self { storage, snapshot })
    }

    pub fn save(&self) -> Result<()> {
        self.storage.save(&self.snapshot).context("Failed to save the task list")
    }

    /// Resolve a task by unique id prefix.
    pub fn find_task_id(&self, prefix: &str) -> Result<String> {
        let matches: Vec<&str> = self
            .snapshot
            .tasks
            .iter()
            .filter(|t| t.id.starts_with(prefix))
            .map(|t| t.id.as_str())
            .collect();
        match matches.as_slice() {
            [] => anyhow::bail!("No task matches id '{}'", prefix),
            [id] => Ok(id.to_string()),
            _ => anyhow::bail!("Id '{}' is ambiguous ({} matches)", prefix, matches.len()),
        }
    }
}
