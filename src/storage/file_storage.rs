use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

use super::models::{Settings, Snapshot, Tag, Task, SCHEMA_VERSION, TAG_ALL, TAG_DEFAULT};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Snapshot file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Data directory not found")]
    DataDirNotFound,
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Spacing used when injecting order values into legacy rows.
const ORDER_STEP: f64 = 0.001;

/// Local snapshot repository: one JSON document holding the whole task
/// list, tag set and settings.
pub struct FileStorage {
    path: PathBuf,
}

/// A tag entry as found on disk. Older documents stored tags as plain name
/// strings with colors in a separate `tag_colors` map.
#[derive(Deserialize)]
#[serde(untagged)]
enum TagEntry {
    Record(Tag),
    Name(String),
}

/// Tolerant on-disk form of a snapshot. Every field is optional so a
/// document written by an older build still loads.
#[derive(Deserialize, Default)]
#[serde(default)]
struct RawSnapshot {
    version: u32,
    settings: Settings,
    tags: Vec<TagEntry>,
    tag_colors: HashMap<String, String>,
    tasks: Vec<Task>,
}

impl FileStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Default data directory for this user.
    pub fn default_data_dir() -> Result<PathBuf> {
        dirs::data_local_dir()
            .map(|p| p.join("ticklist"))
            .ok_or(StorageError::DataDirNotFound)
    }

    /// Default snapshot file location.
    pub fn default_storage_path() -> Result<PathBuf> {
        Ok(Self::default_data_dir()?.join("storage.json"))
    }

    /// Create the parent directory if needed.
    pub fn init(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Load the snapshot. A missing file seeds a starter snapshot and
    /// persists it; a file that exists but does not parse is an error —
    /// the caller decides, the repository never overwrites it.
    pub fn load(&self) -> Result<Snapshot> {
        if !self.path.exists() {
            let snapshot = Self::starter_snapshot();
            self.init()?;
            self.save(&snapshot)?;
            return Ok(snapshot);
        }
        Self::load_path(&self.path)
    }

    /// Load a snapshot from an arbitrary file, e.g. a freshly pulled remote
    /// document. Missing files are an error here.
    pub fn load_from(path: &Path) -> Result<Snapshot> {
        if !path.exists() {
            return Err(StorageError::FileNotFound(path.to_path_buf()));
        }
        Self::load_path(path)
    }

    fn load_path(path: &Path) -> Result<Snapshot> {
        let content = fs::read_to_string(path)?;
        let raw: RawSnapshot = serde_json::from_str(&content)?;
        Ok(Self::normalize(raw))
    }

    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let content = serde_json::to_string_pretty(snapshot)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    fn starter_snapshot() -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.add_task("Sample task", TAG_DEFAULT);
        snapshot
    }

    /// Bring a raw document up to the current shape: migrate legacy tag
    /// names, dedupe tags, guarantee the reserved tags, inject missing
    /// order values and backfill tags referenced by tasks.
    fn normalize(raw: RawSnapshot) -> Snapshot {
        if raw.version < SCHEMA_VERSION {
            log::debug!(
                "Storage: migrating snapshot from version {} to {}",
                raw.version,
                SCHEMA_VERSION
            );
        }

        let mut tags: Vec<Tag> = Vec::new();
        for entry in raw.tags {
            let mut tag = match entry {
                TagEntry::Record(tag) => tag,
                TagEntry::Name(name) => {
                    let color = raw.tag_colors.get(&name).cloned().unwrap_or_default();
                    Tag::new(name, color)
                }
            };
            let name = tag.name.trim();
            tag.name = if name.is_empty() {
                TAG_DEFAULT.to_string()
            } else {
                name.to_string()
            };
            if tag.id.is_empty() {
                tag.id = super::models::new_id();
            }
            if !tags.iter().any(|t| t.name == tag.name) {
                tags.push(tag);
            }
        }
        if !tags.iter().any(|t| t.name == TAG_ALL) {
            tags.insert(0, Tag::new(TAG_ALL, ""));
        }
        if !tags.iter().any(|t| t.name == TAG_DEFAULT) {
            tags.push(Tag::new(TAG_DEFAULT, ""));
        }

        let mut tasks = raw.tasks;
        tasks.retain(|t| !t.id.is_empty());

        // Rows from older documents carry no order; hand them a descending
        // ramp below the current maximum so the on-disk sequence survives.
        let max_order = tasks
            .iter()
            .map(|t| t.order)
            .fold(Utc::now().timestamp_millis() as f64 / 1000.0, f64::max);
        let mut missing = 0;
        for task in tasks.iter_mut() {
            if task.order == 0.0 {
                missing += 1;
                task.order = max_order - missing as f64 * ORDER_STEP;
            }
        }

        let mut known: Vec<String> = tags
            .iter()
            .filter(|t| !t.deleted)
            .map(|t| t.name.clone())
            .collect();
        for task in &tasks {
            if !known.contains(&task.tag) {
                known.push(task.tag.clone());
                tags.push(Tag::new(task.tag.clone(), ""));
            }
        }

        Snapshot {
            version: SCHEMA_VERSION,
            settings: raw.settings,
            tags,
            tasks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_in(dir: &tempfile::TempDir) -> FileStorage {
        FileStorage::new(dir.path().join("storage.json"))
    }

    #[test]
    fn missing_file_seeds_starter_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_in(&dir);

        let snapshot = storage.load().unwrap();
        assert!(storage.path().exists());
        assert_eq!(snapshot.version, SCHEMA_VERSION);
        assert_eq!(snapshot.tasks.len(), 1);
        assert!(snapshot.tags.iter().any(|t| t.name == TAG_ALL));
        assert!(snapshot.tags.iter().any(|t| t.name == TAG_DEFAULT));
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_in(&dir);

        let mut snapshot = Snapshot::default();
        snapshot.add_task("water the plants", "home");
        snapshot.settings.sync_user = "alice".to_string();
        storage.init().unwrap();
        storage.save(&snapshot).unwrap();

        let loaded = storage.load().unwrap();
        assert_eq!(loaded.tasks.len(), 1);
        assert_eq!(loaded.tasks[0].text, "water the plants");
        assert_eq!(loaded.settings.sync_user, "alice");
    }

    #[test]
    fn corrupt_file_is_an_error_not_a_reset() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_in(&dir);
        fs::write(storage.path(), "{not json").unwrap();

        assert!(matches!(storage.load(), Err(StorageError::Json(_))));
        // The broken file is left in place for the operator.
        assert_eq!(fs::read_to_string(storage.path()).unwrap(), "{not json");
    }

    #[test]
    fn legacy_string_tags_migrate_with_colors() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_in(&dir);
        let doc = serde_json::json!({
            "version": 1,
            "settings": Settings::default(),
            "tags": ["work", "home", "  "],
            "tag_colors": {"work": "#aa3322"},
            "tasks": [],
        });
        fs::write(storage.path(), doc.to_string()).unwrap();

        let snapshot = storage.load().unwrap();
        let work = snapshot.tags.iter().find(|t| t.name == "work").unwrap();
        assert_eq!(work.color, "#aa3322");
        assert!(snapshot.tags.iter().any(|t| t.name == "home"));
        // Blank legacy entry collapses into the default tag, present once.
        assert_eq!(
            snapshot.tags.iter().filter(|t| t.name == TAG_DEFAULT).count(),
            1
        );
        assert_eq!(snapshot.tags[0].name, TAG_ALL);
    }

    #[test]
    fn missing_order_gets_descending_ramp() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_in(&dir);
        let doc = serde_json::json!({
            "version": 1,
            "tasks": [
                {"id": "a", "text": "first"},
                {"id": "b", "text": "second"},
            ],
        });
        fs::write(storage.path(), doc.to_string()).unwrap();

        let snapshot = storage.load().unwrap();
        let a = snapshot.task("a").unwrap().order;
        let b = snapshot.task("b").unwrap().order;
        assert!(a > 0.0 && b > 0.0);
        // Earlier rows keep the higher rank.
        assert!(a > b);
    }

    #[test]
    fn task_tags_are_backfilled() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_in(&dir);
        let doc = serde_json::json!({
            "version": 2,
            "tags": [],
            "tasks": [{"id": "a", "text": "ship it", "tag": "launch", "order": 5.0}],
        });
        fs::write(storage.path(), doc.to_string()).unwrap();

        let snapshot = storage.load().unwrap();
        assert!(snapshot.tags.iter().any(|t| t.name == "launch"));
    }

    #[test]
    fn load_from_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(matches!(
            FileStorage::load_from(&path),
            Err(StorageError::FileNotFound(_))
        ));
    }
}
