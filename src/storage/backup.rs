use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;

use super::file_storage::Result;

/// Backups kept per snapshot file before the oldest are pruned.
pub const MAX_BACKUPS: usize = 5;

/// Copy `path` to a timestamped sibling (`storage.json.bak_20260314_091502`)
/// before a pull overwrites it. Returns the backup path, or `None` when
/// there was nothing to back up.
pub fn backup_snapshot_file(path: &Path) -> Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let mut backup = path.as_os_str().to_owned();
    backup.push(format!(".bak_{stamp}"));
    let backup = PathBuf::from(backup);
    fs::copy(path, &backup)?;
    Ok(Some(backup))
}

/// Delete the oldest backups of `path`, keeping at most `keep`.
pub fn prune_backups(path: &Path, keep: usize) -> Result<usize> {
    let Some(parent) = path.parent() else {
        return Ok(0);
    };
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(0);
    };
    let prefix = format!("{file_name}.bak_");

    let mut backups: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(parent)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if name.starts_with(&prefix) {
                backups.push(entry.path());
            }
        }
    }
    if backups.len() <= keep {
        return Ok(0);
    }

    // Timestamped names sort chronologically.
    backups.sort();
    let excess = backups.len() - keep;
    let mut removed = 0;
    for old in backups.into_iter().take(excess) {
        fs::remove_file(&old)?;
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_copies_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, b"{\"tasks\":[]}").unwrap();

        let backup = backup_snapshot_file(&path).unwrap().unwrap();
        assert!(backup
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("storage.json.bak_"));
        assert_eq!(fs::read(&backup).unwrap(), fs::read(&path).unwrap());
    }

    #[test]
    fn backup_of_missing_file_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        assert!(backup_snapshot_file(&path).unwrap().is_none());
    }

    #[test]
    fn prune_keeps_the_newest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        for i in 0..4 {
            fs::write(
                dir.path().join(format!("storage.json.bak_2026010{}_000000", i + 1)),
                b"old",
            )
            .unwrap();
        }

        let removed = prune_backups(&path, 2).unwrap();
        assert_eq!(removed, 2);
        assert!(!dir.path().join("storage.json.bak_20260101_000000").exists());
        assert!(!dir.path().join("storage.json.bak_20260102_000000").exists());
        assert!(dir.path().join("storage.json.bak_20260104_000000").exists());
    }
}
