use std::sync::Mutex;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::Mutex as CycleMutex;

use crate::storage::{FileStorage, Snapshot, StorageError};

use super::client::{PullOutcome, SyncClient, SyncClientError};
use super::config::{SyncState, SyncStatus, SyncTrigger, NOTIFY_THROTTLE_SECS};
use super::merge::merge_snapshots;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Transport error: {0}")]
    Client(#[from] SyncClientError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Drives when pulls, merges and pushes happen and turns their results into
/// an observable status.
///
/// The manager is the exclusive owner of the in-memory snapshot. Local
/// edits and merges both go through it and always replace the snapshot
/// wholesale; nothing else holds a reference into it across a cycle. Sync
/// cycles are serialized: background triggers skip when one is in flight,
/// manual sync waits its turn.
pub struct SyncManager {
    storage: FileStorage,
    snapshot: Mutex<Snapshot>,
    client: SyncClient,
    status: Mutex<SyncStatus>,
    cycle: CycleMutex<()>,
    last_auto_notify: Mutex<Option<Instant>>,
}

impl SyncManager {
    /// Load the snapshot from `storage` and build the transport client from
    /// its sync settings. Settings changed by a later merge take effect on
    /// the next construction, matching the lifetime of a session.
    pub fn new(storage: FileStorage) -> Result<Self, SyncError> {
        let snapshot = storage.load()?;
        let client = SyncClient::new(
            &snapshot.settings.sync_base_url,
            &snapshot.settings.sync_token,
            &snapshot.settings.sync_user,
        );
        Ok(Self {
            storage,
            snapshot: Mutex::new(snapshot),
            client,
            status: Mutex::new(SyncStatus::default()),
            cycle: CycleMutex::new(()),
            last_auto_notify: Mutex::new(None),
        })
    }

    /// Current snapshot, by value.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.lock().unwrap().clone()
    }

    pub fn status(&self) -> SyncStatus {
        self.status.lock().unwrap().clone()
    }

    pub fn sync_enabled(&self) -> bool {
        self.snapshot.lock().unwrap().settings.sync_enabled
    }

    pub fn push_timer_enabled(&self) -> bool {
        self.snapshot.lock().unwrap().settings.sync_timer_enabled
    }

    pub fn edit_push_enabled(&self) -> bool {
        self.snapshot.lock().unwrap().settings.sync_strategy_b
    }

    /// Sync is worth attempting at all: turned on and a server configured.
    pub fn sync_ready(&self) -> bool {
        self.sync_enabled() && self.client.available()
    }

    /// Apply a local edit: mutate a copy of the snapshot, replace the
    /// original wholesale and persist. The caller notifies the scheduler
    /// separately if a debounced push should follow.
    pub fn edit<F>(&self, apply: F) -> Result<Snapshot, SyncError>
    where
        F: FnOnce(&mut Snapshot),
    {
        let mut next = self.snapshot();
        apply(&mut next);
        self.storage.save(&next)?;
        *self.snapshot.lock().unwrap() = next.clone();
        Ok(next)
    }

    fn set_status(&self, state: SyncState, message: impl Into<String>, ok: bool) {
        let mut status = self.status.lock().unwrap();
        status.state = state;
        status.message = message.into();
        status.ok = ok;
    }

    fn mark_synced(&self) {
        self.status.lock().unwrap().last_sync = Some(chrono::Utc::now());
    }

    /// Single entry point for the timer-driven triggers, so tests can drive
    /// the orchestrator without real timers.
    pub async fn handle_trigger(&self, trigger: SyncTrigger) {
        match trigger {
            SyncTrigger::Startup => self.startup_pull().await,
            SyncTrigger::PeriodicPull => self.periodic_pull().await,
            SyncTrigger::PeriodicPush => self.periodic_push().await,
            SyncTrigger::DebouncePush => self.debounced_push().await,
        }
    }

    /// Startup behavior: pull-and-replace (not merge) the local store once,
    /// then reload the in-memory snapshot from the freshly pulled file.
    async fn startup_pull(&self) {
        if !self.sync_ready() {
            self.set_status(SyncState::Disabled, "sync not enabled", false);
            return;
        }
        let _guard = self.cycle.lock().await;

        self.set_status(SyncState::Pulling, "pulling from server", true);
        match self.client.pull_to_file(self.storage.path()).await {
            Ok(PullOutcome::Updated) => match self.storage.load() {
                Ok(snapshot) => {
                    *self.snapshot.lock().unwrap() = snapshot;
                    self.mark_synced();
                    self.set_status(SyncState::Idle, "pulled from server", true);
                }
                Err(e) => {
                    log::error!("Sync: pulled document failed to load: {}", e);
                    self.set_status(SyncState::Idle, format!("pull failed: {e}"), false);
                }
            },
            Ok(PullOutcome::Unchanged) => {
                self.mark_synced();
                self.set_status(SyncState::Idle, "already up to date", true);
            }
            Ok(PullOutcome::Empty) => {
                self.mark_synced();
                self.set_status(SyncState::Idle, "nothing stored remotely yet", true);
            }
            Err(e) => {
                log::warn!("Sync: startup pull failed: {}", e);
                self.set_status(SyncState::Idle, format!("pull failed: {e}"), false);
            }
        }
    }

    /// Background consistency refresh: pull into a temp file, merge, and
    /// silently replace the in-memory snapshot. Never fatal.
    async fn periodic_pull(&self) {
        if !self.sync_ready() {
            return;
        }
        let Ok(_guard) = self.cycle.try_lock() else {
            log::debug!("Sync: cycle in flight, skipping periodic pull");
            return;
        };

        match self.pull_merge(false).await {
            Ok(_) => self.mark_synced(),
            Err(e) => {
                log::debug!("Sync: periodic pull failed: {}", e);
                self.set_status(SyncState::Idle, "background pull failed", false);
            }
        }
    }

    /// Background save + push. Reported, but a failure never disables the
    /// timer.
    async fn periodic_push(&self) {
        if !self.sync_ready() || !self.push_timer_enabled() {
            return;
        }
        let Ok(_guard) = self.cycle.try_lock() else {
            log::debug!("Sync: cycle in flight, skipping periodic push");
            return;
        };

        match self.save_and_push().await {
            Ok(()) => {
                self.mark_synced();
                self.set_status(SyncState::Idle, "sync complete", true);
            }
            Err(e) => {
                log::warn!("Sync: periodic push failed: {}", e);
                self.set_status(SyncState::Idle, format!("sync failed: {e}"), false);
            }
        }
    }

    /// Push after a quiet period following local edits. Success
    /// notifications are throttled so rapid edit bursts do not flicker the
    /// status line.
    async fn debounced_push(&self) {
        if !self.sync_ready() || !self.edit_push_enabled() {
            return;
        }
        let Ok(_guard) = self.cycle.try_lock() else {
            log::debug!("Sync: cycle in flight, skipping debounced push");
            return;
        };

        match self.save_and_push().await {
            Ok(()) => {
                self.mark_synced();
                let mut last = self.last_auto_notify.lock().unwrap();
                let due = last
                    .map(|t| t.elapsed().as_secs() >= NOTIFY_THROTTLE_SECS)
                    .unwrap_or(true);
                if due {
                    *last = Some(Instant::now());
                    drop(last);
                    self.set_status(SyncState::Idle, "auto sync complete", true);
                }
            }
            Err(e) => {
                log::warn!("Sync: debounced push failed: {}", e);
                self.set_status(SyncState::Idle, "sync failed", false);
            }
        }
    }

    /// Foreground sync: pull-merge-reload, save, then push, synchronously
    /// relative to the caller. Reports distinct status text for "not
    /// enabled", "unavailable" and failed outcomes.
    pub async fn manual_sync(&self) -> SyncStatus {
        if !self.sync_enabled() {
            self.set_status(SyncState::Disabled, "sync not enabled", false);
            return self.status();
        }
        if !self.client.available() {
            self.set_status(SyncState::Disabled, "sync unavailable", false);
            return self.status();
        }
        let _guard = self.cycle.lock().await;

        if let Err(e) = self.pull_merge(true).await {
            self.set_status(SyncState::Idle, format!("sync failed: {e}"), false);
            return self.status();
        }

        self.set_status(SyncState::Pushing, "pushing to server", true);
        match self.push_current().await {
            Ok(()) => {
                self.mark_synced();
                self.set_status(SyncState::Idle, "manual sync complete", true);
            }
            Err(e) => {
                log::warn!("Sync: manual push failed: {}", e);
                self.set_status(SyncState::Idle, format!("push failed: {e}"), false);
            }
        }
        self.status()
    }

    /// Final save + push on normal termination. Best-effort: the process is
    /// exiting regardless.
    pub async fn shutdown_push(&self) {
        if !self.sync_ready() {
            return;
        }
        let _guard = self.cycle.lock().await;
        if let Err(e) = self.save_and_push().await {
            log::warn!("Sync: shutdown push failed: {}", e);
        }
    }

    /// Pull the remote document to a temp file and merge it in. With
    /// `persist`, the merged snapshot is also saved to disk (manual sync);
    /// the background refresh leaves persistence to later pushes.
    async fn pull_merge(&self, persist: bool) -> Result<bool, SyncError> {
        let tmp = tempfile::tempdir()?;
        let remote_path = tmp.path().join("remote.json");

        self.set_status(SyncState::Pulling, "pulling from server", true);
        match self.client.pull_to_file(&remote_path).await? {
            PullOutcome::Unchanged => {
                self.set_status(SyncState::Idle, "already up to date", true);
                Ok(false)
            }
            PullOutcome::Empty => {
                self.set_status(SyncState::Idle, "nothing stored remotely yet", true);
                Ok(false)
            }
            PullOutcome::Updated => {
                self.set_status(SyncState::Merging, "merging remote changes", true);
                let remote = FileStorage::load_from(&remote_path)?;
                let merged = {
                    let local = self.snapshot.lock().unwrap();
                    merge_snapshots(&local, &remote)
                };
                *self.snapshot.lock().unwrap() = merged;
                if persist {
                    self.set_status(SyncState::Saving, "saving", true);
                    self.storage.save(&self.snapshot())?;
                }
                self.set_status(SyncState::Idle, "merged remote changes", true);
                Ok(true)
            }
        }
    }

    async fn save_and_push(&self) -> Result<(), SyncError> {
        self.set_status(SyncState::Saving, "saving", true);
        self.storage.save(&self.snapshot())?;
        self.set_status(SyncState::Pushing, "pushing to server", true);
        self.push_current().await
    }

    async fn push_current(&self) -> Result<(), SyncError> {
        self.client.push_from_file(self.storage.path()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with(settings: impl FnOnce(&mut crate::storage::Settings)) -> (tempfile::TempDir, SyncManager) {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("storage.json"));
        let mut snapshot = Snapshot::default();
        settings(&mut snapshot.settings);
        storage.init().unwrap();
        storage.save(&snapshot).unwrap();
        let manager = SyncManager::new(FileStorage::new(dir.path().join("storage.json"))).unwrap();
        (dir, manager)
    }

    #[tokio::test]
    async fn manual_sync_when_disabled_reports_not_enabled() {
        let (_dir, manager) = manager_with(|s| s.sync_enabled = false);
        let status = manager.manual_sync().await;
        assert_eq!(status.state, SyncState::Disabled);
        assert_eq!(status.message, "sync not enabled");
        assert!(!status.ok);
    }

    #[tokio::test]
    async fn manual_sync_without_server_reports_unavailable() {
        let (_dir, manager) = manager_with(|s| {
            s.sync_enabled = true;
            s.sync_base_url = String::new();
        });
        let status = manager.manual_sync().await;
        assert_eq!(status.state, SyncState::Disabled);
        assert_eq!(status.message, "sync unavailable");
    }

    #[tokio::test]
    async fn background_triggers_are_noops_while_disabled() {
        let (_dir, manager) = manager_with(|s| s.sync_enabled = false);
        manager.handle_trigger(SyncTrigger::PeriodicPull).await;
        manager.handle_trigger(SyncTrigger::PeriodicPush).await;
        manager.handle_trigger(SyncTrigger::DebouncePush).await;

        let status = manager.status();
        assert_eq!(status.state, SyncState::Disabled);
        assert!(status.message.is_empty());
        assert!(status.last_sync.is_none());
    }

    #[tokio::test]
    async fn shutdown_push_is_a_noop_while_disabled() {
        let (_dir, manager) = manager_with(|s| s.sync_enabled = false);
        manager.shutdown_push().await;
        assert!(manager.status().last_sync.is_none());
    }

    #[test]
    fn edit_replaces_and_persists_the_snapshot() {
        let (dir, manager) = manager_with(|_| {});
        let before = manager.snapshot();

        let after = manager
            .edit(|s| {
                s.add_task("file taxes", "paperwork");
            })
            .unwrap();
        assert_eq!(after.tasks.len(), before.tasks.len() + 1);
        assert_eq!(manager.snapshot(), after);

        let reloaded = FileStorage::new(dir.path().join("storage.json")).load().unwrap();
        assert!(reloaded.tasks.iter().any(|t| t.text == "file taxes"));
    }

    #[test]
    fn sync_ready_requires_both_toggle_and_address() {
        let (_dir, enabled_no_url) = manager_with(|s| s.sync_enabled = true);
        assert!(!enabled_no_url.sync_ready());

        let (_dir2, configured) = manager_with(|s| {
            s.sync_enabled = true;
            s.sync_base_url = "http://127.0.0.1:8080".to_string();
        });
        assert!(configured.sync_ready());
    }
}
