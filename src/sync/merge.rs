//! Reconciliation of a remote snapshot into the local one.
//!
//! Merging is a pure function of the two snapshots: no I/O, and
//! idempotent — feeding the result back in with the same remote snapshot
//! changes nothing. Conflict resolution is last-write-wins at whole-record
//! granularity; concurrent edits to different fields of the same task on
//! two devices lose one side entirely. That is the accepted trade-off, not
//! something to patch around here.

use std::collections::HashMap;

use crate::storage::{Settings, Snapshot, Tag, Task, SCHEMA_VERSION, TAG_ALL, TAG_DEFAULT};

pub fn merge_snapshots(local: &Snapshot, remote: &Snapshot) -> Snapshot {
    Snapshot {
        version: SCHEMA_VERSION,
        settings: merge_settings(&local.settings, &remote.settings),
        tags: merge_tags(&local.tags, &remote.tags),
        tasks: merge_tasks(&local.tasks, &remote.tasks),
    }
}

/// Tasks are keyed by id. Unknown remote rows are adopted; on conflict the
/// record with the greater-or-equal `updated_at` wins wholesale, remote
/// winning ties. Local rows absent from the remote survive — deletion only
/// travels as an explicit tombstone, never as omission.
pub fn merge_tasks(local: &[Task], remote: &[Task]) -> Vec<Task> {
    let mut merged: Vec<Task> = local.iter().filter(|t| !t.id.is_empty()).cloned().collect();
    let mut by_id: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.clone(), i))
        .collect();

    for rt in remote {
        if rt.id.is_empty() {
            log::warn!("Merge: skipping remote task without id ({:?})", rt.first_line());
            continue;
        }
        match by_id.get(&rt.id) {
            Some(&i) => {
                if rt.updated_at >= merged[i].updated_at {
                    merged[i] = rt.clone();
                }
            }
            None => {
                by_id.insert(rt.id.clone(), merged.len());
                merged.push(rt.clone());
            }
        }
    }
    merged
}

fn canonical_tag_name(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        TAG_DEFAULT.to_string()
    } else {
        name.to_string()
    }
}

/// Tags are keyed by trimmed name. A losing side still never regresses the
/// name-to-color mapping: on conflict only `color` and `deleted` follow the
/// newer record, and `updated_at` becomes the max of both sides.
pub fn merge_tags(local: &[Tag], remote: &[Tag]) -> Vec<Tag> {
    let mut merged: Vec<Tag> = local.to_vec();

    for rt in remote {
        let name = canonical_tag_name(&rt.name);
        match merged
            .iter_mut()
            .find(|t| canonical_tag_name(&t.name) == name)
        {
            Some(lt) => {
                if rt.updated_at >= lt.updated_at {
                    if !rt.color.is_empty() {
                        lt.color = rt.color.clone();
                    }
                    lt.updated_at = lt.updated_at.max(rt.updated_at);
                    lt.deleted = rt.deleted;
                }
            }
            None => {
                let mut tag = rt.clone();
                tag.name = name;
                merged.push(tag);
            }
        }
    }

    ensure_reserved_tags(&mut merged);
    merged
}

/// The "all" pseudo-tag and the fallback tag exist after every merge and
/// carry no tombstone, whatever the inputs said.
pub fn ensure_reserved_tags(tags: &mut Vec<Tag>) {
    for tag in tags.iter_mut() {
        if tag.name == TAG_ALL || tag.name == TAG_DEFAULT {
            tag.deleted = false;
        }
    }
    if !tags.iter().any(|t| t.name == TAG_ALL) {
        tags.insert(0, Tag::new(TAG_ALL, ""));
    }
    if !tags.iter().any(|t| t.name == TAG_DEFAULT) {
        tags.push(Tag::new(TAG_DEFAULT, ""));
    }
}

/// Only the sync configuration travels between devices. Everything else in
/// settings is device-local (fonts, geometry, hotkeys) and keeps its local
/// value no matter what the remote snapshot says.
pub fn merge_settings(local: &Settings, remote: &Settings) -> Settings {
    Settings {
        sync_enabled: remote.sync_enabled,
        sync_base_url: remote.sync_base_url.clone(),
        sync_token: remote.sync_token.clone(),
        sync_user: remote.sync_user.clone(),
        sync_timer_enabled: remote.sync_timer_enabled,
        sync_strategy_b: remote.sync_strategy_b,
        ..local.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn task(id: &str, text: &str, updated: i64) -> Task {
        Task {
            id: id.to_string(),
            text: text.to_string(),
            created_at: at(0),
            updated_at: at(updated),
            ..Task::default()
        }
    }

    fn tag(name: &str, color: &str, updated: i64, deleted: bool) -> Tag {
        Tag {
            id: format!("tag-{name}"),
            name: name.to_string(),
            color: color.to_string(),
            updated_at: at(updated),
            deleted,
        }
    }

    fn snapshot(tasks: Vec<Task>, tags: Vec<Tag>) -> Snapshot {
        Snapshot {
            version: SCHEMA_VERSION,
            settings: Settings::default(),
            tags,
            tasks,
        }
    }

    #[test]
    fn newer_remote_task_wins_wholesale() {
        let local = vec![task("a", "buy milk", 100)];
        let remote = vec![task("a", "buy milk and eggs", 150)];

        let merged = merge_tasks(&local, &remote);
        assert_eq!(merged, remote);
    }

    #[test]
    fn newer_local_task_survives() {
        let local = vec![task("a", "call dentist today", 200)];
        let remote = vec![task("a", "call dentist", 150)];

        let merged = merge_tasks(&local, &remote);
        assert_eq!(merged[0].text, "call dentist today");
    }

    #[test]
    fn equal_timestamps_favor_remote() {
        let local = vec![task("a", "local wording", 100)];
        let remote = vec![task("a", "remote wording", 100)];

        let merged = merge_tasks(&local, &remote);
        assert_eq!(merged[0].text, "remote wording");
    }

    #[test]
    fn local_only_tasks_are_not_deleted_by_omission() {
        let local = vec![task("a", "kept", 100), task("b", "also kept", 100)];
        let remote = vec![task("a", "kept", 100)];

        let merged = merge_tasks(&local, &remote);
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().any(|t| t.id == "b"));
    }

    #[test]
    fn remote_only_tasks_are_adopted() {
        let local = vec![];
        let remote = vec![task("a", "new on this device", 100)];

        let merged = merge_tasks(&local, &remote);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn records_without_ids_are_skipped() {
        let local = vec![task("", "placeholder row", 500)];
        let remote = vec![task("", "broken remote row", 500), task("a", "real", 100)];

        let merged = merge_tasks(&local, &remote);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "a");
    }

    #[test]
    fn task_tombstone_propagates() {
        let mut dead = task("a", "obsolete", 300);
        dead.deleted = true;
        let local = vec![task("a", "obsolete", 100)];

        let merged = merge_tasks(&local, &[dead]);
        assert!(merged[0].deleted);
    }

    #[test]
    fn newer_tag_tombstone_is_not_resurrected() {
        let local = vec![tag("chores", "", 200, true)];
        let remote = vec![tag("chores", "#00ff00", 100, false)];

        let merged = merge_tags(&local, &remote);
        let chores = merged.iter().find(|t| t.name == "chores").unwrap();
        assert!(chores.deleted);
        assert_eq!(chores.color, "");
    }

    #[test]
    fn newer_remote_tag_updates_color_and_tombstone_only() {
        let local = vec![tag("chores", "#112233", 100, false)];
        let remote = vec![tag("chores", "#445566", 150, true)];

        let merged = merge_tags(&local, &remote);
        let chores = merged.iter().find(|t| t.name == "chores").unwrap();
        assert_eq!(chores.color, "#445566");
        assert!(chores.deleted);
        assert_eq!(chores.updated_at, at(150));
        // Identity stays local; the record is reconciled, not replaced.
        assert_eq!(chores.id, "tag-chores");
    }

    #[test]
    fn empty_remote_tag_color_keeps_local_color() {
        let local = vec![tag("chores", "#112233", 100, false)];
        let remote = vec![tag("chores", "", 150, false)];

        let merged = merge_tags(&local, &remote);
        assert_eq!(merged.iter().find(|t| t.name == "chores").unwrap().color, "#112233");
    }

    #[test]
    fn blank_tag_name_normalizes_to_default() {
        let merged = merge_tags(&[], &[tag("  ", "#ffffff", 100, false)]);
        let default = merged.iter().find(|t| t.name == TAG_DEFAULT).unwrap();
        assert_eq!(default.color, "#ffffff");
    }

    #[test]
    fn reserved_tags_exist_exactly_once_after_any_merge() {
        let merged = merge_tags(&[], &[]);
        assert_eq!(merged.iter().filter(|t| t.name == TAG_ALL).count(), 1);
        assert_eq!(merged.iter().filter(|t| t.name == TAG_DEFAULT).count(), 1);
        assert_eq!(merged[0].name, TAG_ALL);

        let merged = merge_tags(
            &[tag(TAG_ALL, "", 10, false), tag(TAG_DEFAULT, "", 10, false)],
            &[tag(TAG_ALL, "", 20, false)],
        );
        assert_eq!(merged.iter().filter(|t| t.name == TAG_ALL).count(), 1);
        assert_eq!(merged.iter().filter(|t| t.name == TAG_DEFAULT).count(), 1);
    }

    #[test]
    fn reserved_tags_shed_tombstones() {
        let merged = merge_tags(&[], &[tag(TAG_DEFAULT, "", 100, true)]);
        assert!(!merged.iter().find(|t| t.name == TAG_DEFAULT).unwrap().deleted);
    }

    #[test]
    fn settings_merge_touches_only_the_sync_subset() {
        let mut local = Settings::default();
        local.font_family = "Iosevka".to_string();
        local.win_x = 42;
        local.hotkey_sequence = "Ctrl+Shift+Y".to_string();

        let mut remote = Settings::default();
        remote.font_family = "Arial".to_string();
        remote.win_x = 900;
        remote.sync_enabled = true;
        remote.sync_base_url = "http://sync.example.net:8080".to_string();
        remote.sync_token = "s3cret".to_string();
        remote.sync_user = "alice".to_string();
        remote.sync_timer_enabled = false;
        remote.sync_strategy_b = false;

        let merged = merge_settings(&local, &remote);
        assert_eq!(merged.font_family, "Iosevka");
        assert_eq!(merged.win_x, 42);
        assert_eq!(merged.hotkey_sequence, "Ctrl+Shift+Y");
        assert!(merged.sync_enabled);
        assert_eq!(merged.sync_base_url, "http://sync.example.net:8080");
        assert_eq!(merged.sync_token, "s3cret");
        assert_eq!(merged.sync_user, "alice");
        assert!(!merged.sync_timer_enabled);
        assert!(!merged.sync_strategy_b);
    }

    #[test]
    fn merge_is_idempotent() {
        let local = snapshot(
            vec![task("a", "local", 100), task("b", "only local", 50)],
            vec![tag("chores", "#112233", 100, false)],
        );
        let remote = snapshot(
            vec![task("a", "remote", 150), task("c", "only remote", 75)],
            vec![tag("chores", "#445566", 150, false), tag("errands", "", 60, false)],
        );

        let once = merge_snapshots(&local, &remote);
        let twice = merge_snapshots(&once, &remote);
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_produces_a_fresh_snapshot() {
        let local = snapshot(vec![task("a", "x", 100)], vec![]);
        let remote = snapshot(vec![], vec![]);

        let merged = merge_snapshots(&local, &remote);
        assert_eq!(merged.version, SCHEMA_VERSION);
        assert_eq!(merged.tasks, local.tasks);
        // Local inputs are untouched.
        assert_eq!(local.tasks[0].text, "x");
    }
}
