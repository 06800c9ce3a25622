use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Schema version written into every snapshot document.
pub const SCHEMA_VERSION: u32 = 2;

/// Pseudo-tag matching every task. Always present, never deleted.
pub const TAG_ALL: &str = "All";

/// Fallback tag for tasks without a usable tag name. Always present, never deleted.
pub const TAG_DEFAULT: &str = "Default";

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Task {
    pub id: String,
    pub text: String,
    pub tag: String,
    pub done: bool,
    pub pinned: bool,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub order: f64,
    pub deleted: bool,
}

impl Default for Task {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            // Deliberately empty: a record that arrives without an id is
            // unusable for merge and gets skipped there.
            id: String::new(),
            text: String::new(),
            tag: TAG_DEFAULT.to_string(),
            done: false,
            pinned: false,
            note: String::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            order: 0.0,
            deleted: false,
        }
    }
}

impl Task {
    pub fn new(text: impl Into<String>, tag: impl Into<String>) -> Self {
        let now = Utc::now();
        let tag = tag.into();
        Self {
            id: new_id(),
            text: text.into(),
            tag: if tag.trim().is_empty() {
                TAG_DEFAULT.to_string()
            } else {
                tag
            },
            done: false,
            pinned: false,
            note: String::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            order: now.timestamp_millis() as f64 / 1000.0,
            deleted: false,
        }
    }

    /// First line of the task text, used as its display label.
    pub fn first_line(&self) -> &str {
        self.text.lines().next().unwrap_or("")
    }

    /// Bump `updated_at` and keep `completed_at` consistent with `done`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.completed_at = if self.done { Some(self.updated_at) } else { None };
    }

    pub fn set_done(&mut self, done: bool) {
        self.done = done;
        self.touch();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub color: String,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
}

impl Default for Tag {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            color: String::new(),
            updated_at: Utc::now(),
            deleted: false,
        }
    }
}

impl Tag {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: new_id(),
            name: if name.trim().is_empty() {
                TAG_DEFAULT.to_string()
            } else {
                name.trim().to_string()
            },
            color: color.into(),
            updated_at: Utc::now(),
            deleted: false,
        }
    }
}

/// Full application settings. Only the `sync_*` subset ever travels to other
/// devices; everything else is device-local and protected from merge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub show_completed_in_main: bool,
    pub auto_archive_completed: bool,

    pub font_family: String,
    pub font_size: u32,

    pub panel_opacity: u8,
    pub always_on_top: bool,

    pub hotkey_enabled: bool,
    pub hotkey_sequence: String,
    pub hotkey_force_top: bool,

    pub win_x: i32,
    pub win_y: i32,
    pub win_w: u32,
    pub win_h: u32,

    pub sync_enabled: bool,
    pub sync_base_url: String,
    pub sync_token: String,
    pub sync_user: String,
    pub sync_timer_enabled: bool,
    pub sync_strategy_b: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_completed_in_main: true,
            auto_archive_completed: true,
            font_family: String::new(),
            font_size: 10,
            panel_opacity: 160,
            always_on_top: false,
            hotkey_enabled: false,
            hotkey_sequence: "Ctrl+Alt+T".to_string(),
            hotkey_force_top: true,
            win_x: 200,
            win_y: 200,
            win_w: 360,
            win_h: 560,
            sync_enabled: false,
            sync_base_url: String::new(),
            sync_token: String::new(),
            sync_user: "default".to_string(),
            sync_timer_enabled: true,
            sync_strategy_b: true,
        }
    }
}

/// The unit of load, save and transmit: one value holding everything a
/// device knows. Merge never edits a snapshot in place; it builds a new one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Snapshot {
    pub version: u32,
    pub settings: Settings,
    pub tags: Vec<Tag>,
    pub tasks: Vec<Task>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            settings: Settings::default(),
            tags: vec![Tag::new(TAG_ALL, ""), Tag::new(TAG_DEFAULT, "")],
            tasks: Vec::new(),
        }
    }
}

impl Snapshot {
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Largest order value among live tasks in the same pinned group, plus
    /// one. New tasks land at the top of their group.
    pub fn next_order_in_group(&self, pinned: bool) -> f64 {
        self.tasks
            .iter()
            .filter(|t| !t.deleted && t.pinned == pinned)
            .map(|t| t.order)
            .fold(f64::NEG_INFINITY, f64::max)
            .max(Utc::now().timestamp_millis() as f64 / 1000.0)
            + 1.0
    }

    /// Add a task at the top of the unpinned group. Returns its id.
    pub fn add_task(&mut self, text: impl Into<String>, tag: impl Into<String>) -> String {
        let mut task = Task::new(text, tag);
        task.order = self.next_order_in_group(false);
        let id = task.id.clone();
        if !self.tags.iter().any(|t| t.name == task.tag && !t.deleted) {
            self.tags.push(Tag::new(task.tag.clone(), ""));
        }
        self.tasks.push(task);
        id
    }

    pub fn set_done(&mut self, id: &str, done: bool) -> bool {
        match self.task_mut(id) {
            Some(task) => {
                task.set_done(done);
                true
            }
            None => false,
        }
    }

    /// Soft-delete: flips the tombstone so the deletion can propagate to
    /// other devices through merge.
    pub fn soft_delete_task(&mut self, id: &str) -> bool {
        match self.task_mut(id) {
            Some(task) => {
                task.deleted = true;
                task.touch();
                true
            }
            None => false,
        }
    }

    pub fn restore_task(&mut self, id: &str) -> bool {
        match self.task_mut(id) {
            Some(task) => {
                task.deleted = false;
                task.touch();
                true
            }
            None => false,
        }
    }

    /// Physically remove a row, bypassing the tombstone. Used to discard
    /// placeholder rows that were never committed.
    pub fn remove_task_hard(&mut self, id: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        self.tasks.len() != before
    }

    /// Permanently erase completed (non-deleted) rows.
    pub fn purge_completed(&mut self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|t| !(t.done && !t.deleted));
        before - self.tasks.len()
    }

    /// Permanently erase soft-deleted rows.
    pub fn purge_deleted(&mut self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|t| !t.deleted);
        before - self.tasks.len()
    }

    /// Live tasks in display order: pinned group first, each group sorted
    /// by descending order value.
    pub fn visible_tasks(&self) -> Vec<&Task> {
        let mut pinned: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| !t.deleted && t.pinned)
            .collect();
        let mut normal: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| !t.deleted && !t.pinned)
            .collect();
        pinned.sort_by(|a, b| b.order.total_cmp(&a.order));
        normal.sort_by(|a, b| b.order.total_cmp(&a.order));
        pinned.extend(normal);
        pinned
    }
}
