use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::config::{SyncTrigger, DEBOUNCE_SECS, PULL_INTERVAL_SECS, PUSH_INTERVAL_SECS};
use super::manager::SyncManager;

/// Messages to control the sync scheduler
#[derive(Debug)]
pub enum SchedulerMessage {
    /// A local edit happened; restart the debounce window.
    Dirty,
    /// Sync settings changed; re-evaluate timers.
    Reload,
    /// App closing.
    Shutdown,
}

/// Handle for the timer loop driving the sync orchestrator.
pub struct SyncScheduler {
    sender: mpsc::Sender<SchedulerMessage>,
    task: tokio::task::JoinHandle<()>,
}

impl SyncScheduler {
    /// Notify the scheduler that the snapshot is dirty (restarts the
    /// debounce window).
    pub fn mark_dirty(&self) {
        let _ = self.sender.try_send(SchedulerMessage::Dirty);
    }

    /// Notify the scheduler that sync settings changed.
    pub fn reload(&self) {
        let _ = self.sender.try_send(SchedulerMessage::Reload);
    }

    /// Stop the loop and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.sender.send(SchedulerMessage::Shutdown).await;
        let _ = self.task.await;
    }
}

/// Start the sync timer loop.
///
/// One task drives all four triggers through the manager, so two cycles can
/// never run concurrently: a timer that fires while a cycle is in flight is
/// skipped by the manager's try-lock, and the loop itself is strictly
/// sequential.
pub fn start_sync_scheduler(manager: Arc<SyncManager>) -> SyncScheduler {
    let (tx, rx) = mpsc::channel(32);
    let task = tokio::spawn(async move {
        scheduler_loop(manager, rx).await;
    });
    SyncScheduler { sender: tx, task }
}

/// The timer that fires next.
#[derive(Debug, PartialEq, Eq)]
struct Deadline {
    at: Instant,
    trigger: SyncTrigger,
}

/// Pick the soonest of the configured timers. The push timer only counts
/// when the "always push" preference is on; the debounce deadline only when
/// edit-triggered pushes are on and an edit armed it.
fn soonest_deadline(
    next_pull: Instant,
    next_push: Instant,
    debounce_due: Option<Instant>,
    push_timer_enabled: bool,
    edit_push_enabled: bool,
) -> Deadline {
    let mut deadline = Deadline {
        at: next_pull,
        trigger: SyncTrigger::PeriodicPull,
    };
    if push_timer_enabled && next_push < deadline.at {
        deadline = Deadline {
            at: next_push,
            trigger: SyncTrigger::PeriodicPush,
        };
    }
    if edit_push_enabled {
        if let Some(due) = debounce_due {
            if due < deadline.at {
                deadline = Deadline {
                    at: due,
                    trigger: SyncTrigger::DebouncePush,
                };
            }
        }
    }
    deadline
}

async fn scheduler_loop(manager: Arc<SyncManager>, mut receiver: mpsc::Receiver<SchedulerMessage>) {
    log::info!("Sync scheduler started");

    manager.handle_trigger(SyncTrigger::Startup).await;

    let mut next_pull = Instant::now() + Duration::from_secs(PULL_INTERVAL_SECS);
    let mut next_push = Instant::now() + Duration::from_secs(PUSH_INTERVAL_SECS);
    let mut debounce_due: Option<Instant> = None;

    loop {
        if !manager.sync_ready() {
            // Disabled: no timers run; wait for a control message and
            // re-evaluate.
            match receiver.recv().await {
                Some(SchedulerMessage::Shutdown) | None => break,
                Some(SchedulerMessage::Dirty) | Some(SchedulerMessage::Reload) => {
                    next_pull = Instant::now() + Duration::from_secs(PULL_INTERVAL_SECS);
                    next_push = Instant::now() + Duration::from_secs(PUSH_INTERVAL_SECS);
                    debounce_due = None;
                    continue;
                }
            }
        }

        let deadline = soonest_deadline(
            next_pull,
            next_push,
            debounce_due,
            manager.push_timer_enabled(),
            manager.edit_push_enabled(),
        );

        tokio::select! {
            _ = tokio::time::sleep_until(deadline.at) => {
                manager.handle_trigger(deadline.trigger).await;
                match deadline.trigger {
                    SyncTrigger::PeriodicPull => {
                        next_pull = Instant::now() + Duration::from_secs(PULL_INTERVAL_SECS);
                    }
                    SyncTrigger::PeriodicPush => {
                        next_push = Instant::now() + Duration::from_secs(PUSH_INTERVAL_SECS);
                    }
                    SyncTrigger::DebouncePush => {
                        debounce_due = None;
                    }
                    SyncTrigger::Startup => {}
                }
            }

            msg = receiver.recv() => {
                match msg {
                    Some(SchedulerMessage::Dirty) => {
                        debounce_due = Some(Instant::now() + Duration::from_secs(DEBOUNCE_SECS));
                    }
                    Some(SchedulerMessage::Reload) => {
                        log::info!("Sync scheduler: settings changed, re-evaluating");
                        continue;
                    }
                    Some(SchedulerMessage::Shutdown) | None => break,
                }
            }
        }
    }

    log::info!("Sync scheduler stopped");
}
