use anyhow::Result;

use crate::app::App;

/// Soft-delete: the row keeps a tombstone so the deletion reaches other
/// devices through merge. `purge` erases tombstones for good.
pub fn run(app: &mut App, id_prefix: &str) -> Result<()> {
    let id = app.find_task_id(id_prefix)?;
    app.snapshot.soft_delete_task(&id);
    app.save()?;
    println!("Deleted {}", &id[..8]);
    Ok(())
}
