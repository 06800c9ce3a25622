use anyhow::Result;

use crate::app::App;

use ticklist_lib::storage::TAG_DEFAULT;

pub fn run(app: &mut App, text: &str, tag: Option<&str>, pin: bool) -> Result<()> {
    let id = app.snapshot.add_task(text, tag.unwrap_or(TAG_DEFAULT));
    if pin {
        let order = app.snapshot.next_order_in_group(true);
        if let Some(task) = app.snapshot.task_mut(&id) {
            task.pinned = true;
            task.order = order;
        }
    }
    app.save()?;
    println!("Added {}", &id[..8]);
    Ok(())
}
