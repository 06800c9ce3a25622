use anyhow::Result;

use crate::app::App;

pub fn run(app: &mut App, id_prefix: &str, undo: bool) -> Result<()> {
    let id = app.find_task_id(id_prefix)?;
    app.snapshot.set_done(&id, !undo);
    app.save()?;
    let label = app
        .snapshot
        .task(&id)
        .map(|t| t.first_line().to_string())
        .unwrap_or_default();
    println!("{} {}", if undo { "Reopened" } else { "Done:" }, label);
    Ok(())
}
