use anyhow::Result;

use crate::app::App;

pub fn run(app: &mut App) -> Result<()> {
    let completed = app.snapshot.purge_completed();
    let deleted = app.snapshot.purge_deleted();
    app.save()?;
    println!("Purged {} completed, {} deleted", completed, deleted);
    Ok(())
}
