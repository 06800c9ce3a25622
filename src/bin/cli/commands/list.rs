use anyhow::Result;

use crate::app::App;
use crate::OutputFormat;

use ticklist_lib::storage::TAG_ALL;

pub fn run(app: &App, tag: Option<&str>, done_only: bool, format: &OutputFormat) -> Result<()> {
    let show_completed = app.snapshot.settings.show_completed_in_main;
    let tasks: Vec<_> = app
        .snapshot
        .visible_tasks()
        .into_iter()
        .filter(|t| if done_only { t.done } else { show_completed || !t.done })
        .filter(|t| match tag {
            Some(tag) if tag != TAG_ALL => t.tag == tag,
            _ => true,
        })
        .collect();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        }
        OutputFormat::Plain => {
            if tasks.is_empty() {
                println!("No tasks.");
                return Ok(());
            }
            for task in tasks {
                let mark = if task.done { "x" } else { " " };
                let pin = if task.pinned { "*" } else { " " };
                println!(
                    "[{}]{} {:<8}  {:<12} {}",
                    mark,
                    pin,
                    &task.id[..task.id.len().min(8)],
                    task.tag,
                    task.first_line(),
                );
            }
        }
    }
    Ok(())
}
