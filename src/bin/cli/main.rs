mod app;
mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ticklist", about = "Personal task list with multi-device sync", version)]
struct Cli {
    /// Use a specific snapshot file (default: the per-user data directory)
    #[arg(long, global = true)]
    file: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// List tasks (pinned group first)
    List {
        /// Only tasks with this tag
        #[arg(long)]
        tag: Option<String>,
        /// Only completed tasks
        #[arg(long)]
        done: bool,
    },

    /// Add a task
    Add {
        text: String,
        /// Tag name (created if new)
        #[arg(long)]
        tag: Option<String>,
        /// Pin the task
        #[arg(long)]
        pin: bool,
    },

    /// Mark a task done (id prefix)
    Done {
        id: String,
        /// Reopen instead
        #[arg(long)]
        undo: bool,
    },

    /// Soft-delete a task (id prefix)
    Rm { id: String },

    /// Permanently erase completed and deleted tasks
    Purge,

    /// Overwrite the local file with the remote document
    Pull,

    /// Send the local file to the server
    Push,

    /// Pull, merge, save and push once
    Sync,

    /// Keep syncing in the background; line commands for local edits
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Command::List { tag, done } => {
            let app = app::App::new(cli.file)?;
            commands::list::run(&app, tag.as_deref(), done, &cli.format)?;
        }
        Command::Add { text, tag, pin } => {
            let mut app = app::App::new(cli.file)?;
            commands::add::run(&mut app, &text, tag.as_deref(), pin)?;
        }
        Command::Done { id, undo } => {
            let mut app = app::App::new(cli.file)?;
            commands::done::run(&mut app, &id, undo)?;
        }
        Command::Rm { id } => {
            let mut app = app::App::new(cli.file)?;
            commands::rm::run(&mut app, &id)?;
        }
        Command::Purge => {
            let mut app = app::App::new(cli.file)?;
            commands::purge::run(&mut app)?;
        }
        Command::Pull => {
            let app = app::App::new(cli.file)?;
            commands::sync::run_pull(&app).await?;
        }
        Command::Push => {
            let app = app::App::new(cli.file)?;
            commands::sync::run_push(&app).await?;
        }
        Command::Sync => {
            let app = app::App::new(cli.file)?;
            commands::sync::run_sync(app).await?;
        }
        Command::Watch => {
            let app = app::App::new(cli.file)?;
            commands::sync::run_watch(app).await?;
        }
    }

    Ok(())
}
