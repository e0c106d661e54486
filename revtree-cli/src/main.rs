use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod commands;
mod config;
mod display;
mod workspace;

use commands::{checkout, commit, diff, init, item, log, reset, serve, stash, status, sync, watch};
use config::{workspace_dir, Config, DEFAULT_PORT};

#[derive(Parser)]
#[command(name = "revtree")]
#[command(version, about = "Version control for structured project data", long_about = None)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short = 'C', long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a workspace in the project directory
    Init {
        /// Project title (defaults to the directory name)
        #[arg(short, long)]
        title: Option<String>,

        /// Remote URL or SQLite path
        #[arg(short, long)]
        remote: Option<String>,
    },

    /// Add a tracked item
    Add {
        /// Item type (project_info, track, pattern)
        item_type: String,

        /// Item name
        name: String,

        /// Initial fields as key=value
        #[arg(short, long = "field")]
        fields: Vec<String>,
    },

    /// Set or remove fields of an item
    Set {
        /// Item name or uuid prefix
        item: String,

        /// Fields as key=value
        assignments: Vec<String>,

        /// Fields to remove
        #[arg(long)]
        unset: Vec<String>,
    },

    /// Remove a tracked item
    Rm {
        /// Item name or uuid prefix
        item: String,
    },

    /// Show current status
    Status,

    /// Show uncommitted changes, or the changes recorded by a revision
    Diff {
        /// Revision id prefix
        revision: Option<String>,
    },

    /// Record changes as a new revision
    Commit {
        /// Revision message
        message: String,

        /// Indices from `status` to include (defaults to all)
        #[arg(long)]
        only: Vec<usize>,
    },

    /// Show revision history
    Log {
        /// Number of revisions to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only the path from the root to the head
        #[arg(long)]
        path: bool,
    },

    /// Move the head to a revision and materialize it
    Checkout {
        /// Revision id prefix
        revision: String,

        /// Do not ask before discarding changes
        #[arg(short, long)]
        yes: bool,
    },

    /// Restore items as they were at a revision
    CherryPick {
        /// Revision id prefix
        revision: String,

        /// Item names or uuid prefixes
        #[arg(required = true)]
        items: Vec<String>,
    },

    /// Discard uncommitted changes
    Reset {
        /// Indices from `status` to discard (defaults to all)
        #[arg(long)]
        only: Vec<usize>,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Put changes aside
    Stash {
        #[command(subcommand)]
        action: StashAction,
    },

    /// Fetch revisions from the remote
    Pull {
        /// Only fetch revision metadata
        #[arg(long)]
        fetch_only: bool,

        /// Restrict payload transfer to these revision id prefixes
        #[arg(long)]
        only: Vec<String>,
    },

    /// Upload local revisions to the remote
    Push {
        /// Restrict the upload to these revision id prefixes
        #[arg(long)]
        only: Vec<String>,
    },

    /// Create a workspace from a remote project
    Clone {
        /// Remote project id
        project_id: Uuid,

        /// Remote URL or SQLite path
        #[arg(short, long)]
        remote: String,
    },

    /// Delete this project from the remote
    DeleteRemote {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Run a remote server
    Serve {
        /// Port for the API server
        #[arg(short, long)]
        port: Option<u16>,

        /// Database path
        #[arg(short, long)]
        db: Option<PathBuf>,
    },

    /// Reprint the status whenever the workspace changes
    Watch,
}

#[derive(Subcommand)]
enum StashAction {
    /// Stash changes under a message
    Save {
        message: String,

        /// Indices from `status` to stash (defaults to all)
        #[arg(long)]
        only: Vec<usize>,

        /// Keep the changes in the project
        #[arg(long)]
        keep: bool,
    },
    /// Apply a stash by id prefix or message
    Apply {
        key: String,

        /// Keep the stash after applying it
        #[arg(long)]
        keep: bool,
    },
    /// List stashes
    List,
    /// Move every change to the quick stash
    Quick,
    /// Apply and clear the quick stash
    Pop,
}

/// Runs a command that blocks on the network off the async runtime.
async fn blocking<F>(job: F) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(job).await?
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let dir = workspace_dir(cli.dir.clone())?;

    match cli.command {
        Commands::Init { title, remote } => {
            init::run(cli.dir, title, remote)?;
        }
        Commands::Add {
            item_type,
            name,
            fields,
        } => {
            item::add(&dir, item_type, name, fields)?;
        }
        Commands::Set {
            item,
            assignments,
            unset,
        } => {
            item::set(&dir, item, assignments, unset)?;
        }
        Commands::Rm { item } => {
            item::remove(&dir, item)?;
        }
        Commands::Status => {
            status::run(&dir)?;
        }
        Commands::Diff { revision } => {
            diff::run(&dir, revision)?;
        }
        Commands::Commit { message, only } => {
            commit::run(&dir, message, only)?;
        }
        Commands::Log { limit, path } => {
            log::run(&dir, limit, path)?;
        }
        Commands::Checkout { revision, yes } => {
            checkout::checkout(&dir, revision, yes)?;
        }
        Commands::CherryPick { revision, items } => {
            checkout::cherry_pick(&dir, revision, items)?;
        }
        Commands::Reset { only, yes } => {
            reset::run(&dir, only, yes)?;
        }
        Commands::Stash { action } => match action {
            StashAction::Save {
                message,
                only,
                keep,
            } => stash::save(&dir, message, only, keep)?,
            StashAction::Apply { key, keep } => stash::apply(&dir, key, keep)?,
            StashAction::List => stash::list(&dir)?,
            StashAction::Quick => stash::quick(&dir)?,
            StashAction::Pop => stash::pop(&dir)?,
        },
        Commands::Pull { fetch_only, only } => {
            blocking(move || sync::pull(&dir, fetch_only, only)).await?;
        }
        Commands::Push { only } => {
            blocking(move || sync::push(&dir, only)).await?;
        }
        Commands::Clone { project_id, remote } => {
            blocking(move || sync::clone(&dir, project_id, remote)).await?;
        }
        Commands::DeleteRemote { yes } => {
            blocking(move || sync::delete_remote(&dir, yes)).await?;
        }
        Commands::Serve { port, db } => {
            let port = match port {
                Some(port) => port,
                None => Config::load(&dir).map(|c| c.port).unwrap_or(DEFAULT_PORT),
            };
            serve::run(port, db).await?;
        }
        Commands::Watch => {
            watch::run(dir).await?;
        }
    }

    Ok(())
}
