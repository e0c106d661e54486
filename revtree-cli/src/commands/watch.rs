use crate::workspace::Workspace;
use anyhow::Result;
use colored::Colorize;
use notify::{RecursiveMode, Watcher};
use notify_debouncer_full::{new_debouncer, DebounceEventResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Reprints the status every time the workspace file changes on disk.
pub async fn run(dir: PathBuf) -> Result<()> {
    let workspace = Workspace::open(&dir)?;
    let file = workspace.file_path();
    super::status::print_status(&workspace);
    drop(workspace);

    let (tx, mut rx) = mpsc::channel(16);

    let mut debouncer = new_debouncer(
        Duration::from_millis(500),
        None,
        move |result: DebounceEventResult| {
            if let Err(e) = tx.blocking_send(result) {
                error!("Failed to send event: {}", e);
            }
        },
    )?;

    // the file is replaced on save, so watch its directory
    debouncer.watcher().watch(&dir, RecursiveMode::NonRecursive)?;
    info!("Watching {:?}", file);

    println!();
    println!("{}", "Watching for changes, press Ctrl+C to stop".dimmed());

    loop {
        tokio::select! {
            result = rx.recv() => match result {
                Some(Ok(events)) => {
                    let touched = events
                        .iter()
                        .any(|event| event.event.paths.iter().any(|p| p.file_name() == file.file_name()));
                    if touched {
                        reprint(&dir);
                    }
                }
                Some(Err(errors)) => {
                    for e in errors {
                        error!("Watch error: {:?}", e);
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}

fn reprint(dir: &Path) {
    println!();
    println!("{}", "━".repeat(80).bright_black());
    match Workspace::open(dir) {
        Ok(workspace) => super::status::print_status(&workspace),
        Err(e) => println!("{} {}", "Failed to reload workspace:".red(), e),
    }
}
