use crate::config::{workspace_dir, Config};
use crate::workspace::Workspace;
use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;
use uuid::Uuid;

pub fn run(root: Option<PathBuf>, title: Option<String>, remote: Option<String>) -> Result<()> {
    let dir = workspace_dir(root)?;

    let title = title.unwrap_or_else(|| {
        dir.parent()
            .and_then(|p| p.file_name())
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "untitled".to_string())
    });

    let workspace = Workspace::init(&dir, Config::new(Uuid::new_v4(), title, remote))?;

    println!("{}", "✓ Initialized revtree workspace".green().bold());
    println!("  {}: {}", "Project".bold(), workspace.config.title);
    println!("  {}: {}", "Project ID".bold(), workspace.config.project_id);
    println!("  {}: {}", "Location".bold(), dir.display());
    if let Some(remote) = &workspace.config.remote {
        println!("  {}: {}", "Remote".bold(), remote);
    }

    Ok(())
}
