use crate::config::WORKSPACE_DIR;
use anyhow::Result;
use colored::Colorize;
use revtree_server::RevtreeServer;
use std::path::PathBuf;

pub async fn run(port: u16, db: Option<PathBuf>) -> Result<()> {
    let db_path = match db {
        Some(path) => path,
        None => std::env::current_dir()?.join(WORKSPACE_DIR).join("remote.db"),
    };

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    println!("{}", "🚀 Starting revtree server...".bold().cyan());
    println!("   {}: {:?}", "Database".bold(), db_path);

    let server = RevtreeServer::new(db_path)?;

    println!(
        "   {}: {}",
        "API Server".bold(),
        format!("http://localhost:{}", port).green()
    );
    println!();
    println!("{}", "Press Ctrl+C to stop".dimmed());
    println!();

    let addr = format!("0.0.0.0:{}", port).parse()?;
    server.serve(addr).await?;

    Ok(())
}
