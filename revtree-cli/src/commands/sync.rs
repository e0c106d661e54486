use crate::config::Config;
use crate::workspace::{open_transport, Workspace};
use anyhow::{bail, Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use revtree_core::sync::{SyncOutcome, SyncService, SyncTarget, SyncTransport};
use revtree_core::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Starts one operation on a fresh service and blocks until it reports.
fn run_service<F>(transport: Arc<dyn SyncTransport>, label: &str, start: F) -> Result<SyncOutcome>
where
    F: FnOnce(&SyncService) -> bool,
{
    let (service, mut events) = SyncService::new(transport);
    if !start(&service) {
        bail!("A {} is already running", label);
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
    spinner.set_message(format!("{}...", label));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let event = events.blocking_recv();
    spinner.finish_and_clear();

    event
        .map(|event| event.outcome)
        .context("Sync worker stopped without reporting")
}

fn failed(errors: Vec<String>) -> anyhow::Error {
    anyhow::anyhow!("Remote error: {}", errors.join("; "))
}

fn restrict(workspace: &Workspace, only: &[String]) -> Result<SyncTarget> {
    let ids = only
        .iter()
        .map(|prefix| workspace.vcs.resolve_revision(prefix).map(|r| r.id()))
        .collect::<revtree_core::Result<Vec<Uuid>>>()?;
    Ok(workspace.sync_target().with_only(ids))
}

pub fn pull(dir: &Path, fetch_only: bool, only: Vec<String>) -> Result<()> {
    let workspace = Workspace::open(dir)?;
    let transport = workspace.transport()?;
    let target = restrict(&workspace, &only)?;
    let before = workspace.vcs.revisions().len();

    let outcome = if fetch_only {
        run_service(transport, "Fetching", |service| service.fetch(target))?
    } else {
        run_service(transport, "Pulling", |service| service.pull(target))?
    };

    let added = workspace.vcs.revisions().len() - before;
    workspace.save()?;

    match outcome {
        SyncOutcome::FetchDone => {
            println!("{}", "✓ Fetch complete".green().bold());
            println!("  {}: {}", "New revisions".bold(), added);
            let shallow = workspace
                .vcs
                .revisions()
                .iter()
                .filter(|r| r.is_shallow())
                .count();
            if shallow > 0 {
                println!(
                    "  {} revision(s) without payload, run {} to download them",
                    shallow.to_string().yellow(),
                    "revtree pull".cyan()
                );
            }
        }
        SyncOutcome::SyncDone { nothing_to_sync: true } => {
            println!("{}", "Already up to date".green());
        }
        SyncOutcome::SyncDone { .. } => {
            println!("{}", "✓ Pull complete".green().bold());
            println!("  {}: {}", "New revisions".bold(), added);
        }
        SyncOutcome::ProjectMissing => {
            println!("{}", "The remote does not have this project yet".yellow());
            println!("Run {} to upload it", "revtree push".cyan());
        }
        SyncOutcome::Cancelled => println!("{}", "Pull cancelled".yellow()),
        SyncOutcome::Failed(errors) => return Err(failed(errors)),
        other => debug!("Unexpected pull outcome {:?}", other),
    }

    Ok(())
}

pub fn push(dir: &Path, only: Vec<String>) -> Result<()> {
    let workspace = Workspace::open(dir)?;
    let transport = workspace.transport()?;
    let target = restrict(&workspace, &only)?;

    let outcome = run_service(transport, "Pushing", |service| service.push(target))?;
    workspace.save()?;

    match outcome {
        SyncOutcome::PushDone { pushed: 0 } => println!("{}", "Everything up to date".green()),
        SyncOutcome::PushDone { pushed } => {
            println!("{}", "✓ Push complete".green().bold());
            println!("  {}: {}", "Revisions uploaded".bold(), pushed);
        }
        SyncOutcome::Cancelled => println!("{}", "Push cancelled".yellow()),
        SyncOutcome::Failed(errors) => return Err(failed(errors)),
        other => debug!("Unexpected push outcome {:?}", other),
    }

    Ok(())
}

pub fn clone(dir: &Path, project_id: Uuid, remote: String) -> Result<()> {
    if dir.exists() {
        bail!("{} already exists", dir.display());
    }

    let transport = open_transport(&remote)?;
    let listed = transport
        .fetch_project(project_id)
        .map_err(|e| failed(e.errors))?
        .with_context(|| format!("Project {} not found on {}", project_id, remote))?;

    let config = Config::new(project_id, listed.title.clone(), Some(remote));
    let mut workspace = Workspace::init(dir, config)?;

    let result = materialize_clone(&mut workspace, transport);
    if result.is_err() {
        if let Err(e) = std::fs::remove_dir_all(dir) {
            debug!("Failed to clean up {}: {}", dir.display(), e);
        }
    }
    result?;

    println!("{}", "✓ Clone complete".green().bold());
    println!("  {}: {}", "Project".bold(), listed.title);
    println!("  {}: {}", "Revisions".bold(), workspace.vcs.revisions().len());
    println!("  {}: {}", "Items".bold(), workspace.project.items().count());
    Ok(())
}

fn materialize_clone(workspace: &mut Workspace, transport: Arc<dyn SyncTransport>) -> Result<()> {
    let target = workspace.sync_target();
    match run_service(transport, "Cloning", |service| service.clone_project(target))? {
        SyncOutcome::CloneDone => {}
        SyncOutcome::ProjectMissing => bail!("The project disappeared from the remote"),
        SyncOutcome::Cancelled => bail!("Clone cancelled"),
        SyncOutcome::Failed(errors) => return Err(failed(errors)),
        other => bail!("Unexpected clone outcome {:?}", other),
    }

    let heading = workspace.vcs.heading_revision();
    match workspace.vcs.checkout(&mut workspace.project, &heading) {
        Ok(()) => {}
        // nothing to materialize for a project without history
        Err(Error::InvalidOperation(reason)) => debug!("Skipping checkout: {}", reason),
        Err(e) => return Err(e.into()),
    }

    workspace.save()
}

pub fn delete_remote(dir: &Path, yes: bool) -> Result<()> {
    let workspace = Workspace::open(dir)?;
    let transport = workspace.transport()?;

    let prompt = format!(
        "Delete project '{}' from {}? This cannot be undone",
        workspace.config.title,
        workspace.config.require_remote()?
    );
    if !super::confirm(&prompt, yes)? {
        println!("{}", "Delete aborted".dimmed());
        return Ok(());
    }

    let target = workspace.sync_target();
    match run_service(transport, "Deleting", |service| service.delete_project(target))? {
        SyncOutcome::DeleteDone => {
            workspace.save()?;
            println!("{}", "✓ Remote project deleted".green().bold());
            Ok(())
        }
        SyncOutcome::Failed(errors) => Err(failed(errors)),
        other => bail!("Unexpected delete outcome {:?}", other),
    }
}
