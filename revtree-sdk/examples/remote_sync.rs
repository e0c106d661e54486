use revtree_core::document::TRACK;
use revtree_core::sync::{SyncOutcome, SyncService, SyncTarget};
use revtree_core::{document_registry, Project, VersionControl, DEFAULT_TYPES};
use revtree_sdk::RevtreeClient;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🎛  Syncing a project with a revtree remote\n");

    let client = Arc::new(RevtreeClient::new("http://localhost:3030"));

    if !client.health_check()? {
        eprintln!("Error: revtree server is not running!");
        eprintln!("Start it with: revtree serve");
        return Ok(());
    }

    println!("✓ Connected to {}", client.base_url());
    println!();

    let registry = Arc::new(document_registry(DEFAULT_TYPES));
    let vcs = Arc::new(VersionControl::new(Arc::clone(&registry)));
    let mut project = Project::new("Demo song", registry);

    println!("📝 Adding tracks");
    let drums = project.add_document(TRACK, "Drums", &[])?;
    project.add_document(TRACK, "Bass", &[("volume".to_string(), serde_json::json!(0.7))])?;
    vcs.commit_all(&project, "Add drums and bass")?;

    println!("📝 Muting drums");
    project.set_field(drums, "muted", serde_json::json!(true))?;
    vcs.commit_all(&project, "Mute drums")?;
    println!();

    let (service, mut events) = SyncService::new(client.clone());
    service.push(SyncTarget::new(Arc::clone(&vcs), project.id(), project.title()));

    match events.blocking_recv().map(|event| event.outcome) {
        Some(SyncOutcome::PushDone { pushed }) => println!("✓ Pushed {} revisions", pushed),
        Some(other) => println!("✗ Push finished with {:?}", other),
        None => println!("✗ Sync service stopped"),
    }

    println!();
    println!("Projects on the remote:");
    for summary in client.list_projects()? {
        println!("  {} {}", summary.id, summary.title);
    }

    Ok(())
}
