use crate::config::Config;
use anyhow::{bail, Context, Result};
use revtree_core::sync::{StorageTransport, SyncTarget, SyncTransport};
use revtree_core::{
    document_registry, ItemRegistry, Project, ProjectRecord, VersionControl,
    VersionControlRecord, DEFAULT_TYPES,
};
use revtree_sdk::RevtreeClient;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::debug;

const WORKSPACE_FILE: &str = "workspace.json";

#[derive(Serialize, Deserialize)]
struct WorkspaceRecord {
    project: ProjectRecord,
    vcs: VersionControlRecord,
}

/// A project with its history, loaded from `.revtree/`.
pub struct Workspace {
    dir: PathBuf,
    pub config: Config,
    pub project: Project,
    pub vcs: Arc<VersionControl>,
}

fn registry() -> Arc<ItemRegistry> {
    Arc::new(document_registry(DEFAULT_TYPES))
}

impl Workspace {
    pub fn init(dir: &Path, config: Config) -> Result<Self> {
        if dir.join(WORKSPACE_FILE).exists() {
            bail!("A revtree workspace already exists in {}", dir.display());
        }
        std::fs::create_dir_all(dir)?;

        let registry = registry();
        let project = Project::with_id(config.project_id, config.title.clone(), Arc::clone(&registry));
        let vcs = Arc::new(VersionControl::new(registry));

        let workspace = Self {
            dir: dir.to_path_buf(),
            config,
            project,
            vcs,
        };
        workspace.save()?;
        Ok(workspace)
    }

    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(WORKSPACE_FILE);
        if !path.exists() {
            bail!("No revtree workspace found. Run 'revtree init' first.");
        }

        let config = Config::load(dir)?;
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let record: WorkspaceRecord = serde_json::from_str(&text)
            .with_context(|| format!("Corrupt workspace file {}", path.display()))?;

        let registry = registry();
        let project = Project::from_record(&record.project, Arc::clone(&registry));
        let vcs = Arc::new(VersionControl::from_record(&record.vcs, registry));
        vcs.mark_project_changed();

        debug!(
            "Loaded workspace {} with {} revisions",
            dir.display(),
            vcs.revisions().len()
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            project,
            vcs,
        })
    }

    pub fn save(&self) -> Result<()> {
        let record = WorkspaceRecord {
            project: self.project.to_record(),
            vcs: self.vcs.to_record(),
        };

        self.config.save(&self.dir)?;
        let mut file = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut file, &record)?;
        file.flush()?;
        file.persist(self.file_path())
            .with_context(|| format!("Failed to write {}", self.file_path().display()))?;
        Ok(())
    }

    pub fn file_path(&self) -> PathBuf {
        self.dir.join(WORKSPACE_FILE)
    }

    pub fn transport(&self) -> Result<Arc<dyn SyncTransport>> {
        open_transport(self.config.require_remote()?)
    }

    pub fn sync_target(&self) -> SyncTarget {
        SyncTarget::new(
            Arc::clone(&self.vcs),
            self.config.project_id,
            self.config.title.clone(),
        )
    }
}

/// HTTP remotes go through the sdk client, anything else is a SQLite path.
pub fn open_transport(remote: &str) -> Result<Arc<dyn SyncTransport>> {
    if remote.starts_with("http://") || remote.starts_with("https://") {
        return Ok(Arc::new(RevtreeClient::new(remote)));
    }

    let transport = StorageTransport::open(remote)
        .with_context(|| format!("Failed to open remote database {}", remote))?;
    Ok(Arc::new(transport))
}
