use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const WORKSPACE_DIR: &str = ".revtree";
const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_PORT: u16 = 3030;

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Contents of `.revtree/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub project_id: Uuid,
    pub title: String,
    /// `http(s)://` URL or path to a SQLite file.
    #[serde(default)]
    pub remote: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Config {
    pub fn new(project_id: Uuid, title: impl Into<String>, remote: Option<String>) -> Self {
        Self {
            project_id,
            title: title.into(),
            remote,
            port: DEFAULT_PORT,
        }
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self)?;
        std::fs::write(dir.join(CONFIG_FILE), text)?;
        Ok(())
    }

    pub fn require_remote(&self) -> Result<&str> {
        self.remote.as_deref().context(
            "No remote configured. Set `remote` in .revtree/config.toml or pass --remote",
        )
    }
}

/// The `.revtree` directory under `root`, or under the current directory.
pub fn workspace_dir(root: Option<PathBuf>) -> Result<PathBuf> {
    let root = match root {
        Some(root) => root,
        None => std::env::current_dir().context("Failed to read the current directory")?,
    };
    Ok(root.join(WORKSPACE_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_roundtrip() {
        let dir = TempDir::new().unwrap();
        let config = Config::new(Uuid::new_v4(), "Song", Some("http://localhost:3030".into()));

        config.save(dir.path()).unwrap();
        assert_eq!(Config::load(dir.path()).unwrap(), config);
    }

    #[test]
    fn test_port_defaults_when_missing() {
        let dir = TempDir::new().unwrap();
        let id = Uuid::new_v4();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            format!("project_id = \"{}\"\ntitle = \"Song\"\n", id),
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.remote, None);
        assert!(config.require_remote().is_err());
    }
}
