use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Revision not found: {0}")]
    RevisionNotFound(String),

    #[error("Tracked item not found: {0}")]
    ItemNotFound(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Unknown tracked item type: {0}")]
    UnknownItemType(String),

    #[error("Nothing selected")]
    EmptySelection,

    #[error("Selection index {index} is out of range ({len} records)")]
    InvalidSelection { index: usize, len: usize },

    #[error("Stash not found: {0}")]
    StashNotFound(String),

    #[error("Transport error: {0}")]
    Transport(#[from] crate::sync::TransportError),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}
