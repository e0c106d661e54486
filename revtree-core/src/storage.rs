use crate::error::{Error, Result};
use crate::sync::{ProjectDto, ProjectUpdate, RevisionDto, RevisionPayload};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

const SCHEMA_VERSION: i32 = 1;

/// Remote-side store of projects and their revisions.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let mut storage = Self { conn };
        storage.initialize()?;
        Ok(storage)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut storage = Self { conn };
        storage.initialize()?;
        Ok(storage)
    }

    fn initialize(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                head TEXT,
                created TEXT NOT NULL,
                updated TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS revisions (
                id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                parent_id TEXT,
                message TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                data TEXT NOT NULL,
                data_hash TEXT NOT NULL,
                PRIMARY KEY (project_id, id),
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_revisions_project ON revisions(project_id);
            CREATE INDEX IF NOT EXISTS idx_revisions_timestamp ON revisions(timestamp);
            "#,
        )?;

        let version: Option<i32> = self
            .conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .optional()?;

        if version.is_none() {
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
        }

        Ok(())
    }

    // Project operations

    /// The project with revision summaries ordered by timestamp, or `None`.
    pub fn get_project(&self, id: &Uuid) -> Result<Option<ProjectDto>> {
        let row = self
            .conn
            .query_row(
                "SELECT title, head FROM projects WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    let title: String = row.get(0)?;
                    let head: Option<String> = row.get(1)?;
                    Ok((title, head))
                },
            )
            .optional()?;

        let Some((title, head)) = row else {
            return Ok(None);
        };

        let head = match head {
            Some(head) => Some(parse_uuid(1, &head)?),
            None => None,
        };

        Ok(Some(ProjectDto {
            id: *id,
            title,
            head,
            revisions: self.revision_summaries(id)?,
        }))
    }

    pub fn list_projects(&self) -> Result<Vec<(Uuid, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, title FROM projects ORDER BY created")?;

        let projects = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                Ok((parse_uuid(0, &id)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<(Uuid, String)>>>()?;

        Ok(projects)
    }

    /// Creates the project or updates its title and head reference.
    pub fn upsert_project(&self, id: &Uuid, update: &ProjectUpdate) -> Result<()> {
        if let Some(head) = update.head {
            if !self.has_revision(id, &head)? {
                return Err(Error::RevisionNotFound(head.to_string()));
            }
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO projects (id, title, head, created, updated)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(id) DO UPDATE SET title = ?2, head = ?3, updated = ?4",
            params![
                id.to_string(),
                update.title,
                update.head.map(|h| h.to_string()),
                now,
            ],
        )?;

        debug!("Stored project {}", id);
        Ok(())
    }

    pub fn delete_project(&self, id: &Uuid) -> Result<bool> {
        self.conn.execute(
            "DELETE FROM revisions WHERE project_id = ?1",
            params![id.to_string()],
        )?;
        let deleted = self
            .conn
            .execute("DELETE FROM projects WHERE id = ?1", params![id.to_string()])?;
        Ok(deleted > 0)
    }

    // Revision operations

    pub fn get_revision(&self, project_id: &Uuid, id: &Uuid) -> Result<RevisionDto> {
        self.conn
            .query_row(
                "SELECT id, parent_id, message, timestamp, data, data_hash
                 FROM revisions WHERE project_id = ?1 AND id = ?2",
                params![project_id.to_string(), id.to_string()],
                |row| revision_from_row(row, true),
            )
            .optional()?
            .ok_or_else(|| Error::RevisionNotFound(id.to_string()))
    }

    /// Stores a revision. The project and the parent must already exist and
    /// the payload must match its hash.
    pub fn put_revision(&self, project_id: &Uuid, revision: &RevisionDto) -> Result<()> {
        if self.get_project_title(project_id)?.is_none() {
            return Err(Error::ProjectNotFound(project_id.to_string()));
        }

        if let Some(parent_id) = revision.parent_id {
            if !self.has_revision(project_id, &parent_id)? {
                return Err(Error::InvalidOperation(format!(
                    "parent revision {} of {} is unknown",
                    parent_id, revision.id
                )));
            }
        }

        let payload = revision
            .verified_payload()
            .map_err(Error::InvalidOperation)?;

        self.conn.execute(
            "INSERT OR REPLACE INTO revisions
                (id, project_id, parent_id, message, timestamp, data, data_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                revision.id.to_string(),
                project_id.to_string(),
                revision.parent_id.map(|p| p.to_string()),
                revision.message,
                revision.timestamp,
                serde_json::to_string(payload)?,
                payload.hash(),
            ],
        )?;

        debug!("Stored revision {} of project {}", revision.id, project_id);
        Ok(())
    }

    // Helper methods

    fn get_project_title(&self, id: &Uuid) -> Result<Option<String>> {
        let title = self
            .conn
            .query_row(
                "SELECT title FROM projects WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(title)
    }

    fn has_revision(&self, project_id: &Uuid, id: &Uuid) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM revisions WHERE project_id = ?1 AND id = ?2",
            params![project_id.to_string(), id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn revision_summaries(&self, project_id: &Uuid) -> Result<Vec<RevisionDto>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, parent_id, message, timestamp, data, data_hash
             FROM revisions WHERE project_id = ?1 ORDER BY timestamp, rowid",
        )?;

        let revisions = stmt
            .query_map(params![project_id.to_string()], |row| {
                revision_from_row(row, false)
            })?
            .collect::<rusqlite::Result<Vec<RevisionDto>>>()?;

        Ok(revisions)
    }
}

fn revision_from_row(row: &Row, with_data: bool) -> rusqlite::Result<RevisionDto> {
    let id: String = row.get(0)?;
    let parent_id: Option<String> = row.get(1)?;
    let message: String = row.get(2)?;
    let timestamp: i64 = row.get(3)?;
    let data: String = row.get(4)?;
    let data_hash: String = row.get(5)?;

    let data = if with_data {
        let payload: RevisionPayload = serde_json::from_str(&data)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
        Some(payload)
    } else {
        None
    };

    Ok(RevisionDto {
        id: parse_uuid(0, &id)?,
        parent_id: match parent_id {
            Some(parent) => Some(parse_uuid(1, &parent)?),
            None => None,
        },
        message,
        timestamp,
        data,
        data_hash: Some(data_hash),
    })
}

fn parse_uuid(column: usize, value: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}
