/*!
 * SQLite-backed project and glossary store.
 *
 * Projects are stored as one JSON document per row. A save replaces the
 * whole document; `update` reads, edits and writes the row in one
 * transaction while holding the connection.
 */

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use crate::document::{GlossaryEntry, GlossarySet, SubtitleProject};
use crate::errors::StoreError;

use super::connection::DatabaseConnection;
use super::{DocumentStore, GlossaryStore, ProjectEdit};

/// Store for projects and glossaries in SQLite
#[derive(Clone)]
pub struct SqliteStore {
    db: DatabaseConnection,
}

impl SqliteStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a store at the default database location
    pub fn new_default() -> Result<Self> {
        Ok(Self::new(DatabaseConnection::open_default()?))
    }

    /// Create a store with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        Ok(Self::new(DatabaseConnection::open_in_memory()?))
    }

    /// Register a glossary set and replace its entries
    pub async fn put_glossary_set(&self, set: &GlossarySet, entries: &[GlossaryEntry]) -> Result<()> {
        let set = set.clone();
        let rows = entries
            .iter()
            .map(|entry| {
                let mut entry = entry.clone();
                entry.set_id = set.id.clone();
                if entry.id.is_empty() {
                    entry.id = Uuid::new_v4().to_string();
                }
                let json = serde_json::to_string(&entry)?;
                Ok((entry.id, json))
            })
            .collect::<Result<Vec<_>>>()?;

        self.db
            .run(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO glossary_sets (id, name, description) VALUES (?1, ?2, ?3)",
                    params![set.id, set.name, set.description],
                )?;
                conn.execute("DELETE FROM glossary_entries WHERE set_id = ?1", params![set.id])?;
                for (id, json) in &rows {
                    conn.execute(
                        "INSERT INTO glossary_entries (id, set_id, entry) VALUES (?1, ?2, ?3)",
                        params![id, set.id, json],
                    )?;
                }
                Ok(())
            })
            .await
            .context("Failed to store glossary set")
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, project_id: &str) -> Result<SubtitleProject, StoreError> {
        let id = project_id.to_string();
        let document: Option<String> = self
            .db
            .run(move |conn| {
                Ok(conn
                    .query_row("SELECT document FROM projects WHERE id = ?1", params![id], |row| {
                        row.get(0)
                    })
                    .optional()?)
            })
            .await?;

        match document {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Err(StoreError::NotFound(project_id.to_string())),
        }
    }

    async fn save(&self, project: &SubtitleProject) -> Result<(), StoreError> {
        let mut stored = project.clone();
        stored.updated_at = crate::document::unix_now();
        let json = serde_json::to_string(&stored)?;
        let id = stored.id.clone();
        let updated_at = stored.updated_at;

        self.db
            .run(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO projects (id, document, updated_at) VALUES (?1, ?2, ?3)",
                    params![id, json, updated_at],
                )
                .context("Failed to save project document")?;
                Ok(())
            })
            .await?;

        debug!("Saved project {} to SQLite store", project.id);
        Ok(())
    }
    async fn update(&self, project_id: &str, edit: ProjectEdit) -> Result<SubtitleProject, StoreError> {
        let id = project_id.to_string();
        let updated: Option<SubtitleProject> = self
            .db
            .run(move |conn| {
                let tx = conn.unchecked_transaction()?;
                let document: Option<String> = tx
                    .query_row("SELECT document FROM projects WHERE id = ?1", params![id], |row| {
                        row.get(0)
                    })
                    .optional()?;
                let Some(document) = document else {
                    return Ok(None);
                };

                let mut project: SubtitleProject =
                    serde_json::from_str(&document).context("Stored project document is invalid")?;
                edit(&mut project);
                project.updated_at = crate::document::unix_now();
                tx.execute(
                    "UPDATE projects SET document = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, serde_json::to_string(&project)?, project.updated_at],
                )?;
                tx.commit()?;
                Ok(Some(project))
            })
            .await?;

        updated.ok_or_else(|| StoreError::NotFound(project_id.to_string()))
    }
}

#[async_trait]
impl GlossaryStore for SqliteStore {
    async fn entries_for_set(&self, set_id: &str) -> Result<Vec<GlossaryEntry>, StoreError> {
        let set_id = set_id.to_string();
        let rows: Vec<String> = self
            .db
            .run(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT entry FROM glossary_entries WHERE set_id = ?1 ORDER BY rowid")?;
                let rows = stmt
                    .query_map(params![set_id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(StoreError::from))
            .collect()
    }
}
