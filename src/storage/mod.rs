/*!
 * Persistence interfaces for project documents and glossaries.
 *
 * The pipeline needs whole-document reads, read-modify-write updates and
 * glossary lookups by set. Two implementations are provided:
 * - `MemoryStore`: in-process maps, used by tests and embedders
 * - `SqliteStore`: JSON documents in a SQLite database
 */

use async_trait::async_trait;

use crate::document::{GlossaryEntry, SubtitleProject};
use crate::errors::StoreError;

pub mod connection;
pub mod memory;
pub mod schema;
pub mod sqlite;

pub use connection::DatabaseConnection;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Whole-document storage for subtitle projects
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load a project by id
    async fn get(&self, project_id: &str) -> Result<SubtitleProject, StoreError>;

    /// Save a project, replacing any previous version (last write wins)
    async fn save(&self, project: &SubtitleProject) -> Result<(), StoreError>;

    /// Apply `edit` to the stored copy and save it, returning the saved document.
    ///
    /// Writers that share a project (concurrent languages, the conversation
    /// recorder, progress snapshots) go through this method so each one only
    /// changes the parts it owns. The default reads then writes; stores that
    /// can lock override it to make the edit atomic.
    async fn update(&self, project_id: &str, edit: ProjectEdit) -> Result<SubtitleProject, StoreError> {
        let mut project = self.get(project_id).await?;
        edit(&mut project);
        self.save(&project).await?;
        Ok(project)
    }
}

/// In-place change to a stored project
pub type ProjectEdit = Box<dyn FnOnce(&mut SubtitleProject) + Send>;

/// Read access to curated glossary sets
#[async_trait]
pub trait GlossaryStore: Send + Sync {
    /// All entries belonging to a glossary set
    async fn entries_for_set(&self, set_id: &str) -> Result<Vec<GlossaryEntry>, StoreError>;
}
