/*!
 * In-memory document and glossary store.
 */

use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::document::{GlossaryEntry, GlossarySet, SubtitleProject};
use crate::errors::StoreError;

use super::{DocumentStore, GlossaryStore, ProjectEdit};

/// In-memory store backed by shared maps; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    projects: Arc<RwLock<HashMap<String, SubtitleProject>>>,
    glossary_sets: Arc<RwLock<HashMap<String, (GlossarySet, Vec<GlossaryEntry>)>>>,
    /// Number of successful saves
    saves: Arc<AtomicUsize>,
    /// Number of glossary lookups served
    glossary_reads: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a project without counting it as a save.
    pub fn insert_project(&self, project: SubtitleProject) {
        self.projects.write().insert(project.id.clone(), project);
    }

    /// Register a glossary set with its entries.
    pub fn insert_glossary_set(&self, set: GlossarySet, entries: Vec<GlossaryEntry>) {
        let entries = entries
            .into_iter()
            .map(|mut entry| {
                entry.set_id = set.id.clone();
                entry
            })
            .collect();
        self.glossary_sets.write().insert(set.id.clone(), (set, entries));
    }

    /// Current copy of a project, if present.
    pub fn project(&self, project_id: &str) -> Option<SubtitleProject> {
        self.projects.read().get(project_id).cloned()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn glossary_read_count(&self) -> usize {
        self.glossary_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, project_id: &str) -> Result<SubtitleProject, StoreError> {
        self.project(project_id)
            .ok_or_else(|| StoreError::NotFound(project_id.to_string()))
    }

    async fn save(&self, project: &SubtitleProject) -> Result<(), StoreError> {
        let mut stored = project.clone();
        stored.updated_at = crate::document::unix_now();
        self.projects.write().insert(stored.id.clone(), stored);
        self.saves.fetch_add(1, Ordering::SeqCst);
        debug!("Saved project {} to memory store", project.id);
        Ok(())
    }

    async fn update(&self, project_id: &str, edit: ProjectEdit) -> Result<SubtitleProject, StoreError> {
        let mut projects = self.projects.write();
        let project = projects
            .get_mut(project_id)
            .ok_or_else(|| StoreError::NotFound(project_id.to_string()))?;
        edit(project);
        project.updated_at = crate::document::unix_now();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(project.clone())
    }
}

#[async_trait]
impl GlossaryStore for MemoryStore {
    async fn entries_for_set(&self, set_id: &str) -> Result<Vec<GlossaryEntry>, StoreError> {
        self.glossary_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .glossary_sets
            .read()
            .get(set_id)
            .map(|(_, entries)| entries.clone())
            .unwrap_or_default())
    }
}
