/*!
 * Glossary resolution for a translation run.
 *
 * Two kinds of terms reach the model:
 * - Enforced terms: entries of the selected glossary sets (`global`) and
 *   caller-supplied extras (`task`). These are masked and restored.
 * - Hints: the analysis' initial glossary (`auto`), shown for reference only.
 *
 * Glossary set lookups go through a TTL cache so back-to-back runs on the
 * same sets do not hit the store every time.
 */

use futures::future::join_all;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::document::{GlossaryEntry, ProjectAnalysis};
use crate::storage::GlossaryStore;

use super::cache::{Clock, TtlCache};

/// Where a glossary term came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlossaryOrigin {
    /// Selected glossary set
    Global,
    /// Extra terms supplied with the request
    Task,
    /// Project analysis suggestion
    Auto,
}

/// Terms in effect for one run
#[derive(Debug, Clone, Default)]
pub struct ResolvedGlossary {
    /// Enforced entries; masking tokens are numbered by position in this list
    pub enforced: Vec<GlossaryEntry>,
    /// Origin of each enforced entry
    pub origins: Vec<GlossaryOrigin>,
    /// Reference-only hints
    pub hints: Vec<GlossaryEntry>,
    /// New value for the project's cached task terms, when it must change
    pub task_terms_update: Option<Vec<GlossaryEntry>>,
}

impl ResolvedGlossary {
    fn push_enforced(&mut self, entries: impl IntoIterator<Item = GlossaryEntry>, origin: GlossaryOrigin) {
        for entry in entries {
            self.enforced.push(entry);
            self.origins.push(origin);
        }
    }

    /// Attach the analysis' initial glossary as hints.
    pub fn with_hints(mut self, analysis: Option<&ProjectAnalysis>) -> Self {
        self.hints = analysis
            .map(|analysis| analysis.initial_glossary.clone())
            .unwrap_or_default();
        self
    }
}

/// Resolves enforced terms from glossary sets, extras and cached task terms
#[derive(Clone)]
pub struct GlossaryResolver {
    store: Arc<dyn GlossaryStore>,
    cache: TtlCache<String, Vec<GlossaryEntry>>,
}

impl GlossaryResolver {
    pub fn new(store: Arc<dyn GlossaryStore>, ttl: Duration) -> Self {
        Self {
            store,
            cache: TtlCache::new(ttl),
        }
    }

    pub fn with_clock(store: Arc<dyn GlossaryStore>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            cache: TtlCache::with_clock(ttl, clock),
        }
    }

    /// Entries of one glossary set; lookup failures yield no entries.
    pub async fn entries_for_set(&self, set_id: &str) -> Vec<GlossaryEntry> {
        let key = set_id.to_string();
        if let Some(entries) = self.cache.get(&key) {
            return entries;
        }

        match self.store.entries_for_set(set_id).await {
            Ok(entries) => {
                debug!("Loaded {} glossary entries for set {}", entries.len(), set_id);
                self.cache.put(key, entries.clone());
                entries
            }
            Err(e) => {
                warn!("Failed to load glossary set {}: {}", set_id, e);
                Vec::new()
            }
        }
    }

    /// Resolve the enforced terms of a run.
    ///
    /// Non-empty `extras` always become the project's task terms. A retry run
    /// without extras reuses the previously stored task terms; a fresh run
    /// without extras uses none.
    pub async fn resolve(
        &self,
        set_ids: &[String],
        extras: &[GlossaryEntry],
        stored_task_terms: &[GlossaryEntry],
        retry_run: bool,
    ) -> ResolvedGlossary {
        let mut resolved = ResolvedGlossary::default();

        let lookups = join_all(set_ids.iter().map(|set_id| self.entries_for_set(set_id))).await;
        for entries in lookups {
            resolved.push_enforced(entries, GlossaryOrigin::Global);
        }

        if !extras.is_empty() {
            resolved.task_terms_update = Some(extras.to_vec());
            resolved.push_enforced(extras.iter().cloned(), GlossaryOrigin::Task);
        } else if retry_run && !stored_task_terms.is_empty() {
            resolved.push_enforced(stored_task_terms.iter().cloned(), GlossaryOrigin::Task);
        }

        resolved
    }

    /// Drop expired glossary set lookups.
    pub fn evict_expired(&self) -> usize {
        self.cache.evict_expired()
    }
}
