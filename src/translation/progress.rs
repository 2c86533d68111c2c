/*!
 * Task progress reporting.
 *
 * The reporter owns the live `ConversionTask` snapshot of a run. Updates
 * are published as `subtitle.progress` events and written into the stored
 * project so a reloaded UI can pick up a task mid-run.
 */

use log::{debug, warn};
use std::sync::Arc;

use crate::document::{ConversionTask, SubtitleProject, TaskStage, TokenUsage, unix_now};
use crate::events::{EventPublisher, ProgressEvent, TranslationEvent};
use crate::storage::DocumentStore;

/// Publishes and persists the progress of one task
pub struct ProgressReporter {
    store: Arc<dyn DocumentStore>,
    publisher: Arc<dyn EventPublisher>,
    project_id: String,
    language: String,
    task: ConversionTask,
}

impl ProgressReporter {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        publisher: Arc<dyn EventPublisher>,
        project_id: &str,
        language: &str,
        task: ConversionTask,
    ) -> Self {
        Self {
            store,
            publisher,
            project_id: project_id.to_string(),
            language: language.to_string(),
            task,
        }
    }

    pub fn task(&self) -> &ConversionTask {
        &self.task
    }

    pub fn task_mut(&mut self) -> &mut ConversionTask {
        &mut self.task
    }

    pub fn set_stage(&mut self, stage: TaskStage, detail: impl Into<String>) {
        self.task.stage = Some(stage);
        self.task.stage_detail = detail.into();
        debug!("[{}] stage {} ({})", short_id(&self.task.id), stage, self.task.stage_detail);
    }

    pub fn add_usage(&mut self, usage: &TokenUsage) {
        self.task.add_usage(usage);
    }

    /// Update processed/failed counts and recompute the percentage.
    pub fn record_counts(&mut self, processed: usize, failed: usize) {
        self.task.processed_segments = processed;
        self.task.failed_segments = failed;
        self.task.refresh_progress();
    }

    /// Publish the current snapshot.
    pub fn publish(&self) {
        self.publisher.publish(TranslationEvent::Progress(ProgressEvent {
            project_id: self.project_id.clone(),
            language: self.language.clone(),
            task: self.task.clone(),
        }));
    }

    /// Write the snapshot into the latest stored document. Failures are logged only.
    pub async fn persist(&self) {
        let language = self.language.clone();
        let task = self.task.clone();
        let edit = Box::new(move |project: &mut SubtitleProject| record_task(project, &language, &task));
        if let Err(e) = self.store.update(&self.project_id, edit).await {
            warn!("[{}] Failed to persist task progress: {}", short_id(&self.task.id), e);
        }
    }

    /// Publish and persist in one step.
    pub async fn report(&self) {
        self.publish();
        self.persist().await;
    }

    /// Write the snapshot into an in-memory document before a whole-document save.
    pub fn apply_to(&self, project: &mut SubtitleProject) {
        record_task(project, &self.language, &self.task);
    }
}

fn record_task(project: &mut SubtitleProject, language: &str, task: &ConversionTask) {
    project.upsert_task(language, task);
    project.language_meta_mut(language).status.last_updated = unix_now();
}

/// First 8 characters of an id, for log prefixes
pub(crate) fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
