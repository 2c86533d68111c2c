/*!
 * Background task bookkeeping.
 *
 * Each run executes as one detached tokio task. The registry guarantees
 * that at most one run is in flight per (project, target language) and
 * hands out cancellation tokens shared with the run.
 */

use log::{debug, info};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::document::{ConversionTask, TaskStatus};
use crate::errors::TranslationError;

use super::progress::short_id;

/// Identifies the language track a task writes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub project_id: String,
    pub language: String,
}

impl TaskKey {
    pub fn new(project_id: &str, language: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            language: language.to_string(),
        }
    }
}

/// Final state of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    /// Task record as last persisted
    pub task: ConversionTask,
    /// The run stopped early because a batch produced no output
    pub aborted: bool,
}

impl TaskOutcome {
    pub fn task_id(&self) -> &str {
        &self.task.id
    }

    pub fn status(&self) -> TaskStatus {
        self.task.status
    }

    pub fn processed(&self) -> usize {
        self.task.processed_segments
    }

    pub fn failed(&self) -> usize {
        self.task.failed_segments
    }
}

#[derive(Debug)]
struct RunningTask {
    task_id: String,
    cancel: CancellationToken,
}

/// In-flight tasks keyed by (project, language)
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    running: Arc<Mutex<HashMap<TaskKey, RunningTask>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the key for a new task, failing when another task holds it.
    pub fn reserve(&self, key: &TaskKey, task_id: &str) -> Result<CancellationToken, TranslationError> {
        let mut running = self.running.lock();
        if running.contains_key(key) {
            return Err(TranslationError::TaskAlreadyRunning {
                project_id: key.project_id.clone(),
                language: key.language.clone(),
            });
        }
        let cancel = CancellationToken::new();
        running.insert(
            key.clone(),
            RunningTask {
                task_id: task_id.to_string(),
                cancel: cancel.clone(),
            },
        );
        debug!("[{}] Reserved {}/{}", short_id(task_id), key.project_id, key.language);
        Ok(cancel)
    }

    /// Drop a reservation, but only if it still belongs to `task_id`.
    pub fn release(&self, key: &TaskKey, task_id: &str) {
        let mut running = self.running.lock();
        if running.get(key).is_some_and(|task| task.task_id == task_id) {
            running.remove(key);
            debug!("[{}] Released {}/{}", short_id(task_id), key.project_id, key.language);
        }
    }

    /// Run `future` in the background; the reservation is released when it ends.
    pub fn spawn<F>(&self, key: TaskKey, task_id: &str, cancel: CancellationToken, future: F) -> TaskHandle
    where
        F: Future<Output = Result<TaskOutcome, TranslationError>> + Send + 'static,
    {
        let registry = self.clone();
        let release_key = key.clone();
        let release_id = task_id.to_string();
        let join = tokio::spawn(async move {
            let result = future.await;
            registry.release(&release_key, &release_id);
            result
        });

        TaskHandle {
            task_id: task_id.to_string(),
            key,
            cancel,
            join,
        }
    }

    /// Cancel the in-flight task of a key. Returns false when none is running.
    pub fn cancel(&self, key: &TaskKey) -> bool {
        match self.running.lock().get(key) {
            Some(task) => {
                info!("[{}] Cancelling {}/{}", short_id(&task.task_id), key.project_id, key.language);
                task.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn active_task_id(&self, key: &TaskKey) -> Option<String> {
        self.running.lock().get(key).map(|task| task.task_id.clone())
    }

    pub fn is_running(&self, key: &TaskKey) -> bool {
        self.running.lock().contains_key(key)
    }
}

/// Handle to a spawned run
#[derive(Debug)]
pub struct TaskHandle {
    task_id: String,
    key: TaskKey,
    cancel: CancellationToken,
    join: JoinHandle<Result<TaskOutcome, TranslationError>>,
}

impl TaskHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn key(&self) -> &TaskKey {
        &self.key
    }

    /// Request cancellation; the run stops at the next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the run to end.
    pub async fn wait(self) -> Result<TaskOutcome, TranslationError> {
        self.join
            .await
            .map_err(|e| TranslationError::TaskJoin(e.to_string()))?
    }
}
