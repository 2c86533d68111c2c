/*!
 * Audit trail of the model exchanges of one task.
 *
 * Every request, response, error and progress note is appended to the
 * task's conversation in the stored project and published as a
 * `subtitle.conversation` event. Streamed fragments are published only.
 * Audit failures are logged and never fail the run.
 */

use log::warn;
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::document::{
    ChatRole, ConversationStatus, LlmChatMessage, LlmConversation, MessageKind, SubtitleProject, unix_now,
};
use crate::errors::StoreError;
use crate::events::{ConversationEvent, EventPublisher, TranslationEvent};
use crate::storage::DocumentStore;

use super::progress::short_id;

/// Identity of the conversation being recorded
#[derive(Debug, Clone, Default)]
pub struct ConversationInfo {
    pub project_id: String,
    pub language: String,
    pub task_id: String,
    pub provider: String,
    pub provider_id: String,
    pub model: String,
}

/// Appends audit messages for one task
pub struct ConversationRecorder {
    store: Arc<dyn DocumentStore>,
    publisher: Arc<dyn EventPublisher>,
    info: ConversationInfo,
}

impl ConversationRecorder {
    pub fn new(store: Arc<dyn DocumentStore>, publisher: Arc<dyn EventPublisher>, info: ConversationInfo) -> Self {
        Self { store, publisher, info }
    }

    pub fn info(&self) -> &ConversationInfo {
        &self.info
    }

    /// Persist one message; empty content is skipped.
    pub async fn append(
        &self,
        kind: MessageKind,
        role: ChatRole,
        content: &str,
        stage: &str,
        metadata: Map<String, Value>,
    ) {
        if content.trim().is_empty() {
            return;
        }

        let message = self.message(kind, role, content, stage, metadata);
        match self.append_to_store(message.clone()).await {
            Ok((status, total)) => self.publish(status, Some(message), total, false),
            Err(e) => warn!("[{}] Failed to append conversation message: {}", short_id(&self.info.task_id), e),
        }
    }

    /// Publish a streamed fragment without persisting it.
    pub fn push_delta(&self, content: &str, stage: &str, metadata: Map<String, Value>) {
        if content.trim().is_empty() {
            return;
        }
        let mut metadata = metadata;
        metadata.insert("delta".to_string(), Value::Bool(true));
        metadata.insert("append".to_string(), Value::Bool(true));
        let message = self.message(MessageKind::Response, ChatRole::Provider, content, stage, metadata);
        self.publish(ConversationStatus::Running, Some(message), 0, true);
    }

    /// Set the final status and stamp the end time once.
    pub async fn mark_finished(&self, status: ConversationStatus) {
        let info = self.info.clone();
        let edit = Box::new(move |project: &mut SubtitleProject| {
            let conversation = conversation_mut(&info, project);
            conversation.status = status;
            if conversation.ended_at == 0 {
                conversation.ended_at = unix_now();
            }
        });

        match self.store.update(&self.info.project_id, edit).await {
            Ok(project) => {
                let total = self.stored_total(&project);
                self.publish(status, None, total, false);
            }
            Err(e) => warn!("[{}] Failed to finish conversation: {}", short_id(&self.info.task_id), e),
        }
    }

    fn message(
        &self,
        kind: MessageKind,
        role: ChatRole,
        content: &str,
        stage: &str,
        mut metadata: Map<String, Value>,
    ) -> LlmChatMessage {
        if !stage.is_empty() {
            metadata.insert("stage".to_string(), Value::String(stage.to_string()));
        }
        LlmChatMessage {
            id: Uuid::new_v4().to_string(),
            role,
            kind,
            content: content.to_string(),
            created_at: unix_now(),
            metadata,
        }
    }

    async fn append_to_store(&self, message: LlmChatMessage) -> Result<(ConversationStatus, usize), StoreError> {
        let info = self.info.clone();
        let edit = Box::new(move |project: &mut SubtitleProject| {
            conversation_mut(&info, project).messages.push(message);
        });
        let project = self.store.update(&self.info.project_id, edit).await?;
        let status = project
            .conversation(&self.info.language, &self.info.task_id)
            .map_or(ConversationStatus::Running, |conversation| conversation.status);
        Ok((status, self.stored_total(&project)))
    }

    fn stored_total(&self, project: &SubtitleProject) -> usize {
        project
            .conversation(&self.info.language, &self.info.task_id)
            .map_or(0, |conversation| conversation.messages.len())
    }

    fn publish(&self, status: ConversationStatus, message: Option<LlmChatMessage>, messages_total: usize, delta: bool) {
        self.publisher.publish(TranslationEvent::Conversation(ConversationEvent {
            project_id: self.info.project_id.clone(),
            language: self.info.language.clone(),
            task_id: self.info.task_id.clone(),
            conversation_id: self.info.task_id.clone(),
            provider: self.info.provider.clone(),
            model: self.info.model.clone(),
            status,
            message,
            messages_total,
            delta,
        }));
    }
}

/// Conversation of a task, created on first use; missing provider/model are filled in.
fn conversation_mut<'a>(info: &ConversationInfo, project: &'a mut SubtitleProject) -> &'a mut LlmConversation {
    let conversation = project
        .language_meta_mut(&info.language)
        .status
        .llm_conversations
        .entry(info.task_id.clone())
        .or_insert_with(|| LlmConversation {
            id: info.task_id.clone(),
            project_id: info.project_id.clone(),
            language: info.language.clone(),
            task_id: info.task_id.clone(),
            started_at: unix_now(),
            ..Default::default()
        });
    if conversation.provider.is_empty() {
        conversation.provider = info.provider.clone();
    }
    if conversation.provider_id.is_empty() {
        conversation.provider_id = info.provider_id.clone();
    }
    if conversation.model.is_empty() {
        conversation.model = info.model.clone();
    }
    conversation
}

/// Build a metadata map from key/value pairs.
pub fn metadata<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs.into_iter().map(|(key, value)| (key.to_string(), value)).collect()
}
