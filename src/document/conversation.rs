/*!
 * Audit conversations: one per task, recording every model exchange.
 */

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Who authored a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    App,
    Provider,
}

/// What a conversation message represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
    Meta,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Running,
    Finished,
    Failed,
}

impl ConversationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub kind: MessageKind,
    pub content: String,
    pub created_at: i64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl LlmChatMessage {
    /// Stage label stored in the message metadata, if any.
    pub fn stage(&self) -> Option<&str> {
        self.metadata.get("stage").and_then(Value::as_str)
    }
}

/// Audit log for one translation task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmConversation {
    /// Same value as the task id
    pub id: String,
    pub project_id: String,
    pub language: String,
    pub task_id: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub provider_id: String,
    #[serde(default)]
    pub model: String,
    pub status: ConversationStatus,
    #[serde(default)]
    pub started_at: i64,
    #[serde(default)]
    pub ended_at: i64,
    #[serde(default)]
    pub messages: Vec<LlmChatMessage>,
}
