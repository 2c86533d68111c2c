/*!
 * Document model for subtitle projects.
 *
 * A project is persisted as one JSON document holding:
 * - Ordered segments with per-language text and processing status
 * - Per-language metadata (task history, audit conversations, sync state)
 * - Project-level analysis and cached task terms
 */

pub mod conversation;
pub mod glossary;
pub mod project;
pub mod task;

pub use conversation::{ChatRole, ConversationStatus, LlmChatMessage, LlmConversation, MessageKind};
pub use glossary::{GlossaryEntry, GlossarySet};
pub use project::{
    Guideline, GuidelineStandard, LanguageContent, LanguageMetadata, LanguageProcess, LanguageTrack,
    LanguageStatus, ProcessStatus, ProjectAnalysis, ProjectMetadata, RoleInfo, SceneOutline,
    Segment, SegmentTrack, SubtitleGuideline, SubtitleProject, SyncStatus,
};
pub use task::{ConversionTask, TaskStage, TaskStatus, TokenUsage};

/// Id that may arrive as a JSON string or number; strings are trimmed.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(id) => Ok(id.trim().to_string()),
        serde_json::Value::Number(id) => Ok(id.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!("unsupported id value: {}", other))),
    }
}

/// Current unix time in seconds.
pub(crate) fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
