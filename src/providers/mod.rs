/*!
 * Chat completion provider interface.
 *
 * The pipeline never talks HTTP itself. Callers inject a `ChatCompletionClient`
 * that routes a request to the provider identified by `provider_id`:
 * - `mock`: scripted in-process client for tests and demos
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::document::TokenUsage;
use crate::errors::ProviderError;

pub mod mock;

/// Role of a chat message sent to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Sampling options for one completion request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Ask the provider to constrain output to a single JSON object
    #[serde(default)]
    pub json_mode: bool,
}

/// Result of a completion request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatCompletion {
    pub content: String,
    pub usage: TokenUsage,
}

/// Inference profile pinned by the caller for one provider/model pair.
///
/// When `json_mode` is set the protocol is fixed for the whole run; when it
/// is `None` the pipeline negotiates JSON mode on its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_mode: Option<bool>,
    /// Prepended to every system prompt
    #[serde(default)]
    pub sys_prompt_tpl: String,
}

impl LlmProfile {
    /// Sampling options from this profile, with a fallback temperature.
    pub fn chat_options(profile: Option<&LlmProfile>, fallback_temperature: f32, json_mode: bool) -> ChatOptions {
        match profile {
            Some(profile) => ChatOptions {
                temperature: profile.temperature.or(Some(fallback_temperature)),
                top_p: profile.top_p,
                max_tokens: profile.max_tokens,
                json_mode,
            },
            None => ChatOptions {
                temperature: Some(fallback_temperature),
                json_mode,
                ..Default::default()
            },
        }
    }
}

/// Callback receiving streamed output fragments
pub type StreamCallback<'a> = dyn Fn(&str) + Send + Sync + 'a;

/// Common trait for chat completion backends
///
/// Implementations route the request to the provider identified by
/// `provider_id` and report token usage when the provider returns it.
#[async_trait]
pub trait ChatCompletionClient: Send + Sync + Debug {
    /// Complete a chat request
    ///
    /// # Arguments
    /// * `provider_id` - Identifier of the configured provider
    /// * `model` - Model name
    /// * `messages` - System and user messages
    /// * `options` - Sampling options and JSON mode flag
    /// * `on_delta` - Optional sink for streamed output fragments
    async fn chat_completion(
        &self,
        provider_id: &str,
        model: &str,
        messages: &[ChatMessage],
        options: &ChatOptions,
        on_delta: Option<&StreamCallback<'_>>,
    ) -> Result<ChatCompletion, ProviderError>;
}
