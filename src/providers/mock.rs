/*!
 * Mock chat completion client for testing.
 *
 * The mock understands the pipeline's own prompts:
 * - `MockChatClient::working()` - Translates every batch item and answers analysis requests
 * - `MockChatClient::failing()` - Always fails with an error
 * - `MockChatClient::garbage()` - Always answers with unparsable prose
 *
 * Individual calls can be scripted with `with_reply`, and every call is recorded
 * so tests can assert on the prompts that were sent.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::document::TokenUsage;
use crate::errors::ProviderError;
use crate::providers::{ChatCompletion, ChatCompletionClient, ChatMessage, ChatOptions, MessageRole, StreamCallback};

/// Prefix the working mock puts in front of every translated line
pub const MOCK_TRANSLATION_PREFIX: &str = "[TRANSLATED] ";

/// Behavior mode for the mock client
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Translates batches and answers analysis prompts
    Working,
    /// Always fails with an error
    Failing,
    /// Returns prose that contains no JSON at all
    Garbage,
    /// Returns an empty response
    Empty,
}

/// A scripted reply for one specific call
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Return this exact text
    Text(String),
    /// Return unparsable prose
    Garbage,
    /// Fail with an API error carrying this message
    Failure(String),
    /// Respond like the working behavior
    Working,
}

/// A request seen by the mock
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub provider_id: String,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub options: ChatOptions,
}

impl RecordedCall {
    /// Content of the system message.
    pub fn system_prompt(&self) -> &str {
        self.content_of(MessageRole::System)
    }

    /// Content of the user message.
    pub fn user_prompt(&self) -> &str {
        self.content_of(MessageRole::User)
    }

    /// The JSON payload on the last line of the user prompt, if it is a translation batch.
    pub fn batch_payload(&self) -> Option<Value> {
        let last_line = self.user_prompt().lines().last()?;
        let payload: Value = serde_json::from_str(last_line).ok()?;
        payload.get("batch")?;
        Some(payload)
    }

    fn content_of(&self, role: MessageRole) -> &str {
        self.messages
            .iter()
            .find(|message| message.role == role)
            .map(|message| message.content.as_str())
            .unwrap_or("")
    }
}

/// Mock chat client for testing translation behavior
#[derive(Debug, Clone)]
pub struct MockChatClient {
    /// Behavior mode
    behavior: MockBehavior,
    /// Request counter shared between clones
    request_count: Arc<AtomicUsize>,
    /// Replies keyed by 1-based call number
    scripted: Arc<Mutex<HashMap<usize, MockReply>>>,
    /// Every request received, in order
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    /// Segment ids the working behavior leaves out of its answer
    skipped_ids: HashSet<String>,
    /// Simulated latency per request
    delay: Option<Duration>,
    /// Usage reported for every answered request
    usage: TokenUsage,
}

impl MockChatClient {
    /// Create a new mock client with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            scripted: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            skipped_ids: HashSet::new(),
            delay: None,
            usage: TokenUsage::new(100, 50),
        }
    }

    /// Create a working mock client
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create a mock client that always errors
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Create a mock client that never returns JSON
    pub fn garbage() -> Self {
        Self::new(MockBehavior::Garbage)
    }

    /// Create a mock client that returns empty responses
    pub fn empty() -> Self {
        Self::new(MockBehavior::Empty)
    }

    /// Script the reply for the given 1-based call number
    pub fn with_reply(self, call_number: usize, reply: MockReply) -> Self {
        self.scripted.lock().insert(call_number, reply);
        self
    }

    /// Leave these segment ids out of every translated batch
    pub fn with_skipped_ids(mut self, ids: &[&str]) -> Self {
        self.skipped_ids = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    /// Sleep before answering each request
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report this usage for every answered request
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Snapshot of every request received so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Build the reply the working behavior gives for a request
    pub fn working_reply(&self, call: &RecordedCall) -> String {
        match call.batch_payload() {
            Some(payload) => self.translate_batch(&payload, call.options.json_mode),
            None => Self::analysis_reply(),
        }
    }

    fn translate_batch(&self, payload: &Value, json_mode: bool) -> String {
        let items: Vec<Value> = payload["batch"]
            .as_array()
            .map(|batch| {
                batch
                    .iter()
                    .filter_map(|item| {
                        let id = item.get("id")?.as_str()?;
                        if self.skipped_ids.contains(id) {
                            return None;
                        }
                        let text = item.get("text").and_then(Value::as_str).unwrap_or("");
                        Some(json!({ "id": id, "final": format!("{}{}", MOCK_TRANSLATION_PREFIX, text) }))
                    })
                    .collect()
            })
            .unwrap_or_default();

        if json_mode {
            json!({ "items": items }).to_string()
        } else {
            items
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join("\n")
        }
    }

    fn analysis_reply() -> String {
        json!({
            "genre": "thriller",
            "tone": "tense",
            "style_guide": ["Keep lines short", "Use informal address between friends"],
            "scene_outline": [{ "start_id": "1", "end_id": "3", "summary": "Opening scene" }],
            "roles": [{ "name": "John", "person": "first", "notes": "lead" }],
            "initial_glossary": [{ "source": "HQ", "translations": { "all": "QG" } }]
        })
        .to_string()
    }
}

#[async_trait]
impl ChatCompletionClient for MockChatClient {
    async fn chat_completion(
        &self,
        provider_id: &str,
        model: &str,
        messages: &[ChatMessage],
        options: &ChatOptions,
        on_delta: Option<&StreamCallback<'_>>,
    ) -> Result<ChatCompletion, ProviderError> {
        let call_number = self.request_count.fetch_add(1, Ordering::SeqCst) + 1;
        let call = RecordedCall {
            provider_id: provider_id.to_string(),
            model: model.to_string(),
            messages: messages.to_vec(),
            options: options.clone(),
        };
        self.calls.lock().push(call.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self.scripted.lock().get(&call_number).cloned();
        let reply = reply.unwrap_or(match self.behavior {
            MockBehavior::Working => MockReply::Working,
            MockBehavior::Failing => MockReply::Failure("Simulated provider failure".to_string()),
            MockBehavior::Garbage => MockReply::Garbage,
            MockBehavior::Empty => MockReply::Text(String::new()),
        });

        let content = match reply {
            MockReply::Text(text) => text,
            MockReply::Garbage => "I'm sorry, I can't help with that request.".to_string(),
            MockReply::Failure(message) => {
                return Err(ProviderError::ApiError {
                    status_code: 500,
                    message: format!("{} (request #{})", message, call_number),
                });
            }
            MockReply::Working => self.working_reply(&call),
        };

        if let Some(sink) = on_delta {
            for line in content.lines() {
                sink(line);
            }
        }

        Ok(ChatCompletion {
            content,
            usage: self.usage,
        })
    }
}
