/*!
 * Event publishing for progress and audit updates.
 *
 * The pipeline emits two kinds of events:
 * - `subtitle.progress`: a snapshot of the running conversion task
 * - `subtitle.conversation`: an audit message or streamed fragment
 *
 * Transport (websocket, IPC) is up to the embedder; `BroadcastEventBus`
 * fans events out to in-process subscribers.
 */

use log::debug;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::document::{ConversationStatus, ConversionTask, LlmChatMessage};

pub const PROGRESS_TOPIC: &str = "subtitle.progress";
pub const CONVERSATION_TOPIC: &str = "subtitle.conversation";

/// Progress snapshot of a running task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub project_id: String,
    pub language: String,
    pub task: ConversionTask,
}

/// Audit conversation update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationEvent {
    pub project_id: String,
    pub language: String,
    pub task_id: String,
    pub conversation_id: String,
    pub provider: String,
    pub model: String,
    pub status: ConversationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<LlmChatMessage>,
    pub messages_total: usize,
    /// The message is a streamed fragment that was not persisted
    pub delta: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "topic", content = "payload")]
pub enum TranslationEvent {
    #[serde(rename = "subtitle.progress")]
    Progress(ProgressEvent),
    #[serde(rename = "subtitle.conversation")]
    Conversation(ConversationEvent),
}

impl TranslationEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Progress(_) => PROGRESS_TOPIC,
            Self::Conversation(_) => CONVERSATION_TOPIC,
        }
    }
}

/// Sink for pipeline events; publishing never fails the caller
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: TranslationEvent);
}

/// Publisher that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPublisher;

impl EventPublisher for NullPublisher {
    fn publish(&self, _event: TranslationEvent) {}
}

/// In-process fan-out over a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<TranslationEvent>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TranslationEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventPublisher for BroadcastEventBus {
    fn publish(&self, event: TranslationEvent) {
        let topic = event.topic();
        if self.sender.send(event).is_err() {
            debug!("No subscribers for {} event", topic);
        }
    }
}

/// Publisher that keeps every event in memory, for inspection in tests
#[derive(Debug, Clone, Default)]
pub struct CollectingPublisher {
    events: Arc<Mutex<Vec<TranslationEvent>>>,
}

impl CollectingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TranslationEvent> {
        self.events.lock().clone()
    }

    /// Task snapshots from progress events, in publish order.
    pub fn progress_snapshots(&self) -> Vec<ConversionTask> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                TranslationEvent::Progress(progress) => Some(progress.task.clone()),
                TranslationEvent::Conversation(_) => None,
            })
            .collect()
    }
}

impl EventPublisher for CollectingPublisher {
    fn publish(&self, event: TranslationEvent) {
        self.events.lock().push(event);
    }
}
