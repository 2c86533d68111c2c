/*!
 * # Sublingo - LLM batch translation for subtitle projects
 *
 * A Rust library that translates the segments of a stored subtitle
 * project into a target language with a chat-completion model.
 *
 * ## Features
 *
 * - Project-level analysis (genre, tone, style guide, glossary hints) cached per project
 * - Enforced glossaries with token masking and post-restore
 * - Batched requests with JSON mode probing and a JSONL fallback
 * - Incremental, never-destructive writes with readability metrics
 * - Progress events and a persisted audit conversation per task
 * - One background task per project and language, with cancellation
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `document`: Project document model (segments, tasks, conversations)
 * - `storage`: Document and glossary stores (in-memory and SQLite)
 * - `providers`: Chat completion client abstraction and a scripted mock
 * - `events`: Progress and conversation event publishing
 * - `translation`: The translation pipeline:
 *   - `translation::orchestrator`: Task lifecycle and batch loop
 *   - `translation::analysis`: Project analysis
 *   - `translation::masking`: Markup and glossary protection
 *   - `translation::prompts`: Prompt templates and payloads
 *   - `translation::response`: Model output parsing
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the library
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod document;
pub mod errors;
pub mod events;
pub mod language_utils;
pub mod providers;
pub mod storage;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::TranslatorConfig;
pub use document::{ConversionTask, GlossaryEntry, Segment, SubtitleProject, TaskStatus};
pub use errors::{ParseError, ProviderError, StoreError, TranslationError};
pub use events::{BroadcastEventBus, EventPublisher, TranslationEvent};
pub use language_utils::{is_same_language, language_label, normalize_to_part2t};
pub use providers::{ChatCompletionClient, ChatMessage, ChatOptions, LlmProfile};
pub use storage::{DocumentStore, GlossaryStore, MemoryStore, SqliteStore};
pub use translation::{TaskHandle, TaskOutcome, TranslationRequest, TranslationService};
