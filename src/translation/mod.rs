/*!
 * LLM batch translation of subtitle projects.
 *
 * The pipeline is split into several submodules:
 *
 * - `orchestrator`: Task lifecycle and the batch loop
 * - `analysis`: One-time project analysis (genre, tone, style, glossary hints)
 * - `glossary`: Enforced term resolution with a TTL cache
 * - `masking`: Protection of markup and glossary terms behind tokens
 * - `prompts`: Prompt templates and batch payload construction
 * - `response`: Tolerant parsing of JSON and JSONL model output
 * - `protocol`: JSON mode negotiation and run diagnostics
 * - `progress` / `conversation`: Progress events and the audit trail
 * - `quality`: Readability metrics for translated segments
 * - `tasks`: Background task registry and cancellation
 */

pub mod analysis;
pub mod cache;
pub mod conversation;
pub mod glossary;
pub mod masking;
pub mod orchestrator;
pub mod progress;
pub mod prompts;
pub mod protocol;
pub mod quality;
pub mod request;
pub mod response;
pub mod tasks;

// Re-export main types for easier usage
pub use self::analysis::{AnalysisOutcome, ProjectAnalyzer, parse_analysis};
pub use self::cache::{Clock, ManualClock, SystemClock, TtlCache};
pub use self::glossary::{GlossaryOrigin, GlossaryResolver, ResolvedGlossary};
pub use self::masking::{GlossaryMask, RestoreMap, mask_general, mask_glossary, restore};
pub use self::orchestrator::{ABORT_NO_OUTPUT, NO_OUTPUT_FOR_ID, TranslationService};
pub use self::prompts::{BatchPayload, BatchPromptBuilder, PromptTemplate};
pub use self::protocol::{Diagnostics, ProtocolNegotiator};
pub use self::quality::QualityAssessor;
pub use self::request::{SegmentPredicate, TranslationRequest, failed_only};
pub use self::response::{TranslatedItem, parse_json_items, parse_jsonl};
pub use self::tasks::{TaskHandle, TaskKey, TaskOutcome, TaskRegistry};
