/*!
 * Prompt engineering for subtitle translation.
 *
 * This module provides:
 * - System prompt templates for both response protocols and the analysis
 * - Batch payload construction with glossary disclosure and context
 */

pub mod builder;
pub mod templates;

// Re-export main types
pub use builder::{
    BatchItem, BatchPayload, BatchPromptBuilder, BoundaryContext, GlobalStyle, PromptGlossaryEntry, ReferencePair,
    build_analysis_prompts, disclose_glossary,
};
pub use templates::PromptTemplate;
