/*!
 * Prompt construction for batches and project analysis.
 *
 * A batch user prompt is the protocol instruction followed by one line of
 * compact JSON carrying the style digest, disclosed glossary, reference
 * pairs, boundary context and the masked batch itself.
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::document::{GlossaryEntry, ProjectAnalysis, Segment};
use crate::translation::glossary::{GlossaryOrigin, ResolvedGlossary};
use crate::translation::masking::glossary_token;

use super::templates::PromptTemplate;

/// Glossary entry as disclosed to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptGlossaryEntry {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub set_id: String,
    pub source: String,
    pub do_not_translate: bool,
    pub case_sensitive: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub translations: BTreeMap<String, String>,
    /// Masking token standing in for the term; withheld in strict mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    pub origin: GlossaryOrigin,
}

impl PromptGlossaryEntry {
    fn from_entry(entry: &GlossaryEntry, origin: GlossaryOrigin, placeholder: Option<String>) -> Self {
        Self {
            id: entry.id.clone(),
            set_id: entry.set_id.clone(),
            source: entry.source.clone(),
            do_not_translate: entry.do_not_translate,
            case_sensitive: entry.case_sensitive,
            translations: entry.translations.clone(),
            placeholder,
            origin,
        }
    }
}

/// Condensed project analysis sent with every batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalStyle {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub genre: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tone: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub style_guide: Vec<String>,
}

impl GlobalStyle {
    /// Digest of an analysis, keeping at most `max_rules` style rules.
    pub fn from_analysis(analysis: Option<&ProjectAnalysis>, max_rules: usize) -> Self {
        match analysis {
            Some(analysis) => Self {
                genre: analysis.genre.clone(),
                tone: analysis.tone.clone(),
                style_guide: analysis.style_guide.iter().take(max_rules).cloned().collect(),
            },
            None => Self::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePair {
    pub src: String,
    pub dst: String,
}

/// Tail of the previous batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundaryContext {
    pub prev_src: Vec<String>,
    pub prev_dst: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub id: String,
    pub text: String,
}

/// Everything the model sees about one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchPayload {
    pub global_style: GlobalStyle,
    pub glossary: Vec<PromptGlossaryEntry>,
    pub reference_translations: Vec<ReferencePair>,
    pub boundary_context: BoundaryContext,
    pub batch: Vec<BatchItem>,
}

/// Glossary entries disclosed for one batch.
///
/// Enforced entries matched in the batch come first, with their masking
/// token unless `strict` is set; up to `max_hints` analysis hints follow.
pub fn disclose_glossary(
    resolved: &ResolvedGlossary,
    used: &[bool],
    strict: bool,
    max_hints: usize,
) -> Vec<PromptGlossaryEntry> {
    let mut disclosed: Vec<PromptGlossaryEntry> = resolved
        .enforced
        .iter()
        .enumerate()
        .filter(|(index, _)| used.get(*index).copied().unwrap_or(false))
        .map(|(index, entry)| {
            let origin = resolved.origins.get(index).copied().unwrap_or(GlossaryOrigin::Global);
            let placeholder = if strict { None } else { Some(glossary_token(index)) };
            PromptGlossaryEntry::from_entry(entry, origin, placeholder)
        })
        .collect();

    disclosed.extend(
        resolved
            .hints
            .iter()
            .filter(|entry| !entry.source.trim().is_empty())
            .take(max_hints)
            .map(|entry| PromptGlossaryEntry::from_entry(entry, GlossaryOrigin::Auto, None)),
    );

    disclosed
}

/// Builds system and user prompts for translation batches
#[derive(Debug, Clone)]
pub struct BatchPromptBuilder {
    source_language: String,
    target_language: String,
    system_prefix: Option<String>,
    json_mode: bool,
}

impl BatchPromptBuilder {
    /// Create a builder for human-readable language labels.
    pub fn new(source_language: &str, target_language: &str, json_mode: bool) -> Self {
        Self {
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            system_prefix: None,
            json_mode,
        }
    }

    /// Prepend a profile's system prompt; blank prefixes are ignored.
    pub fn with_system_prefix(mut self, prefix: Option<&str>) -> Self {
        self.system_prefix = prefix
            .map(str::trim)
            .filter(|prefix| !prefix.is_empty())
            .map(str::to_string);
        self
    }

    pub fn build_system_prompt(&self) -> String {
        let base = PromptTemplate::batch_translator(self.json_mode)
            .render(&self.source_language, &self.target_language);
        match &self.system_prefix {
            Some(prefix) => format!("{}\n\n{}", prefix, base),
            None => base,
        }
    }

    /// Instruction line followed by the compact payload on the last line.
    pub fn build_user_prompt(&self, payload: &BatchPayload) -> String {
        let instruction = if self.json_mode {
            PromptTemplate::JSON_MODE_INSTRUCTION
        } else {
            PromptTemplate::JSONL_INSTRUCTION
        };
        let body = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
        format!("{}\n{}", instruction, body)
    }

    /// Build both system and user prompts.
    pub fn build(&self, payload: &BatchPayload) -> (String, String) {
        (self.build_system_prompt(), self.build_user_prompt(payload))
    }
}

/// Build the analysis prompts: one bullet per non-empty source line.
pub fn build_analysis_prompts(segments: &[Segment], source_lang: &str, source_label: &str) -> (String, String) {
    let system = PromptTemplate::project_analyst().render(source_label, "");

    let mut user = String::from(PromptTemplate::ANALYSIS_INSTRUCTION);
    for segment in segments {
        let text = match segment.text(source_lang) {
            Some(text) if !text.trim().is_empty() => text,
            _ => continue,
        };
        let id = serde_json::Value::String(segment.id.clone());
        let text = serde_json::Value::String(text.to_string());
        user.push_str(&format!("\n- {{\"id\": {}, \"text\": {}}}", id, text));
    }

    (system, user)
}
