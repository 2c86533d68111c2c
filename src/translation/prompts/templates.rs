/*!
 * Prompt templates for subtitle translation and project analysis.
 *
 * Templates use `{source_language}` and `{target_language}` placeholders.
 * Batch prompts come in two flavors matching the two response protocols:
 * a single JSON object (JSON mode) and one JSON object per line (JSONL).
 */

/// System prompt template with language placeholders.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// The template string with placeholders
    template: String,
}

impl PromptTemplate {
    /// System prompt for JSON mode batches.
    pub const JSON_MODE_TRANSLATOR: &'static str = r#"You are an expert subtitle translator working from {source_language} into {target_language}.

## Method
- For every line, silently draft a translation, reflect on accuracy, fluency and length, then settle on a final version
- Keep the established genre, tone and style guide
- Stay consistent with the reference translations and the previous lines in boundary_context

## Glossary
- Copy every token of the form ⟦G000⟧ or ⟦P000⟧ exactly as it appears, never translate or drop it
- Glossary entries without a placeholder are mandatory renderings; entries with origin "auto" are suggestions

## Output Requirements
- Return ONLY one JSON object: {"items":[{"id":"<id>","final":"<translation>"}]}
- Include exactly one item per input id, in input order
- Do not include any text outside the JSON object"#;

    /// System prompt for JSONL batches.
    pub const JSONL_TRANSLATOR: &'static str = r#"You are an expert subtitle translator working from {source_language} into {target_language}.

## Method
- For every line, silently draft a translation, reflect on accuracy, fluency and length, then settle on a final version
- Keep the established genre, tone and style guide
- Stay consistent with the reference translations and the previous lines in boundary_context

## Glossary
- Copy every token of the form ⟦G000⟧ or ⟦P000⟧ exactly as it appears, never translate or drop it
- Glossary entries without a placeholder are mandatory renderings; entries with origin "auto" are suggestions

## Output Requirements
- Return JSON Lines: one object per line, {"id":"<id>","final":"<translation>"}
- Emit exactly one line per input id, in input order
- No code fences, no commentary, no blank lines"#;

    /// User instruction preceding the batch payload in JSON mode.
    pub const JSON_MODE_INSTRUCTION: &'static str =
        "Translate every entry of \"batch\" below. Answer with the JSON object only.";

    /// User instruction preceding the batch payload in JSONL mode.
    pub const JSONL_INSTRUCTION: &'static str =
        "Translate every entry of \"batch\" below. Answer with JSON Lines only, one line per id.";

    /// System prompt for the one-off project analysis.
    pub const PROJECT_ANALYST: &'static str = r#"You are a subtitle project analyst. Read the {source_language} subtitles and prepare a brief for the translators who will localize them.

Return ONLY one JSON object with these fields:
- "genre": short genre label
- "tone": overall tone
- "style_guide": array of short, actionable style rules for the translation
- "scene_outline": array of {"start_id","end_id","summary"}
- "roles": array of {"name","person","notes"} for recurring speakers
- "initial_glossary": array of {"source","translations":{"<lang>":"<text>"},"do_not_translate","case_sensitive"} for names and recurring terms

Do not include any text outside the JSON object."#;

    /// User instruction preceding the analysis bullets.
    pub const ANALYSIS_INSTRUCTION: &'static str =
        "Analyze the following subtitle bullets (one JSON object per line):";

    /// Create a new prompt template.
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    /// Batch translator template for the given protocol.
    pub fn batch_translator(json_mode: bool) -> Self {
        if json_mode {
            Self::new(Self::JSON_MODE_TRANSLATOR)
        } else {
            Self::new(Self::JSONL_TRANSLATOR)
        }
    }

    /// Project analyst template.
    pub fn project_analyst() -> Self {
        Self::new(Self::PROJECT_ANALYST)
    }

    /// Render the template with the given variables.
    pub fn render(&self, source_language: &str, target_language: &str) -> String {
        self.template
            .replace("{source_language}", source_language)
            .replace("{target_language}", target_language)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::batch_translator(false)
    }
}
