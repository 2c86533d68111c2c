/*!
 * Project-level style analysis.
 *
 * Before the first batch the whole source track is sent to the model once
 * to obtain a style brief:
 * - Genre, tone and style rules shared by every batch prompt
 * - Scene outline and recurring roles
 * - An initial glossary used as reference-only hints
 *
 * The result is stored in the project metadata, so later runs reuse it
 * without another model call.
 */

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::document::{ProjectAnalysis, SubtitleProject, TokenUsage};
use crate::errors::{ParseError, TranslationError};
use crate::language_utils::language_label;
use crate::providers::{ChatCompletionClient, ChatMessage, LlmProfile};
use crate::storage::DocumentStore;

use super::prompts::build_analysis_prompts;
use super::response::{normalize, parse_json_document};

/// Result of `ensure_analysis`.
///
/// Usage is reported even when the call succeeded but its output was unusable.
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub result: Result<ProjectAnalysis, TranslationError>,
    pub usage: TokenUsage,
    /// True when the stored analysis was reused
    pub from_cache: bool,
}

/// Computes and caches the project analysis
#[derive(Clone)]
pub struct ProjectAnalyzer {
    client: Arc<dyn ChatCompletionClient>,
    store: Arc<dyn DocumentStore>,
    temperature: f32,
}

impl ProjectAnalyzer {
    pub fn new(client: Arc<dyn ChatCompletionClient>, store: Arc<dyn DocumentStore>, temperature: f32) -> Self {
        Self {
            client,
            store,
            temperature,
        }
    }

    /// Return the stored analysis, or compute, store and persist a new one.
    pub async fn ensure_analysis(
        &self,
        project: &mut SubtitleProject,
        source_lang: &str,
        provider_id: &str,
        model: &str,
        profile: Option<&LlmProfile>,
    ) -> AnalysisOutcome {
        if let Some(analysis) = project.metadata.analysis.clone() {
            debug!("Reusing stored analysis for project {}", project.id);
            return AnalysisOutcome {
                result: Ok(analysis),
                usage: TokenUsage::default(),
                from_cache: true,
            };
        }

        let (system, user) = build_analysis_prompts(&project.segments, source_lang, &language_label(source_lang));
        let messages = [ChatMessage::system(system), ChatMessage::user(user)];
        let options = LlmProfile::chat_options(profile, self.temperature, true);

        info!("Analyzing project {} with {}/{}", project.id, provider_id, model);
        let completion = match self
            .client
            .chat_completion(provider_id, model, &messages, &options, None)
            .await
        {
            Ok(completion) => completion,
            Err(e) => {
                warn!("Project analysis request failed: {}", e);
                return AnalysisOutcome {
                    result: Err(e.into()),
                    usage: TokenUsage::default(),
                    from_cache: false,
                };
            }
        };

        let analysis = match parse_analysis(&completion.content) {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("Project analysis output rejected: {}", e);
                return AnalysisOutcome {
                    result: Err(e.into()),
                    usage: completion.usage,
                    from_cache: false,
                };
            }
        };

        project.metadata.analysis = Some(analysis.clone());
        let stored_analysis = analysis.clone();
        let edit = Box::new(move |stored: &mut SubtitleProject| {
            stored.metadata.analysis.get_or_insert(stored_analysis);
        });
        if let Err(e) = self.store.update(&project.id, edit).await {
            warn!("Failed to persist project analysis for {}: {}", project.id, e);
        }

        AnalysisOutcome {
            result: Ok(analysis),
            usage: completion.usage,
            from_cache: false,
        }
    }
}

/// Parse an analysis reply: fenced or bare object, or an object nested one level down.
pub fn parse_analysis(raw: &str) -> Result<ProjectAnalysis, ParseError> {
    let text = normalize(raw);
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    let document = parse_json_document(&text)
        .ok_or_else(|| ParseError::InvalidAnalysis("response is not JSON".to_string()))?;

    if let Some(analysis) = usable_analysis(&document) {
        return Ok(analysis);
    }

    if let Value::Object(fields) = &document {
        if let Some(analysis) = fields.values().filter(|value| value.is_object()).find_map(usable_analysis) {
            return Ok(analysis);
        }
    }

    Err(ParseError::InvalidAnalysis(
        "genre, style guide and scene outline are all empty".to_string(),
    ))
}

/// Decode field by field so one malformed field or list item does not drop the rest.
fn usable_analysis(value: &Value) -> Option<ProjectAnalysis> {
    let fields = value.as_object()?;
    let analysis = ProjectAnalysis {
        genre: text_field(fields, "genre"),
        tone: text_field(fields, "tone"),
        style_guide: list_field(fields, "style_guide"),
        scene_outline: list_field(fields, "scene_outline"),
        roles: list_field(fields, "roles"),
        initial_glossary: list_field(fields, "initial_glossary"),
    };
    analysis.is_usable().then_some(analysis)
}

fn text_field(fields: &Map<String, Value>, key: &str) -> String {
    fields.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn list_field<T: DeserializeOwned>(fields: &Map<String, Value>, key: &str) -> Vec<T> {
    match fields.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect(),
        _ => Vec::new(),
    }
}
