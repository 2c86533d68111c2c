/*!
 * Subtitle project document: segments, per-language content and metadata.
 */

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::conversation::LlmConversation;
use super::glossary::GlossaryEntry;
use super::task::ConversionTask;

/// Outcome of the last pipeline write for one language of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Ok,
    Error,
    Fallback,
}

/// Provenance of a segment's text in one language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageProcess {
    pub provider: String,
    pub model: String,
    pub task_id: String,
    pub status: ProcessStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    pub updated_at: i64,
}

/// One readability measurement and its severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Guideline {
    pub current: u32,
    /// 0 within limit, 1 slightly over, 2 far over
    pub level: u8,
}

/// Readability metrics of a segment's text in one language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubtitleGuideline {
    pub cps: Guideline,
    pub wpm: Guideline,
    pub cpl: Guideline,
}

/// Readability standard a language track is assessed against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuidelineStandard {
    #[default]
    Netflix,
    Bbc,
    Ade,
}

/// Text of a segment in one language.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageContent {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<LanguageProcess>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guideline: Option<SubtitleGuideline>,
}

impl LanguageContent {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }
}

/// One time-coded subtitle cue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub start_ms: u64,
    pub end_ms: u64,
    #[serde(default)]
    pub languages: BTreeMap<String, LanguageContent>,
    #[serde(default)]
    pub guideline_standard: BTreeMap<String, GuidelineStandard>,
    #[serde(default)]
    pub is_kids_content: bool,
}

impl Segment {
    pub fn new(id: &str, start_ms: u64, end_ms: u64) -> Self {
        Self {
            id: id.to_string(),
            start_ms,
            end_ms,
            ..Default::default()
        }
    }

    /// Set the text for a language.
    pub fn with_text(mut self, language: &str, text: &str) -> Self {
        self.languages.insert(language.to_string(), LanguageContent::new(text));
        self
    }

    /// Text for a language, if present.
    pub fn text(&self, language: &str) -> Option<&str> {
        self.languages.get(language).map(|content| content.text.as_str())
    }

    /// Cue duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.end_ms.saturating_sub(self.start_ms) as f64 / 1000.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneOutline {
    #[serde(default, deserialize_with = "super::string_or_number")]
    pub start_id: String,
    #[serde(default, deserialize_with = "super::string_or_number")]
    pub end_id: String,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub person: String,
    #[serde(default)]
    pub notes: String,
}

/// Project-level style analysis, computed once and reused by later runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectAnalysis {
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub style_guide: Vec<String>,
    #[serde(default)]
    pub scene_outline: Vec<SceneOutline>,
    #[serde(default)]
    pub roles: Vec<RoleInfo>,
    /// Reference-only terms, shown to the model but never masked
    #[serde(default)]
    pub initial_glossary: Vec<GlossaryEntry>,
}

impl ProjectAnalysis {
    /// An analysis is usable when it says anything about genre, style or scenes.
    pub fn is_usable(&self) -> bool {
        !self.genre.trim().is_empty() || !self.style_guide.is_empty() || !self.scene_outline.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ProjectAnalysis>,
    /// Extra terms of the most recent run, reused by failed-only retries
    #[serde(default)]
    pub task_terms: Vec<GlossaryEntry>,
}

/// Coarse translation state of a language track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Translating,
    Done,
    PartialFailed,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageStatus {
    #[serde(default)]
    pub is_original: bool,
    #[serde(default)]
    pub conversion_tasks: Vec<ConversionTask>,
    /// Audit conversations keyed by task id
    #[serde(default)]
    pub llm_conversations: BTreeMap<String, LlmConversation>,
    #[serde(default)]
    pub last_updated: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageMetadata {
    #[serde(default)]
    pub language_name: String,
    #[serde(default)]
    pub translator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_status: Option<SyncStatus>,
    #[serde(default)]
    pub revision: u32,
    /// The single task currently writing this language
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_task_id: Option<String>,
    #[serde(default)]
    pub status: LanguageStatus,
}

/// A subtitle project, persisted as one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubtitleProject {
    pub id: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub metadata: ProjectMetadata,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub language_metadata: BTreeMap<String, LanguageMetadata>,
    #[serde(default)]
    pub updated_at: i64,
}

impl SubtitleProject {
    pub fn new(id: &str, project_name: &str) -> Self {
        Self {
            id: id.to_string(),
            project_name: project_name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_segments(mut self, segments: Vec<Segment>) -> Self {
        self.segments = segments;
        self
    }

    /// Metadata for a language, created empty on first access.
    pub fn language_meta_mut(&mut self, language: &str) -> &mut LanguageMetadata {
        self.language_metadata.entry(language.to_string()).or_default()
    }

    /// Find a task record by id.
    pub fn task(&self, language: &str, task_id: &str) -> Option<&ConversionTask> {
        self.language_metadata
            .get(language)?
            .status
            .conversion_tasks
            .iter()
            .find(|task| task.id == task_id)
    }

    /// Replace the task record with the same id, or append it.
    pub fn upsert_task(&mut self, language: &str, task: &ConversionTask) {
        let tasks = &mut self.language_meta_mut(language).status.conversion_tasks;
        match tasks.iter_mut().find(|existing| existing.id == task.id) {
            Some(existing) => *existing = task.clone(),
            None => tasks.push(task.clone()),
        }
    }

    /// Audit conversation of a task, if one was recorded.
    pub fn conversation(&self, language: &str, task_id: &str) -> Option<&LlmConversation> {
        self.language_metadata
            .get(language)?
            .status
            .llm_conversations
            .get(task_id)
    }

    /// Copy out everything a translation run into `language` writes.
    pub fn language_track(&self, language: &str) -> LanguageTrack {
        let segments = self
            .segments
            .iter()
            .map(|segment| SegmentTrack {
                id: segment.id.clone(),
                content: segment.languages.get(language).cloned(),
                standard: segment.guideline_standard.get(language).copied(),
            })
            .collect();
        let mut meta = self.language_metadata.get(language).cloned();
        if let Some(meta) = meta.as_mut() {
            meta.status.llm_conversations.clear();
        }
        LanguageTrack {
            language: language.to_string(),
            segments,
            meta,
        }
    }

    /// Write a language track over this copy and leave every other language alone.
    ///
    /// Segments are matched by id. Conversations are not part of a track;
    /// the stored ones are kept. Task records are upserted by id.
    pub fn apply_language_track(&mut self, track: LanguageTrack) {
        let LanguageTrack {
            language,
            segments,
            meta,
        } = track;

        let mut by_id: HashMap<String, SegmentTrack> =
            segments.into_iter().map(|segment| (segment.id.clone(), segment)).collect();
        for segment in &mut self.segments {
            let Some(written) = by_id.remove(&segment.id) else {
                continue;
            };
            match written.content {
                Some(content) => segment.languages.insert(language.clone(), content),
                None => segment.languages.remove(&language),
            };
            match written.standard {
                Some(standard) => segment.guideline_standard.insert(language.clone(), standard),
                None => segment.guideline_standard.remove(&language),
            };
        }

        let Some(meta) = meta else {
            return;
        };
        let stored = self.language_meta_mut(&language);
        let conversations = std::mem::take(&mut stored.status.llm_conversations);
        let mut tasks = std::mem::take(&mut stored.status.conversion_tasks);
        for task in &meta.status.conversion_tasks {
            match tasks.iter_mut().find(|existing| existing.id == task.id) {
                Some(existing) => *existing = task.clone(),
                None => tasks.push(task.clone()),
            }
        }
        *stored = meta;
        stored.status.llm_conversations = conversations;
        stored.status.conversion_tasks = tasks;
    }
}

/// One segment's text and standard in a single language
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentTrack {
    pub id: String,
    pub content: Option<LanguageContent>,
    pub standard: Option<GuidelineStandard>,
}

/// The slice of a project owned by the run translating into `language`
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageTrack {
    pub language: String,
    pub segments: Vec<SegmentTrack>,
    /// Language metadata without conversations
    pub meta: Option<LanguageMetadata>,
}
