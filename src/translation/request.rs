/*!
 * Translation run parameters.
 */

use std::fmt;
use std::sync::Arc;

use crate::document::{GlossaryEntry, ProcessStatus, Segment};
use crate::providers::LlmProfile;

/// Selects the segments a run translates
pub type SegmentPredicate = Arc<dyn Fn(&Segment) -> bool + Send + Sync>;

/// Segments whose target text is missing or whose last write failed.
pub fn failed_only(target_lang: &str) -> SegmentPredicate {
    let target = target_lang.to_string();
    Arc::new(move |segment: &Segment| match segment.languages.get(&target) {
        None => true,
        Some(content) => match &content.process {
            None => true,
            Some(process) => matches!(process.status, ProcessStatus::Error | ProcessStatus::Fallback),
        },
    })
}

/// Parameters of one translation run
#[derive(Clone, Default)]
pub struct TranslationRequest {
    pub project_id: String,
    pub source_lang: String,
    pub target_lang: String,
    pub provider_id: String,
    pub model: String,
    /// Glossary sets whose entries are enforced
    pub glossary_set_ids: Vec<String>,
    /// Extra enforced terms for this run
    pub extra_glossary: Vec<GlossaryEntry>,
    /// Withhold masking tokens from the disclosed glossary
    pub strict_glossary: bool,
    /// Restrict the run to matching segments; any filter marks a retry run
    pub filter: Option<SegmentPredicate>,
    pub profile: Option<LlmProfile>,
    /// Overrides the configured batch size
    pub batch_size: Option<usize>,
}

impl TranslationRequest {
    pub fn new(project_id: &str, source_lang: &str, target_lang: &str, provider_id: &str, model: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            provider_id: provider_id.to_string(),
            model: model.to_string(),
            ..Default::default()
        }
    }

    pub fn with_glossary_sets(mut self, set_ids: &[&str]) -> Self {
        self.glossary_set_ids = set_ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn with_extra_glossary(mut self, entries: Vec<GlossaryEntry>) -> Self {
        self.extra_glossary = entries;
        self
    }

    pub fn with_strict_glossary(mut self, strict: bool) -> Self {
        self.strict_glossary = strict;
        self
    }

    pub fn with_filter(mut self, filter: SegmentPredicate) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_profile(mut self, profile: LlmProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// A run restricted by a filter only revisits earlier work.
    pub fn is_retry_run(&self) -> bool {
        self.filter.is_some()
    }
}

impl fmt::Debug for TranslationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationRequest")
            .field("project_id", &self.project_id)
            .field("source_lang", &self.source_lang)
            .field("target_lang", &self.target_lang)
            .field("provider_id", &self.provider_id)
            .field("model", &self.model)
            .field("glossary_set_ids", &self.glossary_set_ids)
            .field("extra_glossary", &self.extra_glossary.len())
            .field("strict_glossary", &self.strict_glossary)
            .field("filter", &self.filter.is_some())
            .field("profile", &self.profile)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}
