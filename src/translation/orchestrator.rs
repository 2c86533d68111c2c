/*!
 * Batch translation orchestrator.
 *
 * `TranslationService` validates a request, records a new task on the
 * project and spawns one sequential run per (project, target language).
 * A run:
 * - Ensures the project analysis (once per project, non-fatal on failure)
 * - Resolves enforced glossary terms and analysis hints
 * - Translates the selected segments batch by batch, masking markup and
 *   glossary terms, negotiating JSON mode vs. JSONL and retrying once
 * - Writes results per segment without ever overwriting text on failure
 * - Persists progress, usage and an audit conversation along the way
 *
 * A batch that yields no items after its retry aborts the whole run.
 */

use log::{debug, error, info, warn};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::app_config::TranslatorConfig;
use crate::document::task::LLM_TRANSLATE_TASK;
use crate::document::{
    ChatRole, ConversationStatus, ConversionTask, LanguageProcess, MessageKind, ProcessStatus, SubtitleProject,
    SyncStatus, TaskStage, TaskStatus, unix_now,
};
use crate::errors::{ParseError, ProviderError, TranslationError};
use crate::events::EventPublisher;
use crate::language_utils::{is_same_language, language_label};
use crate::providers::{ChatCompletion, ChatCompletionClient, ChatMessage, ChatOptions, LlmProfile, StreamCallback};
use crate::storage::{DocumentStore, GlossaryStore};

use super::analysis::ProjectAnalyzer;
use super::conversation::{ConversationInfo, ConversationRecorder, metadata};
use super::glossary::{GlossaryResolver, ResolvedGlossary};
use super::masking::{mask_general, mask_glossary, restore};
use super::progress::{ProgressReporter, short_id};
use super::prompts::{
    BatchItem, BatchPayload, BatchPromptBuilder, BoundaryContext, GlobalStyle, ReferencePair, disclose_glossary,
};
use super::protocol::{Diagnostics, ProtocolNegotiator};
use super::quality::QualityAssessor;
use super::request::{TranslationRequest, failed_only};
use super::response::{TranslatedItem, parse_json_items, parse_jsonl};
use super::tasks::{TaskHandle, TaskKey, TaskOutcome, TaskRegistry};

/// Reason recorded when a batch produced nothing after its retry
pub const ABORT_NO_OUTPUT: &str = "request_failed_or_no_output_after_retry";

/// Process error for a segment the model did not return
pub const NO_OUTPUT_FOR_ID: &str = "no_output_for_id";

/// Requests per protocol attempt, including the retry
const MAX_ATTEMPTS: usize = 2;

/// Entry point for translation runs
#[derive(Clone)]
pub struct TranslationService {
    client: Arc<dyn ChatCompletionClient>,
    store: Arc<dyn DocumentStore>,
    publisher: Arc<dyn EventPublisher>,
    glossary: GlossaryResolver,
    registry: TaskRegistry,
    config: TranslatorConfig,
}

impl TranslationService {
    pub fn new(
        client: Arc<dyn ChatCompletionClient>,
        store: Arc<dyn DocumentStore>,
        glossary_store: Arc<dyn GlossaryStore>,
        publisher: Arc<dyn EventPublisher>,
        config: TranslatorConfig,
    ) -> Self {
        let glossary = GlossaryResolver::new(glossary_store, config.glossary_cache_ttl());
        Self {
            client,
            store,
            publisher,
            glossary,
            registry: TaskRegistry::new(),
            config,
        }
    }

    /// Replace the glossary resolver, e.g. to share its cache or inject a clock.
    pub fn with_glossary_resolver(mut self, glossary: GlossaryResolver) -> Self {
        self.glossary = glossary;
        self
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Validate the request, record the task and start it in the background.
    pub async fn start(&self, request: TranslationRequest) -> Result<TaskHandle, TranslationError> {
        if is_same_language(&request.source_lang, &request.target_lang) {
            return Err(TranslationError::SameLanguage(request.target_lang.clone()));
        }

        let mut project = self.store.get(&request.project_id).await?;
        if project.segments.is_empty() {
            return Err(TranslationError::EmptyProject(request.project_id.clone()));
        }

        let task_id = Uuid::new_v4().to_string();
        let key = TaskKey::new(&request.project_id, &request.target_lang);
        let cancel = self.registry.reserve(&key, &task_id)?;

        match self.prepare_run(&mut project, request, &task_id, cancel.clone()).await {
            Ok(run) => Ok(self.registry.spawn(key, &task_id, cancel, run.run())),
            Err(e) => {
                self.registry.release(&key, &task_id);
                Err(e)
            }
        }
    }

    /// Run a translation to completion.
    pub async fn translate(&self, request: TranslationRequest) -> Result<TaskOutcome, TranslationError> {
        self.start(request).await?.wait().await
    }

    /// Translate only segments whose target text is missing or failed.
    pub async fn retry_failed(&self, request: TranslationRequest) -> Result<TaskOutcome, TranslationError> {
        let request = match request.filter {
            Some(_) => request,
            None => {
                let filter = failed_only(&request.target_lang);
                request.with_filter(filter)
            }
        };
        self.translate(request).await
    }

    /// Cancel the running task of a language. Returns false when none is running.
    pub fn cancel(&self, project_id: &str, target_lang: &str) -> bool {
        self.registry.cancel(&TaskKey::new(project_id, target_lang))
    }

    /// Create the task record, persist it and build the run.
    async fn prepare_run(
        &self,
        project: &mut SubtitleProject,
        request: TranslationRequest,
        task_id: &str,
        cancel: CancellationToken,
    ) -> Result<TaskRun, TranslationError> {
        let project_total = project.segments.len();
        let task_total = match &request.filter {
            Some(filter) => project.segments.iter().filter(|segment| filter(*segment)).count(),
            None => project_total,
        };

        let provider = request.provider_id.clone();
        let task = ConversionTask {
            id: task_id.to_string(),
            task_type: LLM_TRANSLATE_TASK.to_string(),
            status: TaskStatus::Processing,
            start_time: unix_now(),
            source_lang: request.source_lang.clone(),
            target_lang: request.target_lang.clone(),
            provider: provider.clone(),
            provider_id: request.provider_id.clone(),
            model: request.model.clone(),
            total_segments: task_total,
            project_total_segments: project_total,
            project_completed_segments: project_total - task_total,
            ..Default::default()
        };

        let source_label = display_name(project, &request.source_lang);
        let target_label = display_name(project, &request.target_lang);
        let meta = project.language_meta_mut(&request.target_lang);
        if meta.language_name.trim().is_empty() {
            meta.language_name = target_label.clone();
        }
        meta.translator = format!("llm/{}", provider);
        meta.sync_status = Some(SyncStatus::Translating);
        meta.active_task_id = Some(task_id.to_string());
        meta.status.is_original = false;
        meta.status.last_updated = unix_now();
        meta.status.conversion_tasks.push(task.clone());

        let track = project.language_track(&request.target_lang);
        let edit = Box::new(move |stored: &mut SubtitleProject| stored.apply_language_track(track));
        *project = self.store.update(&request.project_id, edit).await?;

        let mut progress = ProgressReporter::new(
            self.store.clone(),
            self.publisher.clone(),
            &request.project_id,
            &request.target_lang,
            task,
        );
        progress.set_stage(TaskStage::AnalysisStarted, "project_overview");
        progress.report().await;

        let recorder = ConversationRecorder::new(
            self.store.clone(),
            self.publisher.clone(),
            ConversationInfo {
                project_id: request.project_id.clone(),
                language: request.target_lang.clone(),
                task_id: task_id.to_string(),
                provider: provider.clone(),
                provider_id: request.provider_id.clone(),
                model: request.model.clone(),
            },
        );
        recorder
            .append(
                MessageKind::Meta,
                ChatRole::App,
                &format!(
                    "Start LLM subtitle translation: {} → {} (provider={}, model={}, total_segments={})",
                    request.source_lang, request.target_lang, provider, request.model, task_total
                ),
                TaskStage::AnalysisStarted.as_str(),
                metadata([("project_total", json!(project_total)), ("task_total", json!(task_total))]),
            )
            .await;

        info!(
            "[{}] Starting translation of project {} {} → {} ({} of {} segments)",
            short_id(task_id),
            request.project_id,
            request.source_lang,
            request.target_lang,
            task_total,
            project_total
        );

        let negotiator = ProtocolNegotiator::new(
            request.profile.as_ref().and_then(|profile| profile.json_mode),
            request.is_retry_run(),
        );

        Ok(TaskRun {
            client: self.client.clone(),
            store: self.store.clone(),
            analyzer: ProjectAnalyzer::new(self.client.clone(), self.store.clone(), self.config.analysis_temperature),
            glossary: self.glossary.clone(),
            config: self.config.clone(),
            task_id: task_id.to_string(),
            provider,
            source_label,
            target_label,
            project: project.clone(),
            request,
            progress,
            recorder,
            cancel,
            negotiator,
            diagnostics: Diagnostics::new(),
            quality: QualityAssessor::new(),
            processed: 0,
            failed: 0,
            failed_sample: Vec::new(),
            references: Vec::new(),
            boundary: BoundaryContext::default(),
        })
    }
}

/// Prompt label for a language: the track's configured name, else the ISO name.
fn display_name(project: &SubtitleProject, code: &str) -> String {
    project
        .language_metadata
        .get(code)
        .map(|meta| meta.language_name.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| language_label(code))
}

/// How a run ended before finalization
#[derive(Debug, Clone, PartialEq)]
enum RunEnd {
    Finished,
    Aborted(String),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Protocol {
    Json,
    Jsonl,
}

impl Protocol {
    fn is_json(self) -> bool {
        self == Self::Json
    }

    fn label(self) -> &'static str {
        match self {
            Self::Json => "json-mode",
            Self::Jsonl => "jsonl",
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Self::Json => "[JSON mode]",
            Self::Jsonl => "[JSONL]",
        }
    }

    fn stage(self) -> &'static str {
        match self {
            Self::Json => "batch_json",
            Self::Jsonl => "batch_jsonl",
        }
    }

    fn stream_stage(self) -> &'static str {
        match self {
            Self::Json => "batch_json_stream",
            Self::Jsonl => "batch_jsonl_stream",
        }
    }

    fn error_stage(self) -> &'static str {
        match self {
            Self::Json => "batch_json_error",
            Self::Jsonl => "batch_jsonl_error",
        }
    }

    fn failure_message(self, error: &ProviderError) -> String {
        match self {
            Self::Json => format!("JSON mode request failed after retry: {}", error),
            Self::Jsonl => format!("Batch request failed after retry: {}", error),
        }
    }

    /// JSONL also retries a readable response without items; JSON mode gives up.
    fn retries_unparsable(self) -> bool {
        self == Self::Jsonl
    }

    fn parse(self, content: &str) -> Result<Vec<TranslatedItem>, ParseError> {
        match self {
            Self::Json => parse_json_items(content),
            Self::Jsonl => parse_jsonl(content),
        }
    }
}

/// Position of a batch within the run
#[derive(Debug, Clone, Copy)]
struct BatchLabel {
    index: usize,
    count: usize,
    items: usize,
}

impl BatchLabel {
    fn metadata(&self, json_mode: bool) -> Map<String, Value> {
        metadata([
            ("batch_index", json!(self.index)),
            ("batch_count", json!(self.count)),
            ("items", json!(self.items)),
            ("json_mode", json!(json_mode)),
        ])
    }
}

impl fmt::Display for BatchLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch {}/{}", self.index, self.count)
    }
}

/// State of one background run
struct TaskRun {
    client: Arc<dyn ChatCompletionClient>,
    store: Arc<dyn DocumentStore>,
    analyzer: ProjectAnalyzer,
    glossary: GlossaryResolver,
    config: TranslatorConfig,
    request: TranslationRequest,
    task_id: String,
    provider: String,
    source_label: String,
    target_label: String,
    project: SubtitleProject,
    progress: ProgressReporter,
    recorder: ConversationRecorder,
    cancel: CancellationToken,
    negotiator: ProtocolNegotiator,
    diagnostics: Diagnostics,
    quality: QualityAssessor,
    processed: usize,
    failed: usize,
    failed_sample: Vec<String>,
    references: Vec<ReferencePair>,
    boundary: BoundaryContext,
}

impl TaskRun {
    async fn run(mut self) -> Result<TaskOutcome, TranslationError> {
        let end = self.execute().await;
        Ok(self.finalize(end).await)
    }

    async fn execute(&mut self) -> RunEnd {
        let style = match self.analyze().await {
            Ok(style) => style,
            Err(end) => return end,
        };
        let glossary = self.resolve_glossary().await;

        let selected: Vec<usize> = match &self.request.filter {
            Some(filter) => (0..self.project.segments.len())
                .filter(|&index| filter(&self.project.segments[index]))
                .collect(),
            None => (0..self.project.segments.len()).collect(),
        };

        let batch_size = self
            .request
            .batch_size
            .filter(|size| *size > 0)
            .unwrap_or(self.config.batch_size)
            .max(1);
        let batch_count = selected.len().div_ceil(batch_size);

        for (position, chunk) in selected.chunks(batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                return RunEnd::Cancelled;
            }
            let batch = BatchLabel {
                index: position + 1,
                count: batch_count,
                items: chunk.len(),
            };
            if let Err(end) = self.run_batch(batch, chunk, &style, &glossary).await {
                return end;
            }
        }

        RunEnd::Finished
    }

    /// Ensure the project analysis and condense it into the style digest.
    async fn analyze(&mut self) -> Result<GlobalStyle, RunEnd> {
        self.recorder
            .append(
                MessageKind::Meta,
                ChatRole::App,
                "Analyze project structure and style before translation (project-level overview).",
                TaskStage::AnalysisStarted.as_str(),
                Map::new(),
            )
            .await;

        let analysis = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(RunEnd::Cancelled),
            outcome = self.analyzer.ensure_analysis(
                &mut self.project,
                &self.request.source_lang,
                &self.request.provider_id,
                &self.request.model,
                self.request.profile.as_ref(),
            ) => outcome,
        };

        if let Err(e) = &analysis.result {
            warn!("[{}] Analysis failed, continuing without it: {}", short_id(&self.task_id), e);
            self.diagnostics.push(format!("analysis failed: {}", e));
            self.recorder
                .append(
                    MessageKind::Error,
                    ChatRole::Provider,
                    &format!("Project analysis failed: {}", e),
                    "analysis_error",
                    Map::new(),
                )
                .await;
        }

        self.progress.set_stage(TaskStage::AnalysisDone, "project_overview");
        self.progress.add_usage(&analysis.usage);
        if !analysis.usage.is_zero() {
            let usage = analysis.usage;
            self.recorder
                .append(
                    MessageKind::Meta,
                    ChatRole::Provider,
                    &format!(
                        "Project analysis completed. Tokens: prompt={}, completion={}, total={}.",
                        usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
                    ),
                    TaskStage::AnalysisDone.as_str(),
                    Map::new(),
                )
                .await;
        }
        self.progress.report().await;

        let analysis = analysis.result.ok();
        Ok(GlobalStyle::from_analysis(analysis.as_ref(), self.config.max_style_rules))
    }

    async fn resolve_glossary(&mut self) -> ResolvedGlossary {
        let resolved = self
            .glossary
            .resolve(
                &self.request.glossary_set_ids,
                &self.request.extra_glossary,
                &self.project.metadata.task_terms,
                self.request.is_retry_run(),
            )
            .await
            .with_hints(self.project.metadata.analysis.as_ref());

        if let Some(terms) = &resolved.task_terms_update {
            self.project.metadata.task_terms = terms.clone();
            let terms = terms.clone();
            let edit = Box::new(move |stored: &mut SubtitleProject| stored.metadata.task_terms = terms);
            if let Err(e) = self.store.update(&self.project.id, edit).await {
                warn!("[{}] Failed to save task terms: {}", short_id(&self.task_id), e);
            }
        }

        debug!(
            "[{}] Glossary: {} enforced, {} hints",
            short_id(&self.task_id),
            resolved.enforced.len(),
            resolved.hints.len()
        );
        resolved
    }

    async fn run_batch(
        &mut self,
        batch: BatchLabel,
        positions: &[usize],
        style: &GlobalStyle,
        glossary: &ResolvedGlossary,
    ) -> Result<(), RunEnd> {
        let target = self.request.target_lang.clone();
        let ids: Vec<String> = positions.iter().map(|&p| self.project.segments[p].id.clone()).collect();
        let sources: Vec<String> = positions
            .iter()
            .map(|&p| {
                self.project.segments[p]
                    .text(&self.request.source_lang)
                    .unwrap_or("")
                    .trim()
                    .to_string()
            })
            .collect();

        let (general_masked, general_restore) = mask_general(&sources);
        let glossary_mask = mask_glossary(&general_masked, &glossary.enforced, &target);

        let payload = BatchPayload {
            global_style: style.clone(),
            glossary: disclose_glossary(
                glossary,
                &glossary_mask.used,
                self.request.strict_glossary,
                self.config.max_auto_glossary,
            ),
            reference_translations: self.references.clone(),
            boundary_context: self.boundary.clone(),
            batch: ids
                .iter()
                .zip(&glossary_mask.masked)
                .map(|(id, text)| BatchItem {
                    id: id.clone(),
                    text: text.clone(),
                })
                .collect(),
        };

        self.progress.set_stage(
            TaskStage::BatchSending,
            format!("{}, size {} items", batch, batch.items),
        );
        self.progress.report().await;

        let items = self.request_items(batch, &payload).await?;
        if items.is_empty() {
            warn!("[{}] No output for {} after retry, aborting", short_id(&self.task_id), batch);
            return Err(RunEnd::Aborted(ABORT_NO_OUTPUT.to_string()));
        }

        self.progress
            .set_stage(TaskStage::BatchReceived, format!("{}, got {} items", batch, items.len()));
        self.progress.report().await;

        let got: HashMap<String, TranslatedItem> =
            items.into_iter().map(|item| (item.id.trim().to_string(), item)).collect();
        self.progress
            .set_stage(TaskStage::BatchParsed, format!("{}, parsed {} items", batch, got.len()));
        self.progress.report().await;

        for (offset, &position) in positions.iter().enumerate() {
            let output = got
                .get(&ids[offset])
                .and_then(TranslatedItem::output)
                .map(|text| restore(&restore(text, &glossary_mask.restore), &general_restore));
            self.apply_output(position, &sources[offset], output);

            if self.processed % self.config.progress_flush_every.max(1) == 0 {
                self.progress.record_counts(self.processed, self.failed);
                self.save_document().await;
                self.progress.publish();
            }
        }

        let tail = self.config.boundary_tail.min(positions.len());
        let tail_positions = &positions[positions.len() - tail..];
        self.boundary = BoundaryContext {
            prev_src: sources[sources.len() - tail..].to_vec(),
            prev_dst: tail_positions
                .iter()
                .map(|&p| self.project.segments[p].text(&target).unwrap_or("").trim().to_string())
                .collect(),
        };

        self.progress.record_counts(self.processed, self.failed);
        self.save_document().await;
        self.progress.set_stage(
            TaskStage::BatchApplied,
            format!("{}, processed={} failed={}", batch, self.processed, self.failed),
        );
        self.progress.report().await;
        self.recorder
            .append(
                MessageKind::Meta,
                ChatRole::App,
                &format!(
                    "Applied batch {}/{} to subtitles (processed={}, failed={}).",
                    batch.index, batch.count, self.processed, self.failed
                ),
                TaskStage::BatchApplied.as_str(),
                metadata([
                    ("batch_index", json!(batch.index)),
                    ("batch_count", json!(batch.count)),
                    ("processed", json!(self.processed)),
                    ("failed", json!(self.failed)),
                ]),
            )
            .await;

        debug!(
            "[{}] Applied {} (processed={}, failed={})",
            short_id(&self.task_id),
            batch,
            self.processed,
            self.failed
        );
        Ok(())
    }

    /// Write one segment result. Missing output never touches existing text.
    fn apply_output(&mut self, position: usize, source: &str, output: Option<String>) {
        let target = self.request.target_lang.as_str();
        let mut process = LanguageProcess {
            provider: self.provider.clone(),
            model: self.request.model.clone(),
            task_id: self.task_id.clone(),
            status: ProcessStatus::Ok,
            error: String::new(),
            updated_at: unix_now(),
        };

        let segment = &mut self.project.segments[position];
        match output {
            Some(text) => {
                let content = segment.languages.entry(target.to_string()).or_default();
                content.text = text;
                content.process = Some(process);
                segment
                    .guideline_standard
                    .entry(target.to_string())
                    .or_insert(self.config.guideline_standard);
            }
            None => {
                self.failed += 1;
                if self.failed_sample.len() < self.config.failed_id_sample {
                    self.failed_sample.push(segment.id.clone());
                }
                process.status = ProcessStatus::Error;
                process.error = NO_OUTPUT_FOR_ID.to_string();
                if let Some(content) = segment.languages.get_mut(target) {
                    content.process = Some(process);
                }
            }
        }

        self.quality.assess_segment(segment);
        self.processed += 1;

        if self.references.len() < self.config.max_reference_pairs {
            if let Some(text) = segment.text(target).filter(|text| !text.trim().is_empty()) {
                self.references.push(ReferencePair {
                    src: source.to_string(),
                    dst: text.to_string(),
                });
            }
        }
    }

    /// Items for one batch: JSON mode when negotiated, falling back to JSONL.
    async fn request_items(&mut self, batch: BatchLabel, payload: &BatchPayload) -> Result<Vec<TranslatedItem>, RunEnd> {
        if self.negotiator.use_json_mode(batch.index - 1) {
            let items = self.attempt(Protocol::Json, batch, payload).await?;
            if !items.is_empty() {
                self.negotiator.record_json_success();
                return Ok(items);
            }
            self.negotiator.record_json_failure();
        }
        self.attempt(Protocol::Jsonl, batch, payload).await
    }

    /// One protocol attempt with a single retry. An empty list means no usable output.
    async fn attempt(
        &mut self,
        protocol: Protocol,
        batch: BatchLabel,
        payload: &BatchPayload,
    ) -> Result<Vec<TranslatedItem>, RunEnd> {
        let json_mode = protocol.is_json();
        let profile = self.request.profile.as_ref();
        let builder = BatchPromptBuilder::new(&self.source_label, &self.target_label, json_mode)
            .with_system_prefix(profile.map(|profile| profile.sys_prompt_tpl.as_str()));
        let (system, user) = builder.build(payload);
        let options = LlmProfile::chat_options(profile, self.config.default_temperature, json_mode);

        let preview = format!(
            "Batch {}/{} ({} items) {}\n\nSystem:\n{}\n\nUser:\n{}",
            batch.index,
            batch.count,
            batch.items,
            protocol.tag(),
            system,
            user
        );
        self.recorder
            .append(
                MessageKind::Request,
                ChatRole::App,
                &preview,
                protocol.stage(),
                batch.metadata(json_mode),
            )
            .await;
        let messages = [ChatMessage::system(system), ChatMessage::user(user)];

        for attempt in 1..=MAX_ATTEMPTS {
            let retry = if attempt > 1 { " (retry)" } else { "" };
            let last_attempt = attempt == MAX_ATTEMPTS;

            let completion = match self.call(protocol, batch, &messages, &options).await? {
                Ok(completion) => completion,
                Err(e) => {
                    warn!("[{}] {} request failed{} {}: {}", short_id(&self.task_id), protocol.label(), retry, batch, e);
                    self.diagnostics
                        .push(format!("{} request failed{} {}: {}", protocol.label(), retry, batch, e));
                    if last_attempt {
                        self.recorder
                            .append(
                                MessageKind::Error,
                                ChatRole::Provider,
                                &protocol.failure_message(&e),
                                protocol.error_stage(),
                                batch.metadata(json_mode),
                            )
                            .await;
                    }
                    continue;
                }
            };

            self.progress.add_usage(&completion.usage);
            let mut response_meta = batch.metadata(json_mode);
            response_meta.insert("prompt_tokens".to_string(), json!(completion.usage.prompt_tokens));
            response_meta.insert("completion_tokens".to_string(), json!(completion.usage.completion_tokens));
            response_meta.insert("total_tokens".to_string(), json!(completion.usage.total_tokens));
            self.recorder
                .append(
                    MessageKind::Response,
                    ChatRole::Provider,
                    &completion.content,
                    protocol.stage(),
                    response_meta,
                )
                .await;

            match protocol.parse(&completion.content) {
                Ok(items) => {
                    self.progress.persist().await;
                    return Ok(items);
                }
                Err(e) => {
                    warn!("[{}] parse {} failed{} {}: {}", short_id(&self.task_id), protocol.label(), retry, batch, e);
                    self.diagnostics
                        .push(format!("parse {} failed{} {}: {}", protocol.label(), retry, batch, e));
                    if last_attempt || !protocol.retries_unparsable() {
                        self.recorder
                            .append(
                                MessageKind::Error,
                                ChatRole::Provider,
                                &format!("Could not parse {} response: {}", protocol.label(), e),
                                protocol.error_stage(),
                                batch.metadata(json_mode),
                            )
                            .await;
                        break;
                    }
                }
            }
        }

        self.progress.persist().await;
        Ok(Vec::new())
    }

    /// One completion request, raced against cancellation. Deltas go to the event bus only.
    async fn call(
        &self,
        protocol: Protocol,
        batch: BatchLabel,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<Result<ChatCompletion, ProviderError>, RunEnd> {
        let recorder = &self.recorder;
        let delta_meta = batch.metadata(protocol.is_json());
        let forward = |delta: &str| recorder.push_delta(delta, protocol.stream_stage(), delta_meta.clone());
        let on_delta: &StreamCallback<'_> = &forward;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RunEnd::Cancelled),
            result = self.client.chat_completion(
                &self.request.provider_id,
                &self.request.model,
                messages,
                options,
                Some(on_delta),
            ) => Ok(result),
        }
    }

    /// Write this run's language track and task snapshot over the stored project.
    ///
    /// Other languages, conversations and project metadata stay as stored.
    async fn save_document(&mut self) {
        self.progress.apply_to(&mut self.project);
        let track = self.project.language_track(&self.request.target_lang);
        let edit = Box::new(move |stored: &mut SubtitleProject| stored.apply_language_track(track));
        if let Err(e) = self.store.update(&self.project.id, edit).await {
            warn!("[{}] Failed to save project {}: {}", short_id(&self.task_id), self.project.id, e);
        }
    }

    async fn finalize(mut self, end: RunEnd) -> TaskOutcome {
        let processed = self.processed;
        let failed = self.failed;
        self.progress.record_counts(processed, failed);

        let diagnostics = self.diagnostics.render();
        let (sync_status, conversation_status) = {
            let task = self.progress.task_mut();
            match &end {
                RunEnd::Aborted(reason) => {
                    task.status = TaskStatus::Failed;
                    task.stage = Some(TaskStage::Aborted);
                    task.stage_detail = reason.clone();
                    task.error_message = format!("{}\n{}", reason, diagnostics);
                    (SyncStatus::Failed, ConversationStatus::Failed)
                }
                RunEnd::Cancelled => {
                    task.status = TaskStatus::Cancelled;
                    task.stage = Some(TaskStage::Cancelled);
                    task.stage_detail = "cancelled".to_string();
                    task.error_message = if diagnostics.is_empty() {
                        "cancelled".to_string()
                    } else {
                        format!("cancelled\n{}", diagnostics)
                    };
                    (SyncStatus::Failed, ConversationStatus::Failed)
                }
                RunEnd::Finished => {
                    task.progress = 100.0;
                    task.stage = Some(TaskStage::Completed);
                    task.stage_detail = format!("processed={} failed={}", processed, failed);
                    if failed > 0 {
                        task.status = TaskStatus::Failed;
                        let mut message = format!(
                            "partial_failed: {} segments did not produce output\nProcessed={} Failed={}\n",
                            failed, processed, failed
                        );
                        if !self.failed_sample.is_empty() {
                            message.push_str(&format!("FailedIDs(sample)={}\n", self.failed_sample.join(", ")));
                        }
                        message.push_str(&diagnostics);
                        task.error_message = message;
                        (SyncStatus::PartialFailed, ConversationStatus::Failed)
                    } else {
                        task.status = TaskStatus::Completed;
                        (SyncStatus::Done, ConversationStatus::Finished)
                    }
                }
            }
        };
        self.progress.task_mut().end_time = unix_now();

        let meta = self.project.language_meta_mut(&self.request.target_lang);
        meta.revision += 1;
        meta.sync_status = Some(sync_status);
        if meta.active_task_id.as_deref() == Some(self.task_id.as_str()) {
            meta.active_task_id = None;
        }
        self.save_document().await;
        self.progress.publish();

        let (kind, content, stage) = match &end {
            RunEnd::Aborted(reason) => (
                MessageKind::Error,
                format!("Translation aborted: {} (processed={}, failed={}).", reason, processed, failed),
                TaskStage::Aborted,
            ),
            RunEnd::Cancelled => (
                MessageKind::Meta,
                format!("Translation cancelled (processed={}, failed={}).", processed, failed),
                TaskStage::Cancelled,
            ),
            RunEnd::Finished => {
                let summary = if failed > 0 { "partial_failed" } else { "completed" };
                (
                    MessageKind::Meta,
                    format!("Translation {}. Segments: processed={}, failed={}.", summary, processed, failed),
                    TaskStage::Completed,
                )
            }
        };
        self.recorder
            .append(
                kind,
                ChatRole::App,
                &content,
                stage.as_str(),
                metadata([("processed", json!(processed)), ("failed", json!(failed))]),
            )
            .await;
        self.recorder.mark_finished(conversation_status).await;

        let task_id = short_id(&self.task_id);
        match &end {
            RunEnd::Aborted(reason) => error!(
                "[{}] Translation aborted: {} (processed={}, failed={})",
                task_id, reason, processed, failed
            ),
            RunEnd::Cancelled => info!(
                "[{}] Translation cancelled (processed={}, failed={})",
                task_id, processed, failed
            ),
            RunEnd::Finished => info!(
                "[{}] Translation finished (processed={}, failed={})",
                task_id, processed, failed
            ),
        }

        TaskOutcome {
            task: self.progress.task().clone(),
            aborted: matches!(end, RunEnd::Aborted(_)),
        }
    }
}
