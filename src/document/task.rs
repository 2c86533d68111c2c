/*!
 * Conversion task records and token accounting.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Task type recorded for LLM translation runs.
pub const LLM_TRANSLATE_TASK: &str = "llm_translate";

/// Lifecycle status of a conversion task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Whether the task has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Named pipeline stage shown to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStage {
    AnalysisStarted,
    AnalysisDone,
    BatchSending,
    BatchReceived,
    BatchParsed,
    BatchApplied,
    Aborted,
    Cancelled,
    Completed,
}

impl TaskStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnalysisStarted => "analysis_started",
            Self::AnalysisDone => "analysis_done",
            Self::BatchSending => "batch_sending",
            Self::BatchReceived => "batch_received",
            Self::BatchParsed => "batch_parsed",
            Self::BatchApplied => "batch_applied",
            Self::Aborted => "aborted",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token usage reported by a provider call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.prompt_tokens == 0 && self.completion_tokens == 0 && self.total_tokens == 0
    }

    /// Add another usage report to this one.
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Persisted record of one translation run for one language.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionTask {
    pub id: String,

    #[serde(rename = "type")]
    pub task_type: String,

    pub status: TaskStatus,

    /// Percentage of the selected subset processed (0-100)
    #[serde(default)]
    pub progress: f64,

    #[serde(default)]
    pub start_time: i64,

    #[serde(default)]
    pub end_time: i64,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,

    pub source_lang: String,
    pub target_lang: String,

    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub provider_id: String,
    #[serde(default)]
    pub model: String,

    /// Size of the selected subset
    #[serde(default)]
    pub total_segments: usize,
    #[serde(default)]
    pub processed_segments: usize,
    #[serde(default)]
    pub failed_segments: usize,

    /// Segment count of the whole project
    #[serde(default)]
    pub project_total_segments: usize,
    /// Segments outside the selected subset, counted as already done
    #[serde(default)]
    pub project_completed_segments: usize,

    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub request_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<TaskStage>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stage_detail: String,
}

impl ConversionTask {
    /// Add provider usage; only non-zero reports count as a request.
    pub fn add_usage(&mut self, usage: &TokenUsage) {
        if usage.is_zero() {
            return;
        }
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total_tokens;
        self.request_count += 1;
    }

    /// Recompute `progress` from processed and total counts.
    pub fn refresh_progress(&mut self) {
        self.progress = if self.total_segments > 0 {
            (self.processed_segments as f64 / self.total_segments as f64 * 100.0).min(100.0)
        } else {
            0.0
        };
    }
}
