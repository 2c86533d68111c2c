/*!
 * Translator configuration module.
 *
 * Loads, validates and saves the pipeline settings.
 */

use anyhow::{Context, Result, anyhow};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::Path;
use std::time::Duration;

use crate::document::GuidelineStandard;

/// Represents the translation pipeline configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TranslatorConfig {
    /// Segments sent to the model per request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Source/target pairs of the previous batch carried as boundary context
    #[serde(default = "default_boundary_tail")]
    pub boundary_tail: usize,

    /// Already translated pairs shown to the model as style references
    #[serde(default = "default_max_reference_pairs")]
    pub max_reference_pairs: usize,

    /// Style guide rules included in the global style digest
    #[serde(default = "default_max_style_rules")]
    pub max_style_rules: usize,

    /// Reference-only glossary hints sent per batch
    #[serde(default = "default_max_auto_glossary")]
    pub max_auto_glossary: usize,

    /// Persist and publish progress every N processed segments inside a batch
    #[serde(default = "default_progress_flush_every")]
    pub progress_flush_every: usize,

    /// Failed segment ids quoted in a partial failure message
    #[serde(default = "default_failed_id_sample")]
    pub failed_id_sample: usize,

    /// Temperature for batch requests when no profile overrides it
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Temperature for the project analysis request
    #[serde(default = "default_analysis_temperature")]
    pub analysis_temperature: f32,

    /// How long glossary set lookups are cached
    #[serde(default = "default_glossary_cache_ttl_secs")]
    pub glossary_cache_ttl_secs: u64,

    /// Readability standard assigned to newly translated tracks
    #[serde(default)]
    pub guideline_standard: GuidelineStandard,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Matching filter for the log facade
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
            Self::Trace => LevelFilter::Trace,
        }
    }
}

fn default_batch_size() -> usize {
    20
}

fn default_boundary_tail() -> usize {
    5
}

fn default_max_reference_pairs() -> usize {
    8
}

fn default_max_style_rules() -> usize {
    6
}

fn default_max_auto_glossary() -> usize {
    100
}

fn default_progress_flush_every() -> usize {
    20
}

fn default_failed_id_sample() -> usize {
    10
}

fn default_temperature() -> f32 {
    0.2
}

fn default_analysis_temperature() -> f32 {
    0.1
}

fn default_glossary_cache_ttl_secs() -> u64 {
    300
}

impl TranslatorConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(anyhow!("batch_size must be greater than zero"));
        }
        if self.progress_flush_every == 0 {
            return Err(anyhow!("progress_flush_every must be greater than zero"));
        }
        for (name, value) in [
            ("default_temperature", self.default_temperature),
            ("analysis_temperature", self.analysis_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(anyhow!("{} must be between 0.0 and 2.0, got {}", name, value));
            }
        }
        Ok(())
    }

    /// Override the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Override the glossary cache lifetime.
    pub fn with_glossary_cache_ttl(mut self, ttl: Duration) -> Self {
        self.glossary_cache_ttl_secs = ttl.as_secs();
        self
    }

    pub fn glossary_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.glossary_cache_ttl_secs)
    }
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            boundary_tail: default_boundary_tail(),
            max_reference_pairs: default_max_reference_pairs(),
            max_style_rules: default_max_style_rules(),
            max_auto_glossary: default_max_auto_glossary(),
            progress_flush_every: default_progress_flush_every(),
            failed_id_sample: default_failed_id_sample(),
            default_temperature: default_temperature(),
            analysis_temperature: default_analysis_temperature(),
            glossary_cache_ttl_secs: default_glossary_cache_ttl_secs(),
            guideline_standard: GuidelineStandard::default(),
            log_level: LogLevel::default(),
        }
    }
}
