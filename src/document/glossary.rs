/*!
 * Glossary entries shared by glossary sets, task terms and analysis hints.
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A curated term with a fixed rendering or a do-not-translate flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    #[serde(default)]
    pub id: String,

    /// Owning glossary set (empty for task terms and analysis hints)
    #[serde(default)]
    pub set_id: String,

    /// Term as it appears in the source text
    pub source: String,

    /// Keep the source term verbatim in every language
    #[serde(default)]
    pub do_not_translate: bool,

    /// Match the source term case-sensitively
    #[serde(default)]
    pub case_sensitive: bool,

    /// Renderings keyed by language code, or by the wildcards `all` / `*`
    #[serde(default)]
    pub translations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

impl GlossaryEntry {
    /// Create an entry that maps `source` to nothing yet.
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Default::default()
        }
    }

    /// Set the entry identifier.
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    /// Set the owning glossary set.
    pub fn with_set_id(mut self, set_id: &str) -> Self {
        self.set_id = set_id.to_string();
        self
    }

    /// Add a rendering for a language code (or `all` / `*`).
    pub fn with_translation(mut self, language: &str, text: &str) -> Self {
        self.translations.insert(language.to_string(), text.to_string());
        self
    }

    /// Mark the term as do-not-translate.
    pub fn do_not_translate(mut self) -> Self {
        self.do_not_translate = true;
        self
    }

    /// Match the term case-sensitively.
    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    /// Resolve the text that replaces this term in `target_lang`.
    ///
    /// Precedence: do-not-translate, exact language, `all`, `*`, then the source itself.
    pub fn rendering_for(&self, target_lang: &str) -> &str {
        if self.do_not_translate {
            return &self.source;
        }
        [target_lang, "all", "*"]
            .iter()
            .filter_map(|key| self.translations.get(*key))
            .find(|value| !value.trim().is_empty())
            .map(|value| value.as_str())
            .unwrap_or(&self.source)
    }
}

/// A named collection of glossary entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlossarySet {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}
