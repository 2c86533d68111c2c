//! Language utilities for ISO language code handling
//!
//! Projects key their tracks by free-form language codes ("en", "fra",
//! "zh-Hans"). These helpers compare codes and turn them into readable
//! labels for prompts and language metadata.

use anyhow::{Result, anyhow};
use isolang::Language;

/// ISO 639-2/B codes that differ from their ISO 639-2/T counterpart
const BIBLIOGRAPHIC_CODES: &[(&str, &str)] = &[
    ("fre", "fra"),
    ("ger", "deu"),
    ("dut", "nld"),
    ("gre", "ell"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("ice", "isl"),
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("per", "fas"),
    ("geo", "kat"),
    ("may", "msa"),
    ("mac", "mkd"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("wel", "cym"),
];

/// Normalize a language code to ISO 639-2/T (3-letter) format
pub fn normalize_to_part2t(code: &str) -> Result<String> {
    let normalized_code = code.trim().to_lowercase();

    match normalized_code.len() {
        2 => {
            if let Some(lang) = Language::from_639_1(&normalized_code) {
                return Ok(lang.to_639_3().to_string());
            }
        }
        3 => {
            if Language::from_639_3(&normalized_code).is_some() {
                return Ok(normalized_code);
            }
            if let Some((_, terminology)) = BIBLIOGRAPHIC_CODES
                .iter()
                .find(|(bibliographic, _)| *bibliographic == normalized_code)
            {
                return Ok(terminology.to_string());
            }
        }
        _ => {}
    }

    Err(anyhow!("Cannot normalize invalid language code: {}", code))
}

/// Check if two language codes denote the same language
///
/// Codes are compared case-insensitively after trimming; ISO codes of
/// different lengths ("fr", "fra", "fre") also match each other.
pub fn is_same_language(code1: &str, code2: &str) -> bool {
    let left = code1.trim().to_lowercase();
    let right = code2.trim().to_lowercase();
    if left == right {
        return true;
    }
    match (normalize_to_part2t(&left), normalize_to_part2t(&right)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Human-readable name for a language code, falling back to the code itself
///
/// Region or script subtags are kept next to the name: "pt-BR" becomes
/// "Portuguese (pt-BR)".
pub fn language_label(code: &str) -> String {
    let trimmed = code.trim();
    let primary = trimmed.split(['-', '_']).next().unwrap_or(trimmed);

    let name = normalize_to_part2t(primary)
        .ok()
        .and_then(|part2t| Language::from_639_3(&part2t))
        .map(|lang| lang.to_name().to_string());

    match name {
        Some(name) if primary.len() == trimmed.len() => name,
        Some(name) => format!("{} ({})", name, trimmed),
        None => trimmed.to_string(),
    }
}
