/*!
 * Placeholder masking for markup, timecodes and glossary terms.
 *
 * Before a batch is sent to the model, fragments that must survive verbatim
 * are swapped for opaque tokens:
 * - `⟦P000⟧` for general placeholders (tags, override codes, variables, notes, timecodes)
 * - `⟦G000⟧` for enforced glossary terms, numbered by the entry's index
 *
 * The returned `RestoreMap` turns tokens back into their final text after the
 * model answers. Glossary tokens restore to the term's target rendering, not
 * to the source, so enforced terms come out already translated.
 */

use log::warn;
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use std::collections::HashMap;

use crate::document::GlossaryEntry;

/// General placeholder patterns, applied in this order
static GENERAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // HTML-like tags
        r"<[^>]+>",
        // ASS/SSA override codes
        r"\{\\[^}]+\}",
        // Brace variables
        r"\{[^}]+\}",
        // Bracketed notes
        r"\[[^\]]+\]",
        // Timecodes
        r"\d{2}:\d{2}:\d{2}[\.,:]\d{2,3}",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Token for the n-th general placeholder.
pub fn general_token(index: usize) -> String {
    format!("⟦P{:03}⟧", index)
}

/// Token for the glossary entry at `index` in the enforced list.
pub fn glossary_token(index: usize) -> String {
    format!("⟦G{:03}⟧", index)
}

/// Ordered token → replacement list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreMap {
    entries: Vec<(String, String)>,
}

impl RestoreMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, token: String, value: String) {
        self.entries.push((token, value));
    }

    /// Replacement recorded for a token.
    pub fn get(&self, token: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| t == token)
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(token, value)| (token.as_str(), value.as_str()))
    }
}

/// Result of glossary masking
#[derive(Debug, Clone, Default)]
pub struct GlossaryMask {
    pub masked: Vec<String>,
    pub restore: RestoreMap,
    /// `used[i]` is set when entry `i` matched somewhere in the batch
    pub used: Vec<bool>,
}

/// Replace tags, override codes, variables, notes and timecodes with `⟦Pnnn⟧` tokens.
///
/// Identical fragments share one token across the whole batch.
pub fn mask_general(lines: &[String]) -> (Vec<String>, RestoreMap) {
    let mut restore = RestoreMap::new();
    if lines.is_empty() {
        return (Vec::new(), restore);
    }

    let mut tokens: HashMap<String, String> = HashMap::new();
    let mut masked: Vec<String> = lines.to_vec();

    for pattern in GENERAL_PATTERNS.iter() {
        for line in masked.iter_mut() {
            if !pattern.is_match(line) {
                continue;
            }
            let replaced = pattern
                .replace_all(line.as_str(), |caps: &regex::Captures| {
                    let fragment = caps[0].to_string();
                    tokens
                        .entry(fragment.clone())
                        .or_insert_with(|| {
                            let token = general_token(restore.len());
                            restore.push(token.clone(), fragment);
                            token
                        })
                        .clone()
                })
                .into_owned();
            *line = replaced;
        }
    }

    (masked, restore)
}

/// Replace enforced glossary terms with `⟦Gnnn⟧` tokens.
///
/// Longer sources are matched first so that a term contained in a longer
/// term never splits it. Matching ignores case unless the entry is
/// case-sensitive. The token of entry `i` restores to its rendering in
/// `target_lang`.
pub fn mask_glossary(lines: &[String], entries: &[GlossaryEntry], target_lang: &str) -> GlossaryMask {
    let mut result = GlossaryMask {
        masked: lines.to_vec(),
        restore: RestoreMap::new(),
        used: vec![false; entries.len()],
    };
    if lines.is_empty() || entries.is_empty() {
        return result;
    }

    let mut order: Vec<usize> = (0..entries.len())
        .filter(|&i| !entries[i].source.trim().is_empty())
        .collect();
    order.sort_by_key(|&i| std::cmp::Reverse(entries[i].source.chars().count()));

    for index in order {
        let entry = &entries[index];
        let escaped = regex::escape(&entry.source);
        let pattern = if entry.case_sensitive {
            escaped
        } else {
            format!("(?i){}", escaped)
        };
        let matcher = match Regex::new(&pattern) {
            Ok(matcher) => matcher,
            Err(e) => {
                warn!("Skipping glossary term '{}': {}", entry.source, e);
                continue;
            }
        };

        let token = glossary_token(index);
        for line in result.masked.iter_mut() {
            if let Some(replaced) = replace_outside_tokens(line, &matcher, &token) {
                *line = replaced;
                result.used[index] = true;
            }
        }
        if result.used[index] {
            result
                .restore
                .push(token, entry.rendering_for(target_lang).to_string());
        }
    }

    result
}

/// Replace `matcher` hits in the text between `⟦…⟧` placeholders. None when nothing matched.
fn replace_outside_tokens(line: &str, matcher: &Regex, token: &str) -> Option<String> {
    let mut out = String::with_capacity(line.len());
    let mut matched = false;
    let mut rest = line;

    loop {
        let (plain, placeholder, tail) = match rest.find('⟦') {
            Some(open) => match rest[open..].find('⟧') {
                Some(close) => {
                    let end = open + close + '⟧'.len_utf8();
                    (&rest[..open], &rest[open..end], &rest[end..])
                }
                None => (rest, "", ""),
            },
            None => (rest, "", ""),
        };

        if matcher.is_match(plain) {
            matched = true;
            out.push_str(&matcher.replace_all(plain, NoExpand(token)));
        } else {
            out.push_str(plain);
        }
        out.push_str(placeholder);

        if tail.is_empty() {
            break;
        }
        rest = tail;
    }

    matched.then_some(out)
}

/// Substitute every token of `map` back into `text`.
pub fn restore(text: &str, map: &RestoreMap) -> String {
    map.iter()
        .fold(text.to_string(), |acc, (token, value)| acc.replace(token, value))
}
