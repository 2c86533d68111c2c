/*!
 * Tolerant parsing of model output.
 *
 * Models wrap their answers in code fences, add a sentence of prose, or pick
 * their own wrapper object. The parser accepts:
 * - JSONL: one `{"id": ..., "final": ...}` object per line (array lines allowed)
 * - JSON: `{"items": [...]}`, a bare array, or the first array field of any object
 *
 * A payload from which no item can be read is a `ParseError`, which the
 * protocol layer treats like a failed request.
 */

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::errors::ParseError;

/// One translated line returned by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslatedItem {
    #[serde(deserialize_with = "crate::document::string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub draft: Option<String>,
    /// Review notes; models send a list, a single string or nothing
    #[serde(default, deserialize_with = "lenient_notes", skip_serializing_if = "Vec::is_empty")]
    pub reflection: Vec<String>,
    #[serde(rename = "final", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub final_text: Option<String>,
}

impl TranslatedItem {
    /// The usable output: `final` when non-empty, otherwise `draft`.
    pub fn output(&self) -> Option<&str> {
        [self.final_text.as_deref(), self.draft.as_deref()]
            .into_iter()
            .flatten()
            .find(|text| !text.trim().is_empty())
    }
}

/// Text field that may arrive as a string, a list of lines or a number.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Array(lines) => {
            let lines: Vec<&str> = lines.iter().filter_map(Value::as_str).collect();
            (!lines.is_empty()).then(|| lines.join("\n"))
        }
        _ => None,
    })
}

fn lenient_notes<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(note) if !note.trim().is_empty() => vec![note],
        Value::Array(notes) => notes
            .into_iter()
            .filter_map(|note| match note {
                Value::String(note) => Some(note),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        _ => Vec::new(),
    })
}

/// Strip code fences and leading prose from a raw model reply.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("```") {
        return strip_fence_block(trimmed);
    }

    for (offset, line) in line_offsets(trimmed) {
        let line = line.trim_start();
        if line.starts_with('{') || line.starts_with('[') {
            break;
        }
        if line.starts_with("```") {
            return strip_fence_block(&trimmed[offset..]);
        }
    }

    trimmed.to_string()
}

/// Parse a JSONL reply, falling back to whole-payload JSON.
pub fn parse_jsonl(raw: &str) -> Result<Vec<TranslatedItem>, ParseError> {
    let normalized = normalize(raw);
    if normalized.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut items = Vec::new();
    for line in normalized.lines() {
        let line = line.trim().trim_end_matches(',');
        if line.is_empty() {
            continue;
        }
        if line.starts_with('[') {
            if let Ok(Value::Array(values)) = serde_json::from_str::<Value>(line) {
                items.extend(values.into_iter().filter_map(item_from_value));
            }
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(line) {
            items.extend(item_from_value(value));
        }
    }

    if items.is_empty() {
        return parse_json_items(&normalized);
    }
    Ok(items)
}

/// Parse a reply that holds a single JSON document of items.
pub fn parse_json_items(raw: &str) -> Result<Vec<TranslatedItem>, ParseError> {
    let normalized = normalize(raw);
    if normalized.is_empty() {
        return Err(ParseError::Empty);
    }

    let value = parse_json_document(&normalized).ok_or(ParseError::NoItems)?;
    let items = match value {
        Value::Array(values) => items_from_array(values),
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(values)) => items_from_array(values),
            _ => map
                .into_iter()
                .filter_map(|(_, field)| match field {
                    Value::Array(values) => Some(items_from_array(values)),
                    _ => None,
                })
                .find(|items| !items.is_empty())
                .unwrap_or_default(),
        },
        _ => Vec::new(),
    };

    if items.is_empty() {
        return Err(ParseError::NoItems);
    }
    Ok(items)
}

/// Parse the first JSON document in `text`, trimming junk around it.
pub(crate) fn parse_json_document(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }
    let start = text.find(['{', '['])?;
    let end = text.rfind(['}', ']'])?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn items_from_array(values: Vec<Value>) -> Vec<TranslatedItem> {
    values.into_iter().filter_map(item_from_value).collect()
}

fn item_from_value(value: Value) -> Option<TranslatedItem> {
    serde_json::from_value::<TranslatedItem>(value)
        .ok()
        .filter(|item| !item.id.is_empty())
}

/// Contents of the first fenced block starting at the top of `text`.
fn strip_fence_block(text: &str) -> String {
    let mut lines = text.lines();
    // Opening fence, possibly with a language tag
    lines.next();
    lines
        .take_while(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn line_offsets(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.split_inclusive('\n').scan(0usize, |offset, line| {
        let start = *offset;
        *offset += line.len();
        Some((start, line.trim_end_matches(['\r', '\n'])))
    })
}
