/*!
 * Response protocol negotiation and run diagnostics.
 *
 * Batches are requested either in JSON mode (one object with an `items`
 * array) or as JSON Lines. JSON mode is tried on the first batch; once it
 * fails the run sticks to JSONL. A caller profile can pin either protocol.
 */

use chrono::{Local, SecondsFormat};
use log::debug;

/// Chooses the response protocol for each batch
#[derive(Debug, Clone)]
pub struct ProtocolNegotiator {
    pinned: Option<bool>,
    retry_run: bool,
    json_ok: bool,
    jsonl_locked: bool,
}

impl ProtocolNegotiator {
    /// `pinned` comes from the caller profile; retry runs never try JSON mode.
    pub fn new(pinned: Option<bool>, retry_run: bool) -> Self {
        Self {
            pinned,
            retry_run,
            json_ok: false,
            jsonl_locked: false,
        }
    }

    /// Whether the batch at `batch_index` (0-based) starts in JSON mode.
    pub fn use_json_mode(&self, batch_index: usize) -> bool {
        if let Some(pinned) = self.pinned {
            return pinned;
        }
        if self.retry_run || self.jsonl_locked {
            return false;
        }
        batch_index == 0 || self.json_ok
    }

    pub fn record_json_success(&mut self) {
        self.json_ok = true;
    }

    /// A JSON mode failure switches the rest of the run to JSONL.
    pub fn record_json_failure(&mut self) {
        if !self.jsonl_locked {
            debug!("JSON mode failed, using JSONL for the rest of the run");
        }
        self.json_ok = false;
        self.jsonl_locked = true;
    }

    pub fn is_locked_to_jsonl(&self) -> bool {
        self.jsonl_locked
    }
}

/// Timestamped failure lines attached to the task's error message
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    lines: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failure as `<RFC 3339 time> - <message>`.
    pub fn push(&mut self, message: impl AsRef<str>) {
        let timestamp = Local::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        self.lines.push(format!("{} - {}", timestamp, message.as_ref()));
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// All lines, each terminated by a newline.
    pub fn render(&self) -> String {
        self.lines.iter().map(|line| format!("{}\n", line)).collect()
    }
}
