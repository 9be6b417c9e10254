use herald_core::{Directive, DirectiveKind, TaskRequest};
use regex::Regex;
use serde_json::Value;

/// Metadata fields that always carry explicit policy feedback.
pub(crate) const FEEDBACK_METADATA_KEYS: [&str; 3] =
    ["policy_feedback", "user_policy_feedback", "user_directives"];

/// Payload fields scanned only when they look like they contain a directive.
const FEEDBACK_PAYLOAD_KEYS: [&str; 3] = ["message", "text", "instructions"];

/// Extracts policy directives from the free-text fields of a request.
///
/// Two phrase shapes are recognized: `never (do)? <pattern>` becomes a
/// [`DirectiveKind::NeverDo`] directive, `tell me if <pattern>` becomes
/// [`DirectiveKind::NotifyIf`]. Patterns are trimmed, stripped of trailing
/// `.`/`!`, and lowercased before storage.
pub struct FeedbackCapture {
    never_do: Regex,
    notify_if: Regex,
}

impl FeedbackCapture {
    /// Compiles the capture patterns.
    pub fn new() -> Self {
        // Patterns end at sentence punctuation or a line break.
        #[allow(clippy::expect_used)]
        let never_do = Regex::new(r"(?i)\bnever\s+(?:do\s+)?([^.!?\n]+)")
            .expect("static never_do pattern compiles");
        #[allow(clippy::expect_used)]
        let notify_if = Regex::new(r"(?i)\btell\s+me\s+if\s+([^.!?\n]+)")
            .expect("static notify_if pattern compiles");
        Self {
            never_do,
            notify_if,
        }
    }

    /// Scans the request and returns the directives found, deduplicated
    /// within the batch. Persistence-level deduplication is the store's job.
    pub fn extract(&self, request: &TaskRequest) -> Vec<Directive> {
        let mut directives = Vec::new();

        for key in FEEDBACK_METADATA_KEYS {
            if let Some(value) = request.metadata.get(key) {
                self.scan_value(value, &mut directives);
            }
        }

        for key in FEEDBACK_PAYLOAD_KEYS {
            if let Some(value) = request.payload.get(key) {
                let text = flatten_text(value);
                let lowered = text.to_lowercase();
                if lowered.contains("never") || lowered.contains("tell me if") {
                    self.scan_text(&text, &mut directives);
                }
            }
        }

        directives
    }

    fn scan_value(&self, value: &Value, out: &mut Vec<Directive>) {
        self.scan_text(&flatten_text(value), out);
    }

    fn scan_text(&self, text: &str, out: &mut Vec<Directive>) {
        for capture in self.never_do.captures_iter(text) {
            if let Some(directive) = Directive::new(DirectiveKind::NeverDo, &capture[1]) {
                if !out.contains(&directive) {
                    out.push(directive);
                }
            }
        }
        for capture in self.notify_if.captures_iter(text) {
            if let Some(directive) = Directive::new(DirectiveKind::NotifyIf, &capture[1]) {
                if !out.contains(&directive) {
                    out.push(directive);
                }
            }
        }
    }
}

impl Default for FeedbackCapture {
    fn default() -> Self {
        Self::new()
    }
}

fn flatten_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(flatten_text)
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}
