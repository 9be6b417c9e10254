use serde::{Deserialize, Serialize};

/// The kind of a persisted policy directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveKind {
    /// A hard prohibition: matching requests are blocked.
    NeverDo,
    /// A notification gate: matching requests require human review.
    NotifyIf,
}

impl std::fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectiveKind::NeverDo => write!(f, "never_do"),
            DirectiveKind::NotifyIf => write!(f, "notify_if"),
        }
    }
}

/// A tenant-scoped policy rule captured from user feedback.
///
/// The pattern is stored trimmed and lowercased; evaluation is a substring
/// match against the flattened request text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Directive {
    /// Whether the directive blocks or merely flags a request.
    pub kind: DirectiveKind,
    /// Non-empty lowercase match pattern.
    pub pattern: String,
}

impl Directive {
    /// Creates a directive, normalizing the pattern (trim, strip trailing
    /// `.`/`!`, lowercase). Returns `None` when the cleaned pattern is empty.
    pub fn new(kind: DirectiveKind, pattern: &str) -> Option<Self> {
        let cleaned = pattern
            .trim()
            .trim_end_matches(['.', '!'])
            .trim()
            .to_lowercase();
        if cleaned.is_empty() {
            return None;
        }
        Some(Self {
            kind,
            pattern: cleaned,
        })
    }
}

/// The outcome of evaluating a request against tenant policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecision {
    /// Whether the request may proceed at all.
    pub allowed: bool,
    /// Human-readable explanation of the decision.
    pub reason: String,
    /// Whether a human must approve before dispatch.
    pub requires_human: bool,
    /// Stable version marker of the evaluating policy set.
    pub policy_version: Option<String>,
    /// Sorted, deduplicated observability tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Default for PolicyDecision {
    fn default() -> Self {
        Self {
            allowed: true,
            reason: "Request satisfies policy checks".to_string(),
            requires_human: false,
            policy_version: None,
            tags: Vec::new(),
        }
    }
}
