use crate::state::RunStatus;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The pipeline area an issue was attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueCategory {
    /// Policy gate or blocked request.
    Policy,
    /// Plugin delivery failures.
    Plugin,
    /// Missing or thin retrieved context.
    Context,
    /// Empty or unusable plan.
    Planning,
    /// Runtime error during execution.
    Execution,
    /// Context validation flagged the retrieved material.
    Validation,
    /// Anything that fits no other category.
    Other,
}

impl std::fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IssueCategory::Policy => "policy",
            IssueCategory::Plugin => "plugin",
            IssueCategory::Context => "context",
            IssueCategory::Planning => "planning",
            IssueCategory::Execution => "execution",
            IssueCategory::Validation => "validation",
            IssueCategory::Other => "other",
        };
        write!(f, "{name}")
    }
}

/// Severity of a review issue. Ordering follows declaration order, so
/// `Critical > High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// Cosmetic or informational.
    Low,
    /// Degraded quality, run can still succeed.
    Medium,
    /// The run outcome is compromised.
    High,
    /// The run must not complete as-is.
    Critical,
}

/// A single categorized finding from the sentinel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewIssue {
    /// Pipeline area the issue belongs to.
    pub category: IssueCategory,
    /// Human-readable description.
    pub description: String,
    /// How bad it is.
    pub severity: IssueSeverity,
    /// Whether a retry could plausibly fix it.
    pub actionable: bool,
    /// Structured context for downstream consumers.
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl ReviewIssue {
    /// Creates an issue without extra context.
    pub fn new(
        category: IssueCategory,
        description: impl Into<String>,
        severity: IssueSeverity,
        actionable: bool,
    ) -> Self {
        Self {
            category,
            description: description.into(),
            severity,
            actionable,
            context: Map::new(),
        }
    }

    /// Attaches a context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

/// Structured notes attached to sentinel feedback when anything noteworthy
/// happened. Routing reads these to make retries informed rather than blind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewNotes {
    /// The workflow stage the run had reached when reviewed.
    pub workflow_stage: RunStatus,
    /// All issues found, in check order.
    pub issues_found: Vec<ReviewIssue>,
    /// Steps that went well and should not be repeated blindly.
    pub successful_steps: Vec<String>,
    /// Per-issue remediation hints, most relevant first.
    pub recommendations: Vec<String>,
    /// Merged routing hints (`failed_plugin`, `empty_plan`, ...).
    pub routing_context: Map<String, Value>,
}

/// The sentinel's verdict over a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewFeedback {
    /// True only when no issues were found and no human gate is set.
    pub approved: bool,
    /// Whether a human must look at this run.
    pub requires_human: bool,
    /// Short outcome summary (rendered message or issue count).
    pub summary: String,
    /// Flat issue descriptions, in check order.
    pub issues: Vec<String>,
    /// Full categorized issues.
    pub detailed_issues: Vec<ReviewIssue>,
    /// Present whenever any issue or routing hint exists.
    pub review_notes: Option<ReviewNotes>,
}

impl ReviewFeedback {
    /// Returns true when any issue is both non-actionable and of at least
    /// High severity. Such issues cannot be fixed by retrying.
    pub fn has_blocking_issue(&self) -> bool {
        self.detailed_issues
            .iter()
            .any(|issue| !issue.actionable && issue.severity >= IssueSeverity::High)
    }
}

/// The review agent's routing decision after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    /// Loop back to routing for another attempt.
    Retry,
    /// Proceed to memory update and finalization.
    Complete,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(IssueSeverity::Critical > IssueSeverity::High);
        assert!(IssueSeverity::High > IssueSeverity::Medium);
        assert!(IssueSeverity::Medium > IssueSeverity::Low);
    }

    #[test]
    fn test_blocking_issue_detection() {
        let feedback = ReviewFeedback {
            approved: false,
            requires_human: true,
            summary: String::new(),
            issues: vec![],
            detailed_issues: vec![
                ReviewIssue::new(
                    IssueCategory::Plugin,
                    "delivery failed",
                    IssueSeverity::High,
                    true,
                ),
                ReviewIssue::new(
                    IssueCategory::Policy,
                    "human gate",
                    IssueSeverity::High,
                    false,
                ),
            ],
            review_notes: None,
        };
        assert!(feedback.has_blocking_issue());
    }

    #[test]
    fn test_actionable_high_is_not_blocking() {
        let feedback = ReviewFeedback {
            approved: false,
            requires_human: true,
            summary: String::new(),
            issues: vec![],
            detailed_issues: vec![ReviewIssue::new(
                IssueCategory::Plugin,
                "delivery failed",
                IssueSeverity::High,
                true,
            )],
            review_notes: None,
        };
        assert!(!feedback.has_blocking_issue());
    }

    #[test]
    fn test_issue_serialization_tags() {
        let issue = ReviewIssue::new(
            IssueCategory::Planning,
            "empty plan",
            IssueSeverity::Medium,
            true,
        );
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["category"], "planning");
        assert_eq!(json["severity"], "medium");
    }
}
