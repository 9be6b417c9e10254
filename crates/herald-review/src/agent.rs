use herald_core::{ReviewAction, ReviewFeedback};
use tracing::info;

/// Decides whether a reviewed run should be retried or completed.
///
/// Pure decision function over the sentinel feedback and the retry budget.
/// Priority order:
///
/// 1. Missing feedback: retry while budget remains, otherwise escalate.
/// 2. Rejected feedback with a non-actionable High/Critical issue: complete
///    immediately — no number of retries fixes a human gate.
/// 3. Rejected feedback with only recoverable issues: retry while budget
///    remains, otherwise escalate with the top recommendations.
/// 4. Approved feedback: complete with the feedback summary.
pub struct ReviewAgent {
    max_retries: u32,
}

impl ReviewAgent {
    /// Creates an agent with the given retry budget. `max_retries` is an
    /// inclusive upper bound on the retry counter: once `retry_count`
    /// reaches it, further retries are denied.
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// The configured retry budget.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Evaluates the sentinel feedback and decides the next edge.
    pub fn evaluate(
        &self,
        feedback: Option<&ReviewFeedback>,
        retry_count: u32,
    ) -> (ReviewAction, String) {
        let budget_left = retry_count < self.max_retries;

        let Some(feedback) = feedback else {
            return if budget_left {
                (
                    ReviewAction::Retry,
                    format!(
                        "No review feedback available; retrying (attempt {})",
                        retry_count + 1
                    ),
                )
            } else {
                (
                    ReviewAction::Complete,
                    "Escalating after retries: review feedback missing".to_string(),
                )
            };
        };

        if !feedback.approved && feedback.has_blocking_issue() {
            let description = feedback
                .detailed_issues
                .iter()
                .find(|issue| !issue.actionable)
                .map_or_else(|| "non-actionable issue".to_string(), |issue| {
                    issue.description.clone()
                });
            info!(issue = %description, "Escalating without retry; issue is not actionable");
            return (
                ReviewAction::Complete,
                format!("Escalating for human review: {description}"),
            );
        }

        if !feedback.approved {
            let recommendations = top_recommendations(feedback);
            return if budget_left {
                (
                    ReviewAction::Retry,
                    format!(
                        "Retrying after review found {} issue(s).{recommendations}",
                        feedback.detailed_issues.len()
                    ),
                )
            } else {
                (
                    ReviewAction::Complete,
                    format!(
                        "Escalating after retries: {} unresolved issue(s).{recommendations}",
                        feedback.detailed_issues.len()
                    ),
                )
            };
        }

        (ReviewAction::Complete, feedback.summary.clone())
    }
}

/// Formats up to two recommendations from the review notes.
fn top_recommendations(feedback: &ReviewFeedback) -> String {
    let Some(notes) = &feedback.review_notes else {
        return String::new();
    };
    if notes.recommendations.is_empty() {
        return String::new();
    }
    let picked: Vec<&str> = notes
        .recommendations
        .iter()
        .take(2)
        .map(String::as_str)
        .collect();
    format!(" Recommendations: {}", picked.join("; "))
}
