use herald_core::{
    IssueCategory, IssueSeverity, ReviewFeedback, ReviewIssue, ReviewNotes, RunState,
};
use serde_json::{json, Map, Value};

/// Inspects run state and produces categorized review feedback.
///
/// The review is a pure function of the state: a fixed sequence of
/// independent checks, each contributing issues, success steps,
/// recommendations, and routing hints. Checks are not mutually exclusive.
#[derive(Default)]
pub struct Sentinel;

impl Sentinel {
    /// Creates a sentinel.
    pub fn new() -> Self {
        Self
    }

    /// Reviews a run and classifies its issues.
    pub fn review(&self, state: &RunState) -> ReviewFeedback {
        let mut issues: Vec<ReviewIssue> = Vec::new();
        let mut successful_steps: Vec<String> = Vec::new();
        let mut recommendations: Vec<String> = Vec::new();
        let mut routing_context: Map<String, Value> = Map::new();
        let mut requires_human = state.requires_human_approval;

        // Plugin dispatch.
        if let Some(result) = &state.plugin_result {
            if result.failed.is_empty() {
                successful_steps.push(format!(
                    "Plugin '{}' dispatched {} message(s)",
                    result.plugin_name, result.dispatched_count
                ));
            } else {
                // Failed deliveries always need a human eye on the outcome.
                requires_human = true;
                issues.push(
                    ReviewIssue::new(
                        IssueCategory::Plugin,
                        format!(
                            "Plugin '{}' failed to deliver to {} recipient(s)",
                            result.plugin_name,
                            result.failed.len()
                        ),
                        IssueSeverity::High,
                        true,
                    )
                    .with_context("failed_recipients", json!(result.failed)),
                );
                routing_context.insert("failed_plugin".to_string(), json!(result.plugin_name));
                routing_context.insert("failed_recipients".to_string(), json!(result.failed));
                recommendations.push(format!(
                    "Avoid plugin '{}' or verify the failed recipients",
                    result.plugin_name
                ));
            }
        }

        // Planning.
        if state.planned_actions.is_empty() {
            issues.push(ReviewIssue::new(
                IssueCategory::Planning,
                "No actions were planned for this run",
                IssueSeverity::Medium,
                true,
            ));
            routing_context.insert("empty_plan".to_string(), json!(true));
            recommendations.push("Re-run planning with a more specific intent".to_string());
        }

        // Policy.
        if let Some(decision) = &state.policy_decision {
            if decision.requires_human {
                issues.push(ReviewIssue::new(
                    IssueCategory::Policy,
                    "Policy requested human approval",
                    IssueSeverity::High,
                    false,
                ));
                recommendations.push("Escalate to a human reviewer before dispatch".to_string());
            }
            if !decision.allowed {
                issues.push(ReviewIssue::new(
                    IssueCategory::Policy,
                    format!("Policy blocked the request: {}", decision.reason),
                    IssueSeverity::Critical,
                    false,
                ));
                routing_context.insert("policy_blocked".to_string(), json!(true));
                routing_context.insert("policy_reason".to_string(), json!(decision.reason));
            }
            if decision.allowed && !decision.requires_human {
                successful_steps.push("Policy check passed".to_string());
            }
        }

        // Context.
        let snippet_count = state
            .retrieved_context
            .as_ref()
            .map_or(0, |snapshot| snapshot.memory_snippets.len());
        if snippet_count == 0 {
            issues.push(ReviewIssue::new(
                IssueCategory::Context,
                "No memory snippets were retrieved",
                IssueSeverity::Low,
                true,
            ));
            routing_context.insert("low_context".to_string(), json!(true));
            recommendations
                .push("Broaden memory retrieval or proceed without context".to_string());
        } else {
            successful_steps.push(format!("Retrieved {snippet_count} memory snippet(s)"));
        }

        // Validation.
        if let Some(validation) = &state.context_validation {
            let lowered = validation.summary.to_lowercase();
            if lowered.contains("insufficient") || lowered.contains("irrelevant") {
                issues.push(ReviewIssue::new(
                    IssueCategory::Validation,
                    format!("Context validation flagged: {}", validation.summary),
                    IssueSeverity::Medium,
                    true,
                ));
                recommendations.push("Refresh the retrieved context before retrying".to_string());
            }
        }

        // Execution.
        if let Some(error) = &state.error {
            issues.push(ReviewIssue::new(
                IssueCategory::Execution,
                format!("Execution error: {error}"),
                IssueSeverity::Critical,
                true,
            ));
            routing_context.insert("error".to_string(), json!(error));
            recommendations.push("Investigate the execution error before retrying".to_string());
        }

        requires_human = requires_human
            || issues
                .iter()
                .any(|issue| !issue.actionable && issue.severity >= IssueSeverity::High);
        let approved = !requires_human && issues.is_empty();

        let summary = state.rendered_message.clone().unwrap_or_else(|| {
            let severe = issues
                .iter()
                .filter(|issue| issue.severity >= IssueSeverity::High)
                .count();
            format!("Workflow reviewed with {severe} high-severity issue(s)")
        });

        let review_notes = if issues.is_empty() && routing_context.is_empty() {
            None
        } else {
            Some(ReviewNotes {
                workflow_stage: state.status,
                issues_found: issues.clone(),
                successful_steps,
                recommendations,
                routing_context,
            })
        };

        ReviewFeedback {
            approved,
            requires_human,
            summary,
            issues: issues.iter().map(|issue| issue.description.clone()).collect(),
            detailed_issues: issues,
            review_notes,
        }
    }
}
