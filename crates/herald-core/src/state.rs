use crate::policy::{Directive, PolicyDecision};
use crate::request::TaskRequest;
use crate::review::{ReviewAction, ReviewFeedback};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run created, no node executed yet.
    Queued,
    /// Interpreting a free-text prompt into a structured request.
    Interpreting,
    /// Selecting a workflow for the request.
    Routing,
    /// Evaluating tenant policy.
    PolicyCheck,
    /// Hydrating context from the memory layer.
    FetchingContext,
    /// Building the action plan.
    Planning,
    /// Producing the reasoning reflection.
    Reflecting,
    /// Dispatching through the selected plugin.
    Dispatching,
    /// Sentinel / review agent pass.
    Reviewing,
    /// Committing memory updates.
    UpdatingMemory,
    /// Terminal: run finished.
    Completed,
    /// Terminal: run aborted on unrecovered error or policy denial.
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunStatus::Queued => "queued",
            RunStatus::Interpreting => "interpreting",
            RunStatus::Routing => "routing",
            RunStatus::PolicyCheck => "policy_check",
            RunStatus::FetchingContext => "fetching_context",
            RunStatus::Planning => "planning",
            RunStatus::Reflecting => "reflecting",
            RunStatus::Dispatching => "dispatching",
            RunStatus::Reviewing => "reviewing",
            RunStatus::UpdatingMemory => "updating_memory",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// One entry in the per-run audit trail. Every node appends exactly one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    /// Dotted event kind, e.g. `router.decision`.
    pub kind: String,
    /// Human-readable description of what happened.
    pub message: String,
    /// Structured event payload.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// UTC timestamp of when the event was recorded.
    pub at: DateTime<Utc>,
}

impl RunEvent {
    /// Creates an event with an empty payload.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            data: Map::new(),
            at: Utc::now(),
        }
    }

    /// Attaches a data entry.
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

/// One step of the planned action sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    /// 1-based position in the plan.
    pub step: u32,
    /// Short action verb, e.g. `analyse_intent`.
    pub action: String,
    /// What the step concretely covers.
    pub details: String,
    /// Why the step is in the plan.
    pub rationale: String,
    /// Which component proposed the step.
    pub source: String,
}

/// Context retrieved from the memory layer for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemorySnapshot {
    /// Free-text memory snippets relevant to the request.
    #[serde(default)]
    pub memory_snippets: Vec<String>,
    /// Knowledge-graph relations touching the request.
    #[serde(default)]
    pub graph_relations: Vec<String>,
    /// Raw vector-search hits.
    #[serde(default)]
    pub vector_results: Vec<String>,
    /// Age of the freshest snippet, in seconds.
    #[serde(default)]
    pub freshness_seconds: u64,
}

/// A memory write prepared at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryUpdate {
    /// What to remember.
    pub summary: String,
    /// Structured annotations stored alongside the summary.
    #[serde(default)]
    pub annotations: Map<String, Value>,
    /// Token accounting for the stored summary.
    #[serde(default)]
    pub tokens_used: u64,
}

/// Relevance verdict over a retrieved [`MemorySnapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextValidation {
    /// Whether the snapshot looked relevant to the intent.
    pub relevant: bool,
    /// Short human-readable assessment.
    pub summary: String,
}

/// The outcome of a plugin dispatch.
///
/// Per-recipient delivery failures are reported via `failed`; only a
/// transport-level problem surfaces as an error from the plugin itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult {
    /// The plugin that handled the dispatch.
    pub plugin_name: String,
    /// How many recipients were successfully reached.
    pub dispatched_count: usize,
    /// Recipient identifiers that could not be reached.
    #[serde(default)]
    pub failed: Vec<String>,
    /// Plugin-specific metadata (previews, provider ids, ...).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Mutable per-run record accumulated as workflow nodes execute.
///
/// A single node is active per run at any time; nodes communicate only
/// through this state. `working_notes` and `events` are append-only and
/// survive the retry transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// The structured request driving the run. Absent only while a free-text
    /// prompt is still being interpreted.
    pub request: Option<TaskRequest>,
    /// Free-text prompt for runs started without a structured request.
    #[serde(default)]
    pub raw_prompt: Option<String>,
    /// Hints forwarded to prompt interpretation.
    #[serde(default)]
    pub request_hints: Map<String, Value>,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// The workflow selected by routing.
    #[serde(default)]
    pub selected_workflow: Option<String>,
    /// Latest policy evaluation.
    #[serde(default)]
    pub policy_decision: Option<PolicyDecision>,
    /// Ordered, append-only human-readable trace.
    #[serde(default)]
    pub working_notes: Vec<String>,
    /// Context retrieved from the memory layer.
    #[serde(default)]
    pub retrieved_context: Option<MemorySnapshot>,
    /// Relevance verdict over the retrieved context.
    #[serde(default)]
    pub context_validation: Option<ContextValidation>,
    /// Ordered plan produced by the planner.
    #[serde(default)]
    pub planned_actions: Vec<PlanStep>,
    /// Reflection summary from the reasoning agent.
    #[serde(default)]
    pub analysis_summary: Option<String>,
    /// Plugin chosen for dispatch.
    #[serde(default)]
    pub selected_plugin: Option<String>,
    /// Rendered outbound message body.
    #[serde(default)]
    pub rendered_message: Option<String>,
    /// Result of the plugin dispatch.
    #[serde(default)]
    pub plugin_result: Option<DispatchResult>,
    /// Sentinel feedback for the current pass.
    #[serde(default)]
    pub review_feedback: Option<ReviewFeedback>,
    /// Message produced by the review agent.
    #[serde(default)]
    pub review_agent_message: Option<String>,
    /// The review agent's last routing decision.
    #[serde(default)]
    pub review_action: Option<ReviewAction>,
    /// Memory writes prepared at completion.
    #[serde(default)]
    pub memory_updates: Vec<MemoryUpdate>,
    /// Directives captured from request free text, across all passes.
    #[serde(default)]
    pub captured_directives: Vec<Directive>,
    /// Human gate flag. OR-ed monotonically across nodes within a pass;
    /// reset only by the retry transition.
    #[serde(default)]
    pub requires_human_approval: bool,
    /// Append-only audit trail. Never dropped, even across retries.
    #[serde(default)]
    pub events: Vec<RunEvent>,
    /// Number of retry transitions taken so far.
    #[serde(default)]
    pub retry_count: u32,
    /// Unrecovered execution error for the current pass.
    #[serde(default)]
    pub error: Option<String>,
}

impl RunState {
    /// Creates the initial state for a structured request.
    pub fn new(request: TaskRequest) -> Self {
        Self {
            request: Some(request),
            ..Self::empty()
        }
    }

    /// Creates the initial state for a free-text prompt.
    pub fn from_prompt(raw_prompt: impl Into<String>, hints: Map<String, Value>) -> Self {
        Self {
            raw_prompt: Some(raw_prompt.into()),
            request_hints: hints,
            ..Self::empty()
        }
    }

    fn empty() -> Self {
        Self {
            request: None,
            raw_prompt: None,
            request_hints: Map::new(),
            status: RunStatus::Queued,
            selected_workflow: None,
            policy_decision: None,
            working_notes: Vec::new(),
            retrieved_context: None,
            context_validation: None,
            planned_actions: Vec::new(),
            analysis_summary: None,
            selected_plugin: None,
            rendered_message: None,
            plugin_result: None,
            review_feedback: None,
            review_agent_message: None,
            review_action: None,
            memory_updates: Vec::new(),
            captured_directives: Vec::new(),
            requires_human_approval: false,
            events: Vec::new(),
            retry_count: 0,
            error: None,
        }
    }

    /// Returns the request, failing when interpretation has not produced one.
    pub fn require_request(&self) -> crate::HeraldResult<&TaskRequest> {
        self.request
            .as_ref()
            .ok_or_else(|| crate::HeraldError::State("Run state missing request".to_string()))
    }

    /// Applies the retry transition: bump the retry counter, clear all
    /// stage-scoped fields, and return to routing. Notes and events are kept
    /// so the next routing pass can read prior-attempt context.
    pub fn apply_retry_reset(&mut self) {
        self.retry_count += 1;
        self.status = RunStatus::Routing;
        self.selected_plugin = None;
        self.rendered_message = None;
        self.plugin_result = None;
        self.review_feedback = None;
        self.policy_decision = None;
        self.analysis_summary = None;
        self.planned_actions = Vec::new();
        self.retrieved_context = None;
        self.context_validation = None;
        self.requires_human_approval = false;
        self.error = None;
    }
}

/// A typed partial update produced by one workflow node.
///
/// `Some` fields replace the corresponding state field; `notes` and `events`
/// append; `requires_human` merges by OR so the flag is monotonic within a
/// pass. Nodes never execute concurrently for one run, so last-writer-wins
/// replacement is safe.
#[derive(Debug, Default)]
pub struct StateDelta {
    /// New lifecycle status.
    pub status: Option<RunStatus>,
    /// Interpreted request (intake node only).
    pub request: Option<TaskRequest>,
    /// Routed workflow.
    pub selected_workflow: Option<String>,
    /// Policy evaluation result.
    pub policy_decision: Option<PolicyDecision>,
    /// Retrieved memory snapshot.
    pub retrieved_context: Option<MemorySnapshot>,
    /// Context relevance verdict.
    pub context_validation: Option<ContextValidation>,
    /// Replacement plan.
    pub planned_actions: Option<Vec<PlanStep>>,
    /// Reflection summary.
    pub analysis_summary: Option<String>,
    /// Chosen plugin.
    pub selected_plugin: Option<String>,
    /// Rendered message body.
    pub rendered_message: Option<String>,
    /// Dispatch outcome.
    pub plugin_result: Option<DispatchResult>,
    /// Sentinel feedback.
    pub review_feedback: Option<ReviewFeedback>,
    /// Review agent message.
    pub review_agent_message: Option<String>,
    /// Review agent decision.
    pub review_action: Option<ReviewAction>,
    /// Prepared memory writes.
    pub memory_updates: Option<Vec<MemoryUpdate>>,
    /// Newly captured directives (appended).
    pub captured_directives: Vec<Directive>,
    /// Human gate contribution, OR-ed into the state.
    pub requires_human: Option<bool>,
    /// Execution error for this pass.
    pub error: Option<String>,
    /// Notes to append to the working trace.
    pub notes: Vec<String>,
    /// Events to append to the audit trail.
    pub events: Vec<RunEvent>,
}

impl StateDelta {
    /// Merges this delta into the run state.
    pub fn apply(self, state: &mut RunState) {
        if let Some(status) = self.status {
            state.status = status;
        }
        if let Some(request) = self.request {
            state.request = Some(request);
        }
        if let Some(workflow) = self.selected_workflow {
            state.selected_workflow = Some(workflow);
        }
        if let Some(decision) = self.policy_decision {
            state.policy_decision = Some(decision);
        }
        if let Some(snapshot) = self.retrieved_context {
            state.retrieved_context = Some(snapshot);
        }
        if let Some(validation) = self.context_validation {
            state.context_validation = Some(validation);
        }
        if let Some(plan) = self.planned_actions {
            state.planned_actions = plan;
        }
        if let Some(summary) = self.analysis_summary {
            state.analysis_summary = Some(summary);
        }
        if let Some(plugin) = self.selected_plugin {
            state.selected_plugin = Some(plugin);
        }
        if let Some(message) = self.rendered_message {
            state.rendered_message = Some(message);
        }
        if let Some(result) = self.plugin_result {
            state.plugin_result = Some(result);
        }
        if let Some(feedback) = self.review_feedback {
            state.review_feedback = Some(feedback);
        }
        if let Some(message) = self.review_agent_message {
            state.review_agent_message = Some(message);
        }
        if let Some(action) = self.review_action {
            state.review_action = Some(action);
        }
        if let Some(updates) = self.memory_updates {
            state.memory_updates = updates;
        }
        state.captured_directives.extend(self.captured_directives);
        if let Some(flag) = self.requires_human {
            state.requires_human_approval = state.requires_human_approval || flag;
        }
        if let Some(error) = self.error {
            state.error = Some(error);
        }
        state.working_notes.extend(self.notes);
        state.events.extend(self.events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::{IssueCategory, IssueSeverity, ReviewIssue};

    fn sample_state() -> RunState {
        RunState::new(TaskRequest::new("send_update"))
    }

    #[test]
    fn test_initial_state() {
        let state = sample_state();
        assert_eq!(state.status, RunStatus::Queued);
        assert_eq!(state.retry_count, 0);
        assert!(state.working_notes.is_empty());
        assert!(state.events.is_empty());
    }

    #[test]
    fn test_delta_appends_notes_and_events() {
        let mut state = sample_state();
        let delta = StateDelta {
            status: Some(RunStatus::Routing),
            notes: vec!["routed".to_string()],
            events: vec![RunEvent::new("router.decision", "routed")],
            ..StateDelta::default()
        };
        delta.apply(&mut state);

        let second = StateDelta {
            notes: vec!["checked".to_string()],
            events: vec![RunEvent::new("policy.review", "checked")],
            ..StateDelta::default()
        };
        second.apply(&mut state);

        assert_eq!(state.status, RunStatus::Routing);
        assert_eq!(state.working_notes, vec!["routed", "checked"]);
        assert_eq!(state.events.len(), 2);
    }

    #[test]
    fn test_requires_human_is_monotonic() {
        let mut state = sample_state();
        StateDelta {
            requires_human: Some(true),
            ..StateDelta::default()
        }
        .apply(&mut state);
        StateDelta {
            requires_human: Some(false),
            ..StateDelta::default()
        }
        .apply(&mut state);
        assert!(state.requires_human_approval);
    }

    #[test]
    fn test_retry_reset_clears_stage_fields_keeps_trace() {
        let mut state = sample_state();
        state.status = RunStatus::Reviewing;
        state.selected_plugin = Some("demo-messaging".to_string());
        state.rendered_message = Some("hello".to_string());
        state.plugin_result = Some(DispatchResult {
            plugin_name: "demo-messaging".to_string(),
            dispatched_count: 1,
            failed: vec!["b@x.com".to_string()],
            metadata: Map::new(),
        });
        state.policy_decision = Some(PolicyDecision::default());
        state.analysis_summary = Some("summary".to_string());
        state.planned_actions = vec![PlanStep {
            step: 1,
            action: "analyse_intent".to_string(),
            details: "x".to_string(),
            rationale: "y".to_string(),
            source: "reasoner".to_string(),
        }];
        state.retrieved_context = Some(MemorySnapshot::default());
        state.context_validation = Some(ContextValidation {
            relevant: true,
            summary: "ok".to_string(),
        });
        state.review_feedback = Some(ReviewFeedback {
            approved: false,
            requires_human: true,
            summary: "x".to_string(),
            issues: vec![],
            detailed_issues: vec![ReviewIssue::new(
                IssueCategory::Plugin,
                "failed",
                IssueSeverity::High,
                true,
            )],
            review_notes: None,
        });
        state.requires_human_approval = true;
        state.error = Some("boom".to_string());
        state.working_notes.push("attempt 1".to_string());
        state.events.push(RunEvent::new("plugin.dispatched", "sent"));

        state.apply_retry_reset();

        assert_eq!(state.retry_count, 1);
        assert_eq!(state.status, RunStatus::Routing);
        assert!(state.selected_plugin.is_none());
        assert!(state.rendered_message.is_none());
        assert!(state.plugin_result.is_none());
        assert!(state.review_feedback.is_none());
        assert!(state.policy_decision.is_none());
        assert!(state.analysis_summary.is_none());
        assert!(state.planned_actions.is_empty());
        assert!(state.retrieved_context.is_none());
        assert!(state.context_validation.is_none());
        assert!(!state.requires_human_approval);
        assert!(state.error.is_none());
        // Trace survives the reset.
        assert_eq!(state.working_notes, vec!["attempt 1"]);
        assert_eq!(state.events.len(), 1);
    }

    #[test]
    fn test_state_round_trips_through_json() {
        let mut state = sample_state();
        state.events.push(RunEvent::new("workflow.completed", "done"));
        let json = serde_json::to_string(&state).unwrap();
        let parsed: RunState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.status, RunStatus::Queued);
        assert_eq!(parsed.events.len(), 1);
    }
}
