use crate::checkpoint::{Checkpointer, InMemoryCheckpointer};
use crate::graph::{Node, Transition};
use herald_core::{
    HeraldResult, MemorySnapshot, ReviewAction, ReviewNotes, RunEvent, RunState, RunStatus,
    StateDelta, TaskRequest,
};
use herald_memory::{DemoMemory, MemoryProvider};
use herald_policy::{InMemoryDirectiveStore, PolicyEngine};
use herald_plugins::PluginRegistry;
use herald_reasoning::ReasoningAgent;
use herald_review::{ReviewAgent, Sentinel};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Inclusive upper bound on the retry counter.
    pub max_retries: u32,
    /// Advisory concurrency hint for callers scheduling many runs. The engine
    /// itself does not enforce it; runs on distinct thread ids never contend.
    pub max_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            max_concurrency: 32,
        }
    }
}

/// Outcome of the policy node, consumed by the driver loop.
///
/// Denial is a first-class value rather than an error: the driver finishes
/// the run as Failed without ever entering the review machinery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyOutcome {
    /// The request may proceed.
    Allowed,
    /// The request is blocked; the run ends immediately.
    Denied(String),
}

enum NodeResult {
    Advance(StateDelta),
    Halt { delta: StateDelta, reason: String },
}

/// The workflow driver: runs the node graph over a shared [`RunState`],
/// checkpointing after every node and serializing work per thread id.
///
/// All collaborators are injected; nothing is looked up through globals.
pub struct WorkflowEngine {
    reasoner: Arc<ReasoningAgent>,
    memory: Arc<dyn MemoryProvider>,
    policy: Arc<PolicyEngine>,
    plugins: Arc<PluginRegistry>,
    sentinel: Sentinel,
    reviewer: ReviewAgent,
    checkpointer: Arc<dyn Checkpointer>,
    thread_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    config: EngineConfig,
}

impl WorkflowEngine {
    /// Creates an engine over explicit collaborators.
    pub fn new(
        reasoner: Arc<ReasoningAgent>,
        memory: Arc<dyn MemoryProvider>,
        policy: Arc<PolicyEngine>,
        plugins: Arc<PluginRegistry>,
        checkpointer: Arc<dyn Checkpointer>,
        config: EngineConfig,
    ) -> Self {
        Self {
            reasoner,
            memory,
            policy,
            plugins,
            sentinel: Sentinel::new(),
            reviewer: ReviewAgent::new(config.max_retries),
            checkpointer,
            thread_locks: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Builds an engine wired with the demo collaborators: heuristic
    /// reasoning, demo memory, an empty directive store, the demo plugin, and
    /// an in-memory checkpoint store.
    pub fn with_demo_stack() -> Self {
        Self::new(
            Arc::new(ReasoningAgent::new()),
            Arc::new(DemoMemory::new()),
            Arc::new(PolicyEngine::new(Arc::new(InMemoryDirectiveStore::new()))),
            Arc::new(PluginRegistry::with_demo_plugin()),
            Arc::new(InMemoryCheckpointer::new()),
            EngineConfig::default(),
        )
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs a structured request, using its request id as the thread id.
    pub async fn run(&self, request: TaskRequest) -> HeraldResult<RunState> {
        let thread_id = request.request_id.clone();
        self.run_with_thread(request, &thread_id).await
    }

    /// Runs a structured request under an explicit thread id.
    pub async fn run_with_thread(
        &self,
        request: TaskRequest,
        thread_id: &str,
    ) -> HeraldResult<RunState> {
        self.drive(RunState::new(request), thread_id).await
    }

    /// Runs from a free-text prompt; the intake node interprets it into a
    /// structured request before routing.
    pub async fn run_prompt(
        &self,
        raw_prompt: impl Into<String>,
        hints: Map<String, Value>,
        thread_id: &str,
    ) -> HeraldResult<RunState> {
        self.drive(RunState::from_prompt(raw_prompt, hints), thread_id)
            .await
    }

    /// Returns the last checkpointed state for a thread.
    pub async fn state(&self, thread_id: &str) -> HeraldResult<Option<RunState>> {
        self.checkpointer.get(thread_id).await
    }

    async fn lock_for(&self, thread_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.thread_locks.lock().await;
        locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn drive(&self, state: RunState, thread_id: &str) -> HeraldResult<RunState> {
        let lock = self.lock_for(thread_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.drive_locked(state, thread_id).await
        };
        self.evict_thread_lock(thread_id, &lock).await;
        result
    }

    /// Removes the thread's lock entry once nothing else holds it, so the
    /// lock map does not grow with every thread id ever seen. Contending
    /// runs hold their own clone of the entry and keep it alive.
    async fn evict_thread_lock(&self, thread_id: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.thread_locks.lock().await;
        if let Some(entry) = locks.get(thread_id) {
            // One reference in the map, one held by this caller.
            if Arc::ptr_eq(entry, lock) && Arc::strong_count(entry) <= 2 {
                locks.remove(thread_id);
            }
        }
    }

    async fn drive_locked(&self, mut state: RunState, thread_id: &str) -> HeraldResult<RunState> {
        let mut node = Node::entry(&state);
        info!(thread_id = %thread_id, node = %node, "Starting workflow run");

        loop {
            match self.execute(node, &state).await {
                Ok(NodeResult::Advance(delta)) => {
                    delta.apply(&mut state);
                }
                Ok(NodeResult::Halt { delta, reason }) => {
                    delta.apply(&mut state);
                    state.status = RunStatus::Failed;
                    state.error = Some(reason.clone());
                    warn!(thread_id = %thread_id, reason = %reason, "Run blocked by policy");
                    self.checkpointer.put(thread_id, &state).await?;
                    return Ok(state);
                }
                Err(error) => {
                    let message = error.to_string();
                    warn!(thread_id = %thread_id, node = %node, error = %message, "Node failed; aborting run");
                    state
                        .events
                        .push(RunEvent::new("workflow.failed", message.clone()));
                    state.status = RunStatus::Failed;
                    state.error = Some(message);
                    self.checkpointer.put(thread_id, &state).await?;
                    return Ok(state);
                }
            }

            if node == Node::ReviewAgent && state.review_action == Some(ReviewAction::Retry) {
                state.apply_retry_reset();
                info!(
                    thread_id = %thread_id,
                    retry_count = state.retry_count,
                    "Retrying run with prior-attempt context"
                );
            }

            self.checkpointer.put(thread_id, &state).await?;

            match node.next(&state) {
                Transition::Goto(next) => node = next,
                Transition::End => {
                    info!(
                        thread_id = %thread_id,
                        status = %state.status,
                        retries = state.retry_count,
                        "Workflow run finished"
                    );
                    return Ok(state);
                }
            }
        }
    }

    async fn execute(&self, node: Node, state: &RunState) -> HeraldResult<NodeResult> {
        match node {
            Node::InterpretRequest => self.interpret_request(state).await.map(NodeResult::Advance),
            Node::RouteRequest => self.route_request(state).await.map(NodeResult::Advance),
            Node::PolicyCheck => {
                let (delta, outcome) = self.policy_check(state).await?;
                Ok(match outcome {
                    PolicyOutcome::Allowed => NodeResult::Advance(delta),
                    PolicyOutcome::Denied(reason) => NodeResult::Halt { delta, reason },
                })
            }
            Node::FetchContext => self.fetch_context(state).await.map(NodeResult::Advance),
            Node::PlanActions => self.plan_actions(state).await.map(NodeResult::Advance),
            Node::AgentReflection => self.agent_reflection(state).await.map(NodeResult::Advance),
            Node::SelectPlugin => self.select_plugin(state).await.map(NodeResult::Advance),
            Node::RenderPayload => self.render_payload(state).await.map(NodeResult::Advance),
            Node::ExecutePlugin => self.execute_plugin(state).await.map(NodeResult::Advance),
            Node::ReviewOutcome => Ok(NodeResult::Advance(self.review_outcome(state))),
            Node::ReviewAgent => Ok(NodeResult::Advance(self.review_agent(state))),
            Node::UpdateMemory => self.update_memory(state).await.map(NodeResult::Advance),
            Node::Finalize => self.finalize(state).map(NodeResult::Advance),
        }
    }

    async fn interpret_request(&self, state: &RunState) -> HeraldResult<StateDelta> {
        let raw_prompt = state.raw_prompt.as_deref().ok_or_else(|| {
            herald_core::HeraldError::State("Run state missing request and raw_prompt".to_string())
        })?;

        let interpretation = self
            .reasoner
            .interpret_prompt(raw_prompt, &state.request_hints)
            .await;

        let preview: String = raw_prompt.chars().take(200).collect();
        let event = RunEvent::new("intake.interpretation", "Interpreted natural language prompt")
            .with_data("used_llm", json!(interpretation.used_llm))
            .with_data("raw_prompt_preview", json!(preview));

        Ok(StateDelta {
            status: Some(RunStatus::Interpreting),
            request: Some(interpretation.request),
            notes: interpretation.rationale.into_iter().collect(),
            events: vec![event],
            ..StateDelta::default()
        })
    }

    async fn route_request(&self, state: &RunState) -> HeraldResult<StateDelta> {
        let request = state.require_request()?;
        let decision = self
            .reasoner
            .decide_workflow(request, &state.working_notes)
            .await;

        let note = decision.rationale;
        let event = RunEvent::new("router.decision", note.clone())
            .with_data("request_id", json!(request.request_id))
            .with_data("channel", json!(request.channel))
            .with_data("decision_tags", json!(decision.tags))
            .with_data("retry_count", json!(state.retry_count));

        Ok(StateDelta {
            status: Some(RunStatus::Routing),
            selected_workflow: Some(decision.workflow),
            notes: vec![note],
            events: vec![event],
            ..StateDelta::default()
        })
    }

    async fn policy_check(&self, state: &RunState) -> HeraldResult<(StateDelta, PolicyOutcome)> {
        let request = state.require_request()?;
        let captured = self.policy.capture(request).await?;
        let decision = self.policy.evaluate(request).await?;

        let note = format!("Policy decision: {}", decision.reason);
        let mut notes = vec![note.clone()];
        if !captured.is_empty() {
            notes.push(format!("Captured {} policy directive(s)", captured.len()));
        }

        let event = RunEvent::new("policy.review", note)
            .with_data("allowed", json!(decision.allowed))
            .with_data("requires_human", json!(decision.requires_human))
            .with_data("policy_version", json!(decision.policy_version))
            .with_data("captured_directives", json!(captured.len()))
            .with_data("tags", json!(decision.tags));

        let outcome = if decision.allowed {
            PolicyOutcome::Allowed
        } else {
            PolicyOutcome::Denied(decision.reason.clone())
        };

        let delta = StateDelta {
            status: Some(RunStatus::PolicyCheck),
            requires_human: Some(decision.requires_human),
            policy_decision: Some(decision),
            captured_directives: captured,
            notes,
            events: vec![event],
            ..StateDelta::default()
        };
        Ok((delta, outcome))
    }

    async fn fetch_context(&self, state: &RunState) -> HeraldResult<StateDelta> {
        let request = state.require_request()?;
        // Retrieval failures degrade to an empty snapshot; the sentinel will
        // surface the missing context as a low-severity issue.
        let snapshot = match self.memory.retrieve_context(request).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(%error, "Context retrieval failed; continuing without context");
                MemorySnapshot::default()
            }
        };
        let validation = self.memory.validate_relevance(&snapshot, &request.intent);

        let note = format!(
            "Context hydrated from {} memory layer",
            self.memory.provider_name()
        );
        let event = RunEvent::new("context.fetched", "Fetched contextual signals from memory layer")
            .with_data("snippets", json!(snapshot.memory_snippets.len()))
            .with_data("graph_relations", json!(snapshot.graph_relations.len()))
            .with_data("validation", json!(validation.summary));

        Ok(StateDelta {
            status: Some(RunStatus::FetchingContext),
            retrieved_context: Some(snapshot),
            context_validation: Some(validation),
            notes: vec![note],
            events: vec![event],
            ..StateDelta::default()
        })
    }

    async fn plan_actions(&self, state: &RunState) -> HeraldResult<StateDelta> {
        let request = state.require_request()?;
        let workflow = selected_workflow(state);
        let plan = self
            .reasoner
            .build_plan(request, workflow, state.retrieved_context.as_ref())
            .await;

        let note = format!(
            "Planning agent proposed {} step(s) for workflow '{workflow}'",
            plan.len()
        );
        let event = RunEvent::new("planner.plan_created", "Created high-level plan")
            .with_data("steps", json!(plan.len()))
            .with_data("workflow", json!(workflow));

        Ok(StateDelta {
            status: Some(RunStatus::Planning),
            planned_actions: Some(plan),
            notes: vec![note],
            events: vec![event],
            ..StateDelta::default()
        })
    }

    async fn agent_reflection(&self, state: &RunState) -> HeraldResult<StateDelta> {
        let request = state.require_request()?;
        let workflow = selected_workflow(state);
        let reflection = self
            .reasoner
            .generate_reflection(
                request,
                workflow,
                &state.planned_actions,
                state.retrieved_context.as_ref(),
                state.context_validation.as_ref(),
                state.policy_decision.as_ref(),
            )
            .await;

        let event = RunEvent::new("agent.reflect", "Generated reasoning summary")
            .with_data("summary", json!(reflection))
            .with_data("workflow", json!(workflow));

        Ok(StateDelta {
            status: Some(RunStatus::Reflecting),
            analysis_summary: Some(reflection),
            notes: vec!["Reasoning agent produced reflection summary".to_string()],
            events: vec![event],
            ..StateDelta::default()
        })
    }

    async fn select_plugin(&self, state: &RunState) -> HeraldResult<StateDelta> {
        let request = state.require_request()?;
        let workflow = selected_workflow(state);
        let known = self.plugins.names();
        let choice = self
            .reasoner
            .choose_plugin(request, workflow, &state.planned_actions, &known)
            .await;

        let event = RunEvent::new(
            "plugin.selected",
            format!("Candidate plugin '{}' chosen", choice.plugin_name),
        )
        .with_data("preferred", json!(request.metadata_str("plugin")))
        .with_data("channel", json!(request.channel))
        .with_data("confidence", json!(choice.confidence))
        .with_data("rationale", json!(choice.rationale));

        Ok(StateDelta {
            selected_plugin: Some(choice.plugin_name),
            notes: vec![choice.rationale],
            events: vec![event],
            ..StateDelta::default()
        })
    }

    async fn render_payload(&self, state: &RunState) -> HeraldResult<StateDelta> {
        let request = state.require_request()?;
        let template = request
            .payload
            .get("template")
            .and_then(Value::as_str)
            .unwrap_or("[demo] {intent}");

        let mut variables: Map<String, Value> = Map::new();
        variables.insert("intent".to_string(), json!(request.intent));
        if let Some(extra) = request.payload.get("variables").and_then(Value::as_object) {
            for (key, value) in extra {
                variables.insert(key.clone(), value.clone());
            }
        }
        let rendered = render_template(template, &variables);

        let message = self
            .reasoner
            .generate_payload(
                request,
                &state.planned_actions,
                state.retrieved_context.as_ref(),
                &rendered,
            )
            .await;

        let event = RunEvent::new("message.rendered", "Rendered payload for plugin dispatch")
            .with_data("char_count", json!(message.chars().count()));

        Ok(StateDelta {
            rendered_message: Some(message),
            events: vec![event],
            ..StateDelta::default()
        })
    }

    async fn execute_plugin(&self, state: &RunState) -> HeraldResult<StateDelta> {
        let request = state.require_request()?;
        let plugin_name = state.selected_plugin.as_deref().unwrap_or_default();
        let rendered = state.rendered_message.as_deref().unwrap_or_default();

        let mut tool_context = Map::new();
        if let Some(workflow) = &state.selected_workflow {
            tool_context.insert("workflow".to_string(), json!(workflow));
        }
        if let Some(summary) = &state.analysis_summary {
            tool_context.insert("analysis".to_string(), json!(summary));
        }
        let context = if tool_context.is_empty() {
            None
        } else {
            Some(&tool_context)
        };

        // Lookup and dispatch failures take the execution-issue path: record
        // the error and let the sentinel classify it instead of aborting.
        let dispatch = match self.plugins.get(plugin_name) {
            Some(plugin) => plugin.dispatch(request, rendered, context).await,
            None => Err(herald_core::HeraldError::Plugin(format!(
                "No plugin registered under name '{plugin_name}'"
            ))),
        };

        let delta = match dispatch {
            Ok(result) => {
                let event = RunEvent::new(
                    "plugin.dispatched",
                    format!("Plugin '{}' dispatched", result.plugin_name),
                )
                .with_data("dispatched_count", json!(result.dispatched_count))
                .with_data("failed", json!(result.failed.len()));
                StateDelta {
                    status: Some(RunStatus::Dispatching),
                    plugin_result: Some(result),
                    events: vec![event],
                    ..StateDelta::default()
                }
            }
            Err(error) => {
                let message = error.to_string();
                warn!(plugin = %plugin_name, error = %message, "Plugin dispatch failed");
                let event = RunEvent::new(
                    "plugin.dispatched",
                    format!("Plugin '{plugin_name}' dispatch failed"),
                )
                .with_data("error", json!(message));
                StateDelta {
                    status: Some(RunStatus::Dispatching),
                    error: Some(message),
                    events: vec![event],
                    ..StateDelta::default()
                }
            }
        };
        Ok(delta)
    }

    fn review_outcome(&self, state: &RunState) -> StateDelta {
        let feedback = self.sentinel.review(state);

        let event = RunEvent::new("agent.review", "Sentinel produced review feedback")
            .with_data("approved", json!(feedback.approved))
            .with_data("requires_human", json!(feedback.requires_human))
            .with_data("issues", json!(feedback.issues));

        StateDelta {
            status: Some(RunStatus::Reviewing),
            requires_human: Some(feedback.requires_human),
            review_feedback: Some(feedback),
            notes: vec!["Sentinel review complete".to_string()],
            events: vec![event],
            ..StateDelta::default()
        }
    }

    fn review_agent(&self, state: &RunState) -> StateDelta {
        let (action, message) = self
            .reviewer
            .evaluate(state.review_feedback.as_ref(), state.retry_count);

        let mut notes = vec![message.clone()];
        if action == ReviewAction::Retry {
            // The reset clears review_feedback, so the context the next
            // routing pass needs is written into the notes now.
            if let Some(review_notes) = state
                .review_feedback
                .as_ref()
                .and_then(|feedback| feedback.review_notes.as_ref())
            {
                notes.extend(retry_context_notes(review_notes, state.retry_count + 1));
            }
        }

        let reported_retry = if action == ReviewAction::Retry {
            state.retry_count + 1
        } else {
            state.retry_count
        };
        let event = RunEvent::new("review.agent", message.clone())
            .with_data("action", json!(action))
            .with_data("retry_count", json!(reported_retry));

        StateDelta {
            review_agent_message: Some(message),
            review_action: Some(action),
            notes,
            events: vec![event],
            ..StateDelta::default()
        }
    }

    async fn update_memory(&self, state: &RunState) -> HeraldResult<StateDelta> {
        let request = state.require_request()?;
        let reflection = state.analysis_summary.as_deref().unwrap_or_default();
        let updates = self
            .memory
            .prepare_updates(request, state.plugin_result.as_ref(), reflection);

        // Best-effort: a failed commit never fails the run.
        if let Err(error) = self.memory.commit_updates(request, &updates).await {
            warn!(%error, "Memory commit failed; updates kept in run state only");
        }

        let event = RunEvent::new("memory.updated", "Prepared memory updates")
            .with_data("entries", json!(updates.len()));

        Ok(StateDelta {
            status: Some(RunStatus::UpdatingMemory),
            memory_updates: Some(updates),
            events: vec![event],
            ..StateDelta::default()
        })
    }

    fn finalize(&self, state: &RunState) -> HeraldResult<StateDelta> {
        let request = state.require_request()?;
        let event = RunEvent::new("workflow.completed", "Workflow completed successfully")
            .with_data("request_id", json!(request.request_id));

        Ok(StateDelta {
            status: Some(RunStatus::Completed),
            events: vec![event],
            ..StateDelta::default()
        })
    }
}

fn selected_workflow(state: &RunState) -> &str {
    state.selected_workflow.as_deref().unwrap_or("generic-task")
}

/// Builds the prior-attempt notes that make the next routing pass an informed
/// retry rather than a blind repeat.
fn retry_context_notes(review_notes: &ReviewNotes, retry_number: u32) -> Vec<String> {
    let mut notes = vec![format!(
        "[Retry {retry_number}] Previous attempt completed at stage: {}",
        review_notes.workflow_stage
    )];

    if !review_notes.successful_steps.is_empty() {
        let steps: Vec<&str> = review_notes
            .successful_steps
            .iter()
            .take(3)
            .map(String::as_str)
            .collect();
        notes.push(format!("Successful steps: {}", steps.join(", ")));
    }

    let mut categories: Vec<String> = Vec::new();
    for issue in &review_notes.issues_found {
        let name = issue.category.to_string();
        if !categories.contains(&name) {
            categories.push(name);
        }
    }
    if !categories.is_empty() {
        notes.push(format!("Issues encountered: {}", categories.join(", ")));
    }

    if !review_notes.recommendations.is_empty() {
        let picked: Vec<&str> = review_notes
            .recommendations
            .iter()
            .take(2)
            .map(String::as_str)
            .collect();
        notes.push(format!("Recommendations: {}", picked.join("; ")));
    }

    if let Some(plugin) = review_notes
        .routing_context
        .get("failed_plugin")
        .and_then(Value::as_str)
    {
        notes.push(format!("Avoid plugin: {plugin}"));
    }
    if review_notes
        .routing_context
        .get("policy_blocked")
        .and_then(Value::as_bool)
        == Some(true)
    {
        let reason = review_notes
            .routing_context
            .get("policy_reason")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        notes.push(format!("Policy constraint: {reason}"));
    }

    notes
}

/// Substitutes `{name}` placeholders in a template. When the template names a
/// variable that is absent, the whole substitution is abandoned and the raw
/// template is returned with the variables appended, so nothing is silently
/// dropped.
fn render_template(template: &str, variables: &Map<String, Value>) -> String {
    let mut missing = false;
    for placeholder in template_placeholders(template) {
        if !variables.contains_key(&placeholder) {
            missing = true;
            break;
        }
    }
    if missing {
        return format!("{template} | vars={}", Value::Object(variables.clone()));
    }

    let mut rendered = template.to_string();
    for (key, value) in variables {
        let needle = format!("{{{key}}}");
        let replacement = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        rendered = rendered.replace(&needle, &replacement);
    }
    rendered
}

fn template_placeholders(template: &str) -> Vec<String> {
    let mut placeholders = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open + 1..].find('}') else {
            break;
        };
        let name = &rest[open + 1..open + 1 + close];
        if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            placeholders.push(name.to_string());
        }
        rest = &rest[open + 1 + close + 1..];
    }
    placeholders
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::{IssueCategory, IssueSeverity, ReviewIssue};

    #[test]
    fn test_render_template_substitutes_variables() {
        let mut vars = Map::new();
        vars.insert("intent".to_string(), json!("send_update"));
        vars.insert("name".to_string(), json!("Ada"));
        assert_eq!(
            render_template("Hi {name}: {intent}", &vars),
            "Hi Ada: send_update"
        );
    }

    #[test]
    fn test_render_template_missing_variable_falls_back() {
        let mut vars = Map::new();
        vars.insert("intent".to_string(), json!("ping"));
        let rendered = render_template("Hello {missing}", &vars);
        assert!(rendered.starts_with("Hello {missing} | vars="));
        assert!(rendered.contains("ping"));
    }

    #[test]
    fn test_render_template_ignores_literal_braces() {
        let vars = Map::new();
        assert_eq!(render_template("a {} b", &vars), "a {} b");
    }

    #[test]
    fn test_retry_notes_cover_routing_context() {
        let mut routing_context = Map::new();
        routing_context.insert("failed_plugin".to_string(), json!("demo-messaging"));
        routing_context.insert("policy_blocked".to_string(), json!(true));
        routing_context.insert("policy_reason".to_string(), json!("never email the ceo"));

        let review_notes = ReviewNotes {
            workflow_stage: RunStatus::Reviewing,
            issues_found: vec![
                ReviewIssue::new(
                    IssueCategory::Plugin,
                    "delivery failed",
                    IssueSeverity::High,
                    true,
                ),
                ReviewIssue::new(
                    IssueCategory::Plugin,
                    "another delivery failed",
                    IssueSeverity::High,
                    true,
                ),
            ],
            successful_steps: vec!["Policy check passed".to_string()],
            recommendations: vec![
                "first".to_string(),
                "second".to_string(),
                "third".to_string(),
            ],
            routing_context,
        };

        let notes = retry_context_notes(&review_notes, 1);
        assert!(notes[0].contains("[Retry 1]"));
        assert!(notes.iter().any(|n| n == "Successful steps: Policy check passed"));
        assert!(notes.iter().any(|n| n == "Issues encountered: plugin"));
        assert!(notes.iter().any(|n| n == "Recommendations: first; second"));
        assert!(notes.iter().any(|n| n == "Avoid plugin: demo-messaging"));
        assert!(notes
            .iter()
            .any(|n| n == "Policy constraint: never email the ceo"));
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.max_concurrency, 32);
    }

    #[tokio::test]
    async fn test_thread_lock_evicted_after_run() {
        let engine = WorkflowEngine::with_demo_stack();
        engine
            .run_with_thread(TaskRequest::new("ping"), "t-1")
            .await
            .unwrap();
        engine
            .run_with_thread(TaskRequest::new("pong"), "t-2")
            .await
            .unwrap();
        // Finished runs leave no lock entry behind.
        assert!(engine.thread_locks.lock().await.is_empty());
    }
}
