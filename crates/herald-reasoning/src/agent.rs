use crate::model::LanguageModel;
use herald_core::{
    ContextValidation, MemorySnapshot, PlanStep, PolicyDecision, TaskRequest,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// The workflow routing decision.
#[derive(Debug, Clone)]
pub struct WorkflowDecision {
    /// Selected workflow name.
    pub workflow: String,
    /// Why the workflow was chosen.
    pub rationale: String,
    /// Where the decision came from (`source:metadata`, `source:audience`,
    /// `source:heuristic`).
    pub tags: Vec<String>,
}

/// The plugin dispatch choice.
#[derive(Debug, Clone)]
pub struct PluginChoice {
    /// Registry name of the chosen plugin.
    pub plugin_name: String,
    /// Why the plugin was chosen.
    pub rationale: String,
    /// Confidence in the choice, 0.0..=1.0.
    pub confidence: f64,
}

/// The result of interpreting a free-text prompt.
#[derive(Debug, Clone)]
pub struct Interpretation {
    /// The structured request distilled from the prompt.
    pub request: TaskRequest,
    /// Interpretation rationale, when one was produced.
    pub rationale: Option<String>,
    /// Whether a language model produced the request.
    pub used_llm: bool,
}

/// Reasoning helper that optionally delegates to a language model.
///
/// Deterministic heuristics keep the pipeline stable in tests and when no
/// model is wired in; a configured [`LanguageModel`] enriches rationales and
/// may override plan and plugin choices within guardrails.
pub struct ReasoningAgent {
    model: Option<Arc<dyn LanguageModel>>,
}

impl ReasoningAgent {
    /// Creates an agent with heuristics only.
    pub fn new() -> Self {
        Self { model: None }
    }

    /// Creates an agent backed by a language model.
    pub fn with_model(model: Arc<dyn LanguageModel>) -> Self {
        Self { model: Some(model) }
    }

    /// Interprets a free-text prompt into a structured request.
    ///
    /// With a model configured the agent asks for a JSON request and falls
    /// back to a generic request when the response does not parse.
    pub async fn interpret_prompt(
        &self,
        raw_prompt: &str,
        hints: &Map<String, Value>,
    ) -> Interpretation {
        let prompt = format!(
            "Turn the following user prompt into a JSON orchestration request with \
             fields intent, channel, payload, metadata.\nPrompt: {raw_prompt}\nHints: {}",
            Value::Object(hints.clone())
        );
        if let Some(response) = self.complete_if_configured(&prompt).await {
            if let Ok(request) = serde_json::from_str::<TaskRequest>(response.trim()) {
                return Interpretation {
                    request,
                    rationale: Some("Language model interpreted the prompt".to_string()),
                    used_llm: true,
                };
            }
            debug!("Discarding unparseable interpretation response");
        }

        let mut request = TaskRequest::new(raw_prompt.trim());
        if let Some(channel) = hints.get("channel").and_then(Value::as_str) {
            request.channel = channel.to_string();
        }
        Interpretation {
            request,
            rationale: Some("Interpreted prompt with heuristic fallback".to_string()),
            used_llm: false,
        }
    }

    /// Decides which workflow handles a request. An explicit
    /// `metadata.workflow` pin wins; otherwise an audience selects the
    /// broadcast workflow and everything else falls back to `generic-task`.
    /// Requests without an audience never route to broadcast.
    pub async fn decide_workflow(
        &self,
        request: &TaskRequest,
        prior_notes: &[String],
    ) -> WorkflowDecision {
        let mut tags = Vec::new();
        let (workflow, mut rationale) = if let Some(pinned) = request.metadata_str("workflow") {
            tags.push("source:metadata".to_string());
            (
                pinned.to_string(),
                "Caller pinned workflow via metadata".to_string(),
            )
        } else if request
            .audience
            .as_ref()
            .is_some_and(|a| !a.recipients.is_empty())
        {
            tags.push("source:audience".to_string());
            (
                "broadcast".to_string(),
                "Audience provided; defaulting to broadcast workflow".to_string(),
            )
        } else {
            tags.push("source:heuristic".to_string());
            (
                "generic-task".to_string(),
                "No audience or explicit workflow; using generic-task baseline".to_string(),
            )
        };

        let prompt = self.format_prompt(
            "workflow",
            request,
            &summarize_notes(prior_notes),
            "",
            &rationale,
        );
        if let Some(reason) = self.complete_if_configured(&prompt).await {
            rationale = reason;
        }

        WorkflowDecision {
            workflow,
            rationale,
            tags,
        }
    }

    /// Builds the action plan for a request. The heuristic plan always
    /// analyses the intent, inspects retrieved context when snippets exist,
    /// and prepares the tool invocation; a model may replace it with one
    /// step per response line.
    pub async fn build_plan(
        &self,
        request: &TaskRequest,
        workflow: &str,
        context: Option<&MemorySnapshot>,
    ) -> Vec<PlanStep> {
        let mut steps = Vec::new();
        let mut counter = 1;

        steps.push(PlanStep {
            step: counter,
            action: "analyse_intent".to_string(),
            details: request.intent.clone(),
            rationale: "Understand the caller's goal".to_string(),
            source: "reasoner".to_string(),
        });
        counter += 1;

        let snippet_count = context.map_or(0, |c| c.memory_snippets.len());
        if snippet_count > 0 {
            steps.push(PlanStep {
                step: counter,
                action: "inspect_context".to_string(),
                details: format!("Review {snippet_count} relevant memory snippet(s)"),
                rationale: "Ground the plan with retrieved memory".to_string(),
                source: "reasoner".to_string(),
            });
            counter += 1;
        }

        steps.push(PlanStep {
            step: counter,
            action: "prepare_tool_invocation".to_string(),
            details: workflow.to_string(),
            rationale: "Select delivery channel or plugin".to_string(),
            source: "reasoner".to_string(),
        });

        let prompt = self.format_prompt(
            "planning",
            request,
            &summarize_context(context),
            "",
            &format!("{} heuristic step(s)", steps.len()),
        );
        if let Some(response) = self.complete_if_configured(&prompt).await {
            let merged = parse_plan_lines(&response);
            if !merged.is_empty() {
                return merged;
            }
        }

        steps
    }

    /// Produces a short reflection over everything gathered for the run.
    pub async fn generate_reflection(
        &self,
        request: &TaskRequest,
        workflow: &str,
        plan: &[PlanStep],
        context: Option<&MemorySnapshot>,
        validation: Option<&ContextValidation>,
        policy_decision: Option<&PolicyDecision>,
    ) -> String {
        let snippet_count = context.map_or(0, |c| c.memory_snippets.len());
        let relation_count = context.map_or(0, |c| c.graph_relations.len());

        let mut parts = vec![
            format!("Intent: {}", request.intent),
            format!("Workflow: {workflow}"),
            format!("Plan steps: {}", plan.len()),
            format!("Memory snippets: {snippet_count}"),
            format!("Graph relations: {relation_count}"),
        ];
        if let Some(validation) = validation {
            parts.push(format!("Validation: {}", validation.summary));
        }
        if let Some(decision) = policy_decision {
            parts.push(format!("Policy: {}", decision.reason));
        }
        let fallback = parts.join(" | ");

        let prompt = self.format_prompt(
            "reflection",
            request,
            &summarize_context(context),
            &summarize_plan(plan),
            &fallback,
        );
        self.complete_if_configured(&prompt)
            .await
            .unwrap_or(fallback)
    }

    /// Chooses the dispatch plugin. An explicit `metadata.plugin` wins;
    /// otherwise the channel name is used, with generic-task runs deferring
    /// to the demo plugin. A model may propose `name::rationale`, accepted
    /// only when the name is a known plugin.
    pub async fn choose_plugin(
        &self,
        request: &TaskRequest,
        workflow: &str,
        plan: &[PlanStep],
        known_plugins: &[String],
    ) -> PluginChoice {
        let (mut candidate, mut rationale, mut confidence) =
            if let Some(preferred) = request.metadata_str("plugin") {
                (
                    preferred.to_string(),
                    "Caller requested plugin explicitly".to_string(),
                    0.9,
                )
            } else {
                let channel = request.channel.trim();
                let candidate = if channel.is_empty() {
                    "demo-messaging".to_string()
                } else {
                    channel.to_string()
                };
                if workflow == "generic-task" && candidate != "demo-messaging" {
                    (
                        "demo-messaging".to_string(),
                        "Generic workflow defers to demo plugin".to_string(),
                        0.6,
                    )
                } else {
                    (
                        candidate,
                        format!("Selected plugin based on channel '{}'", request.channel),
                        0.7,
                    )
                }
            };

        let prompt = self.format_prompt(
            "plugin",
            request,
            "",
            &summarize_plan(plan),
            &format!("{candidate}::{rationale}"),
        );
        if let Some(response) = self.complete_if_configured(&prompt).await {
            if let Some((name, explanation)) = parse_plugin_response(&response) {
                if known_plugins.iter().any(|known| known.eq_ignore_ascii_case(&name)) {
                    candidate = name;
                    rationale = explanation;
                    confidence = 0.75;
                } else {
                    debug!(
                        proposal = %name,
                        "Ignoring plugin proposal; no plugin registered under that name"
                    );
                }
            }
        }

        PluginChoice {
            plugin_name: candidate,
            rationale,
            confidence,
        }
    }

    /// Generates the outbound message body, falling back to the template
    /// rendering produced upstream.
    pub async fn generate_payload(
        &self,
        request: &TaskRequest,
        plan: &[PlanStep],
        context: Option<&MemorySnapshot>,
        fallback: &str,
    ) -> String {
        let prompt = format!(
            "Write the outbound message for intent '{}' on channel '{}'.\n\
             Plan: {}\nContext: {}\nDefault: {fallback}",
            request.intent,
            request.channel,
            summarize_plan(plan),
            summarize_context(context),
        );
        self.complete_if_configured(&prompt)
            .await
            .unwrap_or_else(|| fallback.to_string())
    }

    async fn complete_if_configured(&self, prompt: &str) -> Option<String> {
        let model = self.model.as_ref()?;
        match model.complete(prompt).await {
            Ok(response) => {
                let trimmed = response.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Err(error) => {
                // Model errors must not break orchestration.
                debug!(%error, "Language model call failed; using heuristic fallback");
                None
            }
        }
    }

    fn format_prompt(
        &self,
        topic: &str,
        request: &TaskRequest,
        context_summary: &str,
        plan_summary: &str,
        default_reason: &str,
    ) -> String {
        let format_hint = match topic {
            "plugin" => {
                "Respond with '<plugin_name>::<short rationale>' using a registered plugin name."
            }
            "workflow" => "Respond with a concise routing rationale.",
            "planning" => "List plan steps succinctly, one per line.",
            "reflection" => "Provide a short summary highlighting key observations.",
            _ => "Respond with a concise rationale.",
        };
        format!(
            "Topic: {topic}\nIntent: {}\nChannel: {}\nContext: {}\nPlan: {}\n{format_hint}\nDefault: {default_reason}",
            request.intent,
            request.channel,
            if context_summary.is_empty() { "none" } else { context_summary },
            if plan_summary.is_empty() { "n/a" } else { plan_summary },
        )
    }
}

impl Default for ReasoningAgent {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_plan_lines(response: &str) -> Vec<PlanStep> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(index, line)| PlanStep {
            step: index as u32 + 1,
            action: line
                .split_whitespace()
                .next()
                .unwrap_or("step")
                .to_lowercase(),
            details: line.to_string(),
            rationale: "Model provided".to_string(),
            source: "reasoner-llm".to_string(),
        })
        .collect()
}

fn parse_plugin_response(response: &str) -> Option<(String, String)> {
    if let Some((name, explanation)) = response.split_once("::") {
        let name = name.trim();
        if !name.is_empty() {
            let explanation = explanation.trim();
            let explanation = if explanation.is_empty() {
                "Model provided plugin rationale"
            } else {
                explanation
            };
            return Some((name.to_string(), explanation.to_string()));
        }
    }
    let bare = response.trim();
    if !bare.is_empty() && bare.split_whitespace().count() == 1 {
        return Some((bare.to_string(), "Model selected plugin".to_string()));
    }
    None
}

fn summarize_context(context: Option<&MemorySnapshot>) -> String {
    match context {
        Some(snapshot) => format!(
            "snippets={}, relations={}",
            snapshot.memory_snippets.len(),
            snapshot.graph_relations.len()
        ),
        None => String::new(),
    }
}

fn summarize_plan(plan: &[PlanStep]) -> String {
    plan.iter()
        .map(|step| step.action.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn summarize_notes(notes: &[String]) -> String {
    notes.join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use herald_core::{Audience, HeraldError, HeraldResult};
    use serde_json::json;

    struct CannedModel(String);

    #[async_trait]
    impl LanguageModel for CannedModel {
        async fn complete(&self, _prompt: &str) -> HeraldResult<String> {
            Ok(self.0.clone())
        }
    }

    struct FailingModel;

    #[async_trait]
    impl LanguageModel for FailingModel {
        async fn complete(&self, _prompt: &str) -> HeraldResult<String> {
            Err(HeraldError::Reasoning("backend unreachable".to_string()))
        }
    }

    fn broadcast_request() -> TaskRequest {
        TaskRequest::new("send_update")
            .with_audience(Audience::new(vec!["a@x.com".to_string()]).unwrap())
    }

    #[tokio::test]
    async fn test_no_audience_never_broadcast() {
        let agent = ReasoningAgent::new();
        let decision = agent
            .decide_workflow(&TaskRequest::new("send_update"), &[])
            .await;
        assert_eq!(decision.workflow, "generic-task");
        assert!(decision.tags.contains(&"source:heuristic".to_string()));
    }

    #[tokio::test]
    async fn test_audience_routes_to_broadcast() {
        let agent = ReasoningAgent::new();
        let decision = agent.decide_workflow(&broadcast_request(), &[]).await;
        assert_eq!(decision.workflow, "broadcast");
        assert!(decision.tags.contains(&"source:audience".to_string()));
    }

    #[tokio::test]
    async fn test_metadata_pin_wins() {
        let agent = ReasoningAgent::new();
        let request = broadcast_request().with_metadata("workflow", json!("digest"));
        let decision = agent.decide_workflow(&request, &[]).await;
        assert_eq!(decision.workflow, "digest");
        assert!(decision.tags.contains(&"source:metadata".to_string()));
    }

    #[tokio::test]
    async fn test_model_only_refines_rationale() {
        let agent = ReasoningAgent::with_model(Arc::new(CannedModel(
            "user asked for a broadcast".to_string(),
        )));
        let decision = agent
            .decide_workflow(&TaskRequest::new("send_update"), &[])
            .await;
        // Workflow selection stays deterministic; the model only explains it.
        assert_eq!(decision.workflow, "generic-task");
        assert_eq!(decision.rationale, "user asked for a broadcast");
    }

    #[tokio::test]
    async fn test_model_failure_falls_back() {
        let agent = ReasoningAgent::with_model(Arc::new(FailingModel));
        let decision = agent.decide_workflow(&broadcast_request(), &[]).await;
        assert_eq!(decision.workflow, "broadcast");
        assert!(decision.rationale.contains("broadcast workflow"));
    }

    #[tokio::test]
    async fn test_heuristic_plan_shape() {
        let agent = ReasoningAgent::new();
        let snapshot = MemorySnapshot {
            memory_snippets: vec!["snippet".to_string()],
            ..MemorySnapshot::default()
        };
        let plan = agent
            .build_plan(&TaskRequest::new("send_update"), "broadcast", Some(&snapshot))
            .await;
        let actions: Vec<&str> = plan.iter().map(|s| s.action.as_str()).collect();
        assert_eq!(
            actions,
            vec!["analyse_intent", "inspect_context", "prepare_tool_invocation"]
        );
    }

    #[tokio::test]
    async fn test_plan_without_context_skips_inspection() {
        let agent = ReasoningAgent::new();
        let plan = agent
            .build_plan(&TaskRequest::new("send_update"), "generic-task", None)
            .await;
        assert_eq!(plan.len(), 2);
    }

    #[tokio::test]
    async fn test_model_plan_replaces_heuristic() {
        let agent = ReasoningAgent::with_model(Arc::new(CannedModel(
            "Draft the note\nSend the note".to_string(),
        )));
        let plan = agent
            .build_plan(&TaskRequest::new("send_update"), "generic-task", None)
            .await;
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].action, "draft");
        assert_eq!(plan[1].source, "reasoner-llm");
    }

    #[tokio::test]
    async fn test_choose_plugin_explicit_metadata() {
        let agent = ReasoningAgent::new();
        let request = TaskRequest::new("send_update").with_metadata("plugin", json!("email"));
        let choice = agent
            .choose_plugin(&request, "broadcast", &[], &["email".to_string()])
            .await;
        assert_eq!(choice.plugin_name, "email");
        assert!((choice.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_generic_task_defers_to_demo() {
        let agent = ReasoningAgent::new();
        let request = TaskRequest::new("send_update").with_channel("whatsapp");
        let choice = agent
            .choose_plugin(&request, "generic-task", &[], &[])
            .await;
        assert_eq!(choice.plugin_name, "demo-messaging");
    }

    #[tokio::test]
    async fn test_model_plugin_proposal_requires_known_name() {
        let agent =
            ReasoningAgent::with_model(Arc::new(CannedModel("carrier-pigeon::fast".to_string())));
        let request = TaskRequest::new("send_update").with_channel("whatsapp");
        let choice = agent
            .choose_plugin(&request, "broadcast", &[], &["whatsapp".to_string()])
            .await;
        // Unknown proposal ignored; channel heuristic stands.
        assert_eq!(choice.plugin_name, "whatsapp");
    }

    #[tokio::test]
    async fn test_model_plugin_proposal_accepted_when_known() {
        let agent =
            ReasoningAgent::with_model(Arc::new(CannedModel("email::matches intent".to_string())));
        let request = TaskRequest::new("send_update").with_channel("whatsapp");
        let choice = agent
            .choose_plugin(
                &request,
                "broadcast",
                &[],
                &["whatsapp".to_string(), "email".to_string()],
            )
            .await;
        assert_eq!(choice.plugin_name, "email");
        assert_eq!(choice.rationale, "matches intent");
    }

    #[tokio::test]
    async fn test_reflection_fallback_format() {
        let agent = ReasoningAgent::new();
        let summary = agent
            .generate_reflection(
                &TaskRequest::new("send_update"),
                "broadcast",
                &[],
                None,
                None,
                None,
            )
            .await;
        assert!(summary.contains("Intent: send_update"));
        assert!(summary.contains("Workflow: broadcast"));
    }

    #[tokio::test]
    async fn test_payload_fallback() {
        let agent = ReasoningAgent::new();
        let body = agent
            .generate_payload(&TaskRequest::new("send_update"), &[], None, "[demo] hi")
            .await;
        assert_eq!(body, "[demo] hi");
    }

    #[tokio::test]
    async fn test_interpret_prompt_fallback() {
        let agent = ReasoningAgent::new();
        let mut hints = Map::new();
        hints.insert("channel".to_string(), json!("email"));
        let interpretation = agent
            .interpret_prompt("  remind the team about standup  ", &hints)
            .await;
        assert!(!interpretation.used_llm);
        assert_eq!(
            interpretation.request.intent,
            "remind the team about standup"
        );
        assert_eq!(interpretation.request.channel, "email");
    }

    #[tokio::test]
    async fn test_interpret_prompt_parses_model_json() {
        let agent = ReasoningAgent::with_model(Arc::new(CannedModel(
            r#"{"intent": "send_digest", "channel": "email"}"#.to_string(),
        )));
        let interpretation = agent.interpret_prompt("send the digest", &Map::new()).await;
        assert!(interpretation.used_llm);
        assert_eq!(interpretation.request.intent, "send_digest");
    }
}
