use crate::capture::FeedbackCapture;
use crate::store::DirectiveStore;
use herald_core::{Directive, DirectiveKind, HeraldResult, PolicyDecision, TaskRequest};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Metadata keys checked, in order, to resolve the tenant of a request.
const TENANT_METADATA_KEYS: [&str; 4] = ["tenant_id", "tenant", "workspace_id", "account_id"];

/// Fallback tenant when a request carries no tenant metadata.
pub const DEFAULT_TENANT: &str = "default";

/// Evaluates requests against tenant-scoped directives and built-in rules.
pub struct PolicyEngine {
    store: Arc<dyn DirectiveStore>,
    capture: FeedbackCapture,
    policy_version: String,
}

impl PolicyEngine {
    /// Creates an engine over the given directive store.
    pub fn new(store: Arc<dyn DirectiveStore>) -> Self {
        Self {
            store,
            capture: FeedbackCapture::new(),
            policy_version: "herald/v1".to_string(),
        }
    }

    /// Overrides the policy version marker stamped onto decisions.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.policy_version = version.into();
        self
    }

    /// Resolves the tenant id from request metadata.
    pub fn resolve_tenant(request: &TaskRequest) -> String {
        for key in TENANT_METADATA_KEYS {
            if let Some(tenant) = request.metadata_str(key) {
                return tenant.to_string();
            }
        }
        DEFAULT_TENANT.to_string()
    }

    /// Captures directives from the request's free-text fields and persists
    /// the ones not already stored for the tenant. Returns only the newly
    /// added directives; a repeated capture of identical text adds nothing.
    pub async fn capture(&self, request: &TaskRequest) -> HeraldResult<Vec<Directive>> {
        let extracted = self.capture.extract(request);
        if extracted.is_empty() {
            return Ok(Vec::new());
        }
        let tenant = Self::resolve_tenant(request);
        let added = self.store.add_directives(&tenant, extracted).await?;
        if !added.is_empty() {
            info!(
                tenant = %tenant,
                count = added.len(),
                "Captured policy directives from request feedback"
            );
        }
        Ok(added)
    }

    /// Evaluates a request against the tenant's directives and built-in
    /// rules. The first matching `never_do` directive blocks the request
    /// outright; `notify_if` matches only raise the human gate.
    pub async fn evaluate(&self, request: &TaskRequest) -> HeraldResult<PolicyDecision> {
        let tenant = Self::resolve_tenant(request);
        let flattened = flatten_request(request);
        let directives = self.store.directives(&tenant).await?;

        let mut requires_human = false;
        let mut tags: Vec<String> = Vec::new();
        let mut reason = "Policy check passed".to_string();
        let mut allowed = true;

        for directive in &directives {
            if !flattened.contains(&directive.pattern) {
                continue;
            }
            match directive.kind {
                DirectiveKind::NeverDo => {
                    allowed = false;
                    requires_human = true;
                    reason = format!("Blocked by never_do directive '{}'", directive.pattern);
                    tags.push("directive:never_do".to_string());
                    debug!(tenant = %tenant, pattern = %directive.pattern, "Request blocked by directive");
                    break;
                }
                DirectiveKind::NotifyIf => {
                    requires_human = true;
                    tags.push("directive:notify_if".to_string());
                }
            }
        }

        if allowed {
            if request.intent.to_lowercase().starts_with("escalate") {
                requires_human = true;
                tags.push("escalation".to_string());
            }
            if request.metadata_str("priority") == Some("high") {
                tags.push("priority:high".to_string());
            }
            if requires_human {
                reason = "Requires human review before dispatch".to_string();
            }
        }

        tags.sort();
        tags.dedup();

        Ok(PolicyDecision {
            allowed,
            reason,
            requires_human,
            policy_version: Some(self.policy_version.clone()),
            tags,
        })
    }

    /// Diagnostics snapshot combining engine and store state.
    pub async fn summarize(&self) -> Map<String, Value> {
        let mut summary = self.store.summarize().await;
        summary.insert("policy_version".to_string(), json!(self.policy_version));
        summary
    }
}

/// Flattens a whole request (intent, channel, metadata, payload, recursing
/// through maps and lists) into one lowercase string for substring matching.
/// Feedback metadata is skipped: the text that defines a directive must not
/// trip the directive it just defined.
fn flatten_request(request: &TaskRequest) -> String {
    let mut parts = vec![request.intent.clone(), request.channel.clone()];
    if let Some(audience) = &request.audience {
        parts.extend(audience.recipients.iter().cloned());
        if let Some(segment) = &audience.segment_id {
            parts.push(segment.clone());
        }
    }
    for (key, value) in &request.metadata {
        if crate::capture::FEEDBACK_METADATA_KEYS.contains(&key.as_str()) {
            continue;
        }
        flatten_value(value, &mut parts);
    }
    for value in request.payload.values() {
        flatten_value(value, &mut parts);
    }
    parts.join(" ").to_lowercase()
}

fn flatten_value(value: &Value, parts: &mut Vec<String>) {
    match value {
        Value::String(s) => parts.push(s.clone()),
        Value::Array(items) => {
            for item in items {
                flatten_value(item, parts);
            }
        }
        Value::Object(map) => {
            for (key, nested) in map {
                parts.push(key.clone());
                flatten_value(nested, parts);
            }
        }
        Value::Null => {}
        other => parts.push(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryDirectiveStore;
    use serde_json::json;

    fn engine() -> PolicyEngine {
        PolicyEngine::new(Arc::new(InMemoryDirectiveStore::new()))
    }

    #[tokio::test]
    async fn test_clean_request_passes() {
        let decision = engine()
            .evaluate(&TaskRequest::new("send_update"))
            .await
            .unwrap();
        assert!(decision.allowed);
        assert!(!decision.requires_human);
        assert_eq!(decision.policy_version.as_deref(), Some("herald/v1"));
    }

    #[tokio::test]
    async fn test_never_do_round_trip_blocks() {
        let engine = engine();
        let feedback = TaskRequest::new("configure")
            .with_metadata("policy_feedback", json!("Never email the CEO."));
        let added = engine.capture(&feedback).await.unwrap();
        assert_eq!(added.len(), 1);

        let request =
            TaskRequest::new("send_update").with_payload("body", json!("please email the CEO now"));
        let decision = engine.evaluate(&request).await.unwrap();
        assert!(!decision.allowed);
        assert!(decision.requires_human);
        assert!(decision.reason.contains("email the ceo"));
    }

    #[tokio::test]
    async fn test_capture_is_idempotent() {
        let engine = engine();
        let feedback = TaskRequest::new("configure")
            .with_metadata("policy_feedback", json!("Never email the CEO."));
        let first = engine.capture(&feedback).await.unwrap();
        assert_eq!(first.len(), 1);
        let second = engine.capture(&feedback).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_notify_if_flags_without_blocking() {
        let engine = engine();
        let feedback = TaskRequest::new("configure")
            .with_metadata("policy_feedback", json!("tell me if anything urgent happens"));
        engine.capture(&feedback).await.unwrap();

        let request = TaskRequest::new("send_update")
            .with_payload("body", json!("this is anything urgent happens territory"));
        let decision = engine.evaluate(&request).await.unwrap();
        assert!(decision.allowed);
        assert!(decision.requires_human);
        assert!(decision.tags.contains(&"directive:notify_if".to_string()));
    }

    #[tokio::test]
    async fn test_escalate_intent_forces_human() {
        let decision = engine()
            .evaluate(&TaskRequest::new("escalate_billing_dispute"))
            .await
            .unwrap();
        assert!(decision.allowed);
        assert!(decision.requires_human);
        assert!(decision.tags.contains(&"escalation".to_string()));
    }

    #[tokio::test]
    async fn test_high_priority_tagged() {
        let request = TaskRequest::new("send_update").with_metadata("priority", json!("high"));
        let decision = engine().evaluate(&request).await.unwrap();
        assert!(decision.tags.contains(&"priority:high".to_string()));
    }

    #[tokio::test]
    async fn test_tags_sorted_and_deduplicated() {
        let request = TaskRequest::new("escalate_now").with_metadata("priority", json!("high"));
        let decision = engine().evaluate(&request).await.unwrap();
        let mut sorted = decision.tags.clone();
        sorted.sort();
        assert_eq!(decision.tags, sorted);
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let engine = engine();
        let feedback = TaskRequest::new("configure")
            .with_metadata("tenant_id", json!("acme"))
            .with_metadata("policy_feedback", json!("never send invoices"));
        engine.capture(&feedback).await.unwrap();

        // Different tenant is unaffected by acme's directive.
        let request = TaskRequest::new("send_update")
            .with_metadata("tenant_id", json!("globex"))
            .with_payload("body", json!("send invoices today"));
        let decision = engine.evaluate(&request).await.unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_directive_matches_nested_payload() {
        let engine = engine();
        let feedback = TaskRequest::new("configure")
            .with_metadata("policy_feedback", json!("never mention pricing"));
        engine.capture(&feedback).await.unwrap();

        let request = TaskRequest::new("send_update").with_payload(
            "variables",
            json!({"body": ["hello", "we should mention pricing here"]}),
        );
        let decision = engine.evaluate(&request).await.unwrap();
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn test_feedback_text_does_not_trip_its_own_directive() {
        let engine = engine();
        let feedback = TaskRequest::new("configure")
            .with_metadata("policy_feedback", json!("Never mention pricing."));
        engine.capture(&feedback).await.unwrap();

        // Evaluating the same feedback-carrying request stays allowed.
        let decision = engine.evaluate(&feedback).await.unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_summarize_includes_version() {
        let summary = engine().summarize().await;
        assert_eq!(summary["policy_version"], json!("herald/v1"));
    }
}
