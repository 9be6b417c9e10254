use crate::Plugin;
use async_trait::async_trait;
use herald_core::{DispatchResult, HeraldResult, TaskRequest};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::info;

/// Demo plugin that simulates outbound messaging.
///
/// Drop-in placeholder until real channel integrations are wired in. Sleeps
/// briefly to mimic network latency and records a preview of the dispatched
/// message in the result metadata.
pub struct DemoMessagingPlugin;

impl DemoMessagingPlugin {
    /// Creates the demo plugin.
    pub fn new() -> Self {
        Self
    }

    fn recipients(request: &TaskRequest) -> Vec<String> {
        if let Some(audience) = &request.audience {
            return audience.recipients.clone();
        }
        let fallback = request
            .payload
            .get("recipient")
            .and_then(Value::as_str)
            .unwrap_or("demo@local");
        vec![fallback.to_string()]
    }
}

impl Default for DemoMessagingPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for DemoMessagingPlugin {
    fn name(&self) -> &str {
        "demo-messaging"
    }

    async fn dispatch(
        &self,
        request: &TaskRequest,
        message_body: &str,
        context: Option<&Map<String, Value>>,
    ) -> HeraldResult<DispatchResult> {
        // Simulate connector latency.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let recipients = Self::recipients(request);
        info!(
            recipients = recipients.len(),
            intent = %request.intent,
            "Demo plugin dispatched message"
        );

        let preview: String = message_body.chars().take(120).collect();
        let mut metadata = Map::new();
        metadata.insert("preview".to_string(), json!(preview));
        metadata.insert("intent".to_string(), json!(request.intent));
        if let Some(context) = context {
            metadata.insert("tool_context".to_string(), Value::Object(context.clone()));
        }

        Ok(DispatchResult {
            plugin_name: self.name().to_string(),
            dispatched_count: recipients.len(),
            failed: Vec::new(),
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::Audience;

    #[tokio::test]
    async fn test_dispatch_to_audience() {
        let plugin = DemoMessagingPlugin::new();
        let request = TaskRequest::new("send_update").with_audience(
            Audience::new(vec!["a@x.com".to_string(), "b@x.com".to_string()]).unwrap(),
        );
        let result = plugin.dispatch(&request, "hello", None).await.unwrap();
        assert_eq!(result.dispatched_count, 2);
        assert!(result.failed.is_empty());
        assert_eq!(result.metadata["preview"], json!("hello"));
    }

    #[tokio::test]
    async fn test_dispatch_without_audience_uses_fallback() {
        let plugin = DemoMessagingPlugin::new();
        let request = TaskRequest::new("send_update");
        let result = plugin.dispatch(&request, "hi", None).await.unwrap();
        assert_eq!(result.dispatched_count, 1);
    }

    #[tokio::test]
    async fn test_preview_truncated() {
        let plugin = DemoMessagingPlugin::new();
        let request = TaskRequest::new("send_update");
        let long = "x".repeat(500);
        let result = plugin.dispatch(&request, &long, None).await.unwrap();
        let preview = result.metadata["preview"].as_str().unwrap();
        assert_eq!(preview.len(), 120);
    }
}
