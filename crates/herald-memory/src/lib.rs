//! Memory/context retrieval for the Herald orchestrator.
//!
//! The workflow engine consumes memory through the [`MemoryProvider`] trait;
//! real deployments back it with a graph store or vector database. The
//! bundled [`DemoMemory`] simulates retrieval so the pipeline runs end to end
//! without external services.

use async_trait::async_trait;
use herald_core::{
    ContextValidation, DispatchResult, HeraldResult, MemorySnapshot, MemoryUpdate, TaskRequest,
};
use serde_json::json;
use tracing::info;

/// Contract for the memory/context layer.
///
/// Retrieval failures are recoverable: the engine degrades to an empty
/// snapshot and lets the sentinel flag the low-context condition. Commit
/// failures are logged and never fail a run.
#[async_trait]
pub trait MemoryProvider: Send + Sync {
    /// Short provider name, used in working notes.
    fn provider_name(&self) -> &str;

    /// Retrieves context relevant to the request.
    async fn retrieve_context(&self, request: &TaskRequest) -> HeraldResult<MemorySnapshot>;

    /// Judges whether a snapshot is relevant to the given intent.
    fn validate_relevance(&self, snapshot: &MemorySnapshot, intent: &str) -> ContextValidation;

    /// Prepares the memory writes for a finished run.
    fn prepare_updates(
        &self,
        request: &TaskRequest,
        plugin_result: Option<&DispatchResult>,
        reflection: &str,
    ) -> Vec<MemoryUpdate>;

    /// Commits prepared updates. Best-effort.
    async fn commit_updates(
        &self,
        request: &TaskRequest,
        updates: &[MemoryUpdate],
    ) -> HeraldResult<()>;
}

/// Demo provider returning canned snippets; stands in for a real memory
/// backend during development and tests.
#[derive(Default)]
pub struct DemoMemory;

impl DemoMemory {
    /// Creates the demo provider.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MemoryProvider for DemoMemory {
    fn provider_name(&self) -> &str {
        "demo"
    }

    async fn retrieve_context(&self, request: &TaskRequest) -> HeraldResult<MemorySnapshot> {
        Ok(MemorySnapshot {
            memory_snippets: vec![
                "[demo] No persistent memory connected yet.".to_string(),
                format!("[demo] Last intent observed: {}", request.intent),
            ],
            graph_relations: vec!["[demo] Placeholder relationship graph node".to_string()],
            vector_results: vec!["[demo] Vector search results not available.".to_string()],
            freshness_seconds: 5,
        })
    }

    fn validate_relevance(&self, snapshot: &MemorySnapshot, intent: &str) -> ContextValidation {
        let needle = intent.to_lowercase();
        let relevant = snapshot
            .memory_snippets
            .iter()
            .any(|snippet| snippet.to_lowercase().contains(&needle));
        ContextValidation {
            relevant,
            summary: if relevant {
                "Relevant snippets present".to_string()
            } else {
                "No matched snippets".to_string()
            },
        }
    }

    fn prepare_updates(
        &self,
        request: &TaskRequest,
        plugin_result: Option<&DispatchResult>,
        reflection: &str,
    ) -> Vec<MemoryUpdate> {
        let summary = if reflection.is_empty() {
            format!("Request {} completed", request.intent)
        } else {
            reflection.to_string()
        };
        let mut annotations = serde_json::Map::new();
        annotations.insert("intent".to_string(), json!(request.intent));
        if let Some(result) = plugin_result {
            annotations.insert("plugin".to_string(), json!(result.plugin_name));
            annotations.insert(
                "dispatch_count".to_string(),
                json!(result.dispatched_count),
            );
        }
        let tokens_used = summary.split_whitespace().count() as u64;
        vec![MemoryUpdate {
            summary,
            annotations,
            tokens_used,
        }]
    }

    async fn commit_updates(
        &self,
        request: &TaskRequest,
        updates: &[MemoryUpdate],
    ) -> HeraldResult<()> {
        info!(
            request_id = %request.request_id,
            entries = updates.len(),
            "Demo memory commit (no-op)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demo_snapshot_mentions_intent() {
        let memory = DemoMemory::new();
        let request = TaskRequest::new("send_update");
        let snapshot = memory.retrieve_context(&request).await.unwrap();
        assert_eq!(snapshot.memory_snippets.len(), 2);
        assert!(snapshot.memory_snippets[1].contains("send_update"));
    }

    #[tokio::test]
    async fn test_validation_matches_intent_substring() {
        let memory = DemoMemory::new();
        let request = TaskRequest::new("send_update");
        let snapshot = memory.retrieve_context(&request).await.unwrap();
        let validation = memory.validate_relevance(&snapshot, "send_update");
        assert!(validation.relevant);

        let validation = memory.validate_relevance(&snapshot, "unrelated_topic");
        assert!(!validation.relevant);
        assert_eq!(validation.summary, "No matched snippets");
    }

    #[test]
    fn test_prepare_updates_annotates_dispatch() {
        let memory = DemoMemory::new();
        let request = TaskRequest::new("send_update");
        let result = DispatchResult {
            plugin_name: "demo-messaging".to_string(),
            dispatched_count: 3,
            failed: vec![],
            metadata: serde_json::Map::new(),
        };
        let updates = memory.prepare_updates(&request, Some(&result), "two words");
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].annotations["plugin"], json!("demo-messaging"));
        assert_eq!(updates[0].tokens_used, 2);
    }

    #[test]
    fn test_prepare_updates_fallback_summary() {
        let memory = DemoMemory::new();
        let request = TaskRequest::new("send_update");
        let updates = memory.prepare_updates(&request, None, "");
        assert!(updates[0].summary.contains("send_update"));
    }
}
