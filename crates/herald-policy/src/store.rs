use async_trait::async_trait;
use herald_core::{Directive, HeraldResult};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Persistence contract for tenant-scoped policy directives.
///
/// Implementations must deduplicate: storing the same kind+pattern twice for
/// one tenant keeps a single copy, and `add_directives` reports only the
/// directives that were actually new.
#[async_trait]
pub trait DirectiveStore: Send + Sync {
    /// Returns all directives for a tenant, in insertion order.
    async fn directives(&self, tenant_id: &str) -> HeraldResult<Vec<Directive>>;

    /// Stores new directives for a tenant, skipping duplicates. Returns the
    /// directives that were actually added.
    async fn add_directives(
        &self,
        tenant_id: &str,
        directives: Vec<Directive>,
    ) -> HeraldResult<Vec<Directive>>;

    /// Diagnostics snapshot (tenant and directive counts).
    async fn summarize(&self) -> Map<String, Value>;
}

/// In-memory [`DirectiveStore`] keeping per-tenant insertion order.
#[derive(Default)]
pub struct InMemoryDirectiveStore {
    tenants: RwLock<HashMap<String, Vec<Directive>>>,
}

impl InMemoryDirectiveStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DirectiveStore for InMemoryDirectiveStore {
    async fn directives(&self, tenant_id: &str) -> HeraldResult<Vec<Directive>> {
        let tenants = self.tenants.read().await;
        Ok(tenants.get(tenant_id).cloned().unwrap_or_default())
    }

    async fn add_directives(
        &self,
        tenant_id: &str,
        directives: Vec<Directive>,
    ) -> HeraldResult<Vec<Directive>> {
        let mut tenants = self.tenants.write().await;
        let existing = tenants.entry(tenant_id.to_string()).or_default();
        let mut added = Vec::new();
        for directive in directives {
            if existing.contains(&directive) || added.contains(&directive) {
                continue;
            }
            debug!(
                tenant = tenant_id,
                kind = %directive.kind,
                pattern = %directive.pattern,
                "Stored policy directive"
            );
            existing.push(directive.clone());
            added.push(directive);
        }
        Ok(added)
    }

    async fn summarize(&self) -> Map<String, Value> {
        let tenants = self.tenants.read().await;
        let total: usize = tenants.values().map(Vec::len).sum();
        let mut summary = Map::new();
        summary.insert("tenants".to_string(), json!(tenants.len()));
        summary.insert("directives".to_string(), json!(total));
        summary
    }
}
