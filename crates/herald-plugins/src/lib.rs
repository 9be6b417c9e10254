//! Dispatch plugins for the Herald orchestrator.
//!
//! A [`Plugin`] wraps an outbound connector (messaging, email, webhook).
//! Per-recipient delivery failures are reported in
//! [`DispatchResult::failed`](herald_core::DispatchResult); only a
//! transport-level problem (connector unreachable) surfaces as an `Err`,
//! which the engine routes through the execution-issue path.

/// Demo messaging plugin.
pub mod demo;
/// Plugin registry.
pub mod registry;

use async_trait::async_trait;
use herald_core::{DispatchResult, HeraldResult, TaskRequest};
use serde_json::{Map, Value};

pub use demo::DemoMessagingPlugin;
pub use registry::PluginRegistry;

/// Contract for outbound dispatch plugins.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Registry name of the plugin.
    fn name(&self) -> &str;

    /// Executes the dispatch for one request.
    async fn dispatch(
        &self,
        request: &TaskRequest,
        message_body: &str,
        context: Option<&Map<String, Value>>,
    ) -> HeraldResult<DispatchResult>;
}
