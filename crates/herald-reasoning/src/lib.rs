//! Reasoning support for the Herald orchestrator.
//!
//! The [`ReasoningAgent`] answers the questions the workflow engine cannot
//! answer mechanically: which workflow fits a request, what the plan looks
//! like, which plugin to use, what to actually send. Every operation has a
//! deterministic heuristic fallback so orchestration keeps working when no
//! [`LanguageModel`] is configured or the model call fails.

/// The reasoning agent and its decision types.
pub mod agent;
/// Language-model backend contract.
pub mod model;

pub use agent::{Interpretation, PluginChoice, ReasoningAgent, WorkflowDecision};
pub use model::LanguageModel;
