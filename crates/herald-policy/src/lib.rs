//! Policy enforcement for the Herald orchestrator.
//!
//! Two responsibilities:
//!
//! 1. **Capture** — scan free-text fields on an incoming request for phrases
//!    like "never email the CEO" or "tell me if anything urgent arrives" and
//!    persist them as tenant-scoped [`Directive`](herald_core::Directive)s.
//! 2. **Evaluate** — flatten a request into searchable text and match it
//!    against the tenant's stored directives plus a small set of built-in
//!    rules, producing a [`PolicyDecision`](herald_core::PolicyDecision).
//!
//! Directive persistence is behind the [`DirectiveStore`] trait so real
//! deployments can swap in a database-backed store.

/// Directive extraction from request free text.
pub mod capture;
/// Request evaluation against stored directives.
pub mod engine;
/// Directive persistence contract and in-memory reference store.
pub mod store;

pub use capture::FeedbackCapture;
pub use engine::PolicyEngine;
pub use store::{DirectiveStore, InMemoryDirectiveStore};
