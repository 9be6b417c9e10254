//! Core types and error definitions for the Herald orchestrator.
//!
//! This crate provides the foundational types shared across all Herald crates:
//! the unified error enum, the structured task request, the mutable per-run
//! state with its append-only audit trail, and the typed state delta that
//! workflow nodes emit.
//!
//! # Main types
//!
//! - [`HeraldError`] — Unified error enum for all Herald subsystems.
//! - [`HeraldResult`] — Convenience alias for `Result<T, HeraldError>`.
//! - [`TaskRequest`] — Immutable structured input for one orchestration run.
//! - [`RunState`] — Mutable per-run record accumulated across workflow nodes.
//! - [`StateDelta`] — Partial state update produced by a single node.
//! - [`ReviewFeedback`] — Categorized issue report produced by the sentinel.

/// Error type and result alias.
pub mod error;
/// Policy decisions and persisted directives.
pub mod policy;
/// Structured orchestration requests.
pub mod request;
/// Sentinel issues, review notes, and feedback.
pub mod review;
/// Per-run state, events, and the node update delta.
pub mod state;

pub use error::{HeraldError, HeraldResult};
pub use policy::{Directive, DirectiveKind, PolicyDecision};
pub use request::{Audience, TaskRequest};
pub use review::{
    IssueCategory, IssueSeverity, ReviewAction, ReviewFeedback, ReviewIssue, ReviewNotes,
};
pub use state::{
    ContextValidation, DispatchResult, MemorySnapshot, MemoryUpdate, PlanStep, RunEvent, RunState,
    RunStatus, StateDelta,
};
