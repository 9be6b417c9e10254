//! Workflow state machine for the Herald orchestrator.
//!
//! A run moves through a fixed node graph — intake, routing, policy, context,
//! planning, reflection, plugin selection/dispatch, review — with two
//! conditional edges: dispatch is skipped when no plugin was selected, and
//! the review agent may loop the run back to routing for a bounded, informed
//! retry. The driver merges each node's typed delta into the shared
//! [`RunState`](herald_core::RunState), checkpoints after every node, and
//! serializes execution per thread id.
//!
//! # Main types
//!
//! - [`WorkflowEngine`] — the driver; owns the collaborators and runs the graph.
//! - [`Node`] / [`Transition`] — the graph and its enum-keyed transition table.
//! - [`Checkpointer`] — thread-id-keyed snapshot store; [`InMemoryCheckpointer`]
//!   is the bundled reference implementation.
//! - [`EngineConfig`] — retry budget and advisory concurrency hint.

/// Checkpoint store trait and in-memory implementation.
pub mod checkpoint;
/// Driver loop, node bodies, and engine configuration.
pub mod engine;
/// Node enum and transition table.
pub mod graph;

pub use checkpoint::{Checkpointer, InMemoryCheckpointer};
pub use engine::{EngineConfig, PolicyOutcome, WorkflowEngine};
pub use graph::{Node, Transition};
