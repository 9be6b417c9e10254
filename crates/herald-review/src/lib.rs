//! Governance checks for the Herald orchestrator.
//!
//! The [`Sentinel`] inspects a run near the end of a pass and classifies
//! everything that went wrong into categorized, severity-ranked issues. The
//! [`ReviewAgent`] turns that feedback plus the remaining retry budget into a
//! single decision: retry the run or complete (possibly escalating to a
//! human).

/// Retry-vs-escalate decision logic.
pub mod agent;
/// Run-state inspection and issue classification.
pub mod sentinel;

pub use agent::ReviewAgent;
pub use sentinel::Sentinel;
