use thiserror::Error;

/// Top-level error type for the Herald orchestrator.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, Error)]
pub enum HeraldError {
    /// An error from the workflow engine driver.
    #[error("Engine error: {0}")]
    Engine(String),

    /// An error from the policy engine or directive store.
    #[error("Policy error: {0}")]
    Policy(String),

    /// An error from the reasoning agent or its language-model backend.
    #[error("Reasoning error: {0}")]
    Reasoning(String),

    /// An error from the memory/context provider.
    #[error("Memory error: {0}")]
    Memory(String),

    /// An error raised by a dispatch plugin.
    #[error("Plugin error: {0}")]
    Plugin(String),

    /// An invalid run state or request (e.g. empty audience).
    #[error("State error: {0}")]
    State(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`HeraldError`].
pub type HeraldResult<T> = Result<T, HeraldError>;
