use async_trait::async_trait;
use herald_core::{HeraldResult, RunState};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Snapshot store keyed by thread id.
///
/// The engine writes a checkpoint after every node, so the stored state is
/// always the latest merged view of the run. Two thread ids never interact.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Returns the latest snapshot for the thread, if one exists.
    async fn get(&self, thread_id: &str) -> HeraldResult<Option<RunState>>;

    /// Stores the latest snapshot for the thread, replacing any prior one.
    async fn put(&self, thread_id: &str, state: &RunState) -> HeraldResult<()>;
}

/// Reference checkpoint store backed by a map behind an async lock.
#[derive(Default)]
pub struct InMemoryCheckpointer {
    snapshots: RwLock<HashMap<String, RunState>>,
}

impl InMemoryCheckpointer {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of threads with a stored snapshot.
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    /// Whether no snapshots are stored.
    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn get(&self, thread_id: &str) -> HeraldResult<Option<RunState>> {
        Ok(self.snapshots.read().await.get(thread_id).cloned())
    }

    async fn put(&self, thread_id: &str, state: &RunState) -> HeraldResult<()> {
        self.snapshots
            .write()
            .await
            .insert(thread_id.to_string(), state.clone());
        Ok(())
    }
}
