use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::memory::{RunId, SharedMemory};
use crate::interpreter::value::ValueContext;

/// Identity of the run a tool is invoked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Bot executing the run.
    pub bot_id: String,
    /// Run identifier; also the shared-memory namespace.
    pub run_id: RunId,
    /// End user on whose behalf the run executes.
    pub user_id: Option<String>,
}

impl RunMetadata {
    /// Metadata with a fresh run id.
    pub fn new(bot_id: impl Into<String>) -> Self {
        Self {
            bot_id: bot_id.into(),
            run_id: uuid::Uuid::new_v4(),
            user_id: None,
        }
    }

    /// Attach a user id.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Context passed by reference into every tool invocation of one run.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Run identity.
    pub metadata: RunMetadata,
    /// Run-scoped shared memory.
    pub memory: SharedMemory,
}

impl ToolContext {
    /// Build a context; the memory handle must be scoped to `metadata.run_id`.
    pub fn new(metadata: RunMetadata, memory: SharedMemory) -> Self {
        debug_assert_eq!(metadata.run_id, memory.run_id());
        Self { metadata, memory }
    }

    /// Context backed by a fresh in-memory scope.
    pub fn ephemeral(bot_id: impl Into<String>) -> Self {
        let memory = SharedMemory::ephemeral();
        let metadata = RunMetadata {
            bot_id: bot_id.into(),
            run_id: memory.run_id(),
            user_id: None,
        };
        Self { metadata, memory }
    }
}

impl ValueContext for ToolContext {
    fn lookup(&self, name: &str) -> Option<Value> {
        match self.memory.get(name) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(run = %self.metadata.run_id, key = name, "memory read failed: {}", err);
                None
            }
        }
    }
}
