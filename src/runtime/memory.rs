//! Run-scoped shared memory.
//!
//! Every key lives inside a run id namespace, so concurrent runs never observe
//! each other's writes. Backends are swappable behind [`MemoryBackend`]; the
//! in-process [`InMemoryBackend`] is the default.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use super::error::MemoryResult;

/// Identifier of one run.
pub type RunId = Uuid;

/// Storage contract for shared memory.
pub trait MemoryBackend: Send + Sync {
    /// Read a value.
    fn get(&self, run: RunId, key: &str) -> MemoryResult<Option<Value>>;
    /// Overwrite a value.
    fn set(&self, run: RunId, key: &str, value: Value) -> MemoryResult<()>;
    /// Accumulate into a list (see [`append_value`]).
    fn append(&self, run: RunId, key: &str, value: Value) -> MemoryResult<()>;
    /// All keys written in a run, sorted.
    fn keys(&self, run: RunId) -> MemoryResult<Vec<String>>;
    /// Drop every key of a run.
    fn clear(&self, run: RunId) -> MemoryResult<()>;
}

/// List-accumulation policy shared by all backends: a missing key becomes a
/// one-element array, an array grows, and any other value is wrapped into a
/// two-element array with the new value.
pub fn append_value(existing: Option<Value>, value: Value) -> Value {
    match existing {
        None => Value::Array(vec![value]),
        Some(Value::Array(mut items)) => {
            items.push(value);
            Value::Array(items)
        }
        Some(other) => Value::Array(vec![other, value]),
    }
}

/// Process-local backend.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    runs: RwLock<HashMap<RunId, BTreeMap<String, Value>>>,
}

impl InMemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of runs with at least one key.
    pub fn run_count(&self) -> usize {
        self.runs.read().len()
    }
}

impl MemoryBackend for InMemoryBackend {
    fn get(&self, run: RunId, key: &str) -> MemoryResult<Option<Value>> {
        Ok(self
            .runs
            .read()
            .get(&run)
            .and_then(|scope| scope.get(key))
            .cloned())
    }

    fn set(&self, run: RunId, key: &str, value: Value) -> MemoryResult<()> {
        self.runs
            .write()
            .entry(run)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn append(&self, run: RunId, key: &str, value: Value) -> MemoryResult<()> {
        let mut runs = self.runs.write();
        let scope = runs.entry(run).or_default();
        let existing = scope.remove(key);
        scope.insert(key.to_string(), append_value(existing, value));
        Ok(())
    }

    fn keys(&self, run: RunId) -> MemoryResult<Vec<String>> {
        Ok(self
            .runs
            .read()
            .get(&run)
            .map(|scope| scope.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn clear(&self, run: RunId) -> MemoryResult<()> {
        self.runs.write().remove(&run);
        Ok(())
    }
}

/// Handle to one run's memory scope.
#[derive(Clone)]
pub struct SharedMemory {
    run: RunId,
    backend: Arc<dyn MemoryBackend>,
}

impl SharedMemory {
    /// Scope `backend` to `run`.
    pub fn new(run: RunId, backend: Arc<dyn MemoryBackend>) -> Self {
        Self { run, backend }
    }

    /// Fresh in-memory scope, mostly useful in tests.
    pub fn ephemeral() -> Self {
        Self::new(Uuid::new_v4(), Arc::new(InMemoryBackend::new()))
    }

    /// Run id this handle is scoped to.
    pub fn run_id(&self) -> RunId {
        self.run
    }

    /// Read a value.
    pub fn get(&self, key: &str) -> MemoryResult<Option<Value>> {
        self.backend.get(self.run, key)
    }

    /// Overwrite a value.
    pub fn set(&self, key: &str, value: Value) -> MemoryResult<()> {
        self.backend.set(self.run, key, value)
    }

    /// Accumulate a value into a list.
    pub fn append(&self, key: &str, value: Value) -> MemoryResult<()> {
        self.backend.append(self.run, key, value)
    }

    /// Keys written so far.
    pub fn keys(&self) -> MemoryResult<Vec<String>> {
        self.backend.keys(self.run)
    }

    /// Snapshot of the whole scope.
    pub fn snapshot(&self) -> MemoryResult<BTreeMap<String, Value>> {
        let mut out = BTreeMap::new();
        for key in self.keys()? {
            if let Some(value) = self.get(&key)? {
                out.insert(key, value);
            }
        }
        Ok(out)
    }

    /// Drop the scope.
    pub fn clear(&self) -> MemoryResult<()> {
        self.backend.clear(self.run)
    }
}

impl std::fmt::Debug for SharedMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMemory").field("run", &self.run).finish()
    }
}
