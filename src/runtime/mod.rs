//! Execution side of HiveLang
//!
//! Tools are registered into a [`ToolCatalog`] and frozen into a
//! [`ToolRegistry`]. The [`Engine`] runs free-form ReAct tasks and compiled
//! programs against that registry, giving every run its own
//! [`SharedMemory`] scope.

pub mod builtins;
pub mod config;
/// Per-run tool context and identity.
pub mod context;
pub mod decision;
pub mod engine;
pub mod error;
pub mod memory;
pub mod program;
pub mod registry;
pub mod tool;
/// Run traces and results.
pub mod trace;

pub use builtins::register_builtins;
pub use config::{HiveConfig, load_config, resolve_config, write_config};
pub use context::{RunMetadata, ToolContext};
pub use decision::{
    Action, CompletionClient, CompletionDecisionSource, Decision, DecisionSource,
    ReasoningRequest, ScriptedDecisions,
};
pub use engine::{Engine, EngineConfig, RunRequest};
pub use error::{
    EngineError, EngineResult, HiveError, MemoryError, MemoryResult, Result, ToolError,
    ToolResult,
};
pub use memory::{InMemoryBackend, MemoryBackend, RunId, SharedMemory};
pub use registry::{ToolCatalog, ToolRegistry};
pub use tool::{FnTool, Tool, ToolInput, ToolOutput, ToolSpec};
pub use trace::{ActionRecord, ReActStep, RunResult, RunStatus};
