//! Error types for the HiveLang runtime
//!
//! Domain errors use thiserror. Tool errors never escape a run: the engine
//! turns them into observations. Only [`EngineError`] ends a run early.

use std::time::Duration;
use thiserror::Error;

/// Top-level error for embedding applications
#[derive(Debug, Error)]
pub enum HiveError {
    /// Source failed to compile; the rendered diagnostics are included
    #[error("Compilation failed: {}", .0.join("; "))]
    Compile(Vec<String>),

    /// Engine-level failure
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Tool failure outside of a run
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// Memory backend failure
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failures raised while invoking a tool
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    /// No tool registered under this name
    #[error("Unknown tool '{0}'")]
    NotFound(String),

    /// The tool requires an authenticated user and the run has none
    #[error("Tool '{0}' requires an authenticated user")]
    Unauthorized(String),

    /// Input rejected by the tool's schema
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The tool did not finish within the per-step budget
    #[error("Tool '{tool}' timed out after {}ms", .elapsed.as_millis())]
    Timeout {
        /// Tool name
        tool: String,
        /// Time budget that was exceeded
        elapsed: Duration,
    },

    /// The tool ran and failed
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Shared memory access failed inside the tool
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
}

/// Convenience result alias for tool operations
pub type ToolResult<T> = std::result::Result<T, ToolError>;

/// Failures of a shared-memory backend
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MemoryError {
    /// Backing store unavailable
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Stored value could not be encoded or decoded
    #[error("Invalid value for key '{key}': {detail}")]
    InvalidValue {
        /// Memory key
        key: String,
        /// Description of the problem
        detail: String,
    },
}

/// Convenience result alias for memory operations
pub type MemoryResult<T> = std::result::Result<T, MemoryError>;

/// Errors outside the ReAct loop's control
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The decision source could not produce a decision
    #[error("Decision source failed: {0}")]
    Decision(String),

    /// The program has no trigger for the requested event
    #[error("No trigger handles event '{0}'")]
    UnknownTrigger(String),

    /// Shared memory failed while recording an observation
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
}

/// Convenience result alias for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Result type using HiveError
pub type Result<T> = std::result::Result<T, HiveError>;
