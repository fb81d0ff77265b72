//! HiveLang – a small DSL for defining bot behavior
//!
//! This crate implements the HiveLang pipeline:
//! - Lexing and recursive-descent parsing of `@bot` / `@trigger` sources
//! - Static validation against registered tool schemas
//! - Lowering to ordered, executable steps
//! - A bounded ReAct execution engine over a tool registry
//! - Run-scoped shared memory with swappable backends

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Lexer, parser, validator and compiler
pub mod interpreter;
/// Tool registry, execution engine and shared memory
pub mod runtime;

// Re-export key types for convenience
pub use interpreter::{CompileCache, CompiledProgram, ValidationReport, check, compile_source};
pub use runtime::{Engine, EngineConfig, HiveConfig, HiveError, Result, RunRequest, RunResult};

/// Current version of the HiveLang crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
