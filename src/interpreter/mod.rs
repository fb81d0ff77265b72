//! HiveLang front end.
//!
//! Source text flows through [`lexer`], [`parser`], [`validator`] and
//! [`compiler`] to produce a [`CompiledProgram`]: per-trigger step lists that
//! the execution engine in [`crate::runtime`] runs against a tool registry and
//! shared memory.

/// Abstract syntax tree definitions.
pub mod ast;
/// Lowering from AST to steps and the compile surface.
pub mod compiler;
/// Compiled step representation.
pub mod ir;
/// Tokenizer.
pub mod lexer;
/// Recursive-descent parser.
pub mod parser;
/// Static program checks.
pub mod validator;
/// Run-time expression evaluation.
pub mod value;

pub use ast::{Argument, Condition, Expr, Program, Statement, StatementKind, Surface, TriggerBlock};
pub use compiler::{CompileCache, check, compile, compile_source};
pub use ir::{CompiledProgram, CompiledTrigger, Step, StepKind, StepPayload};
pub use lexer::{Position, Token, TokenKind, tokenize};
pub use parser::{ParseError, parse, parse_source};
pub use validator::{
    Diagnostic, Severity, ValidationReport, WELL_KNOWN_VARIABLES, validate, validate_structure,
};
pub use value::{ValueContext, evaluate, evaluate_condition, is_truthy, render};
