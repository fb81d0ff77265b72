//! Lowering from the AST to executable steps, plus the compile surface used
//! by hosting applications.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::ast::{Program, Statement, StatementKind};
use super::ir::{CompiledProgram, CompiledTrigger, Step, StepPayload};
use super::parser::{ParseError, parse_source};
use super::validator::{Diagnostic, ValidationReport, validate, validate_structure};
use crate::runtime::tool::ToolSpec;

/// Lower a parsed program into steps. One step per statement, in order.
pub fn compile(program: &Program) -> CompiledProgram {
    CompiledProgram {
        name: program.bot_name.clone(),
        description: program.description.clone(),
        model: program.model.clone(),
        capabilities: program.capabilities.clone(),
        triggers: program
            .triggers
            .iter()
            .map(|trigger| CompiledTrigger {
                event: trigger.event.clone(),
                steps: lower_block(&trigger.statements),
            })
            .collect(),
    }
}

fn lower_block(statements: &[Statement]) -> Vec<Step> {
    statements.iter().map(lower_statement).collect()
}

fn lower_statement(statement: &Statement) -> Step {
    let payload = match &statement.kind {
        StatementKind::Say { text } => StepPayload::Say { text: text.clone() },
        StatementKind::Call {
            tool,
            args,
            binding,
            reply,
        } => StepPayload::ToolCall {
            tool: tool.clone(),
            args: args
                .iter()
                .map(|arg| (arg.name.clone(), arg.value.clone()))
                .collect(),
            binding: binding.clone(),
            reply: *reply,
        },
        StatementKind::Assign { name, value } => StepPayload::Assign {
            name: name.clone(),
            value: value.clone(),
        },
        StatementKind::Conditional {
            condition,
            then_block,
            else_block,
        } => StepPayload::Branch {
            condition: condition.clone(),
            then_steps: lower_block(then_block),
            else_steps: else_block.as_deref().map(lower_block).unwrap_or_default(),
        },
    };

    Step {
        payload,
        position: statement.position,
    }
}

fn parse_diagnostics(errors: Vec<ParseError>) -> ValidationReport {
    ValidationReport::from_errors(
        errors
            .into_iter()
            .map(|error| Diagnostic::error(error.message, Some(error.position)))
            .collect(),
    )
}

/// Check source text. With `tools == None` only syntax, bindings and
/// references are checked; otherwise tool calls are checked too.
pub fn check(source: &str, tools: Option<&[ToolSpec]>) -> ValidationReport {
    match parse_source(source) {
        Ok(program) => match tools {
            Some(tools) => validate(&program, tools),
            None => validate_structure(&program),
        },
        Err(errors) => parse_diagnostics(errors),
    }
}

/// Parse, validate and compile source text. Warnings do not block
/// compilation; any error returns the full report.
pub fn compile_source(
    source: &str,
    tools: Option<&[ToolSpec]>,
) -> Result<CompiledProgram, ValidationReport> {
    let program = parse_source(source).map_err(parse_diagnostics)?;
    let report = match tools {
        Some(tools) => validate(&program, tools),
        None => validate_structure(&program),
    };
    if !report.valid {
        return Err(report);
    }
    for warning in &report.warnings {
        tracing::debug!(bot = %program.bot_name, "{}", warning);
    }
    Ok(compile(&program))
}

/// Memoizes compiled programs by the blake3 hash of their source.
///
/// Entries are validated against the tool set supplied at construction.
#[derive(Default)]
pub struct CompileCache {
    tools: Option<Vec<ToolSpec>>,
    entries: RwLock<HashMap<blake3::Hash, Arc<CompiledProgram>>>,
}

impl CompileCache {
    /// Cache that validates against `tools` (`None` for syntax-only checks).
    pub fn new(tools: Option<Vec<ToolSpec>>) -> Self {
        Self {
            tools,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Compile `source`, reusing an earlier result for identical text.
    pub fn get_or_compile(&self, source: &str) -> Result<Arc<CompiledProgram>, ValidationReport> {
        let key = blake3::hash(source.as_bytes());
        if let Some(hit) = self.entries.read().get(&key) {
            tracing::trace!(hash = %key, "compile cache hit");
            return Ok(hit.clone());
        }

        let compiled = Arc::new(compile_source(source, self.tools.as_deref())?);
        self.entries.write().insert(key, compiled.clone());
        tracing::debug!(hash = %key, bot = %compiled.name, "compiled program cached");
        Ok(compiled)
    }

    /// Number of cached programs.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every cached program.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
