//! Static checks over a parsed program.
//!
//! Validation is pure: it never mutates the AST and never invokes a tool.
//! Problems are returned as [`Diagnostic`]s so callers can render every issue
//! at once.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;

use super::ast::{Argument, Condition, Expr, Program, Statement, StatementKind, Surface};
use super::lexer::Position;
use crate::runtime::tool::ToolSpec;

/// Variables every trigger can read without binding them first.
pub const WELL_KNOWN_VARIABLES: &[&str] = &["input", "result"];

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Blocks execution readiness.
    Error,
    /// Informational; the program still runs.
    Warning,
}

/// A line-anchored compile diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Error or warning.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// Source location, when known.
    pub position: Option<Position>,
}

impl Diagnostic {
    /// Build an error diagnostic.
    pub fn error(message: impl Into<String>, position: Option<Position>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            position,
        }
    }

    /// Build a warning diagnostic.
    pub fn warning(message: impl Into<String>, position: Option<Position>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            position,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.position {
            Some(position) => write!(f, "{}: {}", position, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Outcome of validating a program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// `true` when `errors` is empty.
    pub valid: bool,
    /// Blocking problems.
    pub errors: Vec<Diagnostic>,
    /// Non-blocking problems.
    pub warnings: Vec<Diagnostic>,
}

impl ValidationReport {
    /// Report built from parse errors.
    pub fn from_errors(errors: Vec<Diagnostic>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings: Vec::new(),
        }
    }

    /// Rendered error lines.
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    /// Rendered warning lines.
    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(ToString::to_string).collect()
    }

    fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.errors.push(diagnostic),
            Severity::Warning => self.warnings.push(diagnostic),
        }
    }
}

/// Validate a program against the tools that will be available at run time.
pub fn validate(program: &Program, tools: &[ToolSpec]) -> ValidationReport {
    let catalog: HashMap<&str, &ToolSpec> =
        tools.iter().map(|spec| (spec.name.as_str(), spec)).collect();
    Validator::new(Some(catalog)).run(program)
}

/// Syntax-only validation: binding and reference checks, no tool lookups.
pub fn validate_structure(program: &Program) -> ValidationReport {
    Validator::new(None).run(program)
}

#[derive(Default)]
struct BlockScope {
    names: HashSet<String>,
    captures: HashSet<String>,
}

struct Validator<'a> {
    tools: Option<HashMap<&'a str, &'a ToolSpec>>,
    scopes: Vec<BlockScope>,
    report: ValidationReport,
}

impl<'a> Validator<'a> {
    fn new(tools: Option<HashMap<&'a str, &'a ToolSpec>>) -> Self {
        Self {
            tools,
            scopes: Vec::new(),
            report: ValidationReport::default(),
        }
    }

    fn run(mut self, program: &Program) -> ValidationReport {
        if program.surface == Surface::Block {
            self.report.push(Diagnostic::warning(
                "the `bot ... end` block syntax is deprecated; use `@bot`/`@trigger` directives",
                program.triggers.first().map(|t| t.position),
            ));
        }

        for trigger in &program.triggers {
            if trigger.statements.is_empty() {
                self.report.push(Diagnostic::warning(
                    format!("trigger `{}` has no statements", trigger.event),
                    Some(trigger.position),
                ));
            }
            self.scopes.clear();
            self.check_block(&trigger.statements);
        }

        self.report.valid = self.report.errors.is_empty();
        self.report
    }

    fn check_block(&mut self, statements: &[Statement]) {
        self.scopes.push(BlockScope::default());
        for statement in statements {
            self.check_statement(statement);
        }
        self.scopes.pop();
    }

    fn check_statement(&mut self, statement: &Statement) {
        let position = Some(statement.position);
        match &statement.kind {
            StatementKind::Say { text } => self.check_references(text, position),
            StatementKind::Call {
                tool,
                args,
                binding,
                ..
            } => {
                self.check_tool(tool, args, position);
                for arg in args {
                    self.check_references(&arg.value, Some(arg.position));
                }
                if let Some(binding) = binding {
                    self.capture(binding, position);
                }
            }
            StatementKind::Assign { name, value } => {
                self.check_references(value, position);
                self.bind(name);
            }
            StatementKind::Conditional {
                condition,
                then_block,
                else_block,
            } => {
                self.check_condition(condition, position);
                self.check_block(then_block);
                if let Some(block) = else_block {
                    self.check_block(block);
                }
            }
        }
    }

    fn check_tool(&mut self, tool: &str, args: &[Argument], position: Option<Position>) {
        let mut seen = HashSet::new();
        for arg in args {
            if !seen.insert(arg.name.as_str()) {
                self.report.push(Diagnostic::error(
                    format!("argument `{}` supplied twice to `{}`", arg.name, tool),
                    Some(arg.position),
                ));
            }
        }

        let Some(tools) = &self.tools else {
            return;
        };
        let Some(spec) = tools.get(tool).copied() else {
            self.report.push(Diagnostic::error(
                format!("unknown tool `{}`", tool),
                position,
            ));
            return;
        };

        for required in spec.required_fields() {
            if !args.iter().any(|arg| arg.name == required) {
                self.report.push(Diagnostic::error(
                    format!("call to `{}` is missing required argument `{}`", tool, required),
                    position,
                ));
            }
        }

        for arg in args {
            if spec.declares_properties() && spec.property(&arg.name).is_none() {
                self.report.push(Diagnostic::warning(
                    format!("`{}` does not declare an argument named `{}`", tool, arg.name),
                    Some(arg.position),
                ));
                continue;
            }
            if let Some(expected) = spec.property_type(&arg.name) {
                if let Some(found) = static_type(&arg.value) {
                    if !type_matches(expected, found) {
                        self.report.push(Diagnostic::error(
                            format!(
                                "argument `{}` of `{}` expects {}, found {}",
                                arg.name, tool, expected, found
                            ),
                            Some(arg.position),
                        ));
                    }
                }
            }
        }

        if spec.deprecated {
            self.report.push(Diagnostic::warning(
                format!("tool `{}` is deprecated", tool),
                position,
            ));
        }
    }

    fn check_condition(&mut self, condition: &Condition, position: Option<Position>) {
        for operand in condition.operands() {
            self.check_references(operand, position);
        }
    }

    fn check_references(&mut self, expr: &Expr, position: Option<Position>) {
        for name in expr.variables() {
            if !self.is_bound(name) {
                self.report.push(Diagnostic::error(
                    format!("reference to unassigned variable `{}`", name),
                    position,
                ));
            }
        }
    }

    fn is_bound(&self, name: &str) -> bool {
        WELL_KNOWN_VARIABLES.contains(&name)
            || self.scopes.iter().any(|scope| scope.names.contains(name))
    }

    fn bind(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.names.insert(name.to_string());
        }
    }

    fn capture(&mut self, name: &str, position: Option<Position>) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        if !scope.captures.insert(name.to_string()) {
            self.report.push(Diagnostic::warning(
                format!("binding `{}` is captured more than once in this block; the last value wins", name),
                position,
            ));
        }
        scope.names.insert(name.to_string());
    }
}

/// JSON-schema type name of an expression when it is known without running it.
fn static_type(expr: &Expr) -> Option<&'static str> {
    match expr {
        Expr::Literal(Value::String(_)) | Expr::Concat(_) => Some("string"),
        Expr::Literal(Value::Number(n)) if n.is_i64() || n.is_u64() => Some("integer"),
        Expr::Literal(Value::Number(_)) => Some("number"),
        Expr::Literal(Value::Bool(_)) => Some("boolean"),
        _ => None,
    }
}

fn type_matches(expected: &str, found: &str) -> bool {
    match expected {
        "number" => found == "number" || found == "integer",
        "string" | "integer" | "boolean" => expected == found,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::parser::parse_source;
    use serde_json::json;

    fn program(src: &str) -> Program {
        parse_source(src).expect("parse")
    }

    fn slack() -> ToolSpec {
        ToolSpec::new("slack.sendMessage", "Post a message to Slack")
            .with_capability("slack")
            .with_schema(json!({
                "type": "object",
                "properties": {
                    "channel": {"type": "string"},
                    "text": {"type": "string"},
                    "retries": {"type": "integer"}
                },
                "required": ["channel", "text"]
            }))
    }

    #[test]
    fn unknown_tool_is_an_error_naming_the_tool() {
        let report = validate(&program("@bot B\n@trigger t\ncall unknown.tool()\n"), &[]);
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].message.contains("unknown.tool"));
        assert_eq!(report.errors[0].to_string(), "3:1: unknown tool `unknown.tool`");
    }

    #[test]
    fn missing_required_argument_is_an_error() {
        let src = "@bot B\n@trigger t\ncall slack.sendMessage(channel: \"x\")\n";
        let report = validate(&program(src), &[slack()]);
        assert!(!report.valid);
        assert!(report.errors[0].message.contains("`text`"));
    }

    #[test]
    fn literal_type_mismatch_is_an_error() {
        let src = "@bot B\n@trigger t\ncall slack.sendMessage(channel: 5, text: \"a\", retries: \"many\")\n";
        let report = validate(&program(src), &[slack()]);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].message.contains("expects string, found integer"));
        assert!(report.errors[1].message.contains("expects integer, found string"));
    }

    #[test]
    fn integer_arguments_reject_fractional_literals() {
        let call = |retries: &str| {
            format!(
                "@bot B\n@trigger t\ncall slack.sendMessage(channel: \"c\", text: \"t\", retries: {})\n",
                retries
            )
        };
        let report = validate(&program(&call("2.5")), &[slack()]);
        assert!(!report.valid);
        assert!(report.errors[0].message.contains("expects integer, found number"));

        assert!(validate(&program(&call("3")), &[slack()]).valid);
        assert!(validate(&program(&call("-1")), &[slack()]).valid);
    }

    #[test]
    fn number_arguments_accept_integer_literals() {
        let spec = ToolSpec::new("math.scale", "scale").with_schema(json!({
            "type": "object",
            "properties": {"factor": {"type": "number"}}
        }));
        let src = "@bot B\n@trigger t\ncall math.scale(factor: 2)\ncall math.scale(factor: 0.5)\n";
        assert!(validate(&program(src), &[spec]).valid);
    }

    #[test]
    fn undeclared_argument_is_a_warning() {
        let src = "@bot B\n@trigger t\ncall slack.sendMessage(channel: \"c\", text: \"t\", emoji: \"x\")\n";
        let report = validate(&program(src), &[slack()]);
        assert!(report.valid);
        assert!(report.warnings[0].message.contains("emoji"));
    }

    #[test]
    fn duplicate_binding_is_a_warning() {
        let src = "@bot B\n@trigger t\ncall slack.sendMessage(channel: \"c\", text: \"1\") as r\ncall slack.sendMessage(channel: \"c\", text: r.id) as r\n";
        let report = validate(&program(src), &[slack()]);
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].message.contains("`r`"));
    }

    #[test]
    fn unresolved_reference_is_an_error() {
        let src = "@bot B\n@trigger t\nsay greeting\nset greeting = \"hi\"\nsay greeting + input + result\n";
        let report = validate_structure(&program(src));
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].message.contains("`greeting`"));
    }

    #[test]
    fn branch_bindings_do_not_leak_out_of_their_block() {
        let src = "@bot B\n@trigger t\nif input\n  set x = 1\n  say x\nend\nsay x\n";
        let report = validate_structure(&program(src));
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].position.map(|p| p.line), Some(7));
    }

    #[test]
    fn outer_bindings_are_visible_inside_branches() {
        let src = "@bot B\n@trigger t\nset x = 1\nif x == 1\n  say x\nelse\n  say \"no\"\nend\n";
        assert!(validate_structure(&program(src)).valid);
    }

    #[test]
    fn structure_check_skips_tool_lookup() {
        let report = validate_structure(&program("@bot B\n@trigger t\ncall unknown.tool()\n"));
        assert!(report.valid);
    }

    #[test]
    fn deprecated_surface_and_tool_are_warnings() {
        let src = "bot \"Old\"\n  on input\n    call old.tool()\n  end\nend\n";
        let old = ToolSpec::new("old.tool", "legacy").deprecated();
        let report = validate(&program(src), &[old]);
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 2);
        assert!(report.warnings[0].message.contains("deprecated"));
    }
}
