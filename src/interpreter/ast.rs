use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::lexer::Position;

/// Expression nodes. Expressions are kept as trees and evaluated at run time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Expr {
    /// String, number or boolean literal.
    Literal(Value),
    /// Reference to a binding (`as` capture, `set`, or a well-known input).
    Variable(String),
    /// `a + b + ...`, rendered as text and joined.
    Concat(Vec<Expr>),
    /// `base.field`.
    Field {
        /// Expression whose value is indexed.
        base: Box<Expr>,
        /// Field name.
        field: String,
    },
}

impl Expr {
    /// Visit every variable referenced by this expression.
    pub fn variables(&self) -> Vec<&str> {
        match self {
            Expr::Literal(_) => Vec::new(),
            Expr::Variable(name) => vec![name.as_str()],
            Expr::Concat(parts) => parts.iter().flat_map(Expr::variables).collect(),
            Expr::Field { base, .. } => base.variables(),
        }
    }
}

/// Conditions guarding `if` blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Holds when the value is truthy (non-empty, non-zero, not false/null).
    Truthy {
        /// Tested expression.
        expr: Expr,
    },
    /// `left == right`
    Equals {
        /// Left operand.
        left: Expr,
        /// Right operand.
        right: Expr,
    },
    /// `left != right`
    NotEquals {
        /// Left operand.
        left: Expr,
        /// Right operand.
        right: Expr,
    },
    /// `left contains right` (substring or array membership).
    Contains {
        /// Haystack.
        left: Expr,
        /// Needle.
        right: Expr,
    },
    /// `not <condition>`
    Not {
        /// Negated condition.
        inner: Box<Condition>,
    },
}

impl Condition {
    /// Every expression operand of the condition.
    pub fn operands(&self) -> Vec<&Expr> {
        match self {
            Condition::Truthy { expr } => vec![expr],
            Condition::Equals { left, right }
            | Condition::NotEquals { left, right }
            | Condition::Contains { left, right } => vec![left, right],
            Condition::Not { inner } => inner.operands(),
        }
    }
}

/// A named call argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    /// Argument name.
    pub name: String,
    /// Argument value expression.
    pub value: Expr,
    /// Where the argument name appears.
    pub position: Position,
}

/// Statement variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatementKind {
    /// Emit text to the reply.
    Say {
        /// Text expression.
        text: Expr,
    },
    /// Invoke a registered tool.
    Call {
        /// Namespaced tool name, e.g. `slack.sendMessage`.
        tool: String,
        /// Named arguments in source order.
        args: Vec<Argument>,
        /// Optional `as` capture.
        binding: Option<String>,
        /// Whether the tool output is appended to the reply (`respond with`).
        reply: bool,
    },
    /// `set name = expr`
    Assign {
        /// Binding name.
        name: String,
        /// Assigned expression.
        value: Expr,
    },
    /// `if ... else ... end`
    Conditional {
        /// Guard.
        condition: Condition,
        /// Statements executed when the guard holds.
        then_block: Vec<Statement>,
        /// Statements executed otherwise.
        else_block: Option<Vec<Statement>>,
    },
}

/// A statement with its source location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Statement payload.
    pub kind: StatementKind,
    /// Position of the statement's first token.
    pub position: Position,
}

impl Statement {
    /// Number of statements including nested ones.
    pub fn count(&self) -> usize {
        match &self.kind {
            StatementKind::Conditional {
                then_block,
                else_block,
                ..
            } => {
                1 + then_block.iter().map(Statement::count).sum::<usize>()
                    + else_block
                        .iter()
                        .flatten()
                        .map(Statement::count)
                        .sum::<usize>()
            }
            _ => 1,
        }
    }
}

/// A trigger and the statements it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerBlock {
    /// Event name (`on_message`, `input`, ...).
    pub event: String,
    /// Statements in source order.
    pub statements: Vec<Statement>,
    /// Position of the trigger header.
    pub position: Position,
}

/// Which surface grammar a program was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    /// Canonical `@bot` / `@trigger` directive style.
    #[default]
    Directive,
    /// Deprecated `bot "Name" ... on input ... end` block style.
    Block,
}

/// Parsed HiveLang program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Bot name from `@bot`.
    pub bot_name: String,
    /// `@description` text.
    pub description: Option<String>,
    /// `@model` name.
    pub model: Option<String>,
    /// Accumulated `@capability` names.
    pub capabilities: Vec<String>,
    /// Trigger blocks in source order.
    pub triggers: Vec<TriggerBlock>,
    /// Grammar variant used by the source.
    pub surface: Surface,
}

impl Program {
    /// Total number of statements across all triggers (nested included).
    pub fn statement_count(&self) -> usize {
        self.triggers
            .iter()
            .flat_map(|trigger| trigger.statements.iter())
            .map(Statement::count)
            .sum()
    }

    /// Find the first trigger handling `event`.
    pub fn trigger(&self, event: &str) -> Option<&TriggerBlock> {
        self.triggers.iter().find(|trigger| trigger.event == event)
    }
}
