use serde::{Deserialize, Serialize};
use std::fmt;

use super::ast::{Condition, Expr};
use super::lexer::Position;

/// Compiled, executable program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledProgram {
    /// Bot name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Preferred model, passed through to the decision source.
    pub model: Option<String>,
    /// Declared capabilities.
    pub capabilities: Vec<String>,
    /// Compiled triggers in source order.
    pub triggers: Vec<CompiledTrigger>,
}

/// Steps executed when a trigger fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledTrigger {
    /// Event name.
    pub event: String,
    /// Top-level steps in statement order.
    pub steps: Vec<Step>,
}

/// Discriminant of a [`Step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Append text to the reply.
    Say,
    /// Invoke a tool.
    ToolCall,
    /// Write a binding.
    Assign,
    /// Conditional branch.
    Branch,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StepKind::Say => "say",
            StepKind::ToolCall => "tool_call",
            StepKind::Assign => "assign",
            StepKind::Branch => "branch",
        })
    }
}

/// Type-specific step payloads. Expressions stay unevaluated until run time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepPayload {
    /// Append rendered text to the reply.
    Say {
        /// Text expression.
        text: Expr,
    },
    /// Invoke a tool with arguments bound at run time.
    ToolCall {
        /// Registered tool name.
        tool: String,
        /// Named argument expressions in source order.
        args: Vec<(String, Expr)>,
        /// Memory key receiving the output.
        binding: Option<String>,
        /// Append the tool output to the reply.
        reply: bool,
    },
    /// Write `value` to memory under `name`.
    Assign {
        /// Binding name.
        name: String,
        /// Value expression.
        value: Expr,
    },
    /// Evaluate `condition` and continue with one of the sub-sequences.
    Branch {
        /// Guard.
        condition: Condition,
        /// Steps run when the guard holds.
        then_steps: Vec<Step>,
        /// Steps run otherwise.
        else_steps: Vec<Step>,
    },
}

/// One executable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Step payload.
    pub payload: StepPayload,
    /// Source position of the originating statement.
    pub position: Position,
}

impl Step {
    /// Step discriminant.
    pub fn kind(&self) -> StepKind {
        match self.payload {
            StepPayload::Say { .. } => StepKind::Say,
            StepPayload::ToolCall { .. } => StepKind::ToolCall,
            StepPayload::Assign { .. } => StepKind::Assign,
            StepPayload::Branch { .. } => StepKind::Branch,
        }
    }

    /// Number of steps including nested branch steps.
    pub fn count(&self) -> usize {
        match &self.payload {
            StepPayload::Branch {
                then_steps,
                else_steps,
                ..
            } => 1 + count_steps(then_steps) + count_steps(else_steps),
            _ => 1,
        }
    }

    /// One-line description used by summaries and execution traces.
    pub fn describe(&self) -> String {
        match &self.payload {
            StepPayload::Say { text } => format!("say {}", render_expr(text)),
            StepPayload::ToolCall {
                tool,
                args,
                binding,
                reply,
            } => {
                let args = args
                    .iter()
                    .map(|(name, value)| format!("{}: {}", name, render_expr(value)))
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut line = format!("call {}({})", tool, args);
                if let Some(binding) = binding {
                    line.push_str(&format!(" as {}", binding));
                }
                if *reply {
                    line.push_str(" -> reply");
                }
                line
            }
            StepPayload::Assign { name, value } => {
                format!("set {} = {}", name, render_expr(value))
            }
            StepPayload::Branch { condition, .. } => format!("if {}", render_condition(condition)),
        }
    }
}

/// Count steps in a sequence, nested steps included.
pub fn count_steps(steps: &[Step]) -> usize {
    steps.iter().map(Step::count).sum()
}

impl CompiledProgram {
    /// Top-level steps of every trigger, in trigger then statement order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.triggers.iter().flat_map(|trigger| trigger.steps.iter())
    }

    /// Total steps including nested branch steps.
    pub fn step_count(&self) -> usize {
        self.triggers
            .iter()
            .map(|trigger| count_steps(&trigger.steps))
            .sum()
    }

    /// First trigger handling `event`.
    pub fn trigger(&self, event: &str) -> Option<&CompiledTrigger> {
        self.triggers.iter().find(|trigger| trigger.event == event)
    }

    /// Stable, human-readable rendering of the bot's behavior.
    pub fn summary(&self) -> String {
        let mut out = format!("bot {}\n", self.name);
        if let Some(description) = &self.description {
            out.push_str(&format!("  description: {}\n", description));
        }
        if let Some(model) = &self.model {
            out.push_str(&format!("  model: {}\n", model));
        }
        if !self.capabilities.is_empty() {
            out.push_str(&format!("  capabilities: {}\n", self.capabilities.join(", ")));
        }
        for trigger in &self.triggers {
            out.push_str(&format!("  on {}:\n", trigger.event));
            let mut counter = 0;
            summarize(&trigger.steps, 2, &mut counter, &mut out);
        }
        out
    }
}

fn summarize(steps: &[Step], depth: usize, counter: &mut usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    for step in steps {
        *counter += 1;
        out.push_str(&format!("{}{}. {}\n", indent, counter, step.describe()));
        if let StepPayload::Branch {
            then_steps,
            else_steps,
            ..
        } = &step.payload
        {
            summarize(then_steps, depth + 1, counter, out);
            if !else_steps.is_empty() {
                out.push_str(&format!("{}else\n", indent));
                summarize(else_steps, depth + 1, counter, out);
            }
        }
    }
}

/// Render an expression back to HiveLang-like text.
pub fn render_expr(expr: &Expr) -> String {
    match expr {
        Expr::Literal(value) => value.to_string(),
        Expr::Variable(name) => name.clone(),
        Expr::Concat(parts) => parts.iter().map(render_expr).collect::<Vec<_>>().join(" + "),
        Expr::Field { base, field } => format!("{}.{}", render_expr(base), field),
    }
}

fn render_condition(condition: &Condition) -> String {
    match condition {
        Condition::Truthy { expr } => render_expr(expr),
        Condition::Equals { left, right } => {
            format!("{} == {}", render_expr(left), render_expr(right))
        }
        Condition::NotEquals { left, right } => {
            format!("{} != {}", render_expr(left), render_expr(right))
        }
        Condition::Contains { left, right } => {
            format!("{} contains {}", render_expr(left), render_expr(right))
        }
        Condition::Not { inner } => format!("not {}", render_condition(inner)),
    }
}
