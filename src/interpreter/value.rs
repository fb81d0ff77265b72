//! Run-time evaluation of expressions and conditions.

use serde_json::Value;

use super::ast::{Condition, Expr};

/// Evaluation context exposed to expressions.
pub trait ValueContext {
    /// Current value of a binding, if it has been written.
    fn lookup(&self, name: &str) -> Option<Value>;
}

/// Evaluate an expression. Unbound variables and missing fields yield `null`.
pub fn evaluate(expr: &Expr, ctx: &dyn ValueContext) -> Value {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Variable(name) => ctx.lookup(name).unwrap_or(Value::Null),
        Expr::Concat(parts) => {
            let text: String = parts
                .iter()
                .map(|part| render(&evaluate(part, ctx)))
                .collect();
            Value::String(text)
        }
        Expr::Field { base, field } => {
            let base = evaluate(base, ctx);
            field_of(&base, field)
        }
    }
}

fn field_of(value: &Value, field: &str) -> Value {
    match value {
        Value::Object(map) => map.get(field).cloned().unwrap_or(Value::Null),
        Value::Array(items) => match field {
            "length" => Value::from(items.len()),
            index => index
                .parse::<usize>()
                .ok()
                .and_then(|idx| items.get(idx).cloned())
                .unwrap_or(Value::Null),
        },
        Value::String(text) if field == "length" => Value::from(text.chars().count()),
        _ => Value::Null,
    }
}

/// Render a value as reply text: strings verbatim, `null` as empty, anything
/// else as compact JSON.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Truthiness used by `if`: `null`, `false`, `0`, `""`, `[]` and `{}` are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(num) => num.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Evaluate a branch condition.
pub fn evaluate_condition(condition: &Condition, ctx: &dyn ValueContext) -> bool {
    match condition {
        Condition::Truthy { expr } => is_truthy(&evaluate(expr, ctx)),
        Condition::Equals { left, right } => loosely_equal(&evaluate(left, ctx), &evaluate(right, ctx)),
        Condition::NotEquals { left, right } => {
            !loosely_equal(&evaluate(left, ctx), &evaluate(right, ctx))
        }
        Condition::Contains { left, right } => {
            let haystack = evaluate(left, ctx);
            let needle = evaluate(right, ctx);
            match &haystack {
                Value::Array(items) => items.iter().any(|item| loosely_equal(item, &needle)),
                Value::Object(map) => map.contains_key(&render(&needle)),
                other => render(other).contains(&render(&needle)),
            }
        }
        Condition::Not { inner } => !evaluate_condition(inner, ctx),
    }
}

/// Numbers compare numerically (`1 == 1.0`); everything else structurally.
fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}
