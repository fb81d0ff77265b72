//! Built-in tools: run-scoped memory access and a few core utilities.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::context::ToolContext;
use super::error::ToolResult;
use super::registry::ToolCatalog;
use super::tool::{FnTool, Tool, ToolInput, ToolOutput, ToolSpec, parse_input};
use crate::interpreter::value::render;

/// Register every built-in tool.
pub fn register_builtins(catalog: &ToolCatalog) {
    catalog.register(MemoryGet::new());
    catalog.register(MemoryWrite::set());
    catalog.register(MemoryWrite::append());
    catalog.register(MemoryKeys::new());
    catalog.register_fn(echo());
    catalog.register_fn(now());
}

#[derive(Deserialize)]
struct KeyArgs {
    key: String,
}

#[derive(Deserialize)]
struct WriteArgs {
    key: String,
    value: Value,
}

/// `memory.get(key)`: read a key of the current run.
pub struct MemoryGet {
    spec: ToolSpec,
}

impl MemoryGet {
    /// Create the tool.
    pub fn new() -> Self {
        Self {
            spec: ToolSpec::new("memory.get", "Read a value from the run's shared memory")
                .with_schema(json!({
                    "type": "object",
                    "properties": {"key": {"type": "string"}},
                    "required": ["key"]
                })),
        }
    }
}

impl Default for MemoryGet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for MemoryGet {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn run(&self, input: ToolInput, context: &ToolContext) -> ToolResult<ToolOutput> {
        let args: KeyArgs = parse_input(input)?;
        Ok(match context.memory.get(&args.key)? {
            Some(value) => ToolOutput::with_data(render(&value), value),
            None => ToolOutput::failure(format!("no value stored under '{}'", args.key)),
        })
    }
}

#[derive(Clone, Copy)]
enum WriteMode {
    Set,
    Append,
}

/// `memory.set(key, value)` and `memory.append(key, value)`.
pub struct MemoryWrite {
    spec: ToolSpec,
    mode: WriteMode,
}

impl MemoryWrite {
    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {"key": {"type": "string"}, "value": {}},
            "required": ["key", "value"]
        })
    }

    /// Overwriting variant.
    pub fn set() -> Self {
        Self {
            spec: ToolSpec::new("memory.set", "Store a value in the run's shared memory")
                .with_schema(Self::schema()),
            mode: WriteMode::Set,
        }
    }

    /// Accumulating variant.
    pub fn append() -> Self {
        Self {
            spec: ToolSpec::new("memory.append", "Append a value to a list in shared memory")
                .with_schema(Self::schema()),
            mode: WriteMode::Append,
        }
    }
}

#[async_trait]
impl Tool for MemoryWrite {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn run(&self, input: ToolInput, context: &ToolContext) -> ToolResult<ToolOutput> {
        let args: WriteArgs = parse_input(input)?;
        match self.mode {
            WriteMode::Set => context.memory.set(&args.key, args.value.clone())?,
            WriteMode::Append => context.memory.append(&args.key, args.value.clone())?,
        }
        let stored = context.memory.get(&args.key)?.unwrap_or(Value::Null);
        Ok(ToolOutput::with_data(format!("stored '{}'", args.key), stored))
    }
}

/// `memory.keys()`: list keys written in the current run.
pub struct MemoryKeys {
    spec: ToolSpec,
}

impl MemoryKeys {
    /// Create the tool.
    pub fn new() -> Self {
        Self {
            spec: ToolSpec::new("memory.keys", "List keys in the run's shared memory"),
        }
    }
}

impl Default for MemoryKeys {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for MemoryKeys {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn run(&self, _input: ToolInput, context: &ToolContext) -> ToolResult<ToolOutput> {
        let keys = context.memory.keys()?;
        Ok(ToolOutput::with_data(keys.join(", "), json!(keys)))
    }
}

fn echo() -> FnTool {
    let spec = ToolSpec::new("core.echo", "Return the given text unchanged").with_schema(json!({
        "type": "object",
        "properties": {"text": {"type": "string"}},
        "required": ["text"]
    }));
    FnTool::new(spec, |input, _ctx| {
        Box::pin(async move {
            let args: EchoArgs = parse_input(input)?;
            Ok(ToolOutput::ok(args.text))
        })
    })
}

#[derive(Deserialize)]
struct EchoArgs {
    text: String,
}

fn now() -> FnTool {
    FnTool::new(
        ToolSpec::new("core.now", "Current UTC time in RFC 3339 format"),
        |_input, _ctx| Box::pin(async { Ok(ToolOutput::ok(chrono::Utc::now().to_rfc3339())) }),
    )
}
