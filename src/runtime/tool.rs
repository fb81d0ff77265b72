//! Tool boundary: descriptors, inputs/outputs and the [`Tool`] trait.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::context::ToolContext;
use super::error::{ToolError, ToolResult};

/// Structured tool input: named arguments.
pub type ToolInput = Map<String, Value>;

/// Static description of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Namespaced name, e.g. `slack.sendMessage`.
    pub name: String,
    /// Capability tag the tool belongs to.
    pub capability: String,
    /// Human-readable description (shown to the decision source).
    pub description: String,
    /// Minimal JSON schema (`properties`, `required`, property `type`s).
    pub input_schema: Value,
    /// Whether the tool needs user credentials.
    #[serde(default)]
    pub requires_auth: bool,
    /// Deprecated tools still run but produce a validation warning.
    #[serde(default)]
    pub deprecated: bool,
}

impl ToolSpec {
    /// New spec with an empty object schema. The capability defaults to the
    /// name's namespace.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        let capability = name.split('.').next().unwrap_or_default().to_string();
        Self {
            name,
            capability,
            description: description.into(),
            input_schema: serde_json::json!({"type": "object"}),
            requires_auth: false,
            deprecated: false,
        }
    }

    /// Override the capability tag.
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = capability.into();
        self
    }

    /// Set the input schema.
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Mark the tool as requiring authentication.
    pub fn requiring_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    /// Mark the tool as deprecated.
    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    /// Names listed in the schema's `required` array.
    pub fn required_fields(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|fields| fields.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Whether the schema enumerates its properties.
    pub fn declares_properties(&self) -> bool {
        self.input_schema
            .get("properties")
            .is_some_and(Value::is_object)
    }

    /// Schema of a single property.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.input_schema.get("properties")?.get(name)
    }

    /// Declared JSON type of a property.
    pub fn property_type(&self, name: &str) -> Option<&str> {
        self.property(name)?.get("type")?.as_str()
    }

    /// Check an input against the schema: required fields present and
    /// declared scalar types respected.
    pub fn check_input(&self, input: &ToolInput) -> ToolResult<()> {
        for field in self.required_fields() {
            if !input.contains_key(field) {
                return Err(ToolError::InvalidInput(format!(
                    "missing required field `{}`",
                    field
                )));
            }
        }
        for (key, value) in input {
            let Some(expected) = self.property_type(key) else {
                continue;
            };
            let ok = match expected {
                "string" => value.is_string(),
                "number" => value.is_number(),
                "integer" => value.is_i64() || value.is_u64(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !ok && !value.is_null() {
                return Err(ToolError::InvalidInput(format!(
                    "field `{}` must be of type {}",
                    key, expected
                )));
            }
        }
        Ok(())
    }
}

/// Result shape every tool returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Whether the tool considers the call successful.
    pub success: bool,
    /// Text observation.
    pub output: String,
    /// Optional structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolOutput {
    /// Successful output with text only.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: None,
        }
    }

    /// Successful output with structured data.
    pub fn with_data(output: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: Some(data),
        }
    }

    /// Tool-reported failure.
    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            data: None,
        }
    }

    /// Value stored in shared memory for this output: the structured data
    /// when present, otherwise the text.
    pub fn memory_value(&self) -> Value {
        self.data
            .clone()
            .unwrap_or_else(|| Value::String(self.output.clone()))
    }
}

/// An invocable capability.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Static descriptor.
    fn spec(&self) -> &ToolSpec;

    /// Execute with an already schema-checked input.
    async fn run(&self, input: ToolInput, context: &ToolContext) -> ToolResult<ToolOutput>;
}

/// Deserialize a tool input into a typed struct.
pub fn parse_input<T: DeserializeOwned>(input: ToolInput) -> ToolResult<T> {
    serde_json::from_value(Value::Object(input))
        .map_err(|err| ToolError::InvalidInput(err.to_string()))
}

type ToolFn = Arc<
    dyn for<'c> Fn(ToolInput, &'c ToolContext) -> BoxFuture<'c, ToolResult<ToolOutput>>
        + Send
        + Sync,
>;

/// Tool backed by a closure.
#[derive(Clone)]
pub struct FnTool {
    spec: ToolSpec,
    handler: ToolFn,
}

impl FnTool {
    /// Wrap a closure returning a boxed future.
    pub fn new<F>(spec: ToolSpec, handler: F) -> Self
    where
        F: for<'c> Fn(ToolInput, &'c ToolContext) -> BoxFuture<'c, ToolResult<ToolOutput>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            spec,
            handler: Arc::new(handler),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn run(&self, input: ToolInput, context: &ToolContext) -> ToolResult<ToolOutput> {
        (self.handler)(input, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(value: Value) -> ToolInput {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn capability_defaults_to_namespace() {
        let spec = ToolSpec::new("slack.sendMessage", "post");
        assert_eq!(spec.capability, "slack");
        assert!(spec.required_fields().is_empty());
        assert!(!spec.declares_properties());
    }

    #[test]
    fn check_input_enforces_required_and_types() {
        let spec = ToolSpec::new("math.add", "add").with_schema(json!({
            "properties": {"a": {"type": "number"}, "b": {"type": "integer"}},
            "required": ["a", "b"]
        }));
        assert!(spec.check_input(&input(json!({"a": 1.5, "b": 2}))).is_ok());

        let missing = spec.check_input(&input(json!({"a": 1}))).unwrap_err();
        assert!(missing.to_string().contains("`b`"));

        let wrong = spec.check_input(&input(json!({"a": "x", "b": 2}))).unwrap_err();
        assert!(wrong.to_string().contains("type number"));
    }

    #[test]
    fn parse_input_deserializes_typed_struct() {
        #[derive(Deserialize)]
        struct Args {
            text: String,
        }
        let args: Args = parse_input(input(json!({"text": "hi"}))).unwrap();
        assert_eq!(args.text, "hi");
        assert!(parse_input::<Args>(input(json!({}))).is_err());
    }

    #[test]
    fn memory_value_prefers_data() {
        assert_eq!(ToolOutput::ok("x").memory_value(), json!("x"));
        assert_eq!(
            ToolOutput::with_data("x", json!({"id": 1})).memory_value(),
            json!({"id": 1})
        );
    }
}
