//! Tool catalog and registry
//!
//! Tools are registered into a [`ToolCatalog`] during startup. Runs use an
//! immutable [`ToolRegistry`] snapshot taken from the catalog, so lookups
//! during a run never contend with registration.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::context::ToolContext;
use super::error::{ToolError, ToolResult};
use super::tool::{FnTool, Tool, ToolInput, ToolOutput, ToolSpec};

/// Mutable catalog of tools, populated before any run starts.
#[derive(Default)]
pub struct ToolCatalog {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its spec name. Re-registering replaces the
    /// earlier tool.
    pub fn register<T>(&self, tool: T)
    where
        T: Tool + 'static,
    {
        self.register_arc(Arc::new(tool));
    }

    /// Register an already shared tool.
    pub fn register_arc(&self, tool: Arc<dyn Tool>) {
        let name = tool.spec().name.clone();
        let mut tools = self.tools.write();
        if tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "tool re-registered; previous definition replaced");
        } else {
            tracing::debug!(tool = %name, "tool registered");
        }
    }

    /// Register a closure-backed tool.
    pub fn register_fn(&self, tool: FnTool) {
        self.register(tool);
    }

    /// Produce an immutable registry for runs.
    pub fn snapshot(&self) -> ToolRegistry {
        let tools = self.tools.read();
        ToolRegistry {
            tools: Arc::new(tools.clone()),
        }
    }
}

/// Immutable, cheaply cloneable view of the catalog.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    /// Registry from a fixed set of tools.
    pub fn from_tools(tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        let tools = tools
            .into_iter()
            .map(|tool| (tool.spec().name.clone(), tool))
            .collect();
        Self {
            tools: Arc::new(tools),
        }
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Sorted tool names.
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Specs of every tool, sorted by name.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|tool| tool.spec().clone())
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Registry restricted to `names`. Unknown names are ignored.
    pub fn subset(&self, names: &[String]) -> ToolRegistry {
        let tools = names
            .iter()
            .filter_map(|name| self.tools.get(name).map(|tool| (name.clone(), tool.clone())))
            .collect();
        ToolRegistry {
            tools: Arc::new(tools),
        }
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Look up, authorize, schema-check and run a tool within `timeout`.
    /// Tools flagged `requires_auth` only run for a known user.
    pub async fn invoke(
        &self,
        name: &str,
        input: ToolInput,
        context: &ToolContext,
        timeout: Duration,
    ) -> ToolResult<ToolOutput> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        if tool.spec().requires_auth && context.metadata.user_id.is_none() {
            return Err(ToolError::Unauthorized(name.to_string()));
        }
        tool.spec().check_input(&input)?;

        match tokio::time::timeout(timeout, tool.run(input, context)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                tool: name.to_string(),
                elapsed: timeout,
            }),
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.list_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo(name: &str) -> FnTool {
        FnTool::new(ToolSpec::new(name, "echo"), |input, _ctx| {
            Box::pin(async move { Ok(ToolOutput::ok(serde_json::Value::Object(input).to_string())) })
        })
    }

    #[test]
    fn snapshot_is_frozen() {
        let catalog = ToolCatalog::new();
        catalog.register(echo("a.one"));
        let registry = catalog.snapshot();
        catalog.register(echo("b.two"));

        assert_eq!(registry.list_names(), vec!["a.one"]);
        assert_eq!(catalog.snapshot().list_names(), vec!["a.one", "b.two"]);
    }

    #[test]
    fn subset_keeps_only_known_names() {
        let registry = ToolRegistry::from_tools([
            Arc::new(echo("a.one")) as Arc<dyn Tool>,
            Arc::new(echo("b.two")) as Arc<dyn Tool>,
        ]);
        let subset = registry.subset(&["b.two".to_string(), "c.three".to_string()]);
        assert_eq!(subset.list_names(), vec!["b.two"]);
    }

    #[tokio::test]
    async fn invoke_reports_unknown_tools_and_bad_input() {
        let strict = FnTool::new(
            ToolSpec::new("strict.tool", "needs x")
                .with_schema(json!({"required": ["x"]})),
            |_input, _ctx| Box::pin(async { Ok(ToolOutput::ok("ran")) }),
        );
        let registry = ToolRegistry::from_tools([Arc::new(strict) as Arc<dyn Tool>]);
        let ctx = ToolContext::ephemeral("bot");
        let timeout = Duration::from_secs(1);

        let missing = registry
            .invoke("nope", ToolInput::new(), &ctx, timeout)
            .await
            .unwrap_err();
        assert_eq!(missing, ToolError::NotFound("nope".into()));

        let invalid = registry
            .invoke("strict.tool", ToolInput::new(), &ctx, timeout)
            .await
            .unwrap_err();
        assert!(matches!(invalid, ToolError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn auth_tools_need_a_user() {
        let private = FnTool::new(
            ToolSpec::new("inbox.read", "reads mail").requiring_auth(),
            |_input, ctx| {
                let user = ctx.metadata.user_id.clone().unwrap_or_default();
                Box::pin(async move { Ok(ToolOutput::ok(user)) })
            },
        );
        let registry = ToolRegistry::from_tools([Arc::new(private) as Arc<dyn Tool>]);
        let timeout = Duration::from_secs(1);

        let anonymous = ToolContext::ephemeral("bot");
        let err = registry
            .invoke("inbox.read", ToolInput::new(), &anonymous, timeout)
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Unauthorized("inbox.read".into()));

        let mut signed_in = ToolContext::ephemeral("bot");
        signed_in.metadata.user_id = Some("ada".into());
        let output = registry
            .invoke("inbox.read", ToolInput::new(), &signed_in, timeout)
            .await
            .unwrap();
        assert_eq!(output.output, "ada");
    }

    #[tokio::test]
    async fn invoke_times_out_slow_tools() {
        let slow = FnTool::new(ToolSpec::new("slow.tool", "sleeps"), |_input, _ctx| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(ToolOutput::ok("late"))
            })
        });
        let registry = ToolRegistry::from_tools([Arc::new(slow) as Arc<dyn Tool>]);
        let ctx = ToolContext::ephemeral("bot");
        let err = registry
            .invoke("slow.tool", ToolInput::new(), &ctx, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
    }
}
