//! Reasoning side of the ReAct loop.
//!
//! The engine asks a [`DecisionSource`] for exactly one [`Decision`] per
//! cycle. Where decisions come from (a model, a script, a rules table) is up
//! to the host. [`CompletionDecisionSource`] adapts any text-completion
//! client using the `Thought:` / `Action:` / `Answer:` line protocol.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;

use super::tool::{ToolInput, ToolSpec};
use super::trace::ReActStep;

/// Prompt used when neither the request nor the configuration supplies one.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a reasoning agent working through a task step by step.
Start every reply with one line:
Thought: <what you are thinking>
Then, to use a tool, output exactly one line:
Action: <tool_name>(<json object of arguments>)
or, when you have enough information, output:
Answer: <final answer>
Use only the tools listed. One action per reply."#;

/// Everything the decision source sees for one cycle.
#[derive(Debug, Clone, Copy)]
pub struct ReasoningRequest<'a> {
    /// Task or user message.
    pub task: &'a str,
    /// System prompt in effect.
    pub system_prompt: &'a str,
    /// Preferred model, if the host configured one.
    pub model: Option<&'a str>,
    /// Sampling temperature, if requested.
    pub temperature: Option<f32>,
    /// Tools the run may use.
    pub tools: &'a [ToolSpec],
    /// Cycles recorded so far.
    pub history: &'a [ReActStep],
    /// Index of the cycle being decided.
    pub step_index: usize,
}

/// What to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Stop with an answer.
    Final(String),
    /// Invoke a tool.
    Tool {
        /// Tool name.
        tool: String,
        /// Arguments.
        input: ToolInput,
        /// Memory key receiving the output.
        binding: Option<String>,
    },
}

/// One decision: a thought and an action.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Reasoning text recorded in the trace.
    pub thought: String,
    /// Chosen action.
    pub action: Action,
}

impl Decision {
    /// Decision that ends the run.
    pub fn answer(thought: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            thought: thought.into(),
            action: Action::Final(answer.into()),
        }
    }

    /// Decision that invokes a tool. Non-object inputs become an empty map.
    pub fn tool(thought: impl Into<String>, tool: impl Into<String>, input: Value) -> Self {
        Self {
            thought: thought.into(),
            action: Action::Tool {
                tool: tool.into(),
                input: match input {
                    Value::Object(map) => map,
                    _ => ToolInput::new(),
                },
                binding: None,
            },
        }
    }

    /// Store the tool output in shared memory under `binding`.
    pub fn bind(mut self, binding: impl Into<String>) -> Self {
        if let Action::Tool { binding: slot, .. } = &mut self.action {
            *slot = Some(binding.into());
        }
        self
    }
}

/// Source of decisions. Failing here is engine-fatal.
#[async_trait]
pub trait DecisionSource: Send + Sync {
    /// Decide the next action.
    async fn decide(&self, request: ReasoningRequest<'_>) -> anyhow::Result<Decision>;
}

/// Replays a fixed list of decisions, then keeps answering with a fallback.
/// Handy for tests and demos.
pub struct ScriptedDecisions {
    queue: Mutex<VecDeque<Decision>>,
    fallback: Option<Decision>,
}

impl ScriptedDecisions {
    /// Script that fails once exhausted.
    pub fn new(decisions: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            queue: Mutex::new(decisions.into_iter().collect()),
            fallback: None,
        }
    }

    /// Script that repeats `fallback` once exhausted.
    pub fn with_fallback(mut self, fallback: Decision) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

#[async_trait]
impl DecisionSource for ScriptedDecisions {
    async fn decide(&self, _request: ReasoningRequest<'_>) -> anyhow::Result<Decision> {
        if let Some(next) = self.queue.lock().pop_front() {
            return Ok(next);
        }
        self.fallback
            .clone()
            .ok_or_else(|| anyhow::anyhow!("decision script exhausted"))
    }
}

/// Minimal text-completion client.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Complete a prompt.
    async fn complete(
        &self,
        prompt: &str,
        model: Option<&str>,
        temperature: Option<f32>,
    ) -> anyhow::Result<String>;
}

/// Decision source driven by a text-completion client.
pub struct CompletionDecisionSource<C> {
    client: C,
}

impl<C: CompletionClient> CompletionDecisionSource<C> {
    /// Wrap a completion client.
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: CompletionClient> DecisionSource for CompletionDecisionSource<C> {
    async fn decide(&self, request: ReasoningRequest<'_>) -> anyhow::Result<Decision> {
        let prompt = build_prompt(&request);
        let text = self
            .client
            .complete(&prompt, request.model, request.temperature)
            .await?;
        parse_decision(&text).map_err(|err| anyhow::anyhow!(err))
    }
}

/// Render the prompt for one cycle: system prompt, tools, history, task.
pub fn build_prompt(request: &ReasoningRequest<'_>) -> String {
    let mut prompt = request.system_prompt.to_string();
    prompt.push_str("\n\nAvailable tools:\n");
    if request.tools.is_empty() {
        prompt.push_str("(none)\n");
    }
    for tool in request.tools {
        let auth = if tool.requires_auth {
            " (requires an authenticated user)"
        } else {
            ""
        };
        prompt.push_str(&format!(
            "- {}: {}{} input schema: {}\n",
            tool.name, tool.description, auth, tool.input_schema
        ));
    }
    if !request.history.is_empty() {
        prompt.push_str("\nPrevious steps:\n");
        for step in request.history {
            prompt.push_str(&format!("Thought: {}\n", step.thought));
            if let Some(action) = &step.action {
                prompt.push_str(&format!(
                    "Action: {}({})\n",
                    action.tool,
                    Value::Object(action.input.clone())
                ));
            }
            if let Some(observation) = &step.observation {
                prompt.push_str(&format!("Observation: {}\n", observation));
            }
        }
    }
    prompt.push_str("\nTask: ");
    prompt.push_str(request.task);
    prompt
}

/// Parse `Thought:` / `Action: tool({...})` / `Answer:` lines. An answer wins
/// over an action and runs to the end of the text; the first action line is
/// used.
pub fn parse_decision(text: &str) -> Result<Decision, String> {
    let mut thought = Vec::new();
    let mut answer = None;
    let mut action = None;

    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("Thought:") {
            thought.push(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("Answer:") {
            let mut body = vec![rest.trim_start()];
            body.extend(lines.by_ref().map(str::trim_end));
            answer = Some(body.join("\n").trim().to_string());
            break;
        } else if let Some(rest) = line.strip_prefix("Action:") {
            if action.is_none() {
                action = Some(parse_action_line(rest.trim())?);
            }
        }
    }

    let thought = thought.join(" ");
    if let Some(answer) = answer {
        return Ok(Decision::answer(thought, answer));
    }
    match action {
        Some((tool, input)) => Ok(Decision::tool(thought, tool, Value::Object(input))),
        None => Err("no Answer or Action line found".to_string()),
    }
}

fn parse_action_line(line: &str) -> Result<(String, ToolInput), String> {
    let open = line
        .find('(')
        .ok_or_else(|| format!("malformed action `{}`", line))?;
    let close = line
        .rfind(')')
        .filter(|close| *close > open)
        .ok_or_else(|| format!("malformed action `{}`", line))?;
    let name = line[..open].trim().to_string();
    let args = line[open + 1..close].trim();
    if args.is_empty() {
        return Ok((name, ToolInput::new()));
    }
    match serde_json::from_str(args) {
        Ok(Value::Object(input)) => Ok((name, input)),
        Ok(other) => Err(format!(
            "action arguments for `{}` must be a JSON object, found {}",
            name, other
        )),
        Err(err) => Err(format!("invalid action arguments: {}", err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_actions_and_answers() {
        let decision =
            parse_decision("Thought: need the time\nAction: clock.now({\"tz\": \"UTC\"})").unwrap();
        assert_eq!(decision.thought, "need the time");
        assert_eq!(
            decision.action,
            Action::Tool {
                tool: "clock.now".into(),
                input: json!({"tz": "UTC"}).as_object().cloned().unwrap(),
                binding: None,
            }
        );

        let decision = parse_decision("Thought: done\nAnswer: 42").unwrap();
        assert_eq!(decision.action, Action::Final("42".into()));
    }

    #[test]
    fn rejects_unparseable_output() {
        assert!(parse_decision("I am confused").is_err());
        assert!(parse_decision("Action: broken({not json})").is_err());
    }

    #[test]
    fn action_arguments_must_be_an_object() {
        let err = parse_decision("Thought: t\nAction: x.y([1,2])").unwrap_err();
        assert!(err.contains("must be a JSON object"));
        assert!(parse_decision("Action: x.y(\"text\")").is_err());
        assert_eq!(
            parse_decision("Action: x.y()").unwrap().action,
            Action::Tool {
                tool: "x.y".into(),
                input: ToolInput::new(),
                binding: None,
            }
        );
    }

    #[test]
    fn answer_keeps_every_following_line() {
        let decision =
            parse_decision("Thought: t\nAnswer: line one\nline two\n\n  indented three\n").unwrap();
        assert_eq!(
            decision.action,
            Action::Final("line one\nline two\n\n  indented three".into())
        );
        assert_eq!(decision.thought, "t");
    }

    #[test]
    fn prompt_lists_tools_history_and_task() {
        let tools = vec![
            ToolSpec::new("clock.now", "current time"),
            ToolSpec::new("inbox.read", "reads mail").requiring_auth(),
        ];
        let history = vec![ReActStep {
            step_index: 0,
            thought: "check".into(),
            action: Some(crate::runtime::trace::ActionRecord {
                tool: "clock.now".into(),
                input: ToolInput::new(),
            }),
            observation: Some("12:00".into()),
            timestamp: chrono::Utc::now(),
        }];
        let request = ReasoningRequest {
            task: "what time is it?",
            system_prompt: DEFAULT_SYSTEM_PROMPT,
            model: None,
            temperature: None,
            tools: &tools,
            history: &history,
            step_index: 1,
        };
        let prompt = build_prompt(&request);
        assert!(prompt.contains("- clock.now: current time input schema"));
        assert!(prompt.contains("- inbox.read: reads mail (requires an authenticated user)"));
        assert!(prompt.contains("Action: clock.now({})"));
        assert!(prompt.contains("Observation: 12:00"));
        assert!(prompt.ends_with("Task: what time is it?"));
    }

    #[tokio::test]
    async fn scripted_source_replays_then_falls_back() {
        let source = ScriptedDecisions::new([Decision::answer("t", "first")])
            .with_fallback(Decision::answer("t", "again"));
        let request = ReasoningRequest {
            task: "",
            system_prompt: "",
            model: None,
            temperature: None,
            tools: &[],
            history: &[],
            step_index: 0,
        };
        assert_eq!(
            source.decide(request).await.unwrap().action,
            Action::Final("first".into())
        );
        assert_eq!(
            source.decide(request).await.unwrap().action,
            Action::Final("again".into())
        );
        assert!(ScriptedDecisions::new([]).decide(request).await.is_err());
    }
}
