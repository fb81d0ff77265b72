//! Execution engine
//!
//! A run moves through `Start -> Reasoning -> (Acting -> Observing ->
//! Reasoning)* -> Finished | Failed | MaxStepsExceeded`. Tool failures are
//! absorbed as observations; only decision-source and memory failures end a
//! run early. Free-form tasks go through [`Engine::run`]; compiled programs
//! go through [`Engine::run_program`](super::program).

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use super::context::{RunMetadata, ToolContext};
use super::decision::{Action, DecisionSource, ReasoningRequest, DEFAULT_SYSTEM_PROMPT};
use super::error::{EngineError, EngineResult, ToolResult};
use super::memory::{InMemoryBackend, MemoryBackend, RunId, SharedMemory};
use super::registry::ToolRegistry;
use super::tool::{ToolInput, ToolOutput};
use super::trace::{ActionRecord, ReActStep, RunResult, RunStatus};

/// Memory key holding the run input.
pub const INPUT_KEY: &str = "input";
/// Memory key holding the most recent successful tool output.
pub const RESULT_KEY: &str = "result";

/// Engine tuning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on reasoning cycles per run.
    pub max_steps: usize,
    /// Per-tool-call time budget in milliseconds.
    pub tool_timeout_ms: u64,
    /// Model name passed to the decision source.
    pub model: Option<String>,
    /// System prompt used when a request does not carry one.
    pub system_prompt: Option<String>,
    /// Sampling temperature used when a request does not carry one.
    pub temperature: Option<f32>,
    /// Keep a run's memory scope after it ends.
    pub retain_memory: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            tool_timeout_ms: 30_000,
            model: None,
            system_prompt: None,
            temperature: None,
            retain_memory: false,
        }
    }
}

impl EngineConfig {
    /// Per-tool-call time budget.
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }
}

/// A free-form task.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Task or user message.
    pub message: String,
    /// Allowed tool names; empty means every registered tool.
    pub tools: Vec<String>,
    /// Run identity.
    pub metadata: RunMetadata,
    /// Overrides [`EngineConfig::max_steps`].
    pub max_steps: Option<usize>,
    /// Overrides the configured system prompt.
    pub system_prompt: Option<String>,
    /// Overrides the configured temperature.
    pub temperature: Option<f32>,
}

impl RunRequest {
    /// Request with default limits and every tool allowed.
    pub fn new(message: impl Into<String>, metadata: RunMetadata) -> Self {
        Self {
            message: message.into(),
            tools: Vec::new(),
            metadata,
            max_steps: None,
            system_prompt: None,
            temperature: None,
        }
    }

    /// Restrict the run to `tools`.
    pub fn with_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Override the cycle budget.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }
}

/// Phases of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Phase {
    Start,
    Reasoning,
    Acting,
    Observing,
    Finished,
    Failed,
    MaxStepsExceeded,
}

/// Executes runs against a frozen tool registry and a memory backend.
pub struct Engine {
    pub(super) registry: ToolRegistry,
    memory: Arc<dyn MemoryBackend>,
    config: EngineConfig,
}

impl Engine {
    /// Engine with an in-process memory backend.
    pub fn new(registry: ToolRegistry, config: EngineConfig) -> Self {
        Self {
            registry,
            memory: Arc::new(InMemoryBackend::new()),
            config,
        }
    }

    /// Swap the memory backend.
    pub fn with_memory(mut self, backend: Arc<dyn MemoryBackend>) -> Self {
        self.memory = backend;
        self
    }

    /// Registry used by runs.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Memory handle for an existing run id, e.g. to inspect retained memory.
    pub fn memory_for(&self, run: RunId) -> SharedMemory {
        SharedMemory::new(run, self.memory.clone())
    }

    /// Drive a free-form task until the decision source answers, the budget
    /// runs out, or a fatal error occurs.
    pub async fn run(&self, request: RunRequest, decider: &dyn DecisionSource) -> RunResult {
        let RunRequest {
            message,
            tools,
            metadata,
            max_steps,
            system_prompt,
            temperature,
        } = request;

        let max_steps = max_steps.unwrap_or(self.config.max_steps);
        let registry = if tools.is_empty() {
            self.registry.clone()
        } else {
            self.registry.subset(&tools)
        };
        let specs = registry.specs();
        let system_prompt = system_prompt
            .or_else(|| self.config.system_prompt.clone())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        let temperature = temperature.or(self.config.temperature);

        let mut run = self.start(metadata);
        info!(
            run = %run.run_id(),
            bot = %run.context.metadata.bot_id,
            max_steps,
            tools = specs.len(),
            "run started"
        );

        for index in 0..max_steps {
            run.enter(Phase::Reasoning);
            let decided = decider
                .decide(ReasoningRequest {
                    task: &message,
                    system_prompt: &system_prompt,
                    model: self.config.model.as_deref(),
                    temperature,
                    tools: &specs,
                    history: &run.steps,
                    step_index: index,
                })
                .await;

            let decision = match decided {
                Ok(decision) => decision,
                Err(err) => return run.fail(EngineError::Decision(format!("{:#}", err))),
            };

            match decision.action {
                Action::Final(answer) => {
                    run.record(index, decision.thought, None, None);
                    return run.finish(answer);
                }
                Action::Tool {
                    tool,
                    input,
                    binding,
                } => {
                    debug!(run = %run.run_id(), step = index, tool = %tool, "acting");
                    let action = ActionRecord {
                        tool: tool.clone(),
                        input: input.clone(),
                    };
                    let outcome = self.act(&registry, &mut run, &tool, input).await;
                    if let Err(err) = run.observe(
                        index,
                        decision.thought,
                        Some(action),
                        &outcome,
                        binding.as_deref(),
                    ) {
                        return run.fail(err);
                    }
                }
            }
        }

        run.exhausted(max_steps)
    }

    pub(super) fn start(&self, metadata: RunMetadata) -> RunState {
        let memory = SharedMemory::new(metadata.run_id, self.memory.clone());
        RunState {
            context: ToolContext::new(metadata, memory),
            steps: Vec::new(),
            errors: Vec::new(),
            phase: Phase::Start,
            retain_memory: self.config.retain_memory,
        }
    }

    /// Invoke one tool within the configured timeout.
    pub(super) async fn act(
        &self,
        registry: &ToolRegistry,
        run: &mut RunState,
        tool: &str,
        input: ToolInput,
    ) -> ToolResult<ToolOutput> {
        run.enter(Phase::Acting);
        let started = Instant::now();
        let outcome = registry
            .invoke(tool, input, &run.context, self.config.tool_timeout())
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(output) if output.success => {
                debug!(run = %run.run_id(), tool, elapsed_ms, "tool succeeded")
            }
            Ok(output) => {
                warn!(run = %run.run_id(), tool, elapsed_ms, "tool reported failure: {}", output.output)
            }
            Err(err) => warn!(run = %run.run_id(), tool, elapsed_ms, "tool failed: {}", err),
        }
        outcome
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

/// Mutable state of one run.
pub(super) struct RunState {
    pub(super) context: ToolContext,
    steps: Vec<ReActStep>,
    errors: Vec<String>,
    phase: Phase,
    retain_memory: bool,
}

impl RunState {
    pub(super) fn run_id(&self) -> RunId {
        self.context.metadata.run_id
    }

    pub(super) fn enter(&mut self, phase: Phase) {
        trace!(run = %self.run_id(), from = ?self.phase, to = ?phase, "phase");
        self.phase = phase;
    }

    pub(super) fn record(
        &mut self,
        index: usize,
        thought: String,
        action: Option<ActionRecord>,
        observation: Option<String>,
    ) {
        self.steps.push(ReActStep {
            step_index: index,
            thought,
            action,
            observation,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Turn a tool outcome into an observation. Successful outputs are written
    /// under `result` and under `binding`.
    pub(super) fn observe(
        &mut self,
        index: usize,
        thought: String,
        action: Option<ActionRecord>,
        outcome: &ToolResult<ToolOutput>,
        binding: Option<&str>,
    ) -> EngineResult<()> {
        self.enter(Phase::Observing);
        let observation = match outcome {
            Ok(output) if output.success => {
                let value = output.memory_value();
                if let Some(binding) = binding {
                    self.context.memory.set(binding, value.clone())?;
                }
                self.context.memory.set(RESULT_KEY, value)?;
                output.output.clone()
            }
            Ok(output) => {
                self.errors
                    .push(format!("step {}: tool reported failure: {}", index, output.output));
                format!("Tool failed: {}", output.output)
            }
            Err(err) => {
                self.errors.push(format!("step {}: {}", index, err));
                format!("Error: {}", err)
            }
        };
        self.record(index, thought, action, Some(observation));
        Ok(())
    }

    pub(super) fn finish(self, answer: String) -> RunResult {
        self.close(Phase::Finished, RunStatus::Finished, answer)
    }

    pub(super) fn fail(mut self, err: EngineError) -> RunResult {
        warn!(run = %self.run_id(), "run failed: {}", err);
        self.errors.push(err.to_string());
        self.close(Phase::Failed, RunStatus::Failed, String::new())
    }

    pub(super) fn exhausted(mut self, max_steps: usize) -> RunResult {
        warn!(run = %self.run_id(), max_steps, "step budget exhausted");
        self.errors.push(format!(
            "Run exceeded max_steps ({}) without a final answer",
            max_steps
        ));
        self.close(Phase::MaxStepsExceeded, RunStatus::MaxStepsExceeded, String::new())
    }

    fn close(mut self, phase: Phase, status: RunStatus, final_answer: String) -> RunResult {
        self.enter(phase);
        let memory = match self.context.memory.snapshot() {
            Ok(memory) => memory,
            Err(err) => {
                warn!(run = %self.run_id(), "memory snapshot failed: {}", err);
                Default::default()
            }
        };
        if !self.retain_memory {
            if let Err(err) = self.context.memory.clear() {
                warn!(run = %self.run_id(), "memory cleanup failed: {}", err);
            }
        }
        info!(
            run = %self.run_id(),
            status = ?status,
            cycles = self.steps.len(),
            errors = self.errors.len(),
            "run finished"
        );
        RunResult {
            success: status == RunStatus::Finished,
            final_answer,
            steps: self.steps,
            errors: self.errors,
            status,
            memory,
        }
    }
}
