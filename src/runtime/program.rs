//! Execution of compiled programs.
//!
//! A trigger's steps run on a frame stack: branch steps push the chosen
//! sub-sequence and a frame pops once exhausted. Each executed step is one
//! cycle of the run and counts against `max_steps`.

use serde_json::Value;
use tracing::info;

use super::context::RunMetadata;
use super::engine::{Engine, INPUT_KEY, Phase};
use super::error::{EngineError, EngineResult};
use super::tool::ToolInput;
use super::trace::{ActionRecord, RunResult};
use crate::interpreter::ir::{CompiledProgram, Step, StepPayload};
use crate::interpreter::value::{evaluate, evaluate_condition, render};

impl Engine {
    /// Run the steps of `program`'s trigger for `event`.
    ///
    /// `input` is available to the program as `input`. The final answer is
    /// the reply lines produced by `say` steps and reply-emitting tool calls,
    /// joined by newlines. Fails only when no trigger handles `event`; every
    /// other failure is reported in the returned [`RunResult`].
    pub async fn run_program(
        &self,
        program: &CompiledProgram,
        event: &str,
        input: Value,
        metadata: RunMetadata,
    ) -> EngineResult<RunResult> {
        let trigger = program
            .trigger(event)
            .ok_or_else(|| EngineError::UnknownTrigger(event.to_string()))?;
        let max_steps = self.config().max_steps;

        let mut run = self.start(metadata);
        info!(
            run = %run.run_id(),
            bot = %program.name,
            event,
            steps = trigger.steps.len(),
            "program run started"
        );
        if let Err(err) = run.context.memory.set(INPUT_KEY, input) {
            return Ok(run.fail(err.into()));
        }

        let mut cursor = StepCursor::new(&trigger.steps);
        let mut reply = Vec::new();
        let mut index = 0;

        while let Some(step) = cursor.next_step() {
            if index >= max_steps {
                return Ok(run.exhausted(max_steps));
            }
            run.enter(Phase::Reasoning);
            let thought = step.describe();

            match &step.payload {
                StepPayload::Say { text } => {
                    let line = render(&evaluate(text, &run.context));
                    run.record(index, thought, None, Some(line.clone()));
                    reply.push(line);
                }
                StepPayload::Assign { name, value } => {
                    let value = evaluate(value, &run.context);
                    let observation = format!("{} = {}", name, value);
                    if let Err(err) = run.context.memory.set(name, value) {
                        return Ok(run.fail(err.into()));
                    }
                    run.record(index, thought, None, Some(observation));
                }
                StepPayload::Branch {
                    condition,
                    then_steps,
                    else_steps,
                } => {
                    let taken = evaluate_condition(condition, &run.context);
                    cursor.push(if taken {
                        then_steps.as_slice()
                    } else {
                        else_steps.as_slice()
                    });
                    let branch = if taken { "then" } else { "else" };
                    run.record(index, thought, None, Some(format!("took {} branch", branch)));
                }
                StepPayload::ToolCall {
                    tool,
                    args,
                    binding,
                    reply: emits_reply,
                } => {
                    let input: ToolInput = args
                        .iter()
                        .map(|(name, expr)| (name.clone(), evaluate(expr, &run.context)))
                        .collect();
                    let action = ActionRecord {
                        tool: tool.clone(),
                        input: input.clone(),
                    };
                    let outcome = self.act(&self.registry, &mut run, tool, input).await;
                    if *emits_reply {
                        if let Ok(output) = &outcome {
                            if output.success {
                                reply.push(output.output.clone());
                            }
                        }
                    }
                    if let Err(err) =
                        run.observe(index, thought, Some(action), &outcome, binding.as_deref())
                    {
                        return Ok(run.fail(err));
                    }
                }
            }
            index += 1;
        }

        Ok(run.finish(reply.join("\n")))
    }
}

/// Stack of step sequences being executed.
struct StepCursor<'p> {
    frames: Vec<Frame<'p>>,
}

struct Frame<'p> {
    steps: &'p [Step],
    index: usize,
}

impl<'p> StepCursor<'p> {
    fn new(steps: &'p [Step]) -> Self {
        let mut cursor = Self { frames: Vec::new() };
        cursor.push(steps);
        cursor
    }

    fn push(&mut self, steps: &'p [Step]) {
        if !steps.is_empty() {
            self.frames.push(Frame { steps, index: 0 });
        }
    }

    fn next_step(&mut self) -> Option<&'p Step> {
        loop {
            let frame = self.frames.last_mut()?;
            let steps = frame.steps;
            if let Some(step) = steps.get(frame.index) {
                frame.index += 1;
                return Some(step);
            }
            self.frames.pop();
        }
    }
}
