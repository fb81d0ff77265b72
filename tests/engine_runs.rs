use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hivelang::interpreter::compile_source;
use hivelang::runtime::decision::ReasoningRequest;
use hivelang::runtime::{
    Decision, DecisionSource, Engine, EngineConfig, FnTool, InMemoryBackend, MemoryBackend,
    RunMetadata, RunRequest, RunStatus, SharedMemory, ToolCatalog, ToolOutput, ToolSpec,
    register_builtins,
};
use hivelang::runtime::{ScriptedDecisions, ToolError};
use proptest::prelude::*;
use serde_json::json;
use uuid::Uuid;

fn catalog() -> ToolCatalog {
    let catalog = ToolCatalog::new();
    register_builtins(&catalog);
    catalog.register_fn(FnTool::new(
        ToolSpec::new("flaky.fetch", "always fails"),
        |_input, _ctx| Box::pin(async { Err(ToolError::Execution("upstream 503".into())) }),
    ));
    catalog.register_fn(FnTool::new(
        ToolSpec::new("slow.fetch", "never finishes in time"),
        |_input, _ctx| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(ToolOutput::ok("late"))
            })
        },
    ));
    catalog
}

fn engine(config: EngineConfig) -> Engine {
    Engine::new(catalog().snapshot(), config)
}

/// Decision source that keeps calling a tool and never answers.
struct Stubborn;

#[async_trait]
impl DecisionSource for Stubborn {
    async fn decide(&self, request: ReasoningRequest<'_>) -> anyhow::Result<Decision> {
        Ok(Decision::tool(
            format!("attempt {}", request.step_index),
            "core.echo",
            json!({"text": "again"}),
        ))
    }
}

#[tokio::test]
async fn run_without_final_answer_stops_at_max_steps() {
    let engine = engine(EngineConfig::default());
    let request = RunRequest::new("loop forever", RunMetadata::new("bot")).with_max_steps(5);
    let result = engine.run(request, &Stubborn).await;

    assert!(!result.success);
    assert_eq!(result.status, RunStatus::MaxStepsExceeded);
    assert_eq!(result.cycles(), 5);
    assert_eq!(result.final_answer, "");
    assert!(result.errors.last().unwrap().contains("max_steps (5)"));
}

#[tokio::test]
async fn failing_tool_does_not_abort_the_run() {
    let engine = engine(EngineConfig::default());
    let decider = ScriptedDecisions::new([
        Decision::tool("try the flaky one", "flaky.fetch", json!({})),
        Decision::tool("fall back", "core.echo", json!({"text": "cached"})).bind("page"),
        Decision::answer("good enough", "cached"),
    ]);
    let result = engine
        .run(RunRequest::new("fetch", RunMetadata::new("bot")), &decider)
        .await;

    assert!(result.success);
    assert_eq!(result.final_answer, "cached");
    assert_eq!(
        result.steps[0].observation.as_deref(),
        Some("Error: Execution failed: upstream 503")
    );
    assert_eq!(result.tools_called(), vec!["flaky.fetch", "core.echo"]);
    assert_eq!(result.memory.get("page"), Some(&json!("cached")));
    assert_eq!(result.errors.len(), 1);
}

#[tokio::test]
async fn timed_out_tool_becomes_an_observation() {
    let engine = engine(EngineConfig {
        tool_timeout_ms: 20,
        ..EngineConfig::default()
    });
    let decider = ScriptedDecisions::new([
        Decision::tool("slow", "slow.fetch", json!({})),
        Decision::answer("give up", "timed out"),
    ]);
    let result = engine
        .run(RunRequest::new("fetch", RunMetadata::new("bot")), &decider)
        .await;

    assert!(result.success);
    assert_eq!(
        result.steps[0].observation.as_deref(),
        Some("Error: Tool 'slow.fetch' timed out after 20ms")
    );
}

#[tokio::test]
async fn invalid_input_is_reported_back_to_the_decider() {
    let engine = engine(EngineConfig::default());
    let decider = ScriptedDecisions::new([
        Decision::tool("forgot the text", "core.echo", json!({})),
        Decision::answer("ok", "done"),
    ]);
    let result = engine
        .run(RunRequest::new("echo", RunMetadata::new("bot")), &decider)
        .await;

    assert!(result.success);
    let observation = result.steps[0].observation.as_deref().unwrap();
    assert!(observation.starts_with("Error: Invalid input"));
}

#[tokio::test]
async fn concurrent_runs_do_not_share_memory() {
    let backend: Arc<dyn MemoryBackend> = Arc::new(InMemoryBackend::new());
    let engine = Arc::new(
        engine(EngineConfig {
            retain_memory: true,
            ..EngineConfig::default()
        })
        .with_memory(backend.clone()),
    );

    let mut handles = Vec::new();
    for n in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let metadata = RunMetadata::new("bot").with_user(format!("user-{}", n));
            let run = metadata.run_id;
            let decider = ScriptedDecisions::new([
                Decision::tool(
                    "store",
                    "memory.set",
                    json!({"key": "answer", "value": n}),
                ),
                Decision::answer("done", n.to_string()),
            ]);
            let result = engine.run(RunRequest::new("store", metadata), &decider).await;
            (run, n, result)
        }));
    }

    for handle in handles {
        let (run, n, result) = handle.await.unwrap();
        assert!(result.success);
        assert_eq!(result.memory.get("answer"), Some(&json!(n)));
        let memory = SharedMemory::new(run, backend.clone());
        assert_eq!(memory.get("answer").unwrap(), Some(json!(n)));
    }
}

#[test]
fn append_builds_a_list() {
    let memory = SharedMemory::new(Uuid::new_v4(), Arc::new(InMemoryBackend::new()));
    memory.append("log", json!("a")).unwrap();
    memory.append("log", json!("b")).unwrap();
    assert_eq!(memory.get("log").unwrap(), Some(json!(["a", "b"])));
}

#[tokio::test]
async fn compiled_program_runs_with_builtin_tools() {
    let source = r#"@bot Notes
@trigger message
  call memory.append(key: "notes", value: input)
  call memory.append(key: "notes", value: "second")
  call memory.get(key: "notes") as notes
  if notes contains "second"
    say "Stored " + notes.length + " notes"
  end
  call core.echo(text: "first was " + notes.0) as echoed
  say echoed
"#;
    let catalog = catalog();
    let registry = catalog.snapshot();
    let program = compile_source(source, Some(registry.specs().as_slice())).unwrap();
    let engine = Engine::new(registry, EngineConfig::default());

    let result = engine
        .run_program(&program, "message", json!("hello"), RunMetadata::new("notes"))
        .await
        .unwrap();

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.final_answer, "Stored 2 notes\nfirst was hello");
    assert_eq!(result.memory.get("notes"), Some(&json!(["hello", "second"])));
    assert_eq!(result.memory.get("input"), Some(&json!("hello")));
}

#[tokio::test]
async fn failed_tool_in_a_program_leaves_binding_unset() {
    let source = r#"@bot Fetcher
@trigger message
  call flaky.fetch() as page
  if page
    say "got it"
  else
    say "no page"
  end
"#;
    let engine = engine(EngineConfig::default());
    let program = compile_source(source, Some(engine.registry().specs().as_slice())).unwrap();
    let result = engine
        .run_program(&program, "message", json!(null), RunMetadata::new("fetcher"))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.final_answer, "no page");
    assert_eq!(result.errors.len(), 1);
}

proptest! {
    #[test]
    fn runs_never_exceed_their_step_budget(max_steps in 0usize..12, answer_at in 0usize..16) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let result = runtime.block_on(async {
            let engine = engine(EngineConfig::default());
            let mut script: Vec<Decision> = (0..answer_at)
                .map(|i| Decision::tool(format!("step {}", i), "core.echo", json!({"text": "x"})))
                .collect();
            script.push(Decision::answer("done", "finished"));
            let request = RunRequest::new("task", RunMetadata::new("bot")).with_max_steps(max_steps);
            engine.run(request, &ScriptedDecisions::new(script)).await
        });

        prop_assert!(result.cycles() <= max_steps);
        if answer_at < max_steps {
            prop_assert!(result.success);
            prop_assert_eq!(result.cycles(), answer_at + 1);
        } else {
            prop_assert!(!result.success);
            prop_assert_eq!(result.status, RunStatus::MaxStepsExceeded);
            prop_assert_eq!(result.cycles(), max_steps);
        }
    }
}
