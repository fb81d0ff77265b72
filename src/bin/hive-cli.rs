//! HiveLang CLI - Command-line interface for the HiveLang toolchain
//!
//! Provides subcommands for tokenizing, checking, compiling and running
//! HiveLang sources.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use hivelang::interpreter::{self, CompiledProgram, ValidationReport};
use hivelang::runtime::{
    Engine, RunMetadata, RunStatus, ToolCatalog, ToolSpec, register_builtins, resolve_config,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "hive")]
#[command(about = "Compile and run HiveLang bot definitions", long_about = None)]
struct Cli {
    /// Configuration file (JSON); `HIVE_*` variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the token stream of a source file
    Tokens {
        /// Source file
        file: PathBuf,
    },

    /// Validate a source file
    Check {
        /// Source file
        file: PathBuf,

        /// JSON array of tool specs to validate calls against
        #[arg(long)]
        tools: Option<PathBuf>,
    },

    /// Compile a source file and print its steps
    Compile {
        /// Source file
        file: PathBuf,

        /// JSON array of tool specs to validate calls against
        #[arg(long)]
        tools: Option<PathBuf>,

        /// Emit the compiled program as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one trigger of a source file with the built-in tools
    Run {
        /// Source file
        file: PathBuf,

        /// Event to fire
        #[arg(short, long, default_value = "message")]
        event: String,

        /// Input value (parsed as JSON when possible, otherwise a string)
        #[arg(short, long, default_value = "")]
        input: String,

        /// Override the step budget
        #[arg(long)]
        max_steps: Option<usize>,

        /// Print the full trace
        #[arg(long)]
        trace: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Tokens { file } => {
            let source = read_source(&file)?;
            for token in interpreter::tokenize(&source) {
                let position = token.position.to_string();
                println!("{:>8}  {:<10} {:?}", position, kind_name(&token), token.value);
            }
        }

        Commands::Check { file, tools } => {
            let source = read_source(&file)?;
            let specs = load_tool_specs(tools.as_deref())?;
            let report = interpreter::check(&source, specs.as_deref());
            print_report(&report);
            if !report.valid {
                bail!("{} failed validation", file.display());
            }
            println!("{}: ok", file.display());
        }

        Commands::Compile { file, tools, json } => {
            let source = read_source(&file)?;
            let specs = load_tool_specs(tools.as_deref())?;
            let program = compile(&file, &source, specs.as_deref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&program)?);
            } else {
                print!("{}", program.summary());
            }
        }

        Commands::Run {
            file,
            event,
            input,
            max_steps,
            trace,
        } => {
            if let Some(max_steps) = max_steps {
                config.set_max_steps(max_steps)?;
            }
            let catalog = ToolCatalog::new();
            register_builtins(&catalog);
            let registry = catalog.snapshot();

            let source = read_source(&file)?;
            let specs = config.strict_validation.then(|| registry.specs());
            let program = compile(&file, &source, specs.as_deref())?;

            let engine = Engine::new(registry, config.engine.clone());

            let input = serde_json::from_str(&input)
                .unwrap_or_else(|_| serde_json::Value::String(input.clone()));
            let result = engine
                .run_program(&program, &event, input, RunMetadata::new(&program.name))
                .await?;

            if trace {
                for step in &result.steps {
                    println!(
                        "[{}] {} => {}",
                        step.step_index,
                        step.thought,
                        step.observation.as_deref().unwrap_or("")
                    );
                }
            }
            for error in &result.errors {
                eprintln!("error: {}", error);
            }
            match result.status {
                RunStatus::Finished => println!("{}", result.final_answer),
                RunStatus::Failed => bail!("run failed"),
                RunStatus::MaxStepsExceeded => {
                    bail!("run exceeded {} steps", config.engine.max_steps)
                }
            }
        }
    }

    Ok(())
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read source: {:?}", path))
}

fn load_tool_specs(path: Option<&Path>) -> Result<Option<Vec<ToolSpec>>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let data = fs::read(path).with_context(|| format!("Failed to read tool specs: {:?}", path))?;
    let mut specs: Vec<ToolSpec> =
        serde_json::from_slice(&data).context("Failed to deserialize tool specs")?;

    let builtins = ToolCatalog::new();
    register_builtins(&builtins);
    specs.extend(builtins.snapshot().specs());
    Ok(Some(specs))
}

fn compile(file: &Path, source: &str, tools: Option<&[ToolSpec]>) -> Result<CompiledProgram> {
    match interpreter::compile_source(source, tools) {
        Ok(program) => Ok(program),
        Err(report) => {
            print_report(&report);
            bail!("{} failed to compile", file.display())
        }
    }
}

fn print_report(report: &ValidationReport) {
    for diagnostic in &report.errors {
        eprintln!("error: {}", diagnostic);
    }
    for diagnostic in &report.warnings {
        eprintln!("warning: {}", diagnostic);
    }
}

fn kind_name(token: &interpreter::Token) -> String {
    serde_json::to_value(token.kind)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default()
}
