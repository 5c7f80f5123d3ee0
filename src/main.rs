use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dslflow::config::Config;
use dslflow::dsl::{lint_workflow, parse_overrides, parse_workflow_file, DslParser};
use dslflow::engine::{HumanInLoopSignal, LocalSubstrate, WorkflowRuntime};
use dslflow::tasks::{
    build_email_provider, ApprovalHandler, ConsoleProvider, HandlerRegistry, TaskKind,
};

#[derive(Parser)]
#[command(name = "dslflow")]
#[command(about = "Declarative DSL workflow engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: <config dir>/dslflow/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow document to completion
    Run {
        /// Workflow file (JSON or YAML)
        file: PathBuf,
        /// Input overrides as key=value, merged into inputValues
        #[arg(value_name = "KEY=VALUE")]
        overrides: Vec<String>,
        /// Answer approval tasks with this decision instead of prompting
        #[arg(short, long)]
        decision: Option<String>,
    },
    /// Validate a workflow document
    Validate {
        /// Workflow file (JSON or YAML)
        file: PathBuf,
    },
    /// Start the HTTP server (API + approval form)
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "dslflow=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            file,
            overrides,
            decision,
        } => cmd_run(cli.config.as_deref(), &file, &overrides, decision.as_deref()).await,
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Serve { port } => cmd_serve(cli.config.as_deref(), port).await,
        Commands::Completions { shell } => cmd_completions(shell),
    };

    // Engine errors are reported with their code so scripts can branch on them
    if let Err(e) = &result {
        if let Some(err) = e.downcast_ref::<dslflow::Error>() {
            eprintln!("{}", serde_json::to_string_pretty(&err.to_json())?);
            std::process::exit(1);
        }
    }
    result
}

/// Shell completion variants
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum CompletionShell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

impl From<CompletionShell> for Shell {
    fn from(shell: CompletionShell) -> Self {
        match shell {
            CompletionShell::Bash => Shell::Bash,
            CompletionShell::Zsh => Shell::Zsh,
            CompletionShell::Fish => Shell::Fish,
            CompletionShell::PowerShell => Shell::PowerShell,
            CompletionShell::Elvish => Shell::Elvish,
        }
    }
}

/// Generate shell completions
fn cmd_completions(shell: CompletionShell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    let shell: Shell = shell.into();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    config.validate()?;
    Ok(config)
}

fn build_runtime(config: &Config) -> anyhow::Result<WorkflowRuntime> {
    let email = build_email_provider(&config.email)?;
    let handlers = HandlerRegistry::new(email);
    let substrate = LocalSubstrate::new(handlers, &config.substrate);
    Ok(WorkflowRuntime::new(Arc::new(substrate)).with_retention(&config.runtime))
}

// ============================================================================
// Workflow Commands
// ============================================================================

async fn cmd_run(
    config_path: Option<&Path>,
    file: &Path,
    overrides: &[String],
    decision: Option<&str>,
) -> anyhow::Result<()> {
    if !file.exists() {
        anyhow::bail!("File not found: {}", file.display());
    }

    let config = load_config(config_path)?;
    let mut workflow = parse_workflow_file(file)?;
    workflow.merge_input_values(parse_overrides(overrides)?);

    let runtime = build_runtime(&config)?;
    let instance_id = runtime.start(workflow).await?;
    let instance = runtime.instance(&instance_id).await?;
    eprintln!("Started {}", instance_id);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if instance.wait_for_decision_or_finish().await.is_finished() {
            break;
        }

        let answer = match decision {
            Some(d) => d.to_string(),
            None => {
                eprint!("Approval required for {}. Decision: ", instance_id);
                stdin
                    .next_line()
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("stdin closed before a decision"))?
            }
        };
        if let Err(e) = runtime.deliver_signal(&instance_id, &answer).await {
            eprintln!("{}", e);
        }
    }

    let run = instance.wait().await?;
    let tasks: Vec<_> = run
        .tasks
        .iter()
        .map(|t| {
            json!({
                "taskReferenceName": t.task_reference_name,
                "type": t.task_type,
                "status": t.status,
                "output": t.output.as_ref().map(|r| &r.output),
                "reason": t.reason,
            })
        })
        .collect();

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "instance_id": instance_id,
            "workflow": run.name,
            "visited": run.visited,
            "tasks": tasks,
            "output": run.output,
        }))?
    );

    let failed = run.failed_tasks();
    if !failed.is_empty() {
        eprintln!("Failed tasks: {}", failed.join(", "));
    }

    Ok(())
}

fn cmd_validate(file: &Path) -> anyhow::Result<()> {
    if !file.exists() {
        anyhow::bail!("File not found: {}", file.display());
    }

    let parser = DslParser::parse(&std::fs::read_to_string(file)?)?;
    let workflow = parser.definition();

    println!("✓ Workflow '{}' is valid", workflow.name);
    println!();
    println!("  Tasks: {}", parser.tasks().len());

    let mut registry = HandlerRegistry::new(Arc::new(ConsoleProvider::new()));
    registry.register(Arc::new(ApprovalHandler::new(HumanInLoopSignal::new())));
    let descriptions = registry.descriptions();
    for task in parser.tasks() {
        let kind = TaskKind::parse(&task.task_type);
        let description = descriptions
            .iter()
            .find(|(name, _)| name == kind.as_str())
            .map(|(_, d)| d.clone())
            .unwrap_or_else(|| format!("dispatched as {}", kind.activity_name()));
        println!("  - {} [{}]: {}", task.task_reference_name, kind, description);
    }

    let warnings = lint_workflow(workflow);
    if !warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &warnings {
            println!("  - {}", warning);
        }
    }

    Ok(())
}

// ============================================================================
// Server
// ============================================================================

async fn cmd_serve(config_path: Option<&Path>, port: Option<u16>) -> anyhow::Result<()> {
    use dslflow::api::{create_router, AppState};
    use dslflow::shutdown::ShutdownCoordinator;

    let config = load_config(config_path)?;
    let port = port.unwrap_or(config.server.port);

    let shutdown = ShutdownCoordinator::new();
    shutdown.start_signal_listener();

    let runtime = build_runtime(&config)?.with_shutdown(shutdown.clone());
    let app = create_router(AppState::new(runtime), config.server.max_concurrency);

    let addr = format!("{}:{}", config.server.host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("dslflow server running on http://{}", addr);
    println!();
    println!("API endpoints:");
    println!("  GET  /api/health");
    println!("  GET  /api/workflows");
    println!("  POST /api/workflows");
    println!("  GET  /api/workflows/{{id}}");
    println!("  POST /api/workflows/{{id}}/signal");
    println!();
    println!("Approval form: http://{}/", addr);
    println!();
    println!("Press Ctrl+C to stop");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait_for_shutdown().await })
        .await?;

    println!("Server stopped.");
    Ok(())
}
