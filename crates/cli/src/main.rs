mod render;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use agent_client::{EchoAgent, HttpAgentClient};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use futures::StreamExt;
use orchestrator::{
    list_runs, read_events, read_report, OrchestratorError, Pipeline, ProjectConfig, RunMonitor,
    CONFIG_DIR, CONFIG_FILE, ENDPOINT_ENV,
};
use sowcrew_core::{AgentRuntime, RunId};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sowcrew")]
#[command(about = "Run a statement of work through a crew of AI agent roles", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory holding .sowcrew/
    #[arg(short = 'C', long, global = true)]
    project: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write .sowcrew/config.toml with a starter role set
    Init,
    /// Show the tasks a document yields and the role each goes to
    Plan { document: PathBuf },
    /// Execute a document's tasks
    Run {
        document: PathBuf,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Use the built-in echo agent instead of the configured endpoint
        #[arg(long)]
        offline: bool,

        #[arg(long)]
        concurrency: Option<usize>,

        #[arg(long)]
        max_retries: Option<u32>,
    },
    /// List past runs
    Runs,
    /// Print the event log of a run
    Show {
        run_id: String,

        /// Number of trailing events to print
        #[arg(long)]
        tail: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing();

    let project = match cli.project {
        Some(path) => path,
        None => std::env::current_dir()?,
    };

    match cli.command {
        Commands::Init => init_project(&project).await,
        Commands::Plan { document } => plan(&project, &document).await,
        Commands::Run {
            document,
            yes,
            offline,
            concurrency,
            max_retries,
        } => {
            let options = RunOptions {
                yes,
                offline,
                concurrency,
                max_retries,
            };
            run(&project, &document, options).await
        }
        Commands::Runs => runs(&project).await,
        Commands::Show { run_id, tail } => show(&project, &run_id, tail).await,
    }
}

struct RunOptions {
    yes: bool,
    offline: bool,
    concurrency: Option<usize>,
    max_retries: Option<u32>,
}

async fn init_project(project: &Path) -> Result<ExitCode> {
    let config_path = ProjectConfig::path(project);

    if config_path.exists() {
        println!("Project already initialized at {}", config_path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let config = ProjectConfig::with_default_roles();
    config
        .write(project)
        .await
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    println!("Initialized sowcrew in {}", project.display());
    println!();
    println!("Created:");
    println!("  {}/", CONFIG_DIR);
    println!("  └── {}", CONFIG_FILE);
    println!();
    println!("Roles: {}", config.roles.iter().map(|r| r.name.as_str()).collect::<Vec<_>>().join(", "));
    println!();
    println!("Next steps:");
    println!("  1. Set [agent].endpoint in the config or export {}", ENDPOINT_ENV);
    println!("  2. Run 'sowcrew plan <document>' to preview the tasks");

    Ok(ExitCode::SUCCESS)
}

async fn plan(project: &Path, document: &Path) -> Result<ExitCode> {
    let config = ProjectConfig::read(project).await;
    let pipeline = build_pipeline(project, &config, Arc::new(EchoAgent)).await?;
    let text = read_document(document).await?;

    let plan = pipeline.plan(&text)?;
    render::print_plan(&plan);

    Ok(ExitCode::SUCCESS)
}

async fn run(project: &Path, document: &Path, options: RunOptions) -> Result<ExitCode> {
    let mut config = ProjectConfig::read(project).await;
    if let Some(n) = options.concurrency {
        config.execution.max_concurrency = n;
    }
    if let Some(n) = options.max_retries {
        config.execution.max_retries = n;
    }

    let runtime = agent_runtime(&config, options.offline)?;
    let runtime_name = runtime.name().to_string();
    let pipeline = build_pipeline(project, &config, runtime).await?;
    let text = read_document(document).await?;

    // A document without tasks goes straight to the run, which records the
    // abort in the run log.
    if let Ok(plan) = pipeline.plan(&text) {
        render::print_plan(&plan);
        println!();

        let question = format!("Run {} tasks with the {} agent?", plan.entries.len(), runtime_name);
        if !options.yes && !confirm(&question)? {
            println!("Aborted.");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let mut feed = Box::pin(pipeline.event_bus().stream());
    let printer = tokio::spawn(async move {
        while let Some(envelope) = feed.next().await {
            println!("{}", render::event_line(&envelope));
        }
    });

    let token = pipeline.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Cancelling run...".yellow());
            token.cancel();
        }
    });

    let outcome = pipeline.run(&text).await;
    interrupt.abort();

    let report = match outcome {
        Ok(report) => report,
        Err(OrchestratorError::Parse(e)) => {
            drop(pipeline);
            let _ = printer.await;
            eprintln!("{}", e.to_string().red());
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e).context("Run failed"),
    };

    let run_dir = pipeline.run_dir(&report.run_id);
    drop(pipeline);
    let _ = printer.await;

    println!();
    render::print_tasks(&report.tasks);
    println!();
    render::print_summary(&report.summary);
    println!("Run log: {}", run_dir.display());

    if report.summary.failed > 0 || report.summary.cancelled {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

async fn runs(project: &Path) -> Result<ExitCode> {
    let config = ProjectConfig::read(project).await;
    let root = config.logs_dir(project);
    let listings = list_runs(&root)
        .await
        .with_context(|| format!("Failed to list runs in {}", root.display()))?;

    if listings.is_empty() {
        println!("No runs yet.");
        return Ok(ExitCode::SUCCESS);
    }

    println!("Runs ({}):", listings.len());
    for listing in &listings {
        match listing.summary {
            Some(ref summary) => println!("  {}  {}", listing.run_id.to_string().bold(), summary),
            None => println!("  {}  {}", listing.run_id.to_string().bold(), "(no summary)".dimmed()),
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn show(project: &Path, run_id: &str, tail: Option<usize>) -> Result<ExitCode> {
    let config = ProjectConfig::read(project).await;
    let root = config.logs_dir(project);
    let run_id = RunId::from(run_id);

    let events = read_events(&root, &run_id)
        .await
        .with_context(|| format!("No readable event log for run {}", run_id))?;

    let monitor = RunMonitor::new(tail.unwrap_or(config.logging.recent_lines));
    for envelope in &events {
        monitor.apply(envelope);
    }

    println!("Run {}", run_id.to_string().bold());
    println!();
    render::print_snapshot(&monitor.snapshot());

    if let Some(report) = read_report(&root, &run_id).await? {
        println!();
        render::print_summary(&report.summary);
    }

    Ok(ExitCode::SUCCESS)
}

async fn build_pipeline(
    project: &Path,
    config: &ProjectConfig,
    runtime: Arc<dyn AgentRuntime>,
) -> Result<Pipeline> {
    let roles = config
        .load_roles(project)
        .await
        .context("Failed to load roles")?;

    Ok(Pipeline::new(runtime, roles, config.logs_dir(project))
        .with_parser_config(config.parser.clone())
        .with_coordinator_config(config.coordinator_config()))
}

fn agent_runtime(config: &ProjectConfig, offline: bool) -> Result<Arc<dyn AgentRuntime>> {
    if offline {
        return Ok(Arc::new(EchoAgent));
    }

    let Some(endpoint) = config.agent_endpoint() else {
        bail!(
            "No agent endpoint configured. Set [agent].endpoint in {}/{}, export {}, or pass --offline",
            CONFIG_DIR,
            CONFIG_FILE,
            ENDPOINT_ENV
        );
    };

    let timeout = Duration::from_secs(config.agent.timeout_secs.max(1));
    let mut client = HttpAgentClient::with_timeout(endpoint, timeout)?;
    if let Some(token) = config.agent_token() {
        client = client.with_token(token);
    }
    tracing::info!(endpoint = %client.endpoint(), "Using HTTP agent");

    Ok(Arc::new(client))
}

async fn read_document(path: &Path) -> Result<String> {
    documents::extract_path(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "sowcrew=info,orchestrator=info,agent_client=info,documents=info".into()
            }),
        )
        .init();
}
