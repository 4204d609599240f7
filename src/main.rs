mod doctor;

use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use canvasflow_core::config::AppConfig;
use canvasflow_core::event::EventBus;
use canvasflow_core::route::RouteTarget;
use canvasflow_core::state::SessionRequest;
use canvasflow_core::types::SessionId;

use canvasflow_graph::{EdgeTable, GraphExecutor, NodeRegistry, RunLogger};

#[derive(Parser)]
#[command(name = "canvasflow", version, about = "Open canvas graph orchestration")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "canvasflow.toml")]
    config: PathBuf,

    /// Session ID (auto-generated if not provided)
    #[arg(short, long)]
    session: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dry-run a traversal with pass-through nodes
    Run {
        /// JSON session request (reads stdin when omitted)
        #[arg(long)]
        state: Option<PathBuf>,
    },
    /// Print the static path for a route target
    Plan {
        /// Route target name, e.g. generateArtifact
        target: String,
    },
    /// Print the edge table
    Topology {
        /// Emit Graphviz dot instead of plain text
        #[arg(long)]
        dot: bool,
    },
    /// Show current configuration
    Config,
    /// Run graph and config health checks
    Check,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("CANVASFLOW_LOG")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("canvasflow=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "canvasflow", &mut io::stdout());
        return Ok(());
    }

    let config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Run { state } => {
            let session_id = cli
                .session
                .as_deref()
                .map(SessionId::from_str)
                .unwrap_or_default();
            run_dry(&config, session_id, state).await?;
        }
        Commands::Plan { target } => {
            let target: RouteTarget = target.parse()?;
            let path = EdgeTable::plan(target)
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join(" -> ");
            println!("{}", path);
        }
        Commands::Topology { dot } => {
            if dot {
                println!("{}", EdgeTable::render_dot(&config.graph.run_name));
            } else {
                println!("{}", EdgeTable::render_text());
            }
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Check => {
            println!("canvasflow check");
            println!("================");
            let issues = doctor::run_doctor(&config);
            if issues > 0 {
                anyhow::bail!("{} health check(s) failed", issues);
            }
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

/// Execute one traversal with every node passing state through unchanged.
async fn run_dry(
    config: &AppConfig,
    session_id: SessionId,
    state_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let raw = match state_file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let request: SessionRequest = serde_json::from_str(&raw).context("parsing session request")?;
    let initial = request.into_state(&config.generation)?;

    let registry = NodeRegistry::pass_through(config.defaults.clone());
    let mut executor = GraphExecutor::from_config(registry, config)?;

    let mut logger = None;
    if let Some(log_dir) = config.log_dir() {
        let event_bus = Arc::new(EventBus::default());
        executor = executor.with_event_bus(event_bus.clone());
        let run_logger = RunLogger::new(log_dir, config.log_level());
        let handle = tokio::spawn(run_logger.run(
            event_bus.clone(),
            session_id.clone(),
            executor.cancel_token(),
        ));
        // The logger subscribes when first polled.
        while event_bus.receiver_count() == 0 && !handle.is_finished() {
            tokio::task::yield_now().await;
        }
        logger = Some(handle);
    }

    let cancel = executor.cancel_token();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        warn!("Interrupted, cancelling traversal");
        cancel.cancel();
    });

    let result = executor.run_session(session_id, initial).await;

    if let Some(handle) = logger {
        if let Ok(Some(path)) = handle.await {
            info!(path = %path.display(), "Run log written");
        }
    }

    let result = result?;
    let path = result
        .path
        .iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ");
    println!("path: {}", path);
    println!("{}", serde_json::to_string_pretty(&result.state)?);
    Ok(())
}
