//! CLI binary for running and inspecting Waypoint pipelines.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use waypoint_pipeline::{
    default_registry, Answer, AutoApproveInterviewer, CodergenConfig, ConsoleInterviewer,
    EngineConfig, FileBasedInterviewer, Interviewer, PipelineEngine, PipelineGraph, Severity,
};
use waypoint_types::StageStatus;

#[derive(Parser)]
#[command(name = "waypoint", version, about = "DOT-based pipeline runner for AI workflows")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline from a .dot file
    Run {
        /// Path to the pipeline .dot file
        pipeline: PathBuf,

        /// Working directory for agent tool execution
        #[arg(short, long)]
        workdir: Option<PathBuf>,

        /// Run directory holding logs/ and gates/
        #[arg(short, long, default_value = ".waypoint")]
        dir: PathBuf,

        /// Don't call LLM providers; codergen nodes succeed trivially
        #[arg(long)]
        dry_run: bool,

        /// Answer human gates automatically instead of via the file protocol
        #[arg(long)]
        auto_approve: bool,

        /// Answer human gates interactively on the console
        #[arg(long, conflicts_with = "auto_approve")]
        interactive: bool,

        /// Maximum node executions before aborting a runaway loop
        #[arg(long, default_value = "1000")]
        max_steps: u64,
    },

    /// Validate a pipeline .dot file
    Validate {
        /// Path to the pipeline .dot file
        pipeline: PathBuf,
    },

    /// Show information about a pipeline
    Info {
        /// Path to the pipeline .dot file
        pipeline: PathBuf,
    },

    /// Inspect and answer the pending human gate
    Gate {
        #[command(subcommand)]
        action: GateAction,
    },

    /// Summarize checkpoint and per-node status
    Status {
        /// Run directory holding logs/ and gates/
        #[arg(short, long, default_value = ".waypoint")]
        dir: PathBuf,
    },

    /// List or dump node artifacts
    Logs {
        /// Node id; omit to list all nodes
        node: Option<String>,

        /// Run directory holding logs/ and gates/
        #[arg(short, long, default_value = ".waypoint")]
        dir: PathBuf,
    },

    /// Serve the read-only dashboard over HTTP
    Web {
        /// Run directory holding logs/ and gates/
        #[arg(short, long, default_value = ".waypoint")]
        dir: PathBuf,

        /// Port to listen on
        #[arg(short, long, default_value = "7878")]
        port: u16,
    },
}

#[derive(Subcommand)]
enum GateAction {
    /// Print the pending gate question
    Show {
        #[arg(short, long, default_value = ".waypoint")]
        dir: PathBuf,
    },
    /// Answer the pending gate
    Answer {
        /// Free-text answer
        #[arg(long, default_value = "")]
        text: String,

        /// Canonical option to select
        #[arg(long)]
        option: Option<String>,

        #[arg(short, long, default_value = ".waypoint")]
        dir: PathBuf,
    },
    /// Wait for a gate to open and print it
    Watch {
        #[arg(short, long, default_value = ".waypoint")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            pipeline,
            workdir,
            dir,
            dry_run,
            auto_approve,
            interactive,
            max_steps,
        } => {
            let exit_code = cmd_run(
                &pipeline,
                workdir.as_deref(),
                &dir,
                dry_run,
                auto_approve,
                interactive,
                max_steps,
            )
            .await?;
            if exit_code != 0 {
                std::process::exit(exit_code);
            }
        }
        Commands::Validate { pipeline } => cmd_validate(&pipeline)?,
        Commands::Info { pipeline } => cmd_info(&pipeline)?,
        Commands::Gate { action } => match action {
            GateAction::Show { dir } => cmd_gate_show(&dir).await?,
            GateAction::Answer { text, option, dir } => {
                cmd_gate_answer(&dir, text, option).await?
            }
            GateAction::Watch { dir } => cmd_gate_watch(&dir).await?,
        },
        Commands::Status { dir } => cmd_status(&dir).await?,
        Commands::Logs { node, dir } => cmd_logs(node.as_deref(), &dir).await?,
        Commands::Web { dir, port } => {
            waypoint_web::serve(waypoint_web::DashboardState::for_working_dir(&dir), port).await?;
        }
    }

    Ok(())
}

fn load_pipeline(path: &Path) -> anyhow::Result<PipelineGraph> {
    let source = std::fs::read_to_string(path)?;
    let dot = waypoint_dot::parse(&source)?;
    Ok(PipelineGraph::from_dot(dot)?)
}

fn dashboard_state(dir: &Path) -> waypoint_web::DashboardState {
    waypoint_web::DashboardState::for_working_dir(dir)
}

fn cmd_validate(path: &Path) -> anyhow::Result<()> {
    let graph = load_pipeline(path)?;
    let diagnostics = waypoint_pipeline::validate(&graph);

    if diagnostics.is_empty() {
        println!("Pipeline is valid");
        return Ok(());
    }

    let mut has_error = false;
    for diag in &diagnostics {
        let severity = match diag.severity {
            Severity::Error => {
                has_error = true;
                "ERROR"
            }
            Severity::Warning => "WARN",
            Severity::Info => "INFO",
        };
        println!("[{}] {}: {}", severity, diag.rule, diag.message);
    }

    if has_error {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_info(path: &Path) -> anyhow::Result<()> {
    let graph = load_pipeline(path)?;

    println!("Pipeline: {}", graph.name);
    if !graph.goal.is_empty() {
        println!("Goal: {}", graph.goal);
    }

    println!("Nodes: {}", graph.all_nodes().count());
    println!("Edges: {}", graph.all_edges().len());

    if let Some(start) = graph.start_node() {
        println!("Start: {} ({})", start.id, start.label);
    }
    if let Some(exit) = graph.exit_node() {
        println!("Exit: {} ({})", exit.id, exit.label);
    }

    let mut nodes: Vec<_> = graph.all_nodes().collect();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    println!("\nNodes:");
    for node in nodes {
        let node_type = node.node_type.as_deref().unwrap_or("(default)");
        println!(
            "  {} [{}] shape={} type={}",
            node.id, node.label, node.shape, node_type
        );
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_run(
    path: &Path,
    workdir: Option<&Path>,
    dir: &Path,
    dry_run: bool,
    auto_approve: bool,
    interactive: bool,
    max_steps: u64,
) -> anyhow::Result<i32> {
    let graph = load_pipeline(path)?;

    println!("Running pipeline: {}", graph.name);
    if !graph.goal.is_empty() {
        println!("Goal: {}", graph.goal);
    }

    let logs_root = dir.join("logs");
    let gates_root = dir.join("gates");

    let mut initial_context = HashMap::new();
    let workspace = match workdir {
        Some(d) => {
            let abs = std::fs::canonicalize(d)?;
            println!("Working directory: {}", abs.display());
            initial_context.insert("workdir".to_string(), abs.display().to_string());
            abs
        }
        None => std::env::current_dir()?,
    };
    if dry_run {
        println!("(dry run mode -- no LLM calls)");
        initial_context.insert("dry_run".to_string(), "true".to_string());
    } else {
        let detected = waypoint_llm::detect_api_keys();
        println!(
            "Note: no provider adapters are compiled into this binary; codergen nodes \
             will fail without one (API keys detected for: {}). Use --dry-run to \
             exercise the pipeline without LLM calls.",
            if detected.is_empty() {
                "none".to_string()
            } else {
                detected.join(", ")
            }
        );
    }

    let client = Arc::new(waypoint_llm::LlmClient::new());
    let codergen = CodergenConfig {
        workspace,
        ..Default::default()
    };
    let interviewer: Arc<dyn Interviewer> = if auto_approve {
        Arc::new(AutoApproveInterviewer)
    } else if interactive {
        Arc::new(ConsoleInterviewer)
    } else {
        println!("Human gates use the file protocol under {}", gates_root.display());
        Arc::new(FileBasedInterviewer::new(&gates_root))
    };

    let registry = default_registry(client, codergen, interviewer);
    let engine = PipelineEngine::new(
        registry,
        EngineConfig {
            logs_root: logs_root.clone(),
            max_steps,
            initial_context,
            ..Default::default()
        },
    );

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling run");
            ctrl_c_token.cancel();
        }
    });

    // Progress feed from the engine's event bus
    let mut events = engine.events().subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                waypoint_pipeline::PipelineEvent::StageStarted {
                    node_id,
                    handler_type,
                } => println!("  -> {} ({})", node_id, handler_type),
                waypoint_pipeline::PipelineEvent::StageCompleted {
                    node_id, status, ..
                } => println!("  <- {} [{}]", node_id, status),
                waypoint_pipeline::PipelineEvent::StageRetrying { node_id, attempt } => {
                    println!("  .. retrying {} (attempt {})", node_id, attempt)
                }
                _ => {}
            }
        }
    });

    let result = engine.run(graph, &cancel).await;
    progress.abort();

    match result {
        Ok(result) => {
            println!("\nPipeline finished: {}", result.status.as_str());
            println!("Completed nodes: {:?}", result.completed_nodes);
            for (node_id, outcome) in &result.node_outcomes {
                if !outcome.notes.is_empty() {
                    let first_line = outcome.notes.lines().next().unwrap_or("");
                    println!("  {}: {}", node_id, first_line);
                }
            }
            Ok(if result.status == StageStatus::Success {
                0
            } else {
                1
            })
        }
        Err(e) => {
            eprintln!("\nPipeline error: {}", e);
            Ok(1)
        }
    }
}

async fn cmd_gate_show(dir: &Path) -> anyhow::Result<()> {
    match waypoint_web::pending_gate(&dashboard_state(dir)).await {
        Some(gate) => {
            println!("Gate: {}", gate.gate_id);
            println!("{}", gate.text);
            for (i, option) in gate.options.iter().enumerate() {
                println!("  [{}] {}", i + 1, option);
            }
        }
        None => println!("No pending gate"),
    }
    Ok(())
}

async fn cmd_gate_answer(dir: &Path, text: String, option: Option<String>) -> anyhow::Result<()> {
    let answer = match option {
        Some(option) => Answer {
            text: if text.is_empty() { option.clone() } else { text },
            selected_options: vec![option],
        },
        None => Answer {
            text,
            selected_options: vec![],
        },
    };
    let gate_id = waypoint_web::answer_pending_gate(&dashboard_state(dir), &answer).await?;
    println!("Answered {}", gate_id);
    Ok(())
}

async fn cmd_gate_watch(dir: &Path) -> anyhow::Result<()> {
    let state = dashboard_state(dir);
    let mut last_seen: Option<String> = None;
    println!("Watching for gates (ctrl-c to stop)...");
    loop {
        if let Some(gate) = waypoint_web::pending_gate(&state).await {
            if last_seen.as_deref() != Some(gate.gate_id.as_str()) {
                println!("\nGate: {}", gate.gate_id);
                println!("{}", gate.text);
                for (i, option) in gate.options.iter().enumerate() {
                    println!("  [{}] {}", i + 1, option);
                }
                last_seen = Some(gate.gate_id.clone());
            }
        }
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }
}

async fn cmd_status(dir: &Path) -> anyhow::Result<()> {
    let logs_root = dir.join("logs");

    match waypoint_pipeline::load_checkpoint(&logs_root).await? {
        Some(cp) => {
            println!("Current node: {}", cp.current_node_id);
            println!("Completed: {:?}", cp.completed_nodes);
            if !cp.retry_counts.is_empty() {
                println!("Retries: {:?}", cp.retry_counts);
            }
        }
        None => println!("No checkpoint found in {}", logs_root.display()),
    }

    if let Some(result) = waypoint_pipeline::read_result(&logs_root).await {
        println!(
            "Result: {} (finished {})",
            result.status.as_str(),
            result.finished
        );
    }

    let state = waypoint_web::run_state(&dashboard_state(dir)).await;
    if let Some(nodes) = state.get("nodes").and_then(|n| n.as_array()) {
        if !nodes.is_empty() {
            println!("\nNode statuses:");
            for node in nodes {
                println!(
                    "  {} [{}]",
                    node.get("node_id").and_then(|v| v.as_str()).unwrap_or("?"),
                    node.get("status").and_then(|v| v.as_str()).unwrap_or("?"),
                );
            }
        }
    }

    Ok(())
}

async fn cmd_logs(node: Option<&str>, dir: &Path) -> anyhow::Result<()> {
    let state = dashboard_state(dir);
    match node {
        None => {
            let logs_root = dir.join("logs");
            let mut entries = match tokio::fs::read_dir(&logs_root).await {
                Ok(entries) => entries,
                Err(_) => {
                    println!("No logs found in {}", logs_root.display());
                    return Ok(());
                }
            };
            let mut nodes = Vec::new();
            while let Ok(Some(entry)) = entries.next_entry().await {
                if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                    nodes.push(entry.file_name().to_string_lossy().to_string());
                }
            }
            nodes.sort();
            for node in nodes {
                let files = waypoint_web::node_artifacts(&state, &node).await;
                println!("{}: {}", node, files.join(", "));
            }
        }
        Some(node) => {
            let files = waypoint_web::node_artifacts(&state, node).await;
            if files.is_empty() {
                println!("No artifacts for node '{}'", node);
                return Ok(());
            }
            for file in files {
                let path = dir.join("logs").join(node).join(&file);
                println!("===== {} =====", file);
                match tokio::fs::read_to_string(&path).await {
                    Ok(content) => println!("{}", content),
                    Err(e) => println!("(unreadable: {})", e),
                }
            }
        }
    }
    Ok(())
}
