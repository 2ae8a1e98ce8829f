use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use mediaplan_agent::agent_core::{DispatchSettings, Session, Signal, ToolDispatcher, TurnOutcome};
use mediaplan_agent::backend::SqliteBackend;
use mediaplan_agent::config::{find_config_path, load_config};
use mediaplan_agent::{build_orchestrator, data_dir, init_tracing, tools};

#[derive(Debug, Parser)]
#[command(name = "mediaplan-agent", version, about = "Conversational media-plan assistant")]
struct Cli {
    /// Path to mediaplan-agent.yaml (default: MEDIAPLAN_AGENT_ROOT, then upward search)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Workspace directory to load at startup
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,
    /// Debug-level logging for this crate
    #[arg(long, global = true)]
    debug: bool,
    /// Write logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive chat (default)
    Chat,
    /// Print the tool definitions sent to the model
    Tools,
    /// Create an empty workspace
    InitWorkspace {
        dir: PathBuf,
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_path = init_tracing(cli.debug, cli.log_json).context("failed to initialize logging")?;

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => chat(cli.config, cli.workspace, &log_path).await,
        Command::Tools => print_tools(),
        Command::InitWorkspace { dir, name } => {
            let workspace = SqliteBackend::init_workspace(&dir, &name)?;
            println!("{}", serde_json::to_string_pretty(&workspace)?);
            Ok(())
        }
    }
}

fn print_tools() -> anyhow::Result<()> {
    let backend = SqliteBackend::new(data_dir().join("workspaces"));
    let mut dispatcher = ToolDispatcher::new(Arc::new(backend), DispatchSettings::default());
    tools::register_media_tools(&mut dispatcher)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&dispatcher.tool_definitions())?
    );
    Ok(())
}

// ─── Chat REPL ──────────────────────────────────────────────────────────────

async fn chat(
    config_path: Option<PathBuf>,
    workspace: Option<PathBuf>,
    log_path: &Path,
) -> anyhow::Result<()> {
    let config_path = match config_path {
        Some(p) => p,
        None => find_config_path(&std::env::current_dir()?)?,
    };
    let config = load_config(&config_path)?;
    let orchestrator = build_orchestrator(&config, workspace.clone())?;

    let mut session = Session::new();
    tracing::info!(session = %session.id(), config = %config_path.display(), "session started");

    // An explicit --workspace wins over the environment and config defaults
    let load_args = match &workspace {
        Some(dir) => serde_json::json!({ "workspace_path": dir.display().to_string() }),
        None => serde_json::json!({}),
    };
    match orchestrator
        .dispatcher()
        .dispatch(&mut session, "load_workspace", &load_args)
        .await
    {
        Ok(loaded) => println!("{}", loaded["message"].as_str().unwrap_or_default()),
        Err(e) if workspace.is_some() => eprintln!("warning: {e}"),
        Err(_) => println!("No default workspace; ask the assistant to load one."),
    }

    println!("Media planning assistant. Type 'exit' to quit. Logs: {}", log_path.display());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let Some(line) = prompt(&mut lines, "> ").await? else {
            break;
        };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if matches!(message, "exit" | "quit") {
            break;
        }

        let mut result = orchestrator.run_turn(&mut session, message).await;
        loop {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    eprintln!("error [{}]: {e}", e.kind().as_str());
                    break;
                }
            };
            println!("\n{}\n", outcome.reply);

            let Some(signal) = ask_confirmation(&mut lines, &outcome).await? else {
                break;
            };
            result = orchestrator.resolve_confirmation(&mut session, signal).await;
        }
    }

    let summary = session.summary();
    tracing::info!(
        session = %summary.session_id,
        turns = summary.conversation_turns,
        tool_calls = summary.tool_calls,
        "session ended"
    );
    Ok(())
}

/// Ask an explicit y/N question when a deletion is waiting. Anything but
/// `y`/`yes` is a rejection.
async fn ask_confirmation(
    lines: &mut Lines<BufReader<Stdin>>,
    outcome: &TurnOutcome,
) -> anyhow::Result<Option<Signal>> {
    let Some(target) = &outcome.pending_confirmation else {
        return Ok(None);
    };
    let answer = prompt(lines, &format!("Delete media plan '{target}'? [y/N] ")).await?;
    let affirmed = answer
        .map(|a| matches!(a.trim().to_lowercase().as_str(), "y" | "yes"))
        .unwrap_or(false);
    Ok(Some(if affirmed { Signal::Affirm } else { Signal::Reject }))
}

async fn prompt(
    lines: &mut Lines<BufReader<Stdin>>,
    text: &str,
) -> anyhow::Result<Option<String>> {
    print!("{text}");
    std::io::stdout().flush()?;
    Ok(lines.next_line().await?)
}

