pub mod agent_core;
pub mod backend;
pub mod config;
pub mod inference;
pub mod tools;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use agent_core::{Orchestrator, ToolDispatcher};
use backend::SqliteBackend;
use config::AppConfig;
use inference::InferenceClient;

/// Return the platform-standard data directory for the agent.
///
/// - macOS: `~/Library/Application Support/mediaplan-agent/`
/// - Windows: `{FOLDERID_RoamingAppData}\mediaplan-agent\`
/// - Linux: `$XDG_DATA_HOME/mediaplan-agent/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.mediaplan-agent/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("mediaplan-agent");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mediaplan-agent")
}

/// Build the dispatcher (with every media tool) and the orchestrator from
/// a loaded config.
pub fn build_orchestrator(
    config: &AppConfig,
    default_workspace: Option<PathBuf>,
) -> anyhow::Result<Orchestrator> {
    let backend = SqliteBackend::new(config.workspaces_dir())
        .with_default_workspace(default_workspace.or_else(|| config.workspace.default_workspace.clone()));

    let mut dispatcher = ToolDispatcher::new(Arc::new(backend), config.dispatch_settings());
    tools::register_media_tools(&mut dispatcher)?;

    let client = InferenceClient::from_config(config.models.clone())?;
    tracing::info!(
        model = %client.current_model_name(),
        tools = dispatcher.tool_names().len(),
        "orchestrator ready"
    );

    let mut orchestrator = Orchestrator::new(Arc::new(client), Arc::new(dispatcher))
        .with_max_tool_calls(config.agent.max_tool_calls_per_turn);
    if let Some(prompt) = config.system_prompt()? {
        orchestrator = orchestrator.with_system_prompt(prompt);
    }
    Ok(orchestrator)
}

// ─── Logging ────────────────────────────────────────────────────────────────

/// Initialize the tracing subscriber: structured logs in the data directory.
///
/// On each startup:
/// 1. Rotates existing logs (agent.log → agent.log.1 → .2 → .3, keeps last 3).
/// 2. Opens a fresh agent.log with a line-flushing writer for crash resilience.
/// 3. Logs a startup banner with the log path for discoverability.
///
/// `RUST_LOG` overrides the default filter. `debug` raises our own crate to
/// debug level; `json` switches to one JSON object per line.
pub fn init_tracing(debug: bool, json: bool) -> std::io::Result<PathBuf> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = data_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("agent.log");

    rotate_log_file(&log_path, 3);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    let writer = FlushingWriter::new(log_file);

    let default_filter = if debug {
        "mediaplan_agent=debug,warn"
    } else {
        "mediaplan_agent=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== mediaplan-agent starting ==="
    );
    Ok(log_path)
}

/// Rotate log files: `agent.log` → `agent.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write, so a
/// crash never loses the last log lines.
#[derive(Clone)]
struct FlushingWriter {
    file: Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
