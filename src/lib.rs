//! Expense assistant: answers questions about a user's expenses by letting a
//! language model call read-only data tools.
//!
//! - `inference`: completion endpoint client and wire types
//! - `agent_core`: tool registry, dispatcher, and the orchestration loop
//! - `store`: SQLite expense store and saved-query log
//! - `commands`: caller-facing operations used by the binary

pub mod agent_core;
pub mod commands;
pub mod inference;
pub mod store;

/// Return the platform-standard data directory for the assistant.
///
/// - macOS: `~/Library/Application Support/expense-assistant/`
/// - Windows: `{FOLDERID_RoamingAppData}\expense-assistant\`
/// - Linux: `$XDG_DATA_HOME/expense-assistant/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.expense-assistant/` only if none of the above can be resolved.
pub fn data_dir() -> std::path::PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("expense-assistant");
    }
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".expense-assistant")
}

/// Number of older log files kept next to the live one.
const KEEP_LOG_FILES: u32 = 3;

/// Initialize the tracing subscriber, writing structured logs to the data directory.
///
/// Each startup shifts older logs one generation back (`assistant.log.1` is
/// the previous run), opens a fresh `assistant.log`, and logs a banner.
/// Every event is written straight to the unbuffered file, so a killed
/// process loses nothing already logged.
///
/// Returns the log file path.
pub fn init_tracing() -> std::io::Result<std::path::PathBuf> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = data_dir();
    std::fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join("assistant.log");
    shift_log_generations(&log_path, KEEP_LOG_FILES)?;
    let log_file = std::fs::File::create(&log_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("expense_assistant=info,warn"));

    fmt::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %log_dir.display(),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== expense-assistant starting ==="
    );

    Ok(log_path)
}

/// Path of generation `n` of a log file: `assistant.log` → `assistant.log.{n}`.
fn generation_path(base: &std::path::Path, n: u32) -> std::path::PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(format!(".{n}"));
    std::path::PathBuf::from(name)
}

/// Move `base` to generation 1 and every older generation one step back,
/// dropping whatever falls past `keep`. Gaps in the chain are fine.
fn shift_log_generations(base: &std::path::Path, keep: u32) -> std::io::Result<()> {
    for n in (1..=keep).rev() {
        let from = if n == 1 {
            base.to_path_buf()
        } else {
            generation_path(base, n - 1)
        };
        match std::fs::rename(&from, generation_path(base, n)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
