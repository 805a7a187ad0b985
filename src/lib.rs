pub mod agent_core;
pub mod inference;

use std::path::{Path, PathBuf};

pub use agent_core::{
    AgentError, AgentLoop, Conversation, LoopConfig, RunOutcome, RunStatus, ToolRegistry,
    ToolTable, UiSink,
};
pub use inference::{InferenceError, LlmProvider};

/// Return the platform-standard data directory for the engine.
///
/// - macOS: `~/Library/Application Support/agent-engine/`
/// - Windows: `{FOLDERID_RoamingAppData}\agent-engine\`
/// - Linux: `$XDG_DATA_HOME/agent-engine/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.agent-engine/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("agent-engine");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".agent-engine")
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Initialize the tracing subscriber — writes structured logs to `log_dir`
/// (the data directory when `None`) and returns the log file path.
///
/// On each call:
/// 1. Rotates existing logs (agent.log → agent.log.1 → .2 → .3, keeps last 3).
/// 2. Opens a fresh agent.log with a line-flushing writer for crash resilience.
/// 3. Logs a startup banner with the log path for discoverability.
///
/// The filter comes from `RUST_LOG`, defaulting to `agent_engine=info,warn`.
pub fn init_tracing(log_dir: Option<&Path>, format: LogFormat) -> Result<PathBuf, AgentError> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = log_dir.map(Path::to_path_buf).unwrap_or_else(data_dir);
    let log_path = open_log_dir(&log_dir)?;
    let writer = FlushingWriter::open(&log_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("agent_engine=info,warn"));

    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false);

    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| AgentError::LoggingError {
        reason: format!("failed to install subscriber: {e}"),
    })?;

    // Startup banner — makes it easy to find the right log file
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== agent engine starting ==="
    );

    Ok(log_path)
}

/// Create the log directory and rotate any previous `agent.log`.
fn open_log_dir(log_dir: &Path) -> Result<PathBuf, AgentError> {
    std::fs::create_dir_all(log_dir).map_err(|e| AgentError::LoggingError {
        reason: format!("failed to create {}: {e}", log_dir.display()),
    })?;

    let log_path = log_dir.join("agent.log");
    rotate_log_file(&log_path, 3);
    Ok(log_path)
}

/// Rotate log files: `agent.log` → `agent.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    // Delete the oldest
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    // Shift: .{n-1} → .{n}
    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    // Current → .1
    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write.
///
/// Without explicit flushing, log entries may sit in OS buffers and be lost
/// on crash. This wrapper ensures each log line is on disk immediately.
#[derive(Clone)]
struct FlushingWriter {
    file: std::sync::Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn open(path: &Path) -> Result<Self, AgentError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| AgentError::LoggingError {
                reason: format!("failed to open {}: {e}", path.display()),
            })?;
        Ok(Self {
            file: std::sync::Arc::new(std::sync::Mutex::new(file)),
        })
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self.file.lock().map_err(|e| {
            std::io::Error::other(format!("lock poisoned: {e}"))
        })?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self.file.lock().map_err(|e| {
            std::io::Error::other(format!("lock poisoned: {e}"))
        })?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_rotate_shifts_and_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("agent.log");
        std::fs::write(&base, "current").unwrap();
        std::fs::write(dir.path().join("agent.log.1"), "one").unwrap();
        std::fs::write(dir.path().join("agent.log.2"), "two").unwrap();
        std::fs::write(dir.path().join("agent.log.3"), "three").unwrap();

        rotate_log_file(&base, 3);

        assert!(!base.exists());
        let read = |name: &str| std::fs::read_to_string(dir.path().join(name)).unwrap();
        assert_eq!(read("agent.log.1"), "current");
        assert_eq!(read("agent.log.2"), "one");
        assert_eq!(read("agent.log.3"), "two");
    }

    #[test]
    fn test_rotate_with_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("agent.log");
        std::fs::write(&base, "current").unwrap();

        rotate_log_file(&base, 3);

        assert!(dir.path().join("agent.log.1").exists());
        assert!(!dir.path().join("agent.log.2").exists());
    }

    #[test]
    fn test_open_log_dir_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs/engine");
        let path = open_log_dir(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(path, nested.join("agent.log"));
    }

    #[test]
    fn test_flushing_writer_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.log");
        let mut writer = FlushingWriter::open(&path).unwrap();
        writer.write_all(b"line one\n").unwrap();
        let mut clone = writer.clone();
        clone.write_all(b"line two\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line one\nline two\n");
    }

    #[test]
    fn test_data_dir_is_app_specific() {
        let dir = data_dir();
        let name = dir.file_name().and_then(|n| n.to_str()).unwrap();
        assert!(name == "agent-engine" || name == ".agent-engine");
    }
}
