//! Tracing setup and crash reporting.
//!
//! Log lines go to the `--log` file through a shared, line-buffered
//! writer. `RUST_LOG` overrides the configured level.

use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::error;
use tracing_subscriber::EnvFilter;

type SharedFile = Arc<Mutex<LineWriter<File>>>;

/// Writer handed to the fmt layer for each event.
struct SharedWriter(SharedFile);

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).flush()
    }
}

/// Flushes the log file when dropped.
pub struct LogGuard {
    file: SharedFile,
}

impl LogGuard {
    pub fn flush(&self) {
        let _ = self
            .file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush();
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        self.flush();
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global subscriber writing to `path`.
pub fn init(path: &Path, level: &str) -> io::Result<LogGuard> {
    let file: SharedFile = Arc::new(Mutex::new(LineWriter::new(open_append(path)?)));

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let writer_file = Arc::clone(&file);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_thread_names(true)
        .with_writer(move || SharedWriter(Arc::clone(&writer_file)))
        .init();

    Ok(LogGuard { file })
}

// ── Crash hook ───────────────────────────────────────────────────

/// Append every panic to `crash_path` and log it before the default
/// hook runs.
pub fn install_crash_hook(crash_path: PathBuf) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let thread = std::thread::current();
        let thread = thread.name().unwrap_or("<unnamed>");
        error!(thread, "panic: {info}");
        if let Ok(mut file) = open_append(&crash_path) {
            let _ = writeln!(file, "{}", crash_line(thread, &info.to_string()));
        }
        default_hook(info);
    }));
}

fn crash_line(thread: &str, message: &str) -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("[{secs}] thread '{thread}' {message}")
}
