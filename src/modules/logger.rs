use std::fs;
use std::io::Write;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "hook-gate.log";

// Local-timezone timestamps
struct LocalTimer;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().to_rfc3339())
    }
}

/// Flushes the file writer when dropped. Hold it until the process exits.
#[must_use]
pub struct LoggerGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber: console always, a daily rolling file under
/// `log_dir` when given and writable.
///
/// Filtering follows `RUST_LOG`, defaulting to `info`.
pub fn init_logger(log_dir: Option<&Path>) -> LoggerGuard {
    // Capture `log` crate records
    let _ = tracing_log::LogTracer::init();

    let file = log_dir.and_then(|dir| match open_log_writer(dir) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("{}; logging to console only", e);
            None
        }
    });
    let (writer, guard) = match file {
        Some((writer, guard)) => (Some(writer), Some(guard)),
        None => (None, None),
    };

    let file_layer = writer.map(|writer| {
        fmt::Layer::new()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_level(true)
            .with_timer(LocalTimer)
    });

    // Target shown: audit events are identified by it
    let console_layer = fmt::Layer::new()
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true)
        .with_timer(LocalTimer);

    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    match log_dir.filter(|_| guard.is_some()) {
        Some(dir) => tracing::info!("Logging to console and {}", dir.display()),
        None => tracing::info!("Logging to console"),
    }

    LoggerGuard { _file: guard }
}

/// Non-blocking writer over a daily rolling file in `dir`, creating the directory.
fn open_log_writer(dir: &Path) -> Result<(NonBlocking, WorkerGuard), String> {
    fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create log directory {}: {}", dir.display(), e))?;
    if !is_log_dir_writable(dir) {
        return Err(format!("Log directory {} is not writable", dir.display()));
    }
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    Ok(tracing_appender::non_blocking(appender))
}

fn is_log_dir_writable(dir: &Path) -> bool {
    let marker = dir.join(".write_test");
    let result = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&marker)
        .and_then(|mut f| f.write_all(b"ok"));

    if result.is_ok() {
        let _ = fs::remove_file(marker);
        true
    } else {
        false
    }
}
