//! Logging system initialization
//!
//! Sets up the tracing subscriber from the `[logging]` section: level filter,
//! text or JSON format, and console or file output with daily rotation.

use crate::config::StaticConfig;
use tracing_appender::rolling;

type LogWriter = Box<dyn std::io::Write + Send + Sync>;

fn build_writer(config: &StaticConfig) -> LogWriter {
    let Some(log_file) = config.logging.file.as_deref().filter(|f| !f.is_empty()) else {
        return Box::new(std::io::stdout());
    };

    let path = std::path::Path::new(log_file);
    if config.logging.enable_rotation {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(std::path::Path::new("."));
        let filename = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("visitor-relay.log");
        match rolling::Builder::new()
            .rotation(rolling::Rotation::DAILY)
            .filename_prefix(filename.trim_end_matches(".log"))
            .filename_suffix("log")
            .max_log_files(config.logging.max_backups.max(1) as usize)
            .build(dir)
        {
            Ok(appender) => Box::new(appender),
            Err(e) => {
                eprintln!("[ERROR] Failed to create rolling log appender: {}", e);
                Box::new(std::io::stdout())
            }
        }
    } else {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
        {
            Ok(file) => Box::new(file),
            Err(e) => {
                eprintln!("[ERROR] Failed to open log file {}: {}", log_file, e);
                Box::new(std::io::stdout())
            }
        }
    }
}

/// Initialize logging system based on configuration
///
/// Must be called once during startup. The returned `WorkerGuard` has to
/// stay alive for the lifetime of the program so buffered lines are flushed.
pub fn init_logging(config: &StaticConfig) -> tracing_appender::non_blocking::WorkerGuard {
    let to_console = config.logging.file.as_ref().is_none_or(|f| f.is_empty());
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(build_writer(config));
    let filter = tracing_subscriber::EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let subscriber_builder = tracing_subscriber::fmt()
        .with_writer(non_blocking_writer)
        .with_env_filter(filter)
        .with_level(true)
        .with_ansi(to_console);

    let result = if config.logging.format == "json" {
        subscriber_builder.json().try_init()
    } else {
        subscriber_builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("[WARN] Logging already initialized: {}", e);
    }

    guard
}
