use crate::config::Config;
use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing_subscriber::{
    fmt::writer::{BoxMakeWriter, MakeWriterExt},
    EnvFilter,
};

const LEVEL_ENV: &str = "AGENT_CANVAS_LOG_LEVEL";

/// Installs the global subscriber. Output always goes to stdout and, when a
/// log directory is configured, is teed into a per-listener file whose path is
/// returned.
pub fn init_logging(config: &Config) -> Option<PathBuf> {
    let level = default_level(std::env::var(LEVEL_ENV).ok().as_deref(), config.debug);
    // RUST_LOG wins over everything else.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let log_dir = Path::new(config.log_dir.trim());
    let log_file = match open_log_file(log_dir, &config.host, config.http_port) {
        Ok(value) => value,
        Err(err) => {
            eprintln!("agent-canvas: log file unavailable: {err}");
            None
        }
    };
    let (writer, path) = match log_file {
        Some((path, file)) => (BoxMakeWriter::new(io::stdout.and(file)), Some(path)),
        None => (BoxMakeWriter::new(io::stdout), None),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok()?;
    path
}

fn default_level(from_env: Option<&str>, debug: bool) -> String {
    match from_env.map(str::trim) {
        Some(level) if !level.is_empty() => level.to_string(),
        _ if debug => "debug".to_string(),
        _ => "info".to_string(),
    }
}

/// One file per listening address, so two canvases sharing a log directory
/// never interleave.
fn log_file_name(host: &str, port: u16) -> String {
    let host: String = host
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    format!("agent-canvas-{host}-{port}.log")
}

fn open_log_file(
    log_dir: &Path,
    host: &str,
    port: u16,
) -> io::Result<Option<(PathBuf, Arc<File>)>> {
    if log_dir.as_os_str().is_empty() {
        return Ok(None);
    }
    std::fs::create_dir_all(log_dir)?;
    let path = log_dir.join(log_file_name(host, port));
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok(Some((path, Arc::new(file))))
}
