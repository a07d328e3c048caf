use canvas_core::DEFAULT_QUEUE_CAPACITY;
use clap::Parser;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_HTTP_PORT: u16 = 3333;
const STATE_DIR: &str = ".agent-canvas";
const STATE_FILE: &str = "state.json";

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub http_port: u16,
    pub ws_port: u16,
    pub root: PathBuf,
    pub state_file: PathBuf,
    pub log_dir: String,
    pub open_browser: bool,
    pub debug: bool,
    pub queue_capacity: usize,
    pub write_timeout: Duration,
}

#[derive(Parser, Debug)]
#[command(name = "agent-canvas", about = "Live HTML canvas that agents render into")]
pub struct Args {
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub ws_port: Option<u16>,
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    #[arg(long, default_value = "")]
    pub root: String,
    #[arg(long, default_value = "")]
    pub state_file: String,
    #[arg(long, default_value = "")]
    pub log_dir: String,
    #[arg(long, default_value_t = false)]
    pub no_open: bool,
    #[arg(long, default_value_t = false)]
    pub debug: bool,
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
    #[arg(long, default_value_t = 2)]
    pub write_timeout: u64,
}

impl Config {
    pub fn load() -> io::Result<Self> {
        Self::from_args(Args::parse())
    }

    /// Flag, then environment, then default.
    pub fn from_args(args: Args) -> io::Result<Self> {
        let cwd = std::env::current_dir()?;
        let http_port = args
            .port
            .or_else(|| env_port("AGENT_CANVAS_PORT"))
            .unwrap_or(DEFAULT_HTTP_PORT);
        let ws_port = match args.ws_port.or_else(|| env_port("AGENT_CANVAS_WS_PORT")) {
            Some(port) => port,
            None => http_port.checked_add(1).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "no room for a websocket port above 65535; pass --ws-port",
                )
            })?,
        };
        let root = absolutize(&cwd, &resolve_flag(&args.root, "AGENT_CANVAS_ROOT", ""));
        let state_file = match resolve_flag(&args.state_file, "AGENT_CANVAS_STATE_FILE", "") {
            value if value.is_empty() => root.join(STATE_DIR).join(STATE_FILE),
            value => absolutize(&cwd, &value),
        };
        Ok(Config {
            host: args.host,
            http_port,
            ws_port,
            root,
            state_file,
            log_dir: resolve_flag(&args.log_dir, "AGENT_CANVAS_LOG_DIR", ""),
            open_browser: !args.no_open,
            debug: args.debug || env_true("AGENT_CANVAS_DEBUG"),
            queue_capacity: args.queue_capacity,
            write_timeout: Duration::from_secs(args.write_timeout.max(1)),
        })
    }

    pub fn canvas_url(&self) -> String {
        format!("http://localhost:{}", self.http_port)
    }
}

pub fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

fn env_port(key: &str) -> Option<u16> {
    std::env::var(key).ok()?.trim().parse().ok()
}

fn resolve_flag(flag: &str, env_key: &str, fallback: &str) -> String {
    if !flag.trim().is_empty() {
        return flag.to_string();
    }
    if let Ok(value) = std::env::var(env_key) {
        if !value.trim().is_empty() {
            return value;
        }
    }
    fallback.to_string()
}

fn absolutize(cwd: &Path, value: &str) -> PathBuf {
    if value.trim().is_empty() {
        return cwd.to_path_buf();
    }
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}
