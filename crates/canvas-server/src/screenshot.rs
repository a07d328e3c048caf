use chrono::Utc;
use futures_util::future::BoxFuture;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

const AGENT_BROWSER: &str = "agent-browser";
const SETTLE_MS: &str = "800";

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("agent-browser CLI unavailable; cannot capture screenshot")]
    Unavailable,
    #[error("agent-browser failed: {0}")]
    Command(String),
    #[error("screenshot i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Renders a URL to PNG bytes. Injected into the server so tests can fake it.
pub trait ScreenshotCapture: Send + Sync {
    fn capture<'a>(
        &'a self,
        url: &'a str,
        width: u32,
        height: u32,
    ) -> BoxFuture<'a, Result<Vec<u8>, CaptureError>>;
}

/// Drives the external `agent-browser` CLI under a throwaway session.
#[derive(Debug, Clone)]
pub struct AgentBrowserCapture {
    program: String,
    output_dir: PathBuf,
}

impl Default for AgentBrowserCapture {
    fn default() -> Self {
        Self {
            program: AGENT_BROWSER.to_string(),
            output_dir: std::env::temp_dir(),
        }
    }
}

impl AgentBrowserCapture {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub async fn is_available(&self) -> bool {
        matches!(self.run(&["--help"]).await, Ok(output) if output.status.success())
    }

    async fn run(&self, args: &[&str]) -> io::Result<std::process::Output> {
        Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
    }

    async fn run_checked(&self, args: &[&str]) -> Result<(), CaptureError> {
        let output = self.run(args).await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = if !stderr.trim().is_empty() {
            stderr.trim().to_string()
        } else if !stdout.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            match output.status.code() {
                Some(code) => format!("exit {code}"),
                None => "terminated by signal".to_string(),
            }
        };
        Err(CaptureError::Command(detail))
    }

    async fn capture_session(
        &self,
        session: &str,
        output: &str,
        url: &str,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, CaptureError> {
        let (width, height) = (width.to_string(), height.to_string());
        self.run_checked(&["--session", session, "open", url]).await?;
        self.run_checked(&["--session", session, "set", "viewport", &width, &height])
            .await?;
        self.run_checked(&["--session", session, "wait", SETTLE_MS])
            .await?;
        self.run_checked(&["--session", session, "screenshot", output])
            .await?;
        Ok(tokio::fs::read(output).await?)
    }
}

impl ScreenshotCapture for AgentBrowserCapture {
    fn capture<'a>(
        &'a self,
        url: &'a str,
        width: u32,
        height: u32,
    ) -> BoxFuture<'a, Result<Vec<u8>, CaptureError>> {
        Box::pin(async move {
            if !self.is_available().await {
                return Err(CaptureError::Unavailable);
            }
            let session = session_name();
            let output = self.output_dir.join(format!("{session}.png"));
            let output_str = output.to_string_lossy().into_owned();
            info!(event = "screenshot_start", session = %session, url = url, width, height);

            let result = self
                .capture_session(&session, &output_str, url, width, height)
                .await;

            // Always tear the session down, whatever happened above.
            let _ = self.run(&["--session", &session, "close"]).await;
            let _ = tokio::fs::remove_file(&output).await;
            debug!(event = "screenshot_done", session = %session, ok = result.is_ok());
            result
        })
    }
}

fn session_name() -> String {
    let now = Utc::now();
    let salt = (now.timestamp_subsec_nanos() ^ std::process::id()) & 0xff_ffff;
    format!("agent-canvas-shot-{}-{salt:06x}", now.timestamp_millis())
}
