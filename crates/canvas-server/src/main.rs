use canvas_core::{BroadcastHub, PanelStore, PersistenceManager};
use canvas_server::{
    config::Config, logging::init_logging, router, serve, ws_router, AgentBrowserCapture, AppState,
};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::watch};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(value) => value,
        Err(err) => {
            eprintln!("agent-canvas: {err}");
            return ExitCode::FAILURE;
        }
    };
    let log_file = init_logging(&config);

    let hub = Arc::new(BroadcastHub::new(config.queue_capacity));
    let persistence = PersistenceManager::new(&config.state_file);
    let store = match PanelStore::open(persistence, hub, &config.root).await {
        Ok(value) => Arc::new(value),
        Err(err) => {
            error!(event = "state_load_failed", path = %config.state_file.display(), error = %err);
            return ExitCode::FAILURE;
        }
    };

    let http_listener = match TcpListener::bind((config.host.as_str(), config.http_port)).await {
        Ok(value) => value,
        Err(err) => {
            error!(event = "bind_failed", port = config.http_port, error = %err);
            return ExitCode::FAILURE;
        }
    };
    let ws_listener = match TcpListener::bind((config.host.as_str(), config.ws_port)).await {
        Ok(value) => value,
        Err(err) => {
            error!(event = "bind_failed", port = config.ws_port, error = %err);
            return ExitCode::FAILURE;
        }
    };

    let state = AppState::new(
        store,
        Arc::new(AgentBrowserCapture::default()),
        config.http_port,
        config.ws_port,
    )
    .with_write_timeout(config.write_timeout);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!(event = "shutdown_requested");
        let _ = shutdown_tx.send(true);
    });

    info!(
        event = "canvas_start",
        host = %config.host,
        http_port = config.http_port,
        ws_port = config.ws_port,
        root = %config.root.display(),
        state_file = %config.state_file.display(),
        log_file = %log_file
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_default()
    );
    print_banner(&config);
    if config.open_browser {
        open_browser(&config.canvas_url());
    }

    let (http, ws) = tokio::join!(
        serve(http_listener, router(state.clone()), wait_for_shutdown(shutdown_rx.clone())),
        serve(ws_listener, ws_router(state), wait_for_shutdown(shutdown_rx)),
    );
    let mut code = ExitCode::SUCCESS;
    for (listener, result) in [("http", http), ("ws", ws)] {
        if let Err(err) = result {
            error!(event = "server_error", listener, error = %err);
            code = ExitCode::FAILURE;
        }
    }
    code
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn print_banner(config: &Config) {
    println!(
        r#"
  agent-canvas

  Canvas:  http://localhost:{http}
  WS:      ws://localhost:{ws}
  State:   {state}

  Usage:
    curl -X POST http://localhost:{http}/render \
      -H "Content-Type: application/json" \
      -d '{{"html": "<h1>Hello from agent</h1>"}}'
"#,
        http = config.http_port,
        ws = config.ws_port,
        state = config.state_file.display(),
    );
}

fn open_browser(url: &str) {
    let mut command = if cfg!(target_os = "macos") {
        std::process::Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut command = std::process::Command::new("cmd");
        command.args(["/C", "start", ""]);
        command
    } else {
        std::process::Command::new("xdg-open")
    };
    if let Err(err) = command.arg(url).spawn() {
        warn!(event = "browser_open_failed", url = url, error = %err);
    }
}
