pub mod config;
pub mod logging;
pub mod page;
pub mod routes;
pub mod screenshot;
pub mod ws;

use axum::Router;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpListener;

pub use routes::{router, ws_router, AppState};
pub use screenshot::{AgentBrowserCapture, CaptureError, ScreenshotCapture};

/// Serves `app` until `shutdown` resolves. Connect info is attached so the
/// WebSocket handler can log the peer.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> io::Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
