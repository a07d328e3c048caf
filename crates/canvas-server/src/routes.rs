use crate::page::canvas_page;
use crate::screenshot::ScreenshotCapture;
use crate::ws::ws_handler;
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use canvas_core::{CanvasError, PanelStore};
use serde::Deserialize;
use serde_json::{json, Value};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

pub const DEFAULT_SHOT_WIDTH: u32 = 1280;
pub const DEFAULT_SHOT_HEIGHT: u32 = 800;
const MIN_SHOT_DIM: u32 = 100;
const MAX_SHOT_DIM: u32 = 4096;

/// Per-run context threaded through every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PanelStore>,
    pub capture: Arc<dyn ScreenshotCapture>,
    pub http_port: u16,
    pub ws_port: u16,
    pub write_timeout: Duration,
}

impl AppState {
    pub fn new(
        store: Arc<PanelStore>,
        capture: Arc<dyn ScreenshotCapture>,
        http_port: u16,
        ws_port: u16,
    ) -> Self {
        Self {
            store,
            capture,
            http_port,
            ws_port,
            write_timeout: Duration::from_secs(2),
        }
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(page_handler))
        .route("/canvas", get(page_handler))
        .route("/health", get(|| async { "ok" }))
        .route("/render", post(render_handler))
        .route("/panels", get(list_handler).post(create_handler))
        .route("/panels/:name", patch(rename_handler).delete(delete_handler))
        .route("/push", post(push_handler))
        .route("/pull", post(pull_handler))
        .route("/state", get(state_handler))
        .route("/screenshot", get(screenshot_handler))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router for the standalone WebSocket port.
pub fn ws_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<CanvasError> for ApiError {
    fn from(err: CanvasError) -> Self {
        let status = match &err {
            CanvasError::InvalidName(_)
            | CanvasError::LastPanel(_)
            | CanvasError::OutOfBounds { .. } => StatusCode::BAD_REQUEST,
            CanvasError::NotFound(_) => StatusCode::NOT_FOUND,
            CanvasError::Conflict(_) => StatusCode::CONFLICT,
            CanvasError::Io { source, .. } => match source.kind() {
                io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
                io::ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            CanvasError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(event = "request_failed", code = err.code(), error = %err);
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "ok": false, "error": self.message })),
        )
            .into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

/// JSON body whose rejection still answers in the `{ ok, error }` shape.
type JsonBody<T> = Result<Json<T>, JsonRejection>;

async fn page_handler(State(state): State<AppState>) -> Html<String> {
    Html(canvas_page(state.ws_port))
}

#[derive(Debug, Deserialize)]
struct RenderBody {
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    panel: Option<String>,
}

async fn render_handler(State(state): State<AppState>, body: JsonBody<RenderBody>) -> ApiResult {
    let Json(body) = body?;
    let html = body
        .html
        .ok_or_else(|| ApiError::bad_request("missing html field"))?;
    let outcome = state.store.render(body.panel.as_deref(), html).await?;
    Ok(Json(json!({ "ok": true, "panel": outcome.panel })))
}

async fn list_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "ok": true, "panels": state.store.list_panels().await }))
}

#[derive(Debug, Default, Deserialize)]
struct CreateBody {
    #[serde(default)]
    name: Option<String>,
}

/// The body is optional here, so an empty one means "generate a name".
async fn create_handler(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let body: CreateBody = if body.iter().all(u8::is_ascii_whitespace) {
        CreateBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| ApiError::bad_request(format!("invalid JSON body: {err}")))?
    };
    let outcome = state.store.create_panel(body.name.as_deref()).await?;
    Ok(Json(json!({
        "ok": true,
        "panel": outcome.panel,
        "created": outcome.created,
    })))
}

#[derive(Debug, Deserialize)]
struct RenameBody {
    #[serde(default, rename = "newName")]
    new_name: Option<String>,
}

async fn rename_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: JsonBody<RenameBody>,
) -> ApiResult {
    let Json(body) = body?;
    let new_name = body
        .new_name
        .ok_or_else(|| ApiError::bad_request("missing newName field"))?;
    let panel = state.store.rename_panel(&name, &new_name).await?;
    Ok(Json(json!({ "ok": true, "panel": panel })))
}

async fn delete_handler(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult {
    state.store.delete_panel(&name).await?;
    Ok(Json(json!({ "ok": true, "panel": name.trim() })))
}

#[derive(Debug, Deserialize)]
struct FileBody {
    #[serde(default)]
    panel: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

impl FileBody {
    fn path(&self) -> Result<&str, ApiError> {
        match self.path.as_deref() {
            Some(path) if !path.trim().is_empty() => Ok(path),
            _ => Err(ApiError::bad_request("missing path field")),
        }
    }
}

async fn push_handler(State(state): State<AppState>, body: JsonBody<FileBody>) -> ApiResult {
    let Json(body) = body?;
    let outcome = state
        .store
        .push_to_file(body.panel.as_deref(), body.path()?)
        .await?;
    Ok(Json(json!({
        "ok": true,
        "panel": outcome.panel,
        "path": outcome.path.display().to_string(),
        "bytes": outcome.bytes,
    })))
}

async fn pull_handler(State(state): State<AppState>, body: JsonBody<FileBody>) -> ApiResult {
    let Json(body) = body?;
    let outcome = state
        .store
        .pull_from_file(body.panel.as_deref(), body.path()?)
        .await?;
    Ok(Json(json!({
        "ok": true,
        "panel": outcome.panel,
        "path": outcome.path.display().to_string(),
        "html": outcome.html,
    })))
}

async fn state_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "panels": state.store.all_panels().await }))
}

#[derive(Debug, Deserialize)]
struct ShotQuery {
    width: Option<u32>,
    height: Option<u32>,
}

async fn screenshot_handler(
    State(state): State<AppState>,
    Query(query): Query<ShotQuery>,
) -> Response {
    let width = clamp_dim(query.width, DEFAULT_SHOT_WIDTH);
    let height = clamp_dim(query.height, DEFAULT_SHOT_HEIGHT);
    let url = format!("http://127.0.0.1:{}/canvas", state.http_port);
    match state.capture.capture(&url, width, height).await {
        Ok(png) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
        Err(err) => {
            warn!(event = "screenshot_failed", error = %err);
            ApiError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: err.to_string(),
            }
            .into_response()
        }
    }
}

fn clamp_dim(value: Option<u32>, default: u32) -> u32 {
    value.unwrap_or(default).clamp(MIN_SHOT_DIM, MAX_SHOT_DIM)
}
