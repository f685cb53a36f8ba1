//! Built-in preview server.
//!
//! A small HTTP server bound to an ephemeral localhost port. Every page
//! request rebuilds the bundle from the current project tree; a
//! long-poll endpoint lets the preview frame reload when files change.

use crate::state::{now_ms, ChangeClock};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use notify::{RecursiveMode, Watcher};
use serde_json::json;
use skiff_core::preview::build_bundle;
use skiff_core::sink::Sink;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long `/__poll` holds a response waiting for a change.
const POLL_HOLD: Duration = Duration::from_secs(2);

struct PreviewState {
    project_dir: PathBuf,
    changes: Arc<ChangeClock>,
}

/// Run the preview server until the task is canceled.
///
/// Emits the bound URL on stdout; returns 130 on cancellation.
pub async fn serve_preview(
    project_dir: PathBuf,
    changes: Arc<ChangeClock>,
    sink: Sink,
    cancel: CancellationToken,
) -> i32 {
    let listener = match tokio::net::TcpListener::bind(("127.0.0.1", 0)).await {
        Ok(listener) => listener,
        Err(e) => {
            sink.err_line(&format!("preview: failed to bind: {e}"));
            return 1;
        }
    };
    let addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            sink.err_line(&format!("preview: {e}"));
            return 1;
        }
    };

    // Directory notifications feed the change clock; when the watcher
    // is unavailable the clock still advances from command completions.
    let _watcher = watch_project(&project_dir, changes.clone());

    let state = Arc::new(PreviewState {
        project_dir,
        changes,
    });

    let app = Router::new()
        .route("/", get(index))
        .route("/index.html", get(index))
        .route("/__poll", get(poll))
        .fallback(get(static_file))
        .with_state(state);

    info!(%addr, "preview server listening");
    sink.out_line(&format!("Preview server running at http://{addr}"));

    let shutdown = cancel.clone().cancelled_owned();
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        sink.err_line(&format!("preview: server error: {e}"));
        return 1;
    }

    if cancel.is_cancelled() {
        skiff_runtime::EXIT_CANCELED
    } else {
        0
    }
}

fn watch_project(
    project_dir: &Path,
    changes: Arc<ChangeClock>,
) -> Option<notify::RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |result: Result<notify::Event, _>| {
        if result.is_ok() {
            changes.mark();
        }
    })
    .map_err(|e| warn!(error = %e, "file watcher unavailable"))
    .ok()?;

    watcher
        .watch(project_dir, RecursiveMode::Recursive)
        .map_err(|e| warn!(error = %e, "failed to watch project directory"))
        .ok()?;

    Some(watcher)
}

async fn index(State(state): State<Arc<PreviewState>>) -> Response {
    match build_bundle(&state.project_dir) {
        Ok(html) => ([(header::CACHE_CONTROL, "no-cache")], Html(html)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("bundle error: {e}"),
        )
            .into_response(),
    }
}

async fn poll(
    State(state): State<Arc<PreviewState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let since = params
        .get("since")
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let changed = state.changes.wait_change(since, POLL_HOLD).await;
    debug!(since, changed, "poll");

    (
        [(header::CACHE_CONTROL, "no-cache")],
        axum::Json(json!({ "changed": changed, "now": now_ms() })),
    )
        .into_response()
}

async fn static_file(State(state): State<Arc<PreviewState>>, uri: Uri) -> Response {
    let Some(path) = sanitize(&state.project_dir, uri.path()) else {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, content_type(&path))],
            bytes,
        )
            .into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

/// Map a request path into the project directory, refusing traversal.
fn sanitize(project_dir: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = request_path.trim_start_matches('/');
    let candidate = Path::new(relative);
    if candidate
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(project_dir.join(candidate))
}

/// Content type from the file extension.
fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("js") => "application/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
