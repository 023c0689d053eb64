use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stocky_core::config::Settings;
use stocky_core::ingest::orchestrator;
use stocky_core::ingest::provider::HttpPageProvider;
use stocky_core::storage::snapshot::SnapshotStore;

const DEFAULT_PORT: u16 = 3000;

// Dashboards request the snapshot under a handful of relative paths; any
// miss whose path mentions this name resolves to the persisted artifact.
const SNAPSHOT_FILE_NAME: &str = "top_stocks.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let provider = HttpPageProvider::from_env()?;
    let store = SnapshotStore::new(settings.snapshot_path.clone());

    // Refresh the snapshot before serving. A failed scrape is logged and the
    // last-known-good snapshot keeps being served.
    match orchestrator::run_update(&provider, &settings, &store).await {
        Ok(count) => tracing::info!(count, "startup scrape complete"),
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "startup scrape failed; serving existing snapshot");
        }
    }

    let (restart_tx, restart_rx) = mpsc::channel::<()>(1);

    let state = AppState {
        settings: Arc::new(settings),
        store,
        provider,
        scrape_lock: Arc::new(tokio::sync::Mutex::new(())),
        restart_tx,
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/update", get(api_update))
        .route("/api/restart", get(api_restart))
        .fallback(serve_static)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let listener = bind_with_retry(port).await?;
    tracing::info!(addr = %listener.local_addr()?, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(restart_rx))
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    settings: Arc<Settings>,
    store: SnapshotStore,
    provider: HttpPageProvider,
    // Single-flight guard for scrapes triggered over HTTP.
    scrape_lock: Arc<tokio::sync::Mutex<()>>,
    restart_tx: mpsc::Sender<()>,
}

#[derive(Debug, Serialize)]
struct OpResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl OpResponse {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

async fn api_update(State(state): State<AppState>) -> (StatusCode, Json<OpResponse>) {
    // A scrape already in flight wins; the loser is told to retry instead of
    // queueing a second scrape against the same artifact.
    let Ok(_guard) = state.scrape_lock.try_lock() else {
        return (
            StatusCode::CONFLICT,
            Json(OpResponse::err("an update is already in progress")),
        );
    };

    match orchestrator::run_update(&state.provider, &state.settings, &state.store).await {
        Ok(count) => (
            StatusCode::OK,
            Json(OpResponse::ok(format!("stock data updated ({count} records)"))),
        ),
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "update request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(OpResponse::err(format!("{err:#}"))),
            )
        }
    }
}

async fn api_restart(State(state): State<AppState>) -> Json<OpResponse> {
    // Respawning is the process manager's job; this process only finishes
    // in-flight responses (including this one) and exits.
    let _ = state.restart_tx.send(()).await;
    Json(OpResponse::ok(
        "server shutting down for restart; stock data will refresh on startup",
    ))
}

async fn serve_static(State(state): State<AppState>, uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');

    if path.split('/').any(|segment| segment == "..") {
        return not_found();
    }

    let file_path = if path.is_empty() {
        state.settings.static_dir.join("index.html")
    } else {
        state.settings.static_dir.join(path)
    };

    match tokio::fs::read(&file_path).await {
        Ok(content) => {
            ([(header::CONTENT_TYPE, content_type_for(&file_path))], content).into_response()
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if path.contains(SNAPSHOT_FILE_NAME) {
                serve_snapshot(&state).await
            } else {
                not_found()
            }
        }
        Err(err) => {
            tracing::error!(path = %file_path.display(), error = %err, "failed to read static file");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn serve_snapshot(state: &AppState) -> Response {
    match state.store.read_bytes().await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "application/json")], bytes).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "snapshot requested but not readable");
            not_found()
        }
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "404 Not Found").into_response()
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html") => "text/html",
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") => "image/jpeg",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

async fn bind_with_retry(port: u16) -> anyhow::Result<tokio::net::TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(err) => {
            let next = SocketAddr::from(([0, 0, 0, 0], port + 1));
            tracing::warn!(%addr, error = %err, %next, "bind failed; retrying on next port");
            tokio::net::TcpListener::bind(next)
                .await
                .with_context(|| format!("failed to bind {next}"))
        }
    }
}

async fn shutdown_signal(mut restart_rx: mpsc::Receiver<()>) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("ctrl-c received; shutting down");
        }
        _ = restart_rx.recv() => {
            tracing::info!("restart requested; exiting for the process manager to respawn");
        }
    }
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_extensions_to_mime_types() {
        assert_eq!(content_type_for(Path::new("index.html")), "text/html");
        assert_eq!(content_type_for(Path::new("css/style.css")), "text/css");
        assert_eq!(content_type_for(Path::new("app.js")), "text/javascript");
        assert_eq!(
            content_type_for(Path::new("data/top_stocks.json")),
            "application/json"
        );
        assert_eq!(content_type_for(Path::new("logo.png")), "image/png");
        assert_eq!(content_type_for(Path::new("photo.jpg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("anim.gif")), "image/gif");
    }

    #[test]
    fn unknown_extensions_fall_back_to_octet_stream() {
        assert_eq!(
            content_type_for(Path::new("archive.tar")),
            "application/octet-stream"
        );
        assert_eq!(
            content_type_for(Path::new("no_extension")),
            "application/octet-stream"
        );
    }

    #[test]
    fn op_response_envelopes_use_message_or_error() {
        let ok = serde_json::to_value(OpResponse::ok("done")).unwrap();
        assert_eq!(ok["success"], true);
        assert_eq!(ok["message"], "done");
        assert!(ok.get("error").is_none());

        let err = serde_json::to_value(OpResponse::err("boom")).unwrap();
        assert_eq!(err["success"], false);
        assert_eq!(err["error"], "boom");
        assert!(err.get("message").is_none());
    }
}
