//! Gateway: client shell and dictionary listing
//!
//! Serves the single-page client from a directory (or the built-in shell)
//! with index.html as the fallback for unknown paths, and lists every running
//! dictionary server under `POST /api/info`.

use crate::server::{send_file, DictionaryServer};
use axum::{
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mdx_common::mime::mime_for;
use mdx_common::DictionaryInfo;
use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shell used when no client directory is configured
pub const BUILTIN_INDEX: &str = include_str!("../assets/index.html");

/// Client shell, read once at startup
#[derive(Debug, Clone)]
pub enum ClientShell {
    /// Built client from disk; `index` is its index.html
    Directory { root: PathBuf, index: Arc<str> },
    Builtin,
}

impl ClientShell {
    /// Load `root/index.html`
    pub fn from_dir(root: &Path) -> std::io::Result<Self> {
        let index = std::fs::read_to_string(root.join("index.html"))?;
        Ok(ClientShell::Directory {
            root: root.to_path_buf(),
            index: Arc::from(index),
        })
    }

    fn index(&self) -> Html<String> {
        match self {
            ClientShell::Directory { index, .. } => Html(index.to_string()),
            ClientShell::Builtin => Html(BUILTIN_INDEX.to_string()),
        }
    }

    /// On-disk asset for a request path, if it names a regular file
    fn asset(&self, request_path: &str) -> Option<PathBuf> {
        let ClientShell::Directory { root, .. } = self else {
            return None;
        };
        let decoded = percent_decode_str(request_path).decode_utf8().ok()?;
        let relative = Path::new(decoded.trim_start_matches('/'));
        if relative.as_os_str().is_empty()
            || !relative.components().all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }
        let path = root.join(relative);
        path.is_file().then_some(path)
    }
}

/// Shared gateway state
pub struct GatewayState {
    pub shell: ClientShell,
    pub servers: Arc<Vec<Arc<DictionaryServer>>>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    dictionaries: usize,
}

pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        // GET on the listing path is ordinary client routing
        .route("/api/info", post(list_info).fallback(shell))
        .route("/api/health", get(health))
        .fallback(shell)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn list_info(State(state): State<Arc<GatewayState>>) -> Json<Vec<DictionaryInfo>> {
    let infos = state.servers.iter().map(|s| s.info().clone()).collect();
    Json(infos)
}

async fn health(State(state): State<Arc<GatewayState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        dictionaries: state.servers.len(),
    })
}

async fn shell(State(state): State<Arc<GatewayState>>, method: Method, uri: Uri) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    match state.shell.asset(uri.path()) {
        Some(path) => send_file(&path, &mime_for(uri.path())).await,
        None => state.shell.index().into_response(),
    }
}

/// Log the listing once the gateway is up
pub fn announce(addr: std::net::SocketAddr, servers: &[Arc<DictionaryServer>]) {
    info!("  Gateway listening on http://{}", addr);
    for server in servers {
        let info = server.info();
        info!("  {} -> port {}", info.title, info.port);
    }
}
