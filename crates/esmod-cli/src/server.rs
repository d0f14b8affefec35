//! HTTP serving layer.
//!
//! One fallback handler routes every GET through the artifact cache:
//! module sources are built on demand, CSS can be requested as a module
//! (`?module`) and arrives wrapped in a style-injection snippet, plain
//! files pass through from disk, and route-style requests fall back to the
//! nearest `index.html` or a synthesized one.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use esmod_engine::{Artifact, BuildError, ModuleEngine, SourceId};

use crate::compiler::{MODULE_EXTENSIONS, is_module_path};
use crate::error::{CliError, Result};

/// Shared application state: the engine and nothing else.
pub struct AppState {
    engine: ModuleEngine,
}

impl AppState {
    pub fn new(engine: ModuleEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &ModuleEngine {
        &self.engine
    }
}

/// Shared state handle for the router.
pub type SharedState = Arc<AppState>;

/// Bind on localhost and serve until ctrl-c.
pub async fn serve(state: SharedState, port: u16) -> Result<()> {
    let app = router(state);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| CliError::Server(format!("failed to bind {addr}: {err}")))?;

    info!("server ready on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| CliError::Server(err.to_string()))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Build the router. CORS is wide open: a dev server is always
/// cross-origin from something.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .fallback(handle_request)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn handle_request(
    State(state): State<SharedState>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let response = dispatch(&state, &uri).await;
    apply_conditional(response, headers.get(header::IF_MODIFIED_SINCE))
}

async fn dispatch(state: &SharedState, uri: &Uri) -> Response {
    let pathname = uri.path();

    if let Some(name) = pathname.strip_prefix("/builtin:") {
        return serve_built(
            state,
            SourceId::Virtual(name.to_string()),
            "application/javascript",
        )
        .await;
    }

    let file_path = state
        .engine()
        .root()
        .join(pathname.trim_start_matches('/'));

    if is_file(&file_path).await {
        if is_module_path(&file_path) {
            return serve_built(state, SourceId::Path(file_path), "application/javascript").await;
        }
        if extension_is(&file_path, "css") && query_has_flag(uri.query(), "module") {
            return serve_css_module(state, file_path, pathname).await;
        }
        return serve_static(&file_path).await;
    }

    if pathname == "/favicon.ico" {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    }

    // Route-style request: nearest index.html, then the root one.
    let mut index = file_path.join("index.html");
    if !is_file(&index).await {
        index = state.engine().root().join("index.html");
    }
    if is_file(&index).await {
        return serve_built(state, SourceId::Path(index), "text/html; charset=utf-8").await;
    }

    // Bare working dir: synthesize an index for the first entry module.
    if let Some(entry) = find_default_entry(state.engine().root()).await {
        return built_response(
            state,
            None,
            "text/html; charset=utf-8",
            default_index_html(&entry).into_bytes(),
        );
    }

    (StatusCode::NOT_FOUND, "not found").into_response()
}

/// Build (or reuse) an artifact and serve it.
async fn serve_built(state: &SharedState, source: SourceId, content_type: &str) -> Response {
    match state.engine().cache().get_or_build(&source, false).await {
        Ok(artifact) => artifact_response(state, &artifact, content_type),
        Err(err) => error_response(&err),
    }
}

/// Serve a CSS file as a JS module that injects it into the document.
async fn serve_css_module(state: &SharedState, path: PathBuf, pathname: &str) -> Response {
    match state
        .engine()
        .cache()
        .get_or_build(&SourceId::Path(path), false)
        .await
    {
        Ok(artifact) => {
            let css = String::from_utf8_lossy(&artifact.contents);
            let js = css_loader_js(pathname, &css);
            built_response(
                state,
                artifact.modified,
                "application/javascript",
                js.into_bytes(),
            )
        }
        Err(err) => error_response(&err),
    }
}

/// Raw file passthrough from disk; never cached.
async fn serve_static(path: &Path) -> Response {
    match tokio::fs::read(path).await {
        Ok(bytes) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type_for(path))
            .body(Body::from(bytes))
            .unwrap(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to read {}: {err}", path.display()),
        )
            .into_response(),
    }
}

fn artifact_response(state: &SharedState, artifact: &Artifact, content_type: &str) -> Response {
    built_response(
        state,
        artifact.modified,
        content_type,
        artifact.contents.to_vec(),
    )
}

fn built_response(
    state: &SharedState,
    modified: Option<SystemTime>,
    content_type: &str,
    body: Vec<u8>,
) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type);
    if state.engine().mode().is_dev() {
        // Dev relies on conditional requests, not long-lived caching.
        builder = builder.header(header::CACHE_CONTROL, "max-age=0");
    }
    if let Some(modified) = modified {
        builder = builder.header(header::LAST_MODIFIED, http_date(modified));
    }
    builder.body(Body::from(body)).unwrap()
}

/// Map engine errors onto transport status codes. Build diagnostics land
/// in the body so the browser console shows them.
fn error_response(err: &BuildError) -> Response {
    let status = match err {
        BuildError::NotFound(_) => StatusCode::NOT_FOUND,
        BuildError::InvalidTarget(_) => StatusCode::FORBIDDEN,
        BuildError::Failed { .. } | BuildError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string()).into_response()
}

/// Answer 304 when the client's validator matches the artifact's
/// `Last-Modified`; http dates have second granularity, so equality on the
/// formatted value is the comparison.
fn apply_conditional(response: Response, if_modified_since: Option<&HeaderValue>) -> Response {
    let unchanged = match (if_modified_since, response.headers().get(header::LAST_MODIFIED)) {
        (Some(validator), Some(last_modified)) => validator == last_modified,
        _ => false,
    };
    if !unchanged {
        return response;
    }

    let mut not_modified = Response::builder().status(StatusCode::NOT_MODIFIED);
    for name in [header::LAST_MODIFIED, header::CACHE_CONTROL] {
        if let Some(value) = response.headers().get(&name) {
            not_modified = not_modified.header(name, value);
        }
    }
    not_modified.body(Body::empty()).unwrap()
}

/// JS that injects the stylesheet through the embedded css builtin.
fn css_loader_js(url: &str, css: &str) -> String {
    format!(
        "import {{ applyCSS }} from \"/builtin:css.ts\"\napplyCSS({url}, {{ css: {css} }})\n",
        url = json_string(url),
        css = json_string(css),
    )
}

fn json_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

/// Entry names probed, in order, when no index.html exists.
const DEFAULT_ENTRY_NAMES: &[&str] = &["app", "main", "index"];

async fn find_default_entry(root: &Path) -> Option<String> {
    for name in DEFAULT_ENTRY_NAMES {
        for ext in MODULE_EXTENSIONS {
            let candidate = format!("{name}.{ext}");
            if is_file(&root.join(&candidate)).await {
                return Some(candidate);
            }
        }
    }
    None
}

fn default_index_html(entry: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
</head>
<body>
  <script type="module" src="./{entry}"></script>
</body>
</html>
"#
    )
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

fn extension_is(path: &Path, wanted: &str) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(wanted)
}

fn query_has_flag(query: Option<&str>, flag: &str) -> bool {
    query.is_some_and(|query| {
        query
            .split('&')
            .any(|pair| pair == flag || pair.starts_with(&format!("{flag}=")))
    })
}

fn http_date(time: SystemTime) -> String {
    chrono::DateTime::<chrono::Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()).unwrap_or("") {
        "js" | "mjs" => "application/javascript",
        "json" | "map" => "application/json",
        "html" => "text/html; charset=utf-8",
        "css" => "text/css",
        "wasm" => "application/wasm",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        _ => "application/octet-stream",
    }
}
