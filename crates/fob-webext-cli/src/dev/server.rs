//! HTTP side of the dev server.

use crate::dev::SharedState;
use crate::dev::state::content_type;
use crate::error::{CliError, Result};
use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode, Uri, header},
    response::{
        IntoResponse, Redirect, Response, Sse,
        sse::{Event, KeepAlive},
    },
    routing::get,
};
use fob_plugin_webext::DEV_CLIENT_PATH;
use fob_plugin_webext::output::validate_output_path;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;

/// Event stream the dev client subscribes to.
pub const SSE_PATH: &str = "/__webext_sse__";

/// Bound dev server, ready to [`serve`](Self::serve).
pub struct DevHttpServer {
    listener: TcpListener,
    router: Router,
}

impl DevHttpServer {
    /// Bind `127.0.0.1:port`. Port 0 picks a free port.
    pub async fn bind(state: SharedState, port: u16) -> Result<Self> {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| CliError::Server(format!("Failed to bind to {addr}: {e}")))?;
        Ok(Self {
            listener,
            router: router(state),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the task is dropped or the listener fails.
    pub async fn serve(self) -> Result<()> {
        axum::serve(self.listener, self.router)
            .await
            .map_err(|e| CliError::Server(e.to_string()))
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route(DEV_CLIENT_PATH, get(serve_client))
        .route(SSE_PATH, get(handle_sse))
        .fallback(handle_request)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn serve_client(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let client = state.client();
    let fresh = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|tag| tag == client.etag);

    if fresh {
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, client.etag.clone())]).into_response();
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type(".js").to_string()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
            (header::ETAG, client.etag.clone()),
        ],
        client.code.clone(),
    )
        .into_response()
}

async fn handle_sse(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let (id, rx) = state.register_client();
    debug!(client = id, "dev client connected");

    let stream = ReceiverStream::new(rx).map(|data| Ok(Event::default().data(data)));
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
}

/// Bundle files first, then source paths redirect to their chunk, then the
/// public dir and the project root.
async fn handle_request(State(state): State<SharedState>, uri: Uri) -> Response {
    let path = uri.path();
    let bundle = state.bundle();

    if let Some((content, content_type)) = bundle.get(path) {
        return file_response(content.clone(), content_type);
    }

    let relative = path.trim_start_matches('/');
    if let Some(chunk) = bundle.chunk_for(relative) {
        debug!(source = relative, chunk, "redirecting source to chunk");
        return Redirect::temporary(&format!("/{chunk}")).into_response();
    }

    let dirs = state.public_dir().into_iter().chain([state.root()]);
    for dir in dirs {
        if let Some(response) = serve_from(dir, relative).await {
            return response;
        }
    }

    (StatusCode::NOT_FOUND, format!("File not found: {path}")).into_response()
}

async fn serve_from(dir: &Path, relative: &str) -> Option<Response> {
    let file = validate_output_path(dir, relative).ok()?;
    if !file.is_file() {
        return None;
    }
    let content = tokio::fs::read(&file).await.ok()?;
    Some(file_response(content, content_type(relative)))
}

fn file_response(content: Vec<u8>, content_type: &'static str) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        content,
    )
        .into_response()
}
