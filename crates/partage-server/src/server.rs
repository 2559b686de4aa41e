//! HTTP server for upload and download endpoints
//!
//! Provides `PUT /{*name}` and multipart `POST /` uploads, static serving of
//! stored blobs under the file context, `GET /` usage text and `/health`.

use crate::types::{HealthResponse, LinkFormat, PartageConfig};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, put},
    Router,
};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use partage_store::{human_bytes, StoreError, Uploader};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::io::StreamReader;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{debug, error, info, warn};

/// Shared state for the HTTP server
pub struct ServerState {
    pub uploader: Uploader,
    pub base_uri: String,
    pub file_ctx: String,
    pub expiry_secs: i64,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(uploader: Uploader, config: &PartageConfig) -> Self {
        Self {
            uploader,
            base_uri: config.base_uri.trim_end_matches('/').to_string(),
            file_ctx: config.file_ctx.clone(),
            expiry_secs: config.expiry_secs,
            started_at: Utc::now(),
        }
    }

    /// Public link for a stored blob
    pub fn link(&self, id: &str) -> String {
        format!("{}{}{}", self.base_uri, self.file_ctx, id)
    }
}

pub type SharedState = Arc<ServerState>;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Map a store failure to a client-facing response
fn store_error_response(err: StoreError) -> Response {
    match err {
        StoreError::QuotaExceeded { .. } => {
            error_response(StatusCode::PAYLOAD_TOO_LARGE, "File is too big")
        }
        StoreError::NotFound(_) => error_response(StatusCode::NOT_FOUND, "Not found"),
        err => {
            error!(error = %err, "Upload failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

/// Create the HTTP router
///
/// `file_ctx` must not be `/`; the config loader rejects it.
pub fn create_router(state: SharedState) -> Router {
    let files_prefix = state.file_ctx.trim_end_matches('/').to_string();
    let files = ServeDir::new(state.uploader.blobs().dir());

    Router::new()
        .route("/", get(index).post(upload_post))
        .route("/health", get(health))
        .route("/{*name}", put(upload_put))
        .nest_service(&files_prefix, files)
        // uploads are bounded by max_size in the uploader itself
        .layer(DefaultBodyLimit::disable())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, addr: SocketAddr) -> std::io::Result<()> {
    let router = create_router(state);
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
}

/// Usage text
async fn index(State(state): State<SharedState>) -> String {
    format!(
        "partage - anonymous file drop\r\n\
         \r\n\
         curl -T <file> {base}/\r\n\
         curl -F file=@<file> {base}/\r\n\
         \r\n\
         Maximum file size: {max}\r\n",
        base = state.base_uri,
        max = human_bytes(state.uploader.max_size()),
    )
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        max_size: state.uploader.max_size(),
        expiry_secs: state.expiry_secs,
    })
}

/// Raw body upload to any path, the extension is taken from its last segment
async fn upload_put(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let Some(declared) = content_length(&headers) else {
        return error_response(StatusCode::LENGTH_REQUIRED, "Content-Length required");
    };
    debug!(name = %name, declared, "PUT upload");

    let reader = StreamReader::new(body.into_data_stream().map_err(std::io::Error::other));
    tokio::pin!(reader);

    match state
        .uploader
        .store(reader, declared, &name, state.expiry_secs)
        .await
    {
        Ok(id) => format!("{}\r\n", state.link(&id)).into_response(),
        Err(e) => {
            warn!(name = %name, error = %e, "PUT upload rejected");
            store_error_response(e)
        }
    }
}

/// Multipart upload of one or more `file` fields
///
/// Each file is held to the maximum size on its own; a field that streams
/// past it fails the request with 413.
async fn upload_post(State(state): State<SharedState>, mut multipart: Multipart) -> Response {
    let mut links = Vec::new();
    let mut link_format = LinkFormat::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Malformed multipart upload");
                return error_response(StatusCode::BAD_REQUEST, "Malformed multipart body");
            }
        };

        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or_default().to_string();
                let reader = StreamReader::new(field.map_err(std::io::Error::other));
                tokio::pin!(reader);

                match state
                    .uploader
                    .store_unsized(reader, &name, state.expiry_secs)
                    .await
                {
                    Ok(id) => links.push(state.link(&id)),
                    Err(e) => {
                        warn!(name = %name, error = %e, "POST upload rejected");
                        return store_error_response(e);
                    }
                }
            }
            Some("output") => match field.text().await {
                Ok(value) => link_format = LinkFormat::from_field(&value),
                Err(e) => {
                    warn!(error = %e, "Unreadable output field");
                    return error_response(StatusCode::BAD_REQUEST, "Malformed multipart body");
                }
            },
            _ => {}
        }
    }

    match link_format {
        LinkFormat::Json => Json(links).into_response(),
        LinkFormat::Text => links
            .iter()
            .map(|link| format!("{}\r\n", link))
            .collect::<String>()
            .into_response(),
    }
}
