//! partage - anonymous file drop
//!
//! Accepts uploads over HTTP, stores them with an expiry deadline and hands
//! back a link. Expired uploads are purged by `partage-trash`.

mod error;
mod server;
mod types;

use crate::error::{Result, ServerError};
use crate::server::{start_server, ServerState, SharedState};
use crate::types::PartageConfig;
use partage_store::{human_bytes, BlobStore, MetadataStore, Uploader};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("partage_server=info".parse()?)
        .add_directive("partage_store=info".parse()?);

    // Use JSON format for Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting partage...");

    let config = load_config()?;
    let addr: SocketAddr = config
        .listen
        .parse()
        .map_err(|e| ServerError::Config(format!("invalid LISTEN {}: {}", config.listen, e)))?;
    info!("Listen: {}", config.listen);
    info!("Base URI: {}{}", config.base_uri, config.file_ctx);
    info!("Files dir: {:?}", config.files_dir);
    info!("Metadata dir: {:?}", config.meta_dir);
    info!("Max upload size: {}", human_bytes(config.max_size));
    info!("Expiry: {} seconds", config.expiry_secs);

    let uploader = Uploader::new(
        BlobStore::new(config.files_dir.clone()),
        MetadataStore::new(config.meta_dir.clone()),
        config.max_size,
    );
    uploader.init().await?;

    let state: SharedState = Arc::new(ServerState::new(uploader, &config));

    // Start HTTP server (blocking)
    start_server(state, addr).await?;

    Ok(())
}

fn load_config() -> Result<PartageConfig> {
    let defaults = PartageConfig::default();

    let listen = std::env::var("LISTEN").unwrap_or(defaults.listen);

    let base_uri = std::env::var("BASE_URI").unwrap_or(defaults.base_uri);

    let files_dir = std::env::var("FILES_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.files_dir);

    let meta_dir = std::env::var("META_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.meta_dir);

    let file_ctx = std::env::var("FILE_CTX").unwrap_or(defaults.file_ctx);
    let file_ctx = normalize_file_ctx(&file_ctx)?;

    let max_size = std::env::var("MAX_SIZE")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(defaults.max_size);

    let expiry_secs = std::env::var("EXPIRY_SECS")
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(defaults.expiry_secs);

    Ok(PartageConfig {
        listen,
        base_uri,
        files_dir,
        meta_dir,
        file_ctx,
        max_size,
        expiry_secs,
    })
}

/// Force the file context into `/name/` form; the root is reserved for uploads
fn normalize_file_ctx(raw: &str) -> Result<String> {
    let trimmed = raw.trim_matches('/');
    if trimmed.is_empty() {
        return Err(ServerError::Config(
            "FILE_CTX must not be the root path".to_string(),
        ));
    }
    Ok(format!("/{}/", trimmed))
}
