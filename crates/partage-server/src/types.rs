//! Core types for the partage server

use serde::Serialize;
use std::path::PathBuf;

/// Configuration for the server
#[derive(Debug, Clone)]
pub struct PartageConfig {
    pub listen: String,
    /// Scheme and authority prepended to every returned link
    pub base_uri: String,
    pub files_dir: PathBuf,
    pub meta_dir: PathBuf,
    /// Path prefix stored blobs are served under, e.g. `/f/`
    pub file_ctx: String,
    pub max_size: u64,
    /// Lifetime of every upload; zero or negative keeps uploads forever
    pub expiry_secs: i64,
}

impl Default for PartageConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            base_uri: "http://127.0.0.1:8080".to_string(),
            files_dir: PathBuf::from("files"),
            meta_dir: PathBuf::from("meta"),
            file_ctx: "/f/".to_string(),
            max_size: 32 * 1024 * 1024 * 1024, // 32GiB
            expiry_secs: 24 * 60 * 60,         // 24 hours
        }
    }
}

/// Response format requested by a multipart upload's `output` field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkFormat {
    #[default]
    Text,
    Json,
}

impl LinkFormat {
    pub fn from_field(value: &str) -> Self {
        match value.trim() {
            "json" => LinkFormat::Json,
            _ => LinkFormat::Text,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub max_size: u64,
    pub expiry_secs: i64,
}
