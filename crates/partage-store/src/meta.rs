//! Sidecar metadata records, one JSON file per blob

use crate::blob::validate_id;
use crate::error::{Result, StoreError};
use crate::types::Metadata;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Suffix reserved for metadata records
pub const METADATA_SUFFIX: &str = ".json";

/// Metadata records stored as `<dir>/<blob id>.json`
#[derive(Debug, Clone)]
pub struct MetadataStore {
    dir: PathBuf,
}

impl MetadataStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Ensure the metadata directory exists
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        info!(metadata_dir = ?self.dir, "Metadata store initialized");
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for a blob
    pub fn path(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.dir.join(format!("{}{}", id, METADATA_SUFFIX)))
    }

    /// Write the record for a blob, expiring `expiry_secs` from now
    pub async fn put(&self, id: &str, size: u64, expiry_secs: i64) -> Result<Metadata> {
        self.put_at(id, size, expiry_secs, Utc::now().timestamp())
            .await
    }

    /// Write the record for a blob relative to an explicit clock value
    ///
    /// A non-positive `expiry_secs` stores `Expiry = 0`, which never expires.
    /// The record is written to a hidden temporary file, synced, then renamed
    /// over the final name, so readers only ever see a complete record.
    pub async fn put_at(
        &self,
        id: &str,
        size: u64,
        expiry_secs: i64,
        now: i64,
    ) -> Result<Metadata> {
        let path = self.path(id)?;
        let meta = Metadata {
            filename: id.to_string(),
            size: i64::try_from(size).unwrap_or(i64::MAX),
            expiry: if expiry_secs > 0 {
                now.saturating_add(expiry_secs)
            } else {
                0
            },
        };

        let data = serde_json::to_vec(&meta).map_err(|e| {
            StoreError::Io(Box::new(std::io::Error::new(ErrorKind::InvalidData, e)))
        })?;

        let tmp_path = self.dir.join(format!(
            ".{}{}.{}.tmp",
            id,
            METADATA_SUFFIX,
            Uuid::new_v4().simple()
        ));

        if let Err(e) = write_synced(&tmp_path, &data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        debug!(
            id = %id,
            size = meta.size,
            expiry = meta.expiry,
            path = ?path,
            "Saved metadata"
        );
        Ok(meta)
    }

    /// Read and parse the record for a blob
    pub async fn get(&self, id: &str) -> Result<Metadata> {
        let path = self.path(id)?;
        let data = fs::read(&path)
            .await
            .map_err(|e| StoreError::from_io(e, id))?;

        serde_json::from_slice(&data).map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    /// Delete the record for a blob; `NotFound` if it was already gone
    pub async fn remove(&self, id: &str) -> Result<()> {
        let path = self.path(id)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| StoreError::from_io(e, id))
    }

    /// Identifiers of every record in the directory
    ///
    /// Only regular files ending in `.json` count; temporary files, hidden
    /// files and anything else in the directory are ignored.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                warn!(name = ?entry.file_name(), "Skipping non UTF-8 entry");
                continue;
            };

            let Some(id) = name.strip_suffix(METADATA_SUFFIX) else {
                continue;
            };
            if validate_id(id).is_err() {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }

            ids.push(id.to_string());
        }

        ids.sort();
        Ok(ids)
    }
}

async fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await
}
