//! Directory of opaque blobs named by generated identifiers

use crate::error::{Result, StoreError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Attempts at finding an unused identifier before giving up
pub const MAX_ID_ATTEMPTS: usize = 8;

/// Longest extension kept from an upload's name
const MAX_EXTENSION_LEN: usize = 16;

/// Blob files on disk, one file per upload
#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Ensure the blob directory exists
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        info!(blob_dir = ?self.dir, "Blob store initialized");
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a blob, rejecting identifiers that would leave the directory
    pub fn path(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.dir.join(id))
    }

    /// Create a new empty blob under a fresh identifier
    ///
    /// The file is opened with exclusive creation, so two concurrent uploads
    /// can never end up sharing a name. A collision simply draws a new
    /// identifier, up to [`MAX_ID_ATTEMPTS`] times.
    pub async fn create(&self, extension_hint: &str) -> Result<(String, File)> {
        let extension = sanitize_extension(extension_hint);

        for attempt in 1..=MAX_ID_ATTEMPTS {
            let id = generate_id(extension.as_deref());
            let path = self.dir.join(&id);

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    debug!(id = %id, attempt, "Created blob file");
                    return Ok((id, file));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    warn!(id = %id, attempt, "Blob identifier collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!(
                "no unused blob identifier after {} attempts",
                MAX_ID_ATTEMPTS
            ),
        )
        .into())
    }

    /// Size in bytes of a stored blob
    pub async fn len(&self, id: &str) -> Result<u64> {
        let path = self.path(id)?;
        let meta = fs::metadata(&path)
            .await
            .map_err(|e| StoreError::from_io(e, id))?;
        Ok(meta.len())
    }

    pub async fn exists(&self, id: &str) -> Result<bool> {
        match self.len(id).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete a blob; `NotFound` if it was already gone
    pub async fn remove(&self, id: &str) -> Result<()> {
        let path = self.path(id)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| StoreError::from_io(e, id))
    }
}

/// Random identifier with an optional extension appended
pub fn generate_id(extension: Option<&str>) -> String {
    let token = Uuid::new_v4().simple().to_string();
    match extension {
        Some(ext) => format!("{}.{}", token, ext),
        None => token,
    }
}

/// Extract a safe extension from an upload name such as `/docs/Report.PDF`
///
/// Only the last path segment is considered. The extension must be 1 to 16
/// ASCII alphanumerics; anything else is dropped.
pub fn sanitize_extension(hint: &str) -> Option<String> {
    let name = hint.rsplit(['/', '\\']).next().unwrap_or(hint);
    let (_, ext) = name.rsplit_once('.')?;

    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }

    Some(ext.to_ascii_lowercase())
}

/// Reject identifiers that are empty, hidden, or contain path components
pub(crate) fn validate_id(id: &str) -> Result<()> {
    let invalid = id.is_empty()
        || id.starts_with('.')
        || id.contains(['/', '\\', '\0'])
        || id.contains("..");

    if invalid {
        return Err(StoreError::NotFound(id.to_string()));
    }
    Ok(())
}
