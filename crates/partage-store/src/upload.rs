//! Streaming uploads into the blob store

use crate::blob::BlobStore;
use crate::error::{Result, StoreError};
use crate::meta::MetadataStore;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Bytes read from the source per write
pub const CHUNK_SIZE: usize = 4096;

/// Sole producer of (blob, metadata) pairs
///
/// Cloning is cheap and every call to [`Uploader::store`] is independent, so
/// one instance can be shared across all request handlers.
#[derive(Debug, Clone)]
pub struct Uploader {
    blobs: BlobStore,
    metadata: MetadataStore,
    max_size: u64,
}

impl Uploader {
    pub fn new(blobs: BlobStore, metadata: MetadataStore, max_size: u64) -> Self {
        Self {
            blobs,
            metadata,
            max_size,
        }
    }

    /// Create both storage directories
    pub async fn init(&self) -> Result<()> {
        self.blobs.init().await?;
        self.metadata.init().await
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// Store an upload of `declared_length` bytes and return its identifier
    ///
    /// Never writes more than `declared_length` bytes even if the source has
    /// more; a source that ends early produces a shorter blob. The blob is
    /// synced to disk before its metadata record is committed. On failure,
    /// or if the returned future is dropped before completing, nothing is
    /// left behind.
    pub async fn store<R>(
        &self,
        stream: R,
        declared_length: u64,
        extension_hint: &str,
        expiry_secs: i64,
    ) -> Result<String>
    where
        R: AsyncRead + Unpin,
    {
        if declared_length > self.max_size {
            warn!(
                declared_length,
                max_size = self.max_size,
                "Rejecting upload above maximum size"
            );
            return Err(StoreError::QuotaExceeded {
                declared: declared_length,
                max: self.max_size,
            });
        }

        self.write(stream, declared_length, Overflow::Clip, extension_hint, expiry_secs)
            .await
    }

    /// Store an upload whose length is not known up front
    ///
    /// Reads up to the maximum size; a source with more data than that is
    /// rejected with `QuotaExceeded` and its partial blob removed.
    pub async fn store_unsized<R>(
        &self,
        stream: R,
        extension_hint: &str,
        expiry_secs: i64,
    ) -> Result<String>
    where
        R: AsyncRead + Unpin,
    {
        self.write(stream, self.max_size, Overflow::Reject, extension_hint, expiry_secs)
            .await
    }

    async fn write<R>(
        &self,
        mut stream: R,
        limit: u64,
        overflow: Overflow,
        extension_hint: &str,
        expiry_secs: i64,
    ) -> Result<String>
    where
        R: AsyncRead + Unpin,
    {
        let (id, mut file) = self.blobs.create(extension_hint).await?;
        let mut pending = PendingBlob::new(self.blobs.dir().join(&id));
        debug!(id = %id, limit, "Writing upload");

        let written = match write_blob(&mut stream, &mut file, limit).await {
            Ok(written) => written,
            Err(e) => {
                warn!(id = %id, error = %e, "Upload failed, removing partial blob");
                return Err(e.into());
            }
        };
        drop(file);

        if overflow == Overflow::Reject && written == limit {
            let mut extra = [0u8; 1];
            if stream.read(&mut extra).await? > 0 {
                warn!(
                    id = %id,
                    max_size = self.max_size,
                    "Upload exceeds maximum size, removing partial blob"
                );
                return Err(StoreError::QuotaExceeded {
                    declared: limit.saturating_add(1),
                    max: self.max_size,
                });
            }
        }

        if let Err(e) = self.metadata.put(&id, written, expiry_secs).await {
            warn!(id = %id, error = %e, "Failed to commit metadata, removing blob");
            return Err(e);
        }
        pending.commit();

        info!(id = %id, size = written, "Stored upload");
        Ok(id)
    }
}

/// What to do with source bytes past the write limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overflow {
    /// Truncate silently; the caller declared the length
    Clip,
    /// Fail the upload with `QuotaExceeded`
    Reject,
}

/// Removes a blob on drop unless its metadata was committed
///
/// Covers early returns as well as the upload future being dropped mid
/// transfer, e.g. on client disconnect or a request timeout.
struct PendingBlob {
    path: PathBuf,
    committed: bool,
}

impl PendingBlob {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn commit(&mut self) {
        self.committed = true;
    }
}

impl Drop for PendingBlob {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = ?self.path, "Removed uncommitted blob"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = ?self.path, error = %e, "Failed to remove blob"),
        }
    }
}

/// Copy at most `limit` bytes in [`CHUNK_SIZE`] chunks, then sync the file
async fn write_blob<R>(reader: &mut R, file: &mut File, limit: u64) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut written: u64 = 0;

    while written < limit {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }

        // clip so a source longer than its declared length is truncated
        let take = (read as u64).min(limit - written) as usize;
        file.write_all(&buffer[..take]).await?;
        written += take as u64;
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::io;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::io::ReadBuf;

    struct BrokenReader;

    impl AsyncRead for BrokenReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::other("connection reset")))
        }
    }

    /// Yields a few bytes, then never produces more
    struct StalledReader {
        sent: bool,
    }

    impl AsyncRead for StalledReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.sent {
                return Poll::Pending;
            }
            self.sent = true;
            buf.put_slice(&[9u8; 10]);
            Poll::Ready(Ok(()))
        }
    }

    async fn create_uploader(max_size: u64) -> (tempfile::TempDir, Uploader) {
        let dir = tempdir().unwrap();
        let uploader = Uploader::new(
            BlobStore::new(dir.path().join("files")),
            MetadataStore::new(dir.path().join("meta")),
            max_size,
        );
        uploader.init().await.unwrap();
        (dir, uploader)
    }

    fn count_files(path: &std::path::Path) -> usize {
        std::fs::read_dir(path).unwrap().count()
    }

    #[tokio::test]
    async fn test_store_full_upload() {
        let (_dir, uploader) = create_uploader(1024).await;
        let data = vec![7u8; 100];

        let before = Utc::now().timestamp();
        let id = uploader
            .store(&data[..], 100, "photo.png", 3600)
            .await
            .unwrap();
        let after = Utc::now().timestamp();

        assert!(id.ends_with(".png"));
        let stored = std::fs::read(uploader.blobs().path(&id).unwrap()).unwrap();
        assert_eq!(stored, data);

        let meta = uploader.metadata().get(&id).await.unwrap();
        assert_eq!(meta.filename, id);
        assert_eq!(meta.size, 100);
        assert!(meta.expiry >= before + 3600 && meta.expiry <= after + 3600);
    }

    #[tokio::test]
    async fn test_store_short_source() {
        let (_dir, uploader) = create_uploader(1024).await;
        let data = vec![1u8; 50];

        let id = uploader.store(&data[..], 100, "a.bin", 60).await.unwrap();

        assert_eq!(uploader.blobs().len(&id).await.unwrap(), 50);
        assert_eq!(uploader.metadata().get(&id).await.unwrap().size, 50);
    }

    #[tokio::test]
    async fn test_store_clips_long_source() {
        let (_dir, uploader) = create_uploader(1 << 20).await;
        // spans several chunks and stops mid-chunk
        let data: Vec<u8> = (0..20_000u32).map(|i| i as u8).collect();

        let id = uploader.store(&data[..], 9_000, "", 60).await.unwrap();

        let stored = std::fs::read(uploader.blobs().path(&id).unwrap()).unwrap();
        assert_eq!(stored.len(), 9_000);
        assert_eq!(&stored[..], &data[..9_000]);
        assert_eq!(uploader.metadata().get(&id).await.unwrap().size, 9_000);
    }

    #[tokio::test]
    async fn test_store_rejects_oversize_without_side_effects() {
        let (dir, uploader) = create_uploader(10).await;
        let data = vec![0u8; 11];

        let err = uploader.store(&data[..], 11, "x.txt", 60).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::QuotaExceeded {
                declared: 11,
                max: 10
            }
        ));

        assert_eq!(count_files(&dir.path().join("files")), 0);
        assert_eq!(count_files(&dir.path().join("meta")), 0);
    }

    #[tokio::test]
    async fn test_store_at_exact_maximum() {
        let (_dir, uploader) = create_uploader(10).await;
        let data = vec![0u8; 10];

        let id = uploader.store(&data[..], 10, "", 60).await.unwrap();
        assert_eq!(uploader.blobs().len(&id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_store_source_failure_leaves_nothing() {
        let (dir, uploader) = create_uploader(1024).await;
        let source = (&b"partial"[..]).chain(BrokenReader);

        let err = uploader.store(source, 100, "x.txt", 60).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));

        assert_eq!(count_files(&dir.path().join("files")), 0);
        assert_eq!(count_files(&dir.path().join("meta")), 0);
    }

    #[tokio::test]
    async fn test_store_without_expiry() {
        let (_dir, uploader) = create_uploader(1024).await;

        let id = uploader.store(&b"keep"[..], 4, "", 0).await.unwrap();
        assert_eq!(uploader.metadata().get(&id).await.unwrap().expiry, 0);
    }

    #[tokio::test]
    async fn test_concurrent_uploads_are_independent() {
        let (_dir, uploader) = create_uploader(1 << 20).await;
        let uploader = Arc::new(uploader);

        let mut handles = Vec::new();
        for i in 0..16u8 {
            let uploader = uploader.clone();
            handles.push(tokio::spawn(async move {
                let data = vec![i; 5000 + i as usize];
                let id = uploader
                    .store(&data[..], data.len() as u64, "same.txt", 60)
                    .await
                    .unwrap();
                (id, data)
            }));
        }

        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            let (id, data) = handle.await.unwrap();
            let stored = std::fs::read(uploader.blobs().path(&id).unwrap()).unwrap();
            assert_eq!(stored, data);
            assert!(ids.insert(id));
        }
        assert_eq!(ids.len(), 16);
    }

    #[tokio::test]
    async fn test_cancelled_upload_leaves_nothing() {
        let (dir, uploader) = create_uploader(1024).await;

        let result = tokio::time::timeout(
            Duration::from_millis(200),
            uploader.store(StalledReader { sent: false }, 100, "a.txt", 60),
        )
        .await;
        assert!(result.is_err());

        assert_eq!(count_files(&dir.path().join("files")), 0);
        assert_eq!(count_files(&dir.path().join("meta")), 0);
    }

    #[tokio::test]
    async fn test_metadata_failure_removes_blob() {
        let (dir, uploader) = create_uploader(1024).await;
        let meta_dir = dir.path().join("meta");
        std::fs::remove_dir(&meta_dir).unwrap();
        std::fs::write(&meta_dir, b"not a directory").unwrap();

        let err = uploader.store(&b"data"[..], 4, "x.txt", 60).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));

        assert_eq!(count_files(&dir.path().join("files")), 0);
    }

    #[tokio::test]
    async fn test_store_unsized_within_limit() {
        let (_dir, uploader) = create_uploader(10).await;

        let id = uploader
            .store_unsized(&b"0123456789"[..], "a.txt", 60)
            .await
            .unwrap();
        assert_eq!(uploader.blobs().len(&id).await.unwrap(), 10);
        assert_eq!(uploader.metadata().get(&id).await.unwrap().size, 10);
    }

    #[tokio::test]
    async fn test_store_unsized_over_limit_is_rejected() {
        let (dir, uploader) = create_uploader(10).await;

        let err = uploader
            .store_unsized(&b"0123456789A"[..], "a.txt", 60)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { max: 10, .. }));

        assert_eq!(count_files(&dir.path().join("files")), 0);
        assert_eq!(count_files(&dir.path().join("meta")), 0);
    }
}
