//! Expiry sweeping: reclaims (blob, metadata) pairs past their deadline

use crate::blob::BlobStore;
use crate::error::{Result, StoreError};
use crate::meta::MetadataStore;
use crate::types::{CorruptPolicy, Metadata, SweepReport};
use chrono::Utc;
use tracing::{debug, info, warn};

/// Result of examining a single record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryOutcome {
    Deleted,
    Retained(u64),
    Skipped,
    /// Record disappeared between listing and reading
    Vanished,
}

/// One-shot pass over every metadata record
///
/// Only one sweeper is expected to run at a time. Deletions are never rolled
/// back: if the pass stops early, pairs already reclaimed stay deleted.
#[derive(Debug, Clone)]
pub struct Sweeper {
    blobs: BlobStore,
    metadata: MetadataStore,
    policy: CorruptPolicy,
    grace_secs: i64,
}

impl Sweeper {
    pub fn new(blobs: BlobStore, metadata: MetadataStore) -> Self {
        Self {
            blobs,
            metadata,
            policy: CorruptPolicy::default(),
            grace_secs: 0,
        }
    }

    pub fn with_policy(mut self, policy: CorruptPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Keep expired pairs around for `grace_secs` past their deadline
    pub fn with_grace(mut self, grace_secs: i64) -> Self {
        self.grace_secs = grace_secs.max(0);
        self
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now().timestamp()).await
    }

    /// Run a pass as if the current time were `now`
    pub async fn sweep_at(&self, now: i64) -> Result<SweepReport> {
        let ids = self.metadata.list().await?;
        let mut report = SweepReport::default();

        for id in ids {
            match self.sweep_entry(&id, now).await? {
                EntryOutcome::Deleted => {
                    report.scanned += 1;
                    report.deleted += 1;
                }
                EntryOutcome::Retained(size) => {
                    report.scanned += 1;
                    report.retained += 1;
                    report.retained_bytes = report.retained_bytes.saturating_add(size);
                }
                EntryOutcome::Skipped => report.skipped += 1,
                EntryOutcome::Vanished => {}
            }
        }

        info!(
            scanned = report.scanned,
            deleted = report.deleted,
            retained_bytes = report.retained_bytes,
            skipped = report.skipped,
            "Sweep complete"
        );
        Ok(report)
    }

    async fn sweep_entry(&self, id: &str, now: i64) -> Result<EntryOutcome> {
        let meta = match self.read_record(id).await {
            Ok(meta) => meta,
            Err(StoreError::NotFound(_)) => return Ok(EntryOutcome::Vanished),
            Err(e @ StoreError::Corrupt { .. }) => match self.policy {
                CorruptPolicy::Skip => {
                    warn!(id = %id, error = %e, "Skipping corrupt metadata record");
                    return Ok(EntryOutcome::Skipped);
                }
                CorruptPolicy::Abort => return Err(e),
            },
            Err(e) => return Err(e),
        };

        if !meta.is_expired_at(now.saturating_sub(self.grace_secs)) {
            if meta.never_expires() {
                debug!(id = %id, "Never expires");
            } else {
                debug!(id = %id, expires_in_secs = meta.expiry - now, "Not expired");
            }
            return Ok(EntryOutcome::Retained(meta.size.max(0) as u64));
        }

        debug!(id = %id, expired_secs_ago = now - meta.expiry, "Expired");

        // blob first: a crash in between leaves a record for a missing blob,
        // which the next pass collects
        match self.blobs.remove(&meta.filename).await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => {
                warn!(id = %id, blob = %meta.filename, "Blob already missing, removing record");
            }
            Err(e) => return Err(e),
        }

        match self.metadata.remove(id).await {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        info!(id = %id, size = meta.size, "Deleted expired blob");
        Ok(EntryOutcome::Deleted)
    }

    /// Read a record, treating one that names any blob but its own as corrupt
    async fn read_record(&self, id: &str) -> Result<Metadata> {
        let meta = self.metadata.get(id).await?;

        if meta.filename != id {
            return Err(StoreError::Corrupt {
                id: id.to_string(),
                reason: format!("record names blob {:?}", meta.filename),
            });
        }
        Ok(meta)
    }
}
