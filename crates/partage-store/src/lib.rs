//! Blob storage with sidecar metadata and expiry sweeping
//!
//! Uploads are written to a blob directory under generated identifiers, and
//! each blob gets a JSON record in a separate metadata directory holding its
//! size and expiry deadline. The [`Sweeper`] later deletes every pair whose
//! deadline has passed.
//!
//! Write order is always blob first (synced), then metadata; deletion is
//! blob first, then metadata. A record therefore never points at a blob that
//! is still being written.

mod blob;
mod error;
mod meta;
mod sweep;
mod types;
mod upload;

pub use blob::{generate_id, sanitize_extension, BlobStore, MAX_ID_ATTEMPTS};
pub use error::{Result, StoreError};
pub use meta::{MetadataStore, METADATA_SUFFIX};
pub use sweep::Sweeper;
pub use types::{human_bytes, CorruptPolicy, Metadata, SweepReport};
pub use upload::{Uploader, CHUNK_SIZE};
