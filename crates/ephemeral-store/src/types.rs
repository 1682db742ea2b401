//! Store types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Metadata for one stored blob. Never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Index key and on-disk filename inside the blob directory
    pub public_name: String,
    /// Name supplied by the uploader, only used for Content-Disposition
    pub original_name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A fully written upload waiting in the staging area
#[derive(Debug, Clone)]
pub struct StagedUpload {
    /// Must live on the same filesystem as the blob directory
    pub staged_path: PathBuf,
    pub original_name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    /// TTL selector string; unknown values fall back to one hour
    pub ttl: String,
    pub desired_name: Option<String>,
}

/// Result of a successful put
#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    pub record: FileRecord,
    pub download_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub active_files: usize,
    pub total_bytes: u64,
}

/// Outcome of one sweep tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records removed from the index
    pub removed: usize,
    /// Blobs whose unlink failed for a reason other than already being gone
    pub failed: usize,
}
