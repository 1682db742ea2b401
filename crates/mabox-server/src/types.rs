//! Wire types for the Mabox HTTP API

use chrono::{DateTime, SecondsFormat, Utc};
use ephemeral_store::{FileRecord, StoredFile};
use serde::Serialize;

/// `{ success, message?, data? }` envelope used by every JSON response
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: Option<&str>, data: T) -> Self {
        Self {
            success: true,
            message: message.map(str::to_string),
            data: Some(data),
        }
    }
}

/// Same shape as JavaScript's `Date.prototype.toISOString`
pub fn iso8601(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadData {
    pub file_name: String,
    pub original_name: String,
    pub file_size: u64,
    pub download_url: String,
    pub expires_at: String,
    /// The selector exactly as the client sent it
    pub ttl: Option<String>,
}

impl UploadData {
    pub fn new(stored: StoredFile, ttl: Option<String>) -> Self {
        let StoredFile {
            record,
            download_url,
        } = stored;
        Self {
            expires_at: iso8601(record.expires_at),
            file_name: record.public_name,
            original_name: record.original_name,
            file_size: record.size_bytes,
            download_url,
            ttl,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub original_name: String,
    pub size: u64,
    pub uploaded_at: String,
    pub expires_at: String,
    pub mimetype: String,
}

impl From<FileRecord> for FileInfo {
    fn from(record: FileRecord) -> Self {
        Self {
            uploaded_at: iso8601(record.uploaded_at),
            expires_at: iso8601(record.expires_at),
            original_name: record.original_name,
            size: record.size_bytes,
            mimetype: record.mime_type,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub success: bool,
    pub message: String,
    /// Seconds since the server started
    pub uptime: f64,
    pub active_files: usize,
}
