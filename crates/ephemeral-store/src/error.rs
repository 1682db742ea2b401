//! Error types for the ephemeral store

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum StoreError {
    /// No record for the name, or its blob had vanished
    NotFound(String),
    /// The record's TTL elapsed; the record has been evicted
    Expired(String),
    NameResolutionExhausted {
        base: String,
        attempts: u32,
    },
    StorageIo {
        op: &'static str,
        path: PathBuf,
        source: Box<io::Error>,
    },
}

impl StoreError {
    pub(crate) fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        StoreError::StorageIo {
            op,
            path: path.to_path_buf(),
            source: Box::new(source),
        }
    }

    /// NotFound and Expired are caller-facing outcomes; everything else is internal
    pub fn is_client_error(&self) -> bool {
        matches!(self, StoreError::NotFound(_) | StoreError::Expired(_))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(name) => write!(f, "File not found: {}", name),
            StoreError::Expired(name) => write!(f, "File has expired: {}", name),
            StoreError::NameResolutionExhausted { base, attempts } => write!(
                f,
                "Could not find a free name for {} after {} attempts",
                base, attempts
            ),
            StoreError::StorageIo { op, path, source } => {
                write!(f, "Storage error during {} on {:?}: {}", op, path, source)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::StorageIo { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
