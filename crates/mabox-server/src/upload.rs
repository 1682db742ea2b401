//! Multipart upload parsing and staging
//!
//! Streams the `file` part to a temporary file in the staging directory,
//! enforcing the extension allow-list and the size limit, and collects the
//! `ttl` and `fileName` text fields.

use crate::error::AppError;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;
use ephemeral_store::sanitize_name;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Accepted MIME types and their extensions
pub const ALLOWED_FILE_TYPES: &[(&str, &[&str])] = &[
    ("application/pdf", &[".pdf"]),
    ("image/jpeg", &[".jpg", ".jpeg"]),
    ("image/png", &[".png"]),
    ("image/gif", &[".gif"]),
    ("image/webp", &[".webp"]),
    ("image/svg+xml", &[".svg"]),
    ("image/bmp", &[".bmp"]),
    ("image/tiff", &[".tiff", ".tif"]),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        &[".docx"],
    ),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        &[".xlsx"],
    ),
    ("text/csv", &[".csv"]),
    ("application/csv", &[".csv"]),
    ("text/plain", &[".txt"]),
    ("application/zip", &[".zip"]),
    ("application/x-zip-compressed", &[".zip"]),
    ("application/x-rar-compressed", &[".rar"]),
    ("application/vnd.rar", &[".rar"]),
];

const DISALLOWED_TYPE_MESSAGE: &str = "File type not allowed. Only PDF, images (JPG, PNG, GIF, WebP, SVG, BMP, TIFF), DOCX, XLSX, CSV, ZIP, and RAR files are permitted.";

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Lowercased `.ext` of a file name, empty if none
fn extension_of(name: &str) -> String {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name[idx..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// Only the extension decides; the browser-reported MIME type is advisory.
pub fn is_allowed_file(name: &str) -> bool {
    let ext = extension_of(name);
    !ext.is_empty()
        && ALLOWED_FILE_TYPES
            .iter()
            .any(|(_, exts)| exts.contains(&ext.as_str()))
}

pub fn too_large_message(max_bytes: u64) -> String {
    const GIB: u64 = 1024 * 1024 * 1024;
    const MIB: u64 = 1024 * 1024;

    let limit = if max_bytes >= GIB && max_bytes % GIB == 0 {
        format!("{}GB", max_bytes / GIB)
    } else if max_bytes >= MIB && max_bytes % MIB == 0 {
        format!("{}MB", max_bytes / MIB)
    } else {
        format!("{} bytes", max_bytes)
    };
    format!("File too large. Maximum size is {}.", limit)
}

/// A file part fully written to the staging directory
#[derive(Debug)]
pub struct StagedFile {
    pub path: PathBuf,
    pub original_name: String,
    pub size: u64,
    pub mime_type: String,
}

#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<StagedFile>,
    pub ttl: Option<String>,
    pub file_name: Option<String>,
}

/// Best-effort removal of a staged file that will not reach the store
pub async fn discard_staged(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = ?path, error = %e, "Failed to remove staged upload");
        }
    }
}

fn multipart_error(err: MultipartError, max_bytes: u64) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::BadRequest(too_large_message(max_bytes))
    } else {
        AppError::BadRequest(format!("Invalid upload: {}", err.body_text()))
    }
}

/// Read the whole multipart body. On error nothing is left in the staging directory.
pub async fn read_upload(
    mut multipart: Multipart,
    staging_dir: &Path,
    max_bytes: u64,
) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    let result = read_fields(&mut multipart, &mut form, staging_dir, max_bytes).await;
    if let Err(e) = result {
        if let Some(file) = form.file.take() {
            discard_staged(&file.path).await;
        }
        return Err(e);
    }

    Ok(form)
}

async fn read_fields(
    multipart: &mut Multipart,
    form: &mut UploadForm,
    staging_dir: &Path,
    max_bytes: u64,
) -> Result<(), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                if form.file.is_some() {
                    return Err(AppError::BadRequest("Only one file per upload".into()));
                }
                form.file = Some(stage_file(field, staging_dir, max_bytes).await?);
            }
            "ttl" => {
                form.ttl = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| multipart_error(e, max_bytes))?,
                );
            }
            "fileName" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, max_bytes))?;
                form.file_name = Some(value.trim().to_string()).filter(|v| !v.is_empty());
            }
            other => debug!(field = %other, "Ignoring unknown multipart field"),
        }
    }

    Ok(())
}

async fn stage_file(
    field: Field<'_>,
    staging_dir: &Path,
    max_bytes: u64,
) -> Result<StagedFile, AppError> {
    let original_name = sanitize_name(field.file_name().unwrap_or_default());
    if !is_allowed_file(&original_name) {
        return Err(AppError::BadRequest(DISALLOWED_TYPE_MESSAGE.into()));
    }

    let mime_type = field
        .content_type()
        .map(str::to_string)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

    let path = staging_dir.join(format!(
        "temp_{}{}",
        Uuid::new_v4().simple(),
        extension_of(&original_name)
    ));

    match write_field(field, &path, max_bytes).await {
        Ok(size) => {
            debug!(path = ?path, size, original = %original_name, "Staged upload");
            Ok(StagedFile {
                path,
                original_name,
                size,
                mime_type,
            })
        }
        Err(e) => {
            discard_staged(&path).await;
            Err(e)
        }
    }
}

async fn write_field(mut field: Field<'_>, path: &Path, max_bytes: u64) -> Result<u64, AppError> {
    let io_error = |e: std::io::Error| AppError::Internal(format!("staging {:?}: {}", path, e));

    let mut file = File::create(path).await.map_err(io_error)?;
    let mut size: u64 = 0;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        size += chunk.len() as u64;
        if size > max_bytes {
            return Err(AppError::BadRequest(too_large_message(max_bytes)));
        }
        file.write_all(&chunk).await.map_err(io_error)?;
    }

    file.flush().await.map_err(io_error)?;
    Ok(size)
}
