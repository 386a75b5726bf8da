//! Multipart intake: buffers accepted files in memory.

use std::collections::HashMap;

use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;
use bytes::{Bytes, BytesMut};

use crate::upload::filter::{UploadError, UploadFilter};

/// Cap on each text part. Only short fields such as note text are expected.
pub const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;

/// A file part that passed its filter.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field_name: String,
    pub file_name: Option<String>,
    /// Normalized MIME type.
    pub content_type: String,
    pub data: Bytes,
}

/// Everything read from one multipart body, in upload order.
#[derive(Debug, Default)]
pub struct UploadBatch {
    pub files: Vec<UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl UploadBatch {
    /// A text field, if present and not blank.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    /// The single file of a one-file upload.
    pub fn into_single_file(self, filter: &UploadFilter) -> Result<UploadedFile, UploadError> {
        self.files
            .into_iter()
            .next()
            .ok_or_else(|| UploadError::MissingFile {
                field: filter.field().to_string(),
            })
    }

    pub fn total_bytes(&self) -> usize {
        self.files.iter().map(|f| f.data.len()).sum()
    }
}

impl From<MultipartError> for UploadError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::BodyTooLarge
        } else {
            UploadError::Malformed(e.body_text())
        }
    }
}

/// Read every part of `multipart`, applying `filter` to each file part.
///
/// Parts without a file name are text fields and are collected as such.
pub async fn intake(mut multipart: Multipart, filter: &UploadFilter) -> Result<UploadBatch, UploadError> {
    let mut batch = UploadBatch::default();

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        let Some(file_name) = field.file_name().map(str::to_string) else {
            let mut data = BytesMut::new();
            while let Some(chunk) = field.chunk().await? {
                if data.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
                    return Err(UploadError::FieldTooLarge {
                        field: name,
                        limit: MAX_TEXT_FIELD_BYTES,
                    });
                }
                data.extend_from_slice(&chunk);
            }
            let value = String::from_utf8(data.to_vec())
                .map_err(|_| UploadError::Malformed(format!("field '{name}' is not valid UTF-8")))?;
            batch.fields.insert(name, value);
            continue;
        };

        filter.check_field(&name)?;
        let content_type = filter.check_type(field.content_type())?;
        filter.check_count(batch.files.len() + 1)?;

        let mut data = BytesMut::new();
        while let Some(chunk) = field.chunk().await? {
            filter.check_size(data.len() + chunk.len())?;
            data.extend_from_slice(&chunk);
        }

        tracing::debug!(
            field = %name,
            content_type = %content_type,
            size = data.len(),
            "Accepted upload"
        );

        batch.files.push(UploadedFile {
            field_name: name,
            file_name: Some(file_name).filter(|n| !n.is_empty()),
            content_type,
            data: data.freeze(),
        });
    }

    Ok(batch)
}
