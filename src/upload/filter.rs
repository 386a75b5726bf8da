//! Upload filters: field name, MIME allow-list, size cap, file count.

use axum::http::StatusCode;
use thiserror::Error;

use crate::config::UploadFilterConfig;

/// Multipart default when a part declares no content type.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Why an upload was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("Unexpected field '{found}', expected '{expected}'")]
    UnexpectedField { expected: String, found: String },

    #[error("File type '{mime}' is not allowed")]
    UnsupportedType { mime: String },

    #[error("File exceeds the {limit} byte limit")]
    FileTooLarge { limit: usize },

    #[error("Too many files, at most {limit} allowed")]
    TooManyFiles { limit: usize },

    #[error("Missing file in field '{field}'")]
    MissingFile { field: String },

    #[error("Field '{field}' exceeds the {limit} byte limit")]
    FieldTooLarge { field: String, limit: usize },

    #[error("Request body exceeds the allowed size")]
    BodyTooLarge,

    #[error("Malformed multipart body: {0}")]
    Malformed(String),
}

impl UploadError {
    pub fn status(&self) -> StatusCode {
        match self {
            UploadError::UnsupportedType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            UploadError::FileTooLarge { .. }
            | UploadError::FieldTooLarge { .. }
            | UploadError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::UnexpectedField { .. }
            | UploadError::TooManyFiles { .. }
            | UploadError::MissingFile { .. }
            | UploadError::Malformed(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            UploadError::UnexpectedField { .. } => "unexpected_field",
            UploadError::UnsupportedType { .. } => "unsupported_type",
            UploadError::FileTooLarge { .. } => "file_too_large",
            UploadError::TooManyFiles { .. } => "too_many_files",
            UploadError::MissingFile { .. } => "missing_file",
            UploadError::FieldTooLarge { .. } => "field_too_large",
            UploadError::BodyTooLarge => "body_too_large",
            UploadError::Malformed(_) => "malformed",
        }
    }
}

/// Validation applied to every file part before it is accepted.
#[derive(Debug, Clone)]
pub struct UploadFilter {
    field: String,
    allowed_types: Vec<String>,
    max_file_bytes: usize,
    max_files: usize,
}

impl UploadFilter {
    pub fn new(
        field: impl Into<String>,
        allowed_types: Vec<String>,
        max_file_bytes: usize,
        max_files: usize,
    ) -> Self {
        Self {
            field: field.into(),
            allowed_types: allowed_types
                .into_iter()
                .map(|t| t.trim().to_ascii_lowercase())
                .collect(),
            max_file_bytes,
            max_files,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn max_file_bytes(&self) -> usize {
        self.max_file_bytes
    }

    pub fn check_field(&self, name: &str) -> Result<(), UploadError> {
        if name == self.field {
            Ok(())
        } else {
            Err(UploadError::UnexpectedField {
                expected: self.field.clone(),
                found: name.to_string(),
            })
        }
    }

    /// Check the declared content type; returns its normalized essence
    /// (lowercase, parameters stripped).
    pub fn check_type(&self, content_type: Option<&str>) -> Result<String, UploadError> {
        let essence = essence(content_type.unwrap_or(DEFAULT_CONTENT_TYPE));
        if self
            .allowed_types
            .iter()
            .any(|pattern| type_matches(pattern, &essence))
        {
            Ok(essence)
        } else {
            Err(UploadError::UnsupportedType { mime: essence })
        }
    }

    pub fn check_size(&self, size: usize) -> Result<(), UploadError> {
        if size > self.max_file_bytes {
            Err(UploadError::FileTooLarge {
                limit: self.max_file_bytes,
            })
        } else {
            Ok(())
        }
    }

    pub fn check_count(&self, count: usize) -> Result<(), UploadError> {
        if count > self.max_files {
            Err(UploadError::TooManyFiles {
                limit: self.max_files,
            })
        } else {
            Ok(())
        }
    }
}

impl From<&UploadFilterConfig> for UploadFilter {
    fn from(config: &UploadFilterConfig) -> Self {
        Self::new(
            config.field.clone(),
            config.allowed_types.clone(),
            config.max_file_bytes,
            config.max_files,
        )
    }
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn type_matches(pattern: &str, essence: &str) -> bool {
    match pattern.strip_suffix("/*") {
        Some("*") => essence.contains('/'),
        Some(top) => essence
            .strip_prefix(top)
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|sub| !sub.is_empty()),
        None => pattern == essence,
    }
}
