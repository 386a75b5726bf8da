//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, quotas > 0, addresses parse)
//! - Check the upstream credential was resolved
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{RelayConfig, UploadFilterConfig};

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a fully-resolved configuration.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    match url::Url::parse(&config.upstream.base_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::new(
            "upstream.base_url",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new("upstream.base_url", e.to_string())),
    }

    if config.upstream.api_key.is_none() {
        errors.push(ValidationError::new(
            "upstream.api_key",
            format!(
                "no credential found in environment variable {}",
                config.upstream.api_key_env
            ),
        ));
    }

    if config.models.notes_max_tokens == 0 {
        errors.push(ValidationError::new("models.notes_max_tokens", "must be greater than 0"));
    }

    let timeouts = &config.timeouts;
    for (field, value) in [
        ("timeouts.connect_secs", timeouts.connect_secs),
        ("timeouts.upstream_secs", timeouts.upstream_secs),
        ("timeouts.request_secs", timeouts.request_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }
    if timeouts.upstream_secs > timeouts.request_secs {
        errors.push(ValidationError::new(
            "timeouts.upstream_secs",
            "must not exceed timeouts.request_secs",
        ));
    }

    if config.rate_limit.enabled {
        if config.rate_limit.max_requests == 0 {
            errors.push(ValidationError::new("rate_limit.max_requests", "must be greater than 0"));
        }
        if config.rate_limit.window_secs == 0 {
            errors.push(ValidationError::new("rate_limit.window_secs", "must be greater than 0"));
        }
    }

    validate_filter("uploads.images", &config.uploads.images, &mut errors);
    validate_filter("uploads.audio", &config.uploads.audio, &mut errors);

    if config.security.max_json_bytes == 0 {
        errors.push(ValidationError::new("security.max_json_bytes", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_filter(prefix: &str, filter: &UploadFilterConfig, errors: &mut Vec<ValidationError>) {
    if filter.field.trim().is_empty() {
        errors.push(ValidationError::new(format!("{prefix}.field"), "must not be empty"));
    }
    if filter.allowed_types.is_empty() {
        errors.push(ValidationError::new(format!("{prefix}.allowed_types"), "must not be empty"));
    }
    for pattern in &filter.allowed_types {
        if !pattern.contains('/') {
            errors.push(ValidationError::new(
                format!("{prefix}.allowed_types"),
                format!("'{pattern}' is not a MIME type"),
            ));
        }
    }
    if filter.max_file_bytes == 0 {
        errors.push(ValidationError::new(format!("{prefix}.max_file_bytes"), "must be greater than 0"));
    }
    if filter.max_files == 0 {
        errors.push(ValidationError::new(format!("{prefix}.max_files"), "must be greater than 0"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret::Secret;

    fn valid_config() -> RelayConfig {
        let mut config = RelayConfig::default();
        config.upstream.api_key = Some(Secret::new("sk-test"));
        config
    }

    #[test]
    fn test_default_with_credential_is_valid() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_credential_rejected() {
        let errors = validate_config(&RelayConfig::default()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "upstream.api_key");
        assert!(errors[0].message.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_collects_every_violation() {
        let mut config = valid_config();
        config.listener.bind_address = "not-an-address".into();
        config.upstream.base_url = "ftp://example.com".into();
        config.rate_limit.max_requests = 0;
        config.uploads.audio.allowed_types.clear();
        config.uploads.images.max_files = 0;
        config.timeouts.upstream_secs = 500;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();

        assert!(fields.contains(&"listener.bind_address"));
        assert!(fields.contains(&"upstream.base_url"));
        assert!(fields.contains(&"rate_limit.max_requests"));
        assert!(fields.contains(&"uploads.audio.allowed_types"));
        assert!(fields.contains(&"uploads.images.max_files"));
        assert!(fields.contains(&"timeouts.upstream_secs"));
        assert_eq!(errors.len(), 6);
    }

    #[test]
    fn test_disabled_rate_limit_skips_quota_checks() {
        let mut config = valid_config();
        config.rate_limit.enabled = false;
        config.rate_limit.window_secs = 0;
        assert!(validate_config(&config).is_ok());
    }
}
