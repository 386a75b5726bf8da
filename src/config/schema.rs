//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::config::secret::Secret;

const MIB: usize = 1024 * 1024;

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Upstream API location and credential.
    pub upstream: UpstreamConfig,

    /// Fixed model parameters injected into outbound requests.
    pub models: ModelConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Upload filters for the multipart routes.
    pub uploads: UploadsConfig,

    /// Security hardening settings.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Upstream completions API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL, without trailing slash (e.g., "https://api.openai.com/v1").
    pub base_url: String,

    /// Path of the chat completions endpoint, relative to `base_url`.
    pub chat_path: String,

    /// Path of the audio transcription endpoint, relative to `base_url`.
    pub transcription_path: String,

    /// Name of the environment variable holding the bearer credential.
    pub api_key_env: String,

    /// Resolved credential. Only ever read from the environment.
    #[serde(skip)]
    pub api_key: Option<Secret>,
}

impl UpstreamConfig {
    /// Full URL of the chat completions endpoint.
    pub fn chat_url(&self) -> String {
        join_url(&self.base_url, &self.chat_path)
    }

    /// Full URL of the transcription endpoint.
    pub fn transcription_url(&self) -> String {
        join_url(&self.base_url, &self.transcription_path)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            chat_path: "/chat/completions".to_string(),
            transcription_path: "/audio/transcriptions".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Model parameters the relay fixes on behalf of clients.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model sent with every transcription request.
    pub transcription_model: String,

    /// Model used for note analysis.
    pub notes_model: String,

    /// Completion token cap for note analysis.
    pub notes_max_tokens: u32,

    /// System prompt prepended to every note analysis request.
    pub notes_system_prompt: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            transcription_model: "whisper-1".to_string(),
            notes_model: "gpt-4o".to_string(),
            notes_max_tokens: 1000,
            notes_system_prompt: "You are an assistant that reads handwritten and typed notes. \
                Transcribe the content of the provided images, then summarize the key points \
                and list any action items."
                .to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Total time allowed for one upstream call, in seconds.
    pub upstream_secs: u64,

    /// Total time allowed for one inbound request, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            upstream_secs: 120,
            request_secs: 150,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Requests allowed per client within one window.
    pub max_requests: u32,

    /// Fixed window length in seconds.
    pub window_secs: u64,

    /// Key clients by the first X-Forwarded-For entry instead of the peer address.
    /// Only safe behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 100,
            window_secs: 15 * 60,
            trust_forwarded_for: false,
        }
    }
}

/// Filters for both multipart routes.
///
/// The two filters have different defaults, so each TOML section is read as
/// a set of overrides applied on top of its own defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(from = "UploadsOverrides")]
pub struct UploadsConfig {
    pub images: UploadFilterConfig,
    pub audio: UploadFilterConfig,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            images: UploadFilterConfig {
                field: "images".to_string(),
                allowed_types: vec!["image/*".to_string()],
                max_file_bytes: 10 * MIB,
                max_files: 10,
            },
            audio: UploadFilterConfig {
                field: "file".to_string(),
                allowed_types: ["audio/mpeg", "audio/mp4", "audio/wav", "audio/webm", "audio/m4a"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                max_file_bytes: 25 * MIB,
                max_files: 1,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UploadsOverrides {
    images: UploadFilterOverrides,
    audio: UploadFilterOverrides,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UploadFilterOverrides {
    field: Option<String>,
    allowed_types: Option<Vec<String>>,
    max_file_bytes: Option<usize>,
    max_files: Option<usize>,
}

impl UploadFilterOverrides {
    fn apply(self, base: UploadFilterConfig) -> UploadFilterConfig {
        UploadFilterConfig {
            field: self.field.unwrap_or(base.field),
            allowed_types: self.allowed_types.unwrap_or(base.allowed_types),
            max_file_bytes: self.max_file_bytes.unwrap_or(base.max_file_bytes),
            max_files: self.max_files.unwrap_or(base.max_files),
        }
    }
}

impl From<UploadsOverrides> for UploadsConfig {
    fn from(overrides: UploadsOverrides) -> Self {
        let defaults = UploadsConfig::default();
        Self {
            images: overrides.images.apply(defaults.images),
            audio: overrides.audio.apply(defaults.audio),
        }
    }
}

/// One upload filter: which field, which types, how big, how many.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadFilterConfig {
    /// Multipart field name file parts must use.
    pub field: String,

    /// MIME patterns, either exact ("audio/wav") or wildcard ("image/*").
    pub allowed_types: Vec<String>,

    /// Maximum size of a single file in bytes.
    pub max_file_bytes: usize,

    /// Maximum number of files per request.
    pub max_files: usize,
}

impl UploadFilterConfig {
    /// Body limit for a request carrying the maximum number of maximum-size files.
    pub fn body_limit(&self) -> usize {
        self.max_file_bytes
            .saturating_mul(self.max_files)
            .saturating_add(MIB)
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enable security headers.
    pub enable_headers: bool,
    /// Maximum JSON body size in bytes.
    pub max_json_bytes: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
            max_json_bytes: MIB,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_limits() {
        let config = RelayConfig::default();
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.window_secs, 900);
        assert_eq!(config.uploads.images.max_file_bytes, 10 * 1024 * 1024);
        assert_eq!(config.uploads.audio.max_file_bytes, 25 * 1024 * 1024);
        assert_eq!(config.uploads.audio.allowed_types.len(), 5);
        assert!(config.listener.bind_address.ends_with(":3000"));
    }

    #[test]
    fn test_url_join() {
        let mut upstream = UpstreamConfig::default();
        assert_eq!(upstream.chat_url(), "https://api.openai.com/v1/chat/completions");

        upstream.base_url = "http://127.0.0.1:9000/v1/".to_string();
        upstream.transcription_path = "audio/transcriptions".to_string();
        assert_eq!(
            upstream.transcription_url(),
            "http://127.0.0.1:9000/v1/audio/transcriptions"
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: RelayConfig = toml::from_str(
            r#"
            [rate_limit]
            max_requests = 5

            [uploads.images]
            field = "pictures"
            allowed_types = ["image/png"]
            max_file_bytes = 1024
            max_files = 2

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.rate_limit.window_secs, 900);
        assert_eq!(config.uploads.images.field, "pictures");
        assert_eq!(config.uploads.audio.field, "file");
        assert_eq!(config.uploads.audio.max_files, 1);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert!(config.upstream.api_key.is_none());
    }

    #[test]
    fn test_partial_upload_section_keeps_its_own_defaults() {
        let config: RelayConfig = toml::from_str(
            r#"
            [uploads.audio]
            max_file_bytes = 5000000

            [uploads.images]
            max_files = 3
            "#,
        )
        .unwrap();

        let audio = &config.uploads.audio;
        assert_eq!(audio.max_file_bytes, 5_000_000);
        assert_eq!(audio.field, "file");
        assert_eq!(audio.max_files, 1);
        assert_eq!(audio.allowed_types.len(), 5);

        let images = &config.uploads.images;
        assert_eq!(images.max_files, 3);
        assert_eq!(images.field, "images");
        assert_eq!(images.allowed_types, vec!["image/*".to_string()]);
        assert_eq!(images.max_file_bytes, 10 * MIB);
    }
}
