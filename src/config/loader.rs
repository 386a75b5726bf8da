//! Configuration loading from disk and environment.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::RelayConfig;
use crate::config::secret::Secret;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid PORT value '{0}'")]
    Port(String),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, resolve, and validate configuration.
///
/// Reads the TOML file when a path is given, otherwise starts from defaults.
/// Environment overrides are applied from the process environment.
pub fn load_config(path: Option<&Path>) -> Result<RelayConfig, ConfigError> {
    let config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => RelayConfig::default(),
    };

    let config = apply_env_overrides(config, |name| std::env::var(name).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply `PORT` and the credential variable to a parsed config.
pub fn apply_env_overrides<F>(mut config: RelayConfig, lookup: F) -> Result<RelayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup("PORT").filter(|p| !p.trim().is_empty()) {
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|_| ConfigError::Port(port.clone()))?;
        // An unparsable address is left as-is for validation to report.
        if let Some(address) = with_port(&config.listener.bind_address, port) {
            config.listener.bind_address = address;
        }
    }

    if let Some(key) = lookup(&config.upstream.api_key_env).filter(|k| !k.trim().is_empty()) {
        config.upstream.api_key = Some(Secret::new(key.trim()));
    }

    Ok(config)
}

fn with_port(bind_address: &str, port: u16) -> Option<String> {
    let mut addr = bind_address.parse::<SocketAddr>().ok()?;
    addr.set_port(port);
    Some(addr.to_string())
}
