//! Configuration loading from disk and the process environment.
//!
//! The environment is read exactly once, here, at startup. Nothing else in
//! the crate looks at ambient process state.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::RelayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("environment variable {name}: cannot parse {value:?}")]
    Env { name: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from an optional TOML file plus the process environment.
pub fn load_config(path: Option<&Path>) -> Result<RelayConfig, ConfigError> {
    load_config_with_env(path, |name| std::env::var(name).ok())
}

/// Load configuration, resolving environment overrides through `lookup`.
pub fn load_config_with_env<F>(path: Option<&Path>, lookup: F) -> Result<RelayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str::<RelayConfig>(&content)?
        }
        None => RelayConfig::default(),
    };

    apply_env_overrides(&mut config, lookup)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay environment variables onto a parsed configuration.
pub fn apply_env_overrides<F>(config: &mut RelayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = lookup("OPENAI_API_KEY") {
        config.upstream.api_key = key;
    }
    if let Some(origin) = lookup("OPENAI_BASE_URL") {
        config.upstream.origin = origin;
    }
    if let Some(org) = lookup("OPENAI_ORG_ID") {
        config.upstream.organization = Some(org).filter(|o| !o.is_empty());
    }
    if let Some(beta) = lookup("OPENAI_BETA") {
        config.upstream.beta_override = Some(beta).filter(|b| !b.is_empty());
    }
    if let Some(key) = lookup("RELAY_ACCESS_KEY") {
        config.auth.access_key = key;
    }
    if let Some(value) = lookup("RELAY_AUTH_ENABLED") {
        config.auth.enabled = parse_bool(&value).ok_or(ConfigError::Env {
            name: "RELAY_AUTH_ENABLED",
            value,
        })?;
    }
    if let Some(value) = lookup("RELAY_TIMEOUT_SECS") {
        config.upstream.timeout_secs = value.trim().parse().map_err(|_| ConfigError::Env {
            name: "RELAY_TIMEOUT_SECS",
            value: value.clone(),
        })?;
    }
    if let Some(addr) = lookup("RELAY_BIND_ADDRESS") {
        config.listener.bind_address = addr;
    }
    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
