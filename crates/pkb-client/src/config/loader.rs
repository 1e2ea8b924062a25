use std::path::{Path, PathBuf};

use crate::config::schema::{ClientConfig, PollTierConfig};
use crate::error::ConfigError;

/// Environment variable overriding `api_base_url`.
pub const API_BASE_URL_ENV: &str = "PKB_API_BASE_URL";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ClientConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<ClientConfig, ConfigError> {
    let mut config: ClientConfig = serde_json::from_str(content)?;

    apply_env_overrides(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Loads the config at `path`, or at the default location when `path` is
/// `None`. A missing default file yields the built-in defaults; a missing
/// explicit file is an error.
pub fn load_config_or_default(path: Option<&Path>) -> Result<ClientConfig, ConfigError> {
    if let Some(path) = path {
        return load_config(path);
    }

    match default_config_path() {
        Some(default_path) if default_path.exists() => {
            log::debug!("Loading config from {:?}", default_path);
            load_config(&default_path)
        }
        _ => {
            log::debug!("No config file found, using defaults");
            let mut config = ClientConfig::default();
            apply_env_overrides(&mut config);
            validate_config(&config)?;
            Ok(config)
        }
    }
}

/// `<config_dir>/pkb/client.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pkb").join("client.json"))
}

fn apply_env_overrides(config: &mut ClientConfig) {
    if let Ok(url) = std::env::var(API_BASE_URL_ENV) {
        let url = url.trim();
        if !url.is_empty() {
            log::debug!("Using {} from environment: {}", API_BASE_URL_ENV, url);
            config.api_base_url = url.to_string();
        }
    }
}

pub fn validate_config(config: &ClientConfig) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let base = config.api_base_url.trim();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(ConfigError::Validation {
            message: format!(
                "api_base_url must be an http(s) URL, got '{}'",
                config.api_base_url
            ),
        });
    }

    let admission = &config.admission;
    if admission.max_files == 0 {
        return invalid("admission.max_files must be at least 1");
    }
    if admission.max_file_size_bytes == 0 || admission.max_batch_size_bytes == 0 {
        return invalid("admission size limits must be greater than 0");
    }
    if admission.accepted_extensions.is_empty() {
        return invalid("admission.accepted_extensions must not be empty");
    }

    let scheduling = &config.scheduling;
    for (name, value) in [
        ("large_concurrency", scheduling.large_concurrency),
        ("medium_concurrency", scheduling.medium_concurrency),
        ("small_concurrency", scheduling.small_concurrency),
    ] {
        if value == 0 {
            return invalid(&format!("scheduling.{} must be at least 1", name));
        }
    }
    if scheduling.medium_average_bytes > scheduling.large_average_bytes {
        return invalid("scheduling.medium_average_bytes must not exceed large_average_bytes");
    }

    let polling = &config.polling;
    validate_tier("image", &polling.image)?;
    validate_tier("large_file", &polling.large_file)?;
    validate_tier("default", &polling.default)?;
    if polling.max_consecutive_failures == 0 {
        return invalid("polling.max_consecutive_failures must be at least 1");
    }

    if config.qa.model.trim().is_empty() {
        return invalid("qa.model must not be empty");
    }

    Ok(())
}

fn validate_tier(name: &str, tier: &PollTierConfig) -> Result<(), ConfigError> {
    if tier.interval_ms == 0 || tier.max_attempts == 0 {
        return invalid(&format!(
            "polling.{} needs a non-zero interval_ms and max_attempts",
            name
        ));
    }
    Ok(())
}

fn invalid(message: &str) -> Result<(), ConfigError> {
    Err(ConfigError::Validation {
        message: message.to_string(),
    })
}
