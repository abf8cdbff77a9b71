use super::types::Config;
use crate::config::{expand_env_vars, expand_tilde};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    // $env{VAR} references are substituted before parsing
    let yaml_string = expand_env_vars(&yaml_string);

    let mut config: Config = serde_yaml::from_str(&yaml_string)?;

    config.database = expand_tilde(&config.database);
    if let Some(audit_log) = &config.audit_log {
        config.audit_log = Some(expand_tilde(audit_log));
    }

    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.database.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "database path must not be empty".to_string(),
        ));
    }
    if config.batch_size == 0 {
        return Err(ConfigError::Validation(
            "batch_size must be at least 1".to_string(),
        ));
    }
    if !config.loki_url.starts_with("http://") && !config.loki_url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "loki_url must be an http(s) URL, got '{}'",
            config.loki_url
        )));
    }
    Ok(())
}

/// Split a `key=value` label override. Returns None for anything else.
pub fn parse_label(raw: &str) -> Option<(String, String)> {
    let (key, value) = raw.split_once('=')?;
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}
