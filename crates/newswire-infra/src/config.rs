//! Global configuration loader for Newswire.
//!
//! Reads `config.toml` from the data directory (`~/.newswire/` in production)
//! and deserializes it into [`GlobalConfig`]. Falls back to defaults when the
//! file is missing or malformed, then applies environment overrides.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::SecretString;

use newswire_types::config::GlobalConfig;
use newswire_types::error::ConfigError;

/// Load global configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`GlobalConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - If the file exists and parses successfully, returns the parsed config.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
    };

    match toml::from_str::<GlobalConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            GlobalConfig::default()
        }
    }
}

/// Load, apply process-environment overrides and validate.
pub async fn load_config(data_dir: &Path) -> Result<GlobalConfig, ConfigError> {
    let mut config = load_global_config(data_dir).await;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Apply `DAILY_BUDGET`, `MAX_RETRIES`, `REQUEST_TIMEOUT`, `CACHE_DIR` and
/// `DB_PATH` overrides. Unparseable values are ignored with a warning.
pub fn apply_env_overrides(config: &mut GlobalConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = parse_override(&lookup, "DAILY_BUDGET") {
        config.daily_budget_usd = v;
    }
    if let Some(v) = parse_override(&lookup, "MAX_RETRIES") {
        config.max_retries = v;
    }
    if let Some(v) = parse_override(&lookup, "REQUEST_TIMEOUT") {
        config.request_timeout_secs = v;
    }
    if let Some(dir) = lookup("CACHE_DIR").filter(|v| !v.trim().is_empty()) {
        config.cache.dir = dir;
    }
    if let Some(path) = lookup("DB_PATH").filter(|v| !v.trim().is_empty()) {
        config.database_path = path;
    }
}

fn parse_override<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

/// Read the API key of every routed provider from its configured env var.
///
/// A routed provider without a key is a startup error.
pub fn resolve_api_keys(
    config: &GlobalConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<HashMap<String, SecretString>, ConfigError> {
    config
        .routed_providers()
        .into_iter()
        .map(|provider| {
            lookup(&provider.api_key_env)
                .filter(|key| !key.trim().is_empty())
                .map(|key| (provider.name.clone(), SecretString::from(key)))
                .ok_or_else(|| ConfigError::MissingApiKey {
                    provider: provider.name.clone(),
                    env_var: provider.api_key_env.clone(),
                })
        })
        .collect()
}

/// Resolve a configured path: absolute paths are kept, relative ones are
/// placed under the data directory.
pub fn resolve_path(data_dir: &Path, configured: &str) -> PathBuf {
    let path = Path::new(configured);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        data_dir.join(path)
    }
}
