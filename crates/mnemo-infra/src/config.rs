//! Configuration loading for mnemo.
//!
//! Reads `config.toml` from the data directory (`~/.mnemo/` by default)
//! and deserializes it into [`MnemoConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use secrecy::SecretString;

use mnemo_types::config::MnemoConfig;

/// Environment variable that overrides the default data directory.
pub const DATA_DIR_ENV: &str = "MNEMO_DATA_DIR";

/// Load configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`MnemoConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - Otherwise returns the parsed config. Missing fields take their defaults.
pub async fn load_config(data_dir: &Path) -> MnemoConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return MnemoConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return MnemoConfig::default();
        }
    };

    match toml::from_str::<MnemoConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            MnemoConfig::default()
        }
    }
}

/// Resolve the data directory.
///
/// Priority:
/// 1. Explicit path (the `--data-dir` flag)
/// 2. `MNEMO_DATA_DIR` environment variable
/// 3. `~/.mnemo`
pub fn resolve_data_dir(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir;
    }

    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".mnemo");
    }

    // Last resort: current directory
    PathBuf::from(".mnemo")
}

/// Read an API key from the named environment variable.
///
/// Empty values count as unset.
pub fn api_key(env_name: &str) -> Option<SecretString> {
    match std::env::var(env_name) {
        Ok(val) if !val.trim().is_empty() => Some(SecretString::from(val)),
        _ => None,
    }
}
