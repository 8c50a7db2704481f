//! Configuration resolution shared by fieldbook services
//!
//! Resolution priority for the data folder and the config file:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::PathBuf;

/// Resolve the data folder holding the database and stored media.
pub fn resolve_data_dir(cli_arg: Option<&str>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: data_dir key in the config file
    if let Some(config_path) = default_config_file() {
        if let Ok(content) = std::fs::read_to_string(&config_path) {
            if let Ok(value) = toml::from_str::<toml::Value>(&content) {
                if let Some(dir) = value.get("data_dir").and_then(|v| v.as_str()) {
                    return PathBuf::from(dir);
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    default_data_dir()
}

/// Platform config file location, e.g. ~/.config/fieldbook/config.toml.
///
/// On Linux the system-wide /etc/fieldbook/config.toml is used when no user
/// config exists.
pub fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("fieldbook").join("config.toml"));
    if let Some(path) = &user_config {
        if path.exists() {
            return user_config;
        }
    }
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/fieldbook/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }
    user_config
}

/// OS-dependent default data folder.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("fieldbook"))
        .unwrap_or_else(|| PathBuf::from("./fieldbook_data"))
}

/// Read and parse a TOML config file into a typed structure.
pub fn load_toml_config<T: DeserializeOwned>(path: &std::path::Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Cannot parse {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_argument_wins() {
        let dir = resolve_data_dir(Some("/tmp/fieldbook-test"), "FIELDBOOK_TEST_UNSET_VAR");
        assert_eq!(dir, PathBuf::from("/tmp/fieldbook-test"));
    }

    #[test]
    fn falls_back_to_default_without_overrides() {
        let dir = resolve_data_dir(None, "FIELDBOOK_TEST_UNSET_VAR");
        assert!(dir.to_string_lossy().contains("fieldbook"));
    }

    #[test]
    fn load_toml_config_reports_missing_file() {
        let result: Result<toml::Value> =
            load_toml_config(std::path::Path::new("/nonexistent/fieldbook.toml"));
        assert!(result.is_err());
    }
}
