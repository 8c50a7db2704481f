//! Intake service configuration
//!
//! Values resolve in the priority order used across fieldbook:
//! CLI argument > environment variable > TOML config file > compiled default.
//! Secrets (gateway auth, extraction API key) are environment-first so they
//! stay out of config files.

use fieldbook_common::{config as common_config, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Whether a submission needs an explicit YES from the worker.
///
/// Process-wide, not per-worker: the toggle reflects whether outbound
/// replies are currently deliverable, an operational constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmMode {
    /// Records are accepted as `pending` with no confirmation round-trip
    AutoAccept,
    /// Workers must reply YES/NO before the conversation returns to idle
    ConfirmRequired,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Gateway account identifier (basic-auth user for media URLs)
    pub account_sid: String,
    /// Gateway auth token (basic-auth password for media URLs)
    pub auth_token: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Recognition service API key
    pub api_key: String,
    /// Chat-completions endpoint of the vision service
    pub endpoint: String,
    /// Model name sent with each extraction call
    pub model: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Folder holding the database and stored media
    pub data_dir: PathBuf,
    pub bind_host: String,
    pub bind_port: u16,
    pub confirm_mode: ConfirmMode,
    /// Register unknown senders on first contact. When false the service
    /// runs as a whitelist: unknown senders are silenced and queued for
    /// review.
    pub auto_register: bool,
    pub gateway: GatewayConfig,
    pub extraction: ExtractionConfig,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            data_dir: common_config::default_data_dir(),
            bind_host: "127.0.0.1".to_string(),
            bind_port: 5820,
            confirm_mode: ConfirmMode::AutoAccept,
            auto_register: true,
            gateway: GatewayConfig::default(),
            extraction: ExtractionConfig::default(),
        }
    }
}

impl IntakeConfig {
    /// Resolve the effective configuration.
    ///
    /// `cli_data_dir` / `cli_port` come from the command line and win over
    /// everything; the TOML file fills the middle; environment variables
    /// supply secrets and deployment overrides.
    pub fn resolve(cli_data_dir: Option<&str>, cli_port: Option<u16>) -> Result<Self> {
        let mut config = match common_config::default_config_file() {
            Some(path) if path.exists() => common_config::load_toml_config::<IntakeConfig>(&path)?,
            _ => IntakeConfig::default(),
        };

        if let Ok(dir) = std::env::var("FIELDBOOK_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }
        if let Some(dir) = cli_data_dir {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(port) = std::env::var("FIELDBOOK_PORT") {
            if let Ok(port) = port.parse() {
                config.bind_port = port;
            }
        }
        if let Some(port) = cli_port {
            config.bind_port = port;
        }

        if let Ok(sid) = std::env::var("FIELDBOOK_GATEWAY_ACCOUNT") {
            config.gateway.account_sid = sid;
        }
        if let Ok(token) = std::env::var("FIELDBOOK_GATEWAY_TOKEN") {
            config.gateway.auth_token = token;
        }
        if let Ok(key) = std::env::var("FIELDBOOK_EXTRACTION_API_KEY") {
            config.extraction.api_key = key;
        }

        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("fieldbook.db")
    }

    pub fn media_dir(&self) -> PathBuf {
        self.data_dir.join("media")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_auto_accept_with_registration() {
        let config = IntakeConfig::default();
        assert_eq!(config.confirm_mode, ConfirmMode::AutoAccept);
        assert!(config.auto_register);
        assert_eq!(config.bind_port, 5820);
    }

    #[test]
    fn toml_overrides_parse() {
        let config: IntakeConfig = toml::from_str(
            r#"
            bind_port = 6000
            confirm_mode = "confirm_required"
            auto_register = false

            [extraction]
            model = "gpt-4o"
            "#,
        )
        .unwrap();
        assert_eq!(config.bind_port, 6000);
        assert_eq!(config.confirm_mode, ConfirmMode::ConfirmRequired);
        assert!(!config.auto_register);
        assert_eq!(config.extraction.model, "gpt-4o");
        // Untouched sections keep their defaults
        assert_eq!(config.bind_host, "127.0.0.1");
    }

    #[test]
    fn derived_paths_live_under_data_dir() {
        let mut config = IntakeConfig::default();
        config.data_dir = PathBuf::from("/srv/fieldbook");
        assert_eq!(config.database_path(), PathBuf::from("/srv/fieldbook/fieldbook.db"));
        assert_eq!(config.media_dir(), PathBuf::from("/srv/fieldbook/media"));
    }
}
