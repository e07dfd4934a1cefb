//! Configuration module for toolgate

mod provider;
mod settings;

pub use provider::{NetworkProviderConfig, ProcessProviderConfig, ProviderConfig};
pub use settings::{
    ConversationSettings, InferenceSettings, PersistenceSettings, SessionLimits,
};

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Main configuration structure.
///
/// Loaded from one JSON document; every section except `providers` has
/// workable defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Tool provider configurations, keyed by provider id
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Session store limits
    #[serde(default)]
    pub session: SessionLimits,

    /// Session persistence settings
    #[serde(default)]
    pub persistence: PersistenceSettings,

    /// Conversation loop settings
    #[serde(default)]
    pub conversation: ConversationSettings,

    /// Inference backend settings
    #[serde(default)]
    pub inference: InferenceSettings,
}

impl Config {
    /// Load configuration from a JSON file
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            }
            .into());
        }

        let content = fs::read_to_string(path).await?;
        let config: Config =
            serde_json::from_str(&content).map_err(|_| ConfigError::InvalidFormat)?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;

        Ok(())
    }

    /// Default configuration file path
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("toolgate");
        path.push("config.json");
        path
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for (id, provider) in &self.providers {
            match provider {
                ProviderConfig::Process(process) => {
                    if process.command.is_empty() {
                        return Err(ConfigError::MissingField {
                            field: format!("providers.{}.command", id),
                        }
                        .into());
                    }
                }
                ProviderConfig::Network(network) => {
                    if url::Url::parse(&network.url).is_err() {
                        return Err(ConfigError::InvalidValue {
                            field: format!("providers.{}.url", id),
                            value: network.url.clone(),
                        }
                        .into());
                    }
                }
            }
        }

        if self.conversation.max_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                field: "conversation.max_iterations".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            session: SessionLimits::default(),
            persistence: PersistenceSettings::default(),
            conversation: ConversationSettings::default(),
            inference: InferenceSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn load_round_trips_providers_and_limits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let content = r#"{
            "providers": {
                "calc": {
                    "command": "python3",
                    "args": ["servers/calc.py"],
                    "env": {"LOG_LEVEL": "INFO"}
                },
                "geo": {"url": "http://localhost:8001/rpc"}
            },
            "session": {"max_sessions_per_user": 3},
            "conversation": {"max_iterations": 7}
        }"#;
        tokio::fs::write(&path, content).await.unwrap();

        let config = Config::load(&path).await.unwrap();

        assert_eq!(config.providers.len(), 2);
        assert!(matches!(
            config.providers.get("calc"),
            Some(ProviderConfig::Process(_))
        ));
        assert!(matches!(
            config.providers.get("geo"),
            Some(ProviderConfig::Network(_))
        ));
        assert_eq!(config.session.max_sessions_per_user, 3);
        // Unspecified fields fall back to defaults
        assert_eq!(
            config.session.max_messages_per_session,
            SessionLimits::default().max_messages_per_session
        );
        assert_eq!(config.conversation.max_iterations, 7);
    }

    #[tokio::test]
    async fn load_rejects_missing_file() {
        let dir = tempdir().unwrap();
        let result = Config::load(dir.path().join("nope.json")).await;
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_bad_network_url() {
        let mut config = Config::default();
        config.providers.insert(
            "geo".to_string(),
            ProviderConfig::Network(NetworkProviderConfig {
                url: "not a url".to_string(),
            }),
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_iterations() {
        let mut config = Config::default();
        config.conversation.max_iterations = 0;
        assert!(config.validate().is_err());
    }
}
