//! Connection and retrieval settings.
//!
//! Values come from the environment in the binaries and from request bodies in the service.
//! Validation happens once, up front: an orchestrator or QA session is never constructed from a
//! config that cannot reach a model.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const DEFAULT_MODEL: &str = "qwen-flash";
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-v4";
pub const DEFAULT_DATA_DIR: &str = "local_data";
pub const DEFAULT_CHUNK_CHARS: usize = 500;

/// Model connection descriptor bound to every participant.
#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
}

// Keeps the credential out of logs.
impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl ModelConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Reads `CONSULT_BASE_URL`, `CONSULT_API_KEY`, `CONSULT_MODEL` and `CONSULT_TEMPERATURE`,
    /// falling back to defaults for anything unset. The result is not validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let temperature = match std::env::var("CONSULT_TEMPERATURE") {
            Ok(raw) => raw.trim().parse::<f32>().map_err(|_| ConfigError::InvalidEnv {
                name: "CONSULT_TEMPERATURE",
                value: raw.clone(),
            })?,
            Err(_) => defaults.temperature,
        };

        Ok(Self {
            base_url: std::env::var("CONSULT_BASE_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("CONSULT_API_KEY").unwrap_or_default(),
            model: std::env::var("CONSULT_MODEL").unwrap_or(defaults.model),
            temperature,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential);
        }
        let endpoint = self.base_url.trim();
        if endpoint.is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::InvalidEndpoint(endpoint.to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::MissingModel);
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }
        Ok(())
    }

    /// Endpoint without a trailing slash, ready for path joins.
    pub fn endpoint(&self) -> &str {
        self.base_url.trim().trim_end_matches('/')
    }
}

/// Settings for the document index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub embedding_model: String,
    pub data_dir: PathBuf,
    pub chunk_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            chunk_chars: DEFAULT_CHUNK_CHARS,
        }
    }
}

impl RetrievalConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            embedding_model: std::env::var("CONSULT_EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            data_dir: std::env::var("CONSULT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            chunk_chars: defaults.chunk_chars,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ModelConfig {
        ModelConfig::new("https://api.example.com/v1/", "sk-test")
    }

    #[test]
    fn test_defaults() {
        let config = ModelConfig::default();
        assert_eq!(config.model, "qwen-flash");
        assert_eq!(config.temperature, 0.2);
        assert!(config.api_key.is_empty());
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        assert!(valid().validate().is_ok());
        assert_eq!(valid().endpoint(), "https://api.example.com/v1");
    }

    #[test]
    fn test_validate_rejects_missing_credential() {
        let config = ModelConfig::new("https://api.example.com/v1", "  ");
        assert_eq!(config.validate(), Err(ConfigError::MissingCredential));
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        let config = ModelConfig::new("api.example.com", "sk-test");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEndpoint(_))
        ));
        let config = ModelConfig::new("", "sk-test");
        assert_eq!(config.validate(), Err(ConfigError::MissingEndpoint));
    }

    #[test]
    fn test_validate_rejects_temperature_out_of_range() {
        let config = valid().with_temperature(2.5);
        assert_eq!(config.validate(), Err(ConfigError::InvalidTemperature(2.5)));
    }

    #[test]
    fn test_debug_redacts_credential() {
        let rendered = format!("{:?}", valid());
        assert!(!rendered.contains("sk-test"));
    }
}
