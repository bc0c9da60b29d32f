use consult_flow::{ConfigError, ModelConfig, RetrievalConfig};
use std::str::FromStr;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_TURNS: u32 = 5;
pub const DEFAULT_SAFETY_LIMIT: usize = 20;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    /// Turn budget for simulations that do not specify one.
    pub max_turns: u32,
    /// Iteration ceiling for `/run`.
    pub safety_limit: usize,
    pub model: ModelConfig,
    pub retrieval: RetrievalConfig,
}

impl ServiceConfig {
    /// Reads `PORT`, `CONSULT_MAX_TURNS` and `CONSULT_SAFETY_LIMIT` plus the model and retrieval
    /// settings. The model connection is validated here so a bad key stops the service at boot.
    pub fn from_env() -> Result<Self, ConfigError> {
        let model = ModelConfig::from_env()?;
        model.validate()?;

        let config = Self {
            port: parse_var("PORT", std::env::var("PORT").ok(), DEFAULT_PORT)?,
            max_turns: parse_var(
                "CONSULT_MAX_TURNS",
                std::env::var("CONSULT_MAX_TURNS").ok(),
                DEFAULT_MAX_TURNS,
            )?,
            safety_limit: parse_var(
                "CONSULT_SAFETY_LIMIT",
                std::env::var("CONSULT_SAFETY_LIMIT").ok(),
                DEFAULT_SAFETY_LIMIT,
            )?,
            model,
            retrieval: RetrievalConfig::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_turns == 0 {
            return Err(ConfigError::InvalidTurnBudget);
        }
        if self.safety_limit == 0 {
            return Err(ConfigError::InvalidEnv {
                name: "CONSULT_SAFETY_LIMIT",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_defaults_and_parses() {
        assert_eq!(parse_var("PORT", None, 3000u16), Ok(3000));
        assert_eq!(parse_var("PORT", Some(" 8080 ".into()), 3000u16), Ok(8080));
    }

    #[test]
    fn test_parse_var_reports_bad_value() {
        assert_eq!(
            parse_var("CONSULT_MAX_TURNS", Some("five".into()), 5u32),
            Err(ConfigError::InvalidEnv {
                name: "CONSULT_MAX_TURNS",
                value: "five".into()
            })
        );
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = ServiceConfig {
            port: DEFAULT_PORT,
            max_turns: 0,
            safety_limit: DEFAULT_SAFETY_LIMIT,
            model: ModelConfig::new("https://llm.test/v1", "sk-test"),
            retrieval: RetrievalConfig::default(),
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidTurnBudget));

        config.max_turns = 5;
        config.safety_limit = 0;
        assert!(config.validate().is_err());
    }
}
