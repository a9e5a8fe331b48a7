use crate::domain::{BasisPoints, TerminatedReason};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// Flat rate applied to pre-approval amounts.
    pub pre_approval_fee_rate: BasisPoints,
    /// Reason recorded when a deal is terminated without one.
    pub default_terminated_reason: TerminatedReason,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let pre_approval_fee_rate = env_map
            .get("PRE_APPROVAL_FEE_BASIS_POINTS")
            .map(|s| s.as_str())
            .unwrap_or("100")
            .trim()
            .parse::<i64>()
            .ok()
            .map(BasisPoints::new)
            .filter(BasisPoints::is_positive)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "PRE_APPROVAL_FEE_BASIS_POINTS".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;

        let default_terminated_reason = match env_map.get("DEFAULT_TERMINATED_REASON") {
            None => TerminatedReason::ChangedMind,
            Some(value) => TerminatedReason::from_str(value).map_err(|_| {
                ConfigError::InvalidValue(
                    "DEFAULT_TERMINATED_REASON".to_string(),
                    format!(
                        "must be inspection, appraisal, financing, or changed_mind, got {}",
                        value
                    ),
                )
            })?,
        };

        Ok(Config {
            port,
            database_path,
            pre_approval_fee_rate,
            default_terminated_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.pre_approval_fee_rate, BasisPoints(100));
        assert_eq!(
            config.default_terminated_reason,
            TerminatedReason::ChangedMind
        );
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_pre_approval_rate() {
        for bad in ["0", "-5", "1.5", "lots"] {
            let mut env_map = setup_required_env();
            env_map.insert("PRE_APPROVAL_FEE_BASIS_POINTS".to_string(), bad.to_string());
            match Config::from_env_map(env_map) {
                Err(ConfigError::InvalidValue(k, _)) => {
                    assert_eq!(k, "PRE_APPROVAL_FEE_BASIS_POINTS")
                }
                _ => panic!("Expected InvalidValue error for {}", bad),
            }
        }
    }

    #[test]
    fn test_terminated_reason_override() {
        let mut env_map = setup_required_env();
        env_map.insert(
            "DEFAULT_TERMINATED_REASON".to_string(),
            "financing".to_string(),
        );
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.default_terminated_reason, TerminatedReason::Financing);
    }

    #[test]
    fn test_invalid_terminated_reason() {
        let mut env_map = setup_required_env();
        env_map.insert("DEFAULT_TERMINATED_REASON".to_string(), "weather".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "DEFAULT_TERMINATED_REASON"),
            _ => panic!("Expected InvalidValue error"),
        }
    }
}
