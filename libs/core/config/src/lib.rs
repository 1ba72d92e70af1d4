//! Environment-driven configuration shared by the gRPC bootstrap crates.
//!
//! Values are read once at startup and turned into plain value objects; nothing
//! here caches or watches the environment.

pub mod tracing;

use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Environment variable '{0}' is required but not set")]
    MissingEnvVar(String),

    #[error("Failed to parse environment variable '{key}': {details}")]
    ParseError { key: String, details: String },
}

/// Application environment, selects the log format in [`tracing::init_tracing`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Reads `APP_ENV`; anything other than `production` (any case) is development.
    pub fn from_env() -> Self {
        match env_optional("APP_ENV") {
            Some(value) if value.eq_ignore_ascii_case("production") => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

/// Trait for configuration that can be loaded from environment variables
pub trait FromEnv: Sized {
    fn from_env() -> Result<Self, ConfigError>;
}

/// Value of `key`, or `default` when unset.
pub fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Value of `key`, or [`ConfigError::MissingEnvVar`].
pub fn env_required(key: &str) -> Result<String, ConfigError> {
    env_optional(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Value of `key` with surrounding whitespace removed. Unset and blank are both `None`.
pub fn env_optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Parses `key` with [`FromStr`], falling back to `default` when unset.
pub fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_optional(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::ParseError {
            key: key.to_string(),
            details: format!("'{raw}': {e}"),
        }),
    }
}

/// Boolean flag: `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`, case-insensitive.
pub fn env_flag(key: &str, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = env_optional(key) else {
        return Ok(default);
    };

    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::ParseError {
            key: key.to_string(),
            details: format!("'{raw}' is not a boolean"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_defaults_to_development() {
        temp_env::with_var_unset("APP_ENV", || {
            let env = Environment::from_env();
            assert_eq!(env, Environment::Development);
            assert!(env.is_development());
            assert!(!env.is_production());
        });
    }

    #[test]
    fn test_environment_production_case_insensitive() {
        temp_env::with_var("APP_ENV", Some("PRODUCTION"), || {
            assert_eq!(Environment::from_env(), Environment::Production);
        });
        temp_env::with_var("APP_ENV", Some("staging"), || {
            assert_eq!(Environment::from_env(), Environment::Development);
        });
    }

    #[test]
    fn test_env_or_default() {
        temp_env::with_var("CFG_TEST_VAR", Some("value"), || {
            assert_eq!(env_or_default("CFG_TEST_VAR", "default"), "value");
        });
        temp_env::with_var_unset("CFG_TEST_VAR", || {
            assert_eq!(env_or_default("CFG_TEST_VAR", "default"), "default");
        });
    }

    #[test]
    fn test_env_required_missing() {
        temp_env::with_var_unset("CFG_MISSING_REQUIRED", || {
            let err = env_required("CFG_MISSING_REQUIRED").unwrap_err();
            assert_eq!(
                err,
                ConfigError::MissingEnvVar("CFG_MISSING_REQUIRED".to_string())
            );
        });
    }

    #[test]
    fn test_env_optional_treats_blank_as_unset() {
        temp_env::with_var("CFG_BLANK", Some("   "), || {
            assert_eq!(env_optional("CFG_BLANK"), None);
        });
        temp_env::with_var("CFG_PADDED", Some("  /etc/tls/ca.pem "), || {
            assert_eq!(env_optional("CFG_PADDED").as_deref(), Some("/etc/tls/ca.pem"));
        });
    }

    #[test]
    fn test_env_parse() {
        temp_env::with_var("CFG_NUMBER", Some("42"), || {
            assert_eq!(env_parse::<u32>("CFG_NUMBER", 7), Ok(42));
        });
        temp_env::with_var_unset("CFG_NUMBER", || {
            assert_eq!(env_parse::<u32>("CFG_NUMBER", 7), Ok(7));
        });
        temp_env::with_var("CFG_NUMBER", Some("forty"), || {
            let err = env_parse::<u32>("CFG_NUMBER", 7).unwrap_err();
            assert!(matches!(err, ConfigError::ParseError { ref key, .. } if key == "CFG_NUMBER"));
        });
    }

    #[test]
    fn test_env_flag() {
        for raw in ["true", "1", "YES", "on"] {
            temp_env::with_var("CFG_FLAG", Some(raw), || {
                assert_eq!(env_flag("CFG_FLAG", false), Ok(true));
            });
        }
        for raw in ["false", "0", "No", "OFF"] {
            temp_env::with_var("CFG_FLAG", Some(raw), || {
                assert_eq!(env_flag("CFG_FLAG", true), Ok(false));
            });
        }
        temp_env::with_var("CFG_FLAG", Some("maybe"), || {
            assert!(env_flag("CFG_FLAG", false).is_err());
        });
        temp_env::with_var_unset("CFG_FLAG", || {
            assert_eq!(env_flag("CFG_FLAG", true), Ok(true));
        });
    }
}
