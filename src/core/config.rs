//! Application configuration loaded from environment variables.

use std::env;
use thiserror::Error;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Holds all configuration for the application.
///
/// Logging is configured separately by [`configure_logger`], which reads
/// `APP_LOG` / `APP_LOG_STYLE` straight from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,
    pub port: u16,
    pub site_name: String,
    pub liveone_api_key: Option<String>,
    pub liveone_server: Option<String>,
    pub liveone_enabled: Option<String>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Failed to parse number for environment variable: {0}")]
    InvalidNumber(String),
}

impl Config {
    /// Creates a new `Config` instance by reading environment variables.
    ///
    /// The `LIVEONE_*` trio is read raw and left to the push client to
    /// validate: a broken push configuration disables pushing, never the
    /// whole daemon.
    pub fn from_env() -> Result<Self, Error> {
        Ok(Self {
            app_name: APP_NAME.to_string(),
            app_version: APP_VERSION.to_string(),
            port: Env::var("PORT").or("8080").as_u16()?,
            site_name: Env::var("SITE_NAME").or("Home").as_string()?,
            liveone_api_key: Env::var("LIVEONE_API_KEY").as_optional(),
            liveone_server: Env::var("LIVEONE_SERVER").as_optional(),
            liveone_enabled: Env::var("LIVEONE_ENABLED").as_optional(),
        })
    }
}

pub fn configure_logger() {
    let env = env_logger::Env::default()
        .filter_or("APP_LOG", "info")
        .write_style_or("APP_LOG_STYLE", "always");
    env_logger::init_from_env(env);
}

struct Env {
    name: String,
    default: Option<String>,
}

impl Env {
    fn var(name: &str) -> Self {
        Env {
            name: name.to_string(),
            default: None,
        }
    }

    fn or(self, default: &str) -> Self {
        Env {
            name: self.name,
            default: Some(default.to_string()),
        }
    }

    fn as_string(&self) -> Result<String, Error> {
        match env::var(&self.name) {
            Ok(value) if !value.trim().is_empty() => Ok(value),
            Ok(_) => Err(Error::EnvVarNotFound(self.name.clone())),
            Err(_) => match &self.default {
                Some(default_value) => Ok(default_value.clone()),
                None => Err(Error::EnvVarNotFound(self.name.clone())),
            },
        }
    }

    /// Reads the variable as an optional value, treating blank as unset.
    fn as_optional(&self) -> Option<String> {
        match env::var(&self.name) {
            Ok(value) if !value.trim().is_empty() => Some(value),
            _ => None,
        }
    }

    fn as_u16(&self) -> Result<u16, Error> {
        let value = self.as_string()?;
        value
            .trim()
            .parse::<u16>()
            .map_err(|_| Error::InvalidNumber(self.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_env::{with_var, with_vars};

    #[test]
    fn test_as_string_env_present() {
        with_var("TEST_CFG_STRING", Some("hello"), || {
            let val = Env::var("TEST_CFG_STRING").as_string().unwrap();
            assert_eq!(val, "hello");
        });
    }

    #[test]
    fn test_as_string_env_blank() {
        with_var("TEST_CFG_STRING", Some("   "), || {
            let err = Env::var("TEST_CFG_STRING").as_string().unwrap_err();
            assert!(matches!(err, Error::EnvVarNotFound(_)));
        });
    }

    #[test]
    fn test_as_string_env_missing_with_default() {
        with_var("TEST_CFG_STRING", None::<&str>, || {
            let val = Env::var("TEST_CFG_STRING").or("default").as_string().unwrap();
            assert_eq!(val, "default");
        });
    }

    #[test]
    fn test_as_optional() {
        with_var("TEST_CFG_OPT", Some("set"), || {
            assert_eq!(Env::var("TEST_CFG_OPT").as_optional(), Some("set".to_string()));
        });
        with_var("TEST_CFG_OPT", Some(""), || {
            assert_eq!(Env::var("TEST_CFG_OPT").as_optional(), None);
        });
        with_var("TEST_CFG_OPT", None::<&str>, || {
            assert_eq!(Env::var("TEST_CFG_OPT").as_optional(), None);
        });
    }

    #[test]
    fn test_as_u16_valid() {
        with_var("TEST_CFG_PORT", Some("3000"), || {
            assert_eq!(Env::var("TEST_CFG_PORT").as_u16().unwrap(), 3000);
        });
    }

    #[test]
    fn test_as_u16_invalid() {
        with_var("TEST_CFG_PORT", Some("not a port"), || {
            let err = Env::var("TEST_CFG_PORT").as_u16().unwrap_err();
            assert!(matches!(err, Error::InvalidNumber(_)));
        });
    }

    #[test]
    fn test_config_from_env() {
        with_vars(
            [
                ("PORT", Some("9090")),
                ("SITE_NAME", Some("Test Site")),
                ("LIVEONE_API_KEY", Some("fr_abc123")),
                ("LIVEONE_SERVER", Some("https://liveone.example")),
                ("LIVEONE_ENABLED", Some("true")),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.app_name, env!("CARGO_PKG_NAME"));
                assert_eq!(config.app_version, env!("CARGO_PKG_VERSION"));
                assert_eq!(config.port, 9090);
                assert_eq!(config.site_name, "Test Site");
                assert_eq!(config.liveone_api_key.as_deref(), Some("fr_abc123"));
                assert_eq!(
                    config.liveone_server.as_deref(),
                    Some("https://liveone.example")
                );
                assert_eq!(config.liveone_enabled.as_deref(), Some("true"));
            },
        );
    }

    #[test]
    fn test_configure_logger() {
        with_var("APP_LOG", Some("debug"), || {
            configure_logger();
            let log_level = log::max_level();
            assert_eq!(log_level, log::LevelFilter::Debug);
        });
    }

    #[test]
    fn test_config_defaults() {
        with_vars(
            [
                ("PORT", None::<&str>),
                ("SITE_NAME", None),
                ("LIVEONE_API_KEY", None),
                ("LIVEONE_SERVER", None),
                ("LIVEONE_ENABLED", None),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.port, 8080);
                assert_eq!(config.site_name, "Home");
                assert_eq!(config.liveone_api_key, None);
                assert_eq!(config.liveone_server, None);
                assert_eq!(config.liveone_enabled, None);
            },
        );
    }
}
