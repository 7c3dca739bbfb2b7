pub mod tracing;

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Environment variable '{0}' is required but not set")]
    MissingEnvVar(String),

    #[error("Failed to parse environment variable '{key}': {details}")]
    ParseError { key: String, details: String },

    /// Every problem found while reading a group of variables.
    #[error("Incomplete configuration: missing [{}], invalid [{}]", .missing.join(", "), .invalid.join(", "))]
    Incomplete {
        missing: Vec<String>,
        invalid: Vec<String>,
    },
}

impl ConfigError {
    /// Names of all variables this error is about.
    pub fn fields(&self) -> Vec<String> {
        match self {
            ConfigError::MissingEnvVar(key) => vec![key.clone()],
            ConfigError::ParseError { key, .. } => vec![key.clone()],
            ConfigError::Incomplete { missing, invalid } => {
                missing.iter().chain(invalid.iter()).cloned().collect()
            }
        }
    }
}

/// Application environment (dev = local/kind, prod = full k8s)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Environment {
    Development, // Local runs, pretty logs
    Production,  // Deployed, JSON logs
}

impl Environment {
    pub fn from_env() -> Self {
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        if app_env.eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
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

/// Helper to load and parse environment variable with a default value
pub fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Helper to load and parse environment variable or return error
pub fn env_required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Reads a group of prefixed variables and collects every missing or
/// unparsable one instead of stopping at the first.
///
/// ```ignore
/// let mut env = EnvReader::new("APP_");
/// let url = env.required("URL");
/// let timeout: u64 = env.parse_or("TIMEOUT_SECS", 30);
/// env.finish()?;
/// ```
#[derive(Debug, Clone)]
pub struct EnvReader {
    prefix: String,
    missing: Vec<String>,
    invalid: Vec<String>,
}

impl EnvReader {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            missing: Vec::new(),
            invalid: Vec::new(),
        }
    }

    /// Full variable name for `name`.
    pub fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Value of the variable, treating blank values as unset.
    pub fn optional(&self, name: &str) -> Option<String> {
        env::var(self.key(name))
            .ok()
            .filter(|value| !value.trim().is_empty())
    }

    /// Value of a required variable. A missing one is recorded and an
    /// empty string returned so reading can continue.
    pub fn required(&mut self, name: &str) -> String {
        match self.optional(name) {
            Some(value) => value,
            None => {
                self.missing.push(self.key(name));
                String::new()
            }
        }
    }

    pub fn or_default(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    pub fn parse_or<T>(&mut self, name: &str, default: T) -> T
    where
        T: FromStr,
        T::Err: Display,
    {
        self.parse_optional(name).unwrap_or(default)
    }

    pub fn parse_optional<T>(&mut self, name: &str) -> Option<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.optional(name)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(e) => {
                self.invalid.push(format!("{} ({})", self.key(name), e));
                None
            }
        }
    }

    /// Whether nothing has been recorded so far.
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.invalid.is_empty()
    }

    pub fn finish(self) -> Result<(), ConfigError> {
        if self.is_clean() {
            Ok(())
        } else {
            Err(ConfigError::Incomplete {
                missing: self.missing,
                invalid: self.invalid,
            })
        }
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

        temp_env::with_var("APP_ENV", Some("Production"), || {
            assert_eq!(Environment::from_env(), Environment::Production);
        });
    }

    #[test]
    fn test_environment_unknown_defaults_to_development() {
        temp_env::with_var("APP_ENV", Some("staging"), || {
            assert_eq!(Environment::from_env(), Environment::Development);
        });
    }

    #[test]
    fn test_env_or_default_without_value() {
        temp_env::with_var_unset("CORE_CONFIG_MISSING_VAR", || {
            let result = env_or_default("CORE_CONFIG_MISSING_VAR", "default_value");
            assert_eq!(result, "default_value");
        });
    }

    #[test]
    fn test_env_required_missing() {
        temp_env::with_var_unset("CORE_CONFIG_MISSING_REQUIRED", || {
            let err = env_required("CORE_CONFIG_MISSING_REQUIRED").unwrap_err();
            assert!(err.to_string().contains("CORE_CONFIG_MISSING_REQUIRED"));
            assert!(err.to_string().contains("required"));
        });
    }

    #[test]
    fn test_env_reader_collects_every_missing_variable() {
        temp_env::with_vars(
            [
                ("RDR_A", None::<&str>),
                ("RDR_B", Some("   ")),
                ("RDR_C", Some("present")),
            ],
            || {
                let mut env = EnvReader::new("RDR_");
                assert_eq!(env.required("A"), "");
                assert_eq!(env.required("B"), "");
                assert_eq!(env.required("C"), "present");

                let err = env.finish().unwrap_err();
                assert_eq!(err.fields(), vec!["RDR_A".to_string(), "RDR_B".to_string()]);
            },
        );
    }

    #[test]
    fn test_env_reader_parse_errors_are_reported() {
        temp_env::with_vars(
            [("RDR_SIZE", Some("abc")), ("RDR_WORKERS", Some(" 8 "))],
            || {
                let mut env = EnvReader::new("RDR_");
                let size: usize = env.parse_or("SIZE", 10);
                let workers: usize = env.parse_or("WORKERS", 1);
                let absent: Option<u32> = env.parse_optional("NOT_SET");

                assert_eq!(size, 10);
                assert_eq!(workers, 8);
                assert_eq!(absent, None);

                match env.finish() {
                    Err(ConfigError::Incomplete { missing, invalid }) => {
                        assert!(missing.is_empty());
                        assert_eq!(invalid.len(), 1);
                        assert!(invalid[0].starts_with("RDR_SIZE"));
                    }
                    other => panic!("unexpected result: {other:?}"),
                }
            },
        );
    }

    #[test]
    fn test_env_reader_clean_finish() {
        temp_env::with_var("RDR_OK", Some("yes"), || {
            let mut env = EnvReader::new("RDR_");
            assert_eq!(env.required("OK"), "yes");
            assert_eq!(env.or_default("OTHER", "fallback"), "fallback");
            assert!(env.finish().is_ok());
        });
    }
}
