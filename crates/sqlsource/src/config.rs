//! Connection configuration for sqlsource drivers
//!
//! `ConnectionConfig` is built once from operator input, validated, and then
//! handed to `Driver::connect`. The password is held in a [`SensitiveString`]
//! so it never reaches logs.

use secrecy::{ExposeSecret, SecretString};
use tracing::warn;
use validator::Validate;

use crate::error::{Error, Result};

/// A wrapper around `SecretString` that redacts its value in `Debug` and `Display`
#[derive(Clone)]
pub struct SensitiveString(SecretString);

impl SensitiveString {
    /// Create a new sensitive string from any string-like value
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::new(value.into().into_boxed_str()))
    }

    /// Expose the secret value.
    ///
    /// Use only where the actual value is needed (building a DSN).
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for SensitiveString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SensitiveString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Settings a driver needs to reach one database
#[derive(Debug, Clone, Validate)]
pub struct ConnectionConfig {
    /// Database instance hostname
    #[validate(length(min = 1))]
    pub hostname: String,
    /// Database instance port
    #[validate(range(min = 1))]
    pub port: u16,
    /// User to authenticate as
    #[validate(length(min = 1))]
    pub username: String,
    /// Password for `username`
    pub password: SensitiveString,
    /// Database (catalog) name
    #[validate(length(min = 1))]
    pub database: String,
    /// Free-form `key=value` backend options, in the order given
    pub options: Vec<String>,
}

impl ConnectionConfig {
    /// Create a configuration without backend options
    pub fn new(
        hostname: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<SensitiveString>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            username: username.into(),
            password: password.into(),
            database: database.into(),
            options: Vec::new(),
        }
    }

    /// Append a raw `key=value` backend option
    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    /// Append several raw backend options
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.extend(options.into_iter().map(Into::into));
        self
    }

    /// Run field validation, mapping failures to a configuration error
    pub fn validated(self) -> Result<Self> {
        self.validate()
            .map_err(|e| Error::config(format!("invalid connection config: {}", e)))?;
        Ok(self)
    }

    /// Parsed backend options; entries without `=` or with an empty key are skipped
    pub fn parsed_options(&self) -> Vec<(&str, &str)> {
        self.options
            .iter()
            .filter_map(|option| match option.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => Some((key.trim(), value)),
                _ => {
                    warn!(option = %option, "Ignoring malformed driver option");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("db.internal", 3306, "reader", "hunter2", "shop")
    }

    #[test]
    fn test_sensitive_string_redacted() {
        let secret = SensitiveString::new("hunter2");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(secret.expose_secret(), "hunter2");
    }

    #[test]
    fn test_debug_hides_password() {
        let debug = format!("{:?}", config());
        assert!(debug.contains("db.internal"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_parsed_options_skip_malformed() {
        let config = config().with_options(["charset=utf8mb4", "novalue", "=x", "tz=+00:00"]);
        assert_eq!(
            config.parsed_options(),
            vec![("charset", "utf8mb4"), ("tz", "+00:00")]
        );
    }

    #[test]
    fn test_option_value_may_contain_equals() {
        let config = config().with_option("init=SET a=1");
        assert_eq!(config.parsed_options(), vec![("init", "SET a=1")]);
    }

    #[test]
    fn test_validation() {
        assert!(config().validated().is_ok());

        let mut bad = config();
        bad.hostname.clear();
        assert!(bad.validated().is_err());

        let mut bad = config();
        bad.port = 0;
        assert!(bad.validated().is_err());
    }
}
