//! Configuration management
//!
//! Configuration is loaded from `config.yml` and may be overridden through
//! `BOOKER_*` environment variables. Missing values fall back to defaults,
//! so the server starts with no configuration file at all.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Session cookie configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// First administrator created on an empty database
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/booker.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Lifetime of a session in hours
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: i64,
    /// Mark the session cookie `Secure` (only sent over HTTPS)
    #[serde(default)]
    pub cookie_secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
            cookie_secure: false,
        }
    }
}

/// Longest accepted session lifetime (one year)
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 366;

fn default_ttl_hours() -> i64 {
    12
}

/// Bootstrap administrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Create the administrator when the users table is empty
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Display name
    #[serde(default = "default_admin_name")]
    pub name: String,
    /// Login name
    #[serde(default = "default_admin_username")]
    pub username: String,
    /// Initial password
    #[serde(default = "default_admin_password")]
    pub password: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: default_admin_name(),
            username: default_admin_username(),
            password: default_admin_password(),
        }
    }
}

impl BootstrapConfig {
    /// Whether the shipped default password is still in use
    pub fn uses_default_password(&self) -> bool {
        self.password == default_admin_password()
    }
}

fn default_true() -> bool {
    true
}

fn default_admin_name() -> String {
    "Administrator".to_string()
}

fn default_admin_username() -> String {
    "admin".to_string()
}

fn default_admin_password() -> String {
    "admin".to_string()
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist or is empty, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with the location.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Recognised variables:
    /// - BOOKER_SERVER_HOST
    /// - BOOKER_SERVER_PORT
    /// - BOOKER_DATABASE_DRIVER
    /// - BOOKER_DATABASE_URL
    /// - BOOKER_SESSION_TTL_HOURS
    /// - BOOKER_SESSION_COOKIE_SECURE
    /// - BOOKER_BOOTSTRAP_ENABLED
    /// - BOOKER_BOOTSTRAP_USERNAME
    /// - BOOKER_BOOTSTRAP_PASSWORD
    ///
    /// The result is validated before it is returned.
    pub fn load_with_env(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check values that would otherwise fail late at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database.url must not be empty".to_string(),
            ));
        }
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&self.session.ttl_hours) {
            return Err(ConfigError::ValidationError(format!(
                "session.ttl_hours must be between 1 and {}, got {}",
                MAX_SESSION_TTL_HOURS, self.session.ttl_hours
            )));
        }
        if self.bootstrap.enabled
            && (self.bootstrap.username.trim().is_empty() || self.bootstrap.password.is_empty())
        {
            return Err(ConfigError::ValidationError(
                "bootstrap.username and bootstrap.password are required when bootstrap is enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("BOOKER_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("BOOKER_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Ok(driver) = std::env::var("BOOKER_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("BOOKER_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(ttl) = std::env::var("BOOKER_SESSION_TTL_HOURS") {
            if let Ok(ttl) = ttl.parse::<i64>() {
                self.session.ttl_hours = ttl;
            }
        }
        if let Ok(secure) = std::env::var("BOOKER_SESSION_COOKIE_SECURE") {
            if let Ok(secure) = secure.parse::<bool>() {
                self.session.cookie_secure = secure;
            }
        }

        if let Ok(enabled) = std::env::var("BOOKER_BOOTSTRAP_ENABLED") {
            if let Ok(enabled) = enabled.parse::<bool>() {
                self.bootstrap.enabled = enabled;
            }
        }
        if let Ok(username) = std::env::var("BOOKER_BOOTSTRAP_USERNAME") {
            self.bootstrap.username = username;
        }
        if let Ok(password) = std::env::var("BOOKER_BOOTSTRAP_PASSWORD") {
            self.bootstrap.password = password;
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test module that touches process environment.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "BOOKER_SERVER_HOST",
    "BOOKER_SERVER_PORT",
    "BOOKER_DATABASE_DRIVER",
    "BOOKER_DATABASE_URL",
    "BOOKER_SESSION_TTL_HOURS",
    "BOOKER_SESSION_COOKIE_SECURE",
    "BOOKER_BOOTSTRAP_ENABLED",
    "BOOKER_BOOTSTRAP_USERNAME",
    "BOOKER_BOOTSTRAP_PASSWORD",
];

#[cfg(test)]
fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        super::CONFIG_ENV_MUTEX
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn valid_config_strategy() -> impl Strategy<Value = Config> {
        (
            prop_oneof![
                Just("localhost".to_string()),
                Just("127.0.0.1".to_string()),
                "[a-z][a-z0-9]{0,10}",
            ],
            1u16..=65535,
            prop_oneof![Just(DatabaseDriver::Sqlite), Just(DatabaseDriver::Mysql)],
            "[a-z][a-z0-9_/]{0,20}\\.db",
            1i64..=720,
            any::<bool>(),
            "[a-z]{1,12}",
            "[a-zA-Z0-9]{1,16}",
        )
            .prop_map(
                |(host, port, driver, url, ttl_hours, cookie_secure, username, password)| Config {
                    server: ServerConfig { host, port },
                    database: DatabaseConfig { driver, url },
                    session: SessionConfig {
                        ttl_hours,
                        cookie_secure,
                    },
                    bootstrap: BootstrapConfig {
                        enabled: true,
                        name: "Administrator".to_string(),
                        username,
                        password,
                    },
                },
            )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Serializing a config to YAML and loading it back yields the same values.
        #[test]
        fn config_roundtrip(config in valid_config_strategy()) {
            let yaml = serde_yaml::to_string(&config).expect("Failed to serialize config");
            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "{}", yaml).expect("Failed to write config");

            let parsed = Config::load(file.path()).expect("Failed to parse config");

            prop_assert_eq!(&config.server.host, &parsed.server.host);
            prop_assert_eq!(config.server.port, parsed.server.port);
            prop_assert_eq!(config.database.driver, parsed.database.driver);
            prop_assert_eq!(&config.database.url, &parsed.database.url);
            prop_assert_eq!(config.session.ttl_hours, parsed.session.ttl_hours);
            prop_assert_eq!(config.session.cookie_secure, parsed.session.cookie_secure);
            prop_assert_eq!(&config.bootstrap.username, &parsed.bootstrap.username);
            prop_assert!(parsed.validate().is_ok());
        }

        /// A file that only sets the port keeps every other default.
        #[test]
        fn config_default_filling(port in 1u16..=65535) {
            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "server:\n  port: {}\n", port).expect("Failed to write config");

            let config = Config::load(file.path()).expect("Failed to parse config");

            prop_assert_eq!(config.server.port, port);
            prop_assert_eq!(config.server.host, "0.0.0.0");
            prop_assert_eq!(config.database.url, "data/booker.db");
            prop_assert_eq!(config.session.ttl_hours, 12);
        }

        /// Environment overrides win over file values.
        #[test]
        fn env_override_wins(file_port in 1u16..=65535, env_port in 1u16..=65535) {
            let _guard = lock_env();
            clear_env();

            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "server:\n  port: {}\n", file_port).expect("Failed to write config");
            std::env::set_var("BOOKER_SERVER_PORT", env_port.to_string());

            let config = Config::load_with_env(file.path());
            clear_env();

            prop_assert_eq!(config.expect("Failed to load config").server.port, env_port);
        }
    }
}
