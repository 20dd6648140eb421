//! EventHub Configuration
//!
//! Configuration is resolved in three layers:
//! 1. Built-in defaults (enough for a local dev run)
//! 2. An optional TOML file (path taken from `EH_CONFIG`)
//! 3. `EH_*` environment variable overrides
//!
//! The merged result is validated before it is handed to the server.
//!
//! ## Environment Variables
//!
//! | Variable | Section field |
//! |----------|---------------|
//! | `EH_HOST` | `server.host` |
//! | `EH_API_PORT` | `server.port` |
//! | `EH_DEV_MODE` | `server.dev_mode` |
//! | `EH_LOG_JSON` | `server.log_json` |
//! | `EH_MONGO_URL` | `mongo.url` |
//! | `EH_MONGO_DB` | `mongo.database` |
//! | `EH_USE_MEMORY_STORE` | `mongo.use_memory_store` |
//! | `EH_JWT_SECRET` | `auth.jwt_secret` |
//! | `EH_JWT_ISSUER` | `auth.jwt_issuer` |
//! | `EH_JWT_EXPIRY_SECS` | `auth.token_expiry_secs` |
//! | `EH_CLIENT_URL` | `auth.client_url` |
//! | `EH_EMAIL_ENABLED` | `email.enabled` |
//! | `EH_EMAIL_HOST` | `email.host` |
//! | `EH_EMAIL_PORT` | `email.port` |
//! | `EH_EMAIL_SECURE` | `email.secure` |
//! | `EH_EMAIL_USERNAME` | `email.username` |
//! | `EH_EMAIL_PASSWORD` | `email.password` |
//! | `EH_EMAIL_FROM` | `email.from` |
//! | `EH_REQUIRE_MODERATION` | `events.require_moderation` |
//! | `EH_ADMIN_EMAIL` | `admin.email` |
//! | `EH_ADMIN_USERNAME` | `admin.username` |
//! | `EH_ADMIN_PASSWORD` | `admin.password` |

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

const DEV_JWT_SECRET: &str = "eventhub-dev-secret";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub mongo: MongoConfig,
    pub auth: AuthConfig,
    pub email: EmailConfig,
    pub events: EventsConfig,
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Exposes internal error details in responses and relaxes secret checks
    pub dev_mode: bool,
    pub log_json: bool,
    /// How long shutdown waits for background side effects to finish
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            dev_mode: false,
            log_json: false,
            shutdown_grace_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    pub url: String,
    pub database: String,
    /// Run against the in-process store instead of MongoDB
    pub use_memory_store: bool,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            url: "mongodb://localhost:27017".to_string(),
            database: "eventhub".to_string(),
            use_memory_store: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub token_expiry_secs: i64,
    /// Base URL of the front end, used to build email links
    pub client_url: String,
    pub reset_token_ttl_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_issuer: "eventhub".to_string(),
            token_expiry_secs: 3600,
            client_url: "http://localhost:3000".to_string(),
            reset_token_ttl_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// When false, outgoing mail is logged instead of sent
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 587,
            secure: false,
            username: String::new(),
            password: String::new(),
            from: "EventHub <noreply@localhost>".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Events created by non-admins start as pending when set
    pub require_moderation: bool,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            require_moderation: false,
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

/// Optional administrator account created at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl AdminConfig {
    /// Returns (email, username, password) when all three are configured
    pub fn seed_credentials(&self) -> Option<(&str, &str, &str)> {
        match (&self.email, &self.username, &self.password) {
            (Some(e), Some(u), Some(p)) if !e.is_empty() && !u.is_empty() && !p.is_empty() => {
                Some((e.as_str(), u.as_str(), p.as_str()))
            }
            _ => None,
        }
    }
}

impl AppConfig {
    /// Load configuration from `EH_CONFIG` (if set) and the process environment
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("EH_CONFIG") {
            Ok(path) if !path.is_empty() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.finalize()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `EH_*` overrides using the given lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("EH_HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("EH_API_PORT") {
            self.server.port = parse_env("EH_API_PORT", &v)?;
        }
        if let Some(v) = get("EH_DEV_MODE") {
            self.server.dev_mode = parse_bool("EH_DEV_MODE", &v)?;
        }
        if let Some(v) = get("EH_LOG_JSON") {
            self.server.log_json = parse_bool("EH_LOG_JSON", &v)?;
        }

        if let Some(v) = get("EH_MONGO_URL") {
            self.mongo.url = v;
        }
        if let Some(v) = get("EH_MONGO_DB") {
            self.mongo.database = v;
        }
        if let Some(v) = get("EH_USE_MEMORY_STORE") {
            self.mongo.use_memory_store = parse_bool("EH_USE_MEMORY_STORE", &v)?;
        }

        if let Some(v) = get("EH_JWT_SECRET") {
            self.auth.jwt_secret = v;
        }
        if let Some(v) = get("EH_JWT_ISSUER") {
            self.auth.jwt_issuer = v;
        }
        if let Some(v) = get("EH_JWT_EXPIRY_SECS") {
            self.auth.token_expiry_secs = parse_env("EH_JWT_EXPIRY_SECS", &v)?;
        }
        if let Some(v) = get("EH_CLIENT_URL") {
            self.auth.client_url = v;
        }

        if let Some(v) = get("EH_EMAIL_ENABLED") {
            self.email.enabled = parse_bool("EH_EMAIL_ENABLED", &v)?;
        }
        if let Some(v) = get("EH_EMAIL_HOST") {
            self.email.host = v;
        }
        if let Some(v) = get("EH_EMAIL_PORT") {
            self.email.port = parse_env("EH_EMAIL_PORT", &v)?;
        }
        if let Some(v) = get("EH_EMAIL_SECURE") {
            self.email.secure = parse_bool("EH_EMAIL_SECURE", &v)?;
        }
        if let Some(v) = get("EH_EMAIL_USERNAME") {
            self.email.username = v;
        }
        if let Some(v) = get("EH_EMAIL_PASSWORD") {
            self.email.password = v;
        }
        if let Some(v) = get("EH_EMAIL_FROM") {
            self.email.from = v;
        }

        if let Some(v) = get("EH_REQUIRE_MODERATION") {
            self.events.require_moderation = parse_bool("EH_REQUIRE_MODERATION", &v)?;
        }

        if let Some(v) = get("EH_ADMIN_EMAIL") {
            self.admin.email = Some(v);
        }
        if let Some(v) = get("EH_ADMIN_USERNAME") {
            self.admin.username = Some(v);
        }
        if let Some(v) = get("EH_ADMIN_PASSWORD") {
            self.admin.password = Some(v);
        }

        Ok(())
    }

    /// Fill dev-mode fallbacks and validate the merged configuration
    pub fn finalize(&mut self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() && self.server.dev_mode {
            warn!("No JWT secret configured, using the built-in development secret");
            self.auth.jwt_secret = DEV_JWT_SECRET.to_string();
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::Invalid(
                "auth.jwt_secret must be set outside dev mode".to_string(),
            ));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".to_string()));
        }
        if self.auth.token_expiry_secs <= 0 {
            return Err(ConfigError::Invalid(
                "auth.token_expiry_secs must be positive".to_string(),
            ));
        }
        if self.auth.reset_token_ttl_secs <= 0 {
            return Err(ConfigError::Invalid(
                "auth.reset_token_ttl_secs must be positive".to_string(),
            ));
        }
        if self.events.default_page_size == 0
            || self.events.default_page_size > self.events.max_page_size
        {
            return Err(ConfigError::Invalid(
                "events.default_page_size must be between 1 and events.max_page_size".to_string(),
            ));
        }
        if self.email.enabled && self.email.host.is_empty() {
            return Err(ConfigError::Invalid(
                "email.host is required when email is enabled".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.mongo.database, "eventhub");
        assert_eq!(config.auth.token_expiry_secs, 3600);
        assert!(!config.email.enabled);
        assert!(!config.events.require_moderation);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = AppConfig::from_toml_str(
            r#"
            [server]
            port = 8080

            [events]
            require_moderation = true
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.events.require_moderation);
        assert_eq!(config.events.max_page_size, 100);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[mongo]\nurl = \"mongodb://db:27017\"\ndatabase = \"hub\"").unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.mongo.url, "mongodb://db:27017");
        assert_eq!(config.mongo.database, "hub");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = AppConfig::from_file("/nonexistent/eventhub.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = AppConfig::from_toml_str("[server]\nport = 8080").unwrap();
        config
            .apply_env(lookup(&[
                ("EH_API_PORT", "9000"),
                ("EH_JWT_SECRET", "s3cret"),
                ("EH_EMAIL_ENABLED", "true"),
                ("EH_ADMIN_EMAIL", "root@example.com"),
            ]))
            .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.auth.jwt_secret, "s3cret");
        assert!(config.email.enabled);
        assert_eq!(config.admin.email.as_deref(), Some("root@example.com"));
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = AppConfig::default();
        let err = config.apply_env(lookup(&[("EH_API_PORT", "not-a-port")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref key, .. } if key == "EH_API_PORT"));

        let err = config.apply_env(lookup(&[("EH_DEV_MODE", "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn test_secret_required_outside_dev_mode() {
        let mut config = AppConfig::default();
        assert!(matches!(config.finalize(), Err(ConfigError::Invalid(_))));

        let mut config = AppConfig::default();
        config.server.dev_mode = true;
        config.finalize().unwrap();
        assert_eq!(config.auth.jwt_secret, DEV_JWT_SECRET);
    }

    #[test]
    fn test_page_size_validation() {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = "x".to_string();
        config.events.default_page_size = 500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_admin_seed_requires_all_fields() {
        let mut admin = AdminConfig::default();
        assert!(admin.seed_credentials().is_none());

        admin.email = Some("a@b.c".to_string());
        admin.username = Some("admin".to_string());
        assert!(admin.seed_credentials().is_none());

        admin.password = Some("hunter22".to_string());
        assert_eq!(admin.seed_credentials(), Some(("a@b.c", "admin", "hunter22")));
    }
}
