//! Layered server configuration.
//!
//! Precedence, lowest first: compiled defaults, YAML file, `ORATA__*`
//! environment variables, `DATABASE_URL`, command-line overrides.

use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use spatial_features::config::{DatabaseConfig, SpatialFeaturesConfig};
use url::Url;

pub const ENV_PREFIX: &str = "ORATA__";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to render configuration: {0}")]
    Render(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    pub enabled: bool,
    /// `*` allows any origin.
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub max_age: Option<Duration>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_origins: vec!["*".to_owned()],
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
                .map(str::to_owned)
                .to_vec(),
            allowed_headers: vec!["*".to_owned()],
            max_age: Some(Duration::from_secs(600)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub body_limit_bytes: usize,
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_owned(),
            port: 8000,
            request_timeout: Duration::from_secs(30),
            body_limit_bytes: 16 * 1024 * 1024,
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
    /// Also write logs to this file (non-blocking, never rotated).
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub spatial: SpatialFeaturesConfig,
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub verbose: u8,
}

impl AppConfig {
    /// Build the effective configuration from the process environment.
    ///
    /// # Errors
    /// Unreadable YAML, type mismatches or failed validation.
    pub fn load(path: Option<&Path>, overrides: &CliOverrides) -> Result<Self, ConfigError> {
        let database_url = std::env::var(DATABASE_URL_ENV).ok();
        Self::load_from(Self::figment(path), database_url, overrides)
    }

    fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn load_from(
        figment: Figment,
        database_url: Option<String>,
        overrides: &CliOverrides,
    ) -> Result<Self, ConfigError> {
        let mut config: Self = figment.extract().map_err(Box::new)?;
        if let Some(url) = database_url.filter(|u| !u.is_empty()) {
            config.database.url = url;
        }
        config.apply_cli_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_cli_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        match overrides.verbose {
            0 => {}
            1 => "info".clone_into(&mut self.logging.level),
            2 => "debug".clone_into(&mut self.logging.level),
            _ => "trace".clone_into(&mut self.logging.level),
        }
    }

    /// # Errors
    /// Settings that cannot work together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Invalid("database.url must be set".to_owned()));
        }
        Url::parse(&self.database.url)
            .map_err(|e| ConfigError::Invalid(format!("database.url is not a valid URL: {e}")))?;
        if self.database.max_conns == 0 || self.database.min_conns > self.database.max_conns {
            return Err(ConfigError::Invalid(
                "database pool requires 0 < max_conns and min_conns <= max_conns".to_owned(),
            ));
        }
        if self.spatial.default_page_size == 0
            || self.spatial.default_page_size > self.spatial.max_page_size
        {
            return Err(ConfigError::Invalid(
                "spatial page sizes require 0 < default_page_size <= max_page_size".to_owned(),
            ));
        }
        if self.spatial.default_srid <= 0 {
            return Err(ConfigError::Invalid(
                "spatial.default_srid must be positive".to_owned(),
            ));
        }
        if self.server.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "server.request_timeout must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }

    /// YAML rendering with the database password masked.
    ///
    /// # Errors
    /// Serialization failure.
    pub fn to_redacted_yaml(&self) -> Result<String, ConfigError> {
        let mut shown = self.clone();
        shown.database.url = redact_dsn_password(&self.database.url)?;
        serde_saphyr::to_string(&shown).map_err(|e| ConfigError::Render(e.to_string()))
    }
}

/// Replace the password in a connection URL with `***REDACTED***`.
///
/// # Errors
/// The DSN has credentials but is not a parseable URL.
pub fn redact_dsn_password(dsn: &str) -> Result<String, ConfigError> {
    if !dsn.contains('@') {
        return Ok(dsn.to_owned());
    }
    let mut url =
        Url::parse(dsn).map_err(|e| ConfigError::Invalid(format!("unparseable DSN: {e}")))?;
    if url.password().is_some() {
        url.set_password(Some("***REDACTED***"))
            .map_err(|()| ConfigError::Invalid("DSN cannot carry a password".to_owned()))?;
    }
    Ok(url.to_string())
}
