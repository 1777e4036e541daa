use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::error::Result;

/// Main configuration for a pourhouse service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClubConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub signup: SignupConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json")]
    pub json: bool,
}

/// Configuration for the signup/checkout flow.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SignupConfig {
    /// Allowed domains for checkout redirect URLs (empty = allow any HTTPS URL).
    /// This prevents open redirect vulnerabilities.
    #[serde(default)]
    pub allowed_redirect_domains: Vec<String>,
    /// Maximum internal retries for reservation conflicts.
    #[serde(default = "default_reserve_retries")]
    pub max_reserve_retries: u32,
}

impl Default for ClubConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            signup: SignupConfig {
                allowed_redirect_domains: Vec::new(),
                max_reserve_retries: default_reserve_retries(),
            },
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json() -> bool {
    false
}

fn default_reserve_retries() -> u32 {
    3
}

impl ServerConfig {
    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| crate::error::ClubError::BadRequest(format!("Invalid bind address: {}", e)))
    }
}

/// Builder for ClubConfig with environment variable support.
#[must_use = "builder does nothing until you call build()"]
pub struct ClubConfigBuilder {
    config: ClubConfig,
}

impl ClubConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClubConfig::default(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    pub fn with_allowed_redirect_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.signup.allowed_redirect_domains =
            domains.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_reserve_retries(mut self, retries: u32) -> Self {
        self.config.signup.max_reserve_retries = retries;
        self
    }

    /// Load configuration overrides from `POURHOUSE_*` environment variables.
    ///
    /// Recognized variables: `POURHOUSE_HOST`, `POURHOUSE_PORT`,
    /// `POURHOUSE_LOG_LEVEL`, `POURHOUSE_LOG_JSON`,
    /// `POURHOUSE_ALLOWED_REDIRECT_DOMAINS` (comma-separated).
    pub fn from_env(mut self) -> Self {
        if let Ok(host) = std::env::var("POURHOUSE_HOST") {
            self.config.server.host = host;
        }
        if let Ok(port) = std::env::var("POURHOUSE_PORT") {
            if let Ok(port) = port.parse() {
                self.config.server.port = port;
            }
        }
        if let Ok(level) = std::env::var("POURHOUSE_LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Ok(json) = std::env::var("POURHOUSE_LOG_JSON") {
            self.config.logging.json = json.parse().unwrap_or(false);
        }
        if let Ok(domains) = std::env::var("POURHOUSE_ALLOWED_REDIRECT_DOMAINS") {
            self.config.signup.allowed_redirect_domains = domains
                .split(',')
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect();
        }
        self
    }

    pub fn build(self) -> ClubConfig {
        self.config
    }
}

impl Default for ClubConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
