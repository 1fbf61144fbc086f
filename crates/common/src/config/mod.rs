//! Configuration management for LinguaChat services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Layered files: config/default, config/{APP_ENV}, config/local
//! - Default values
//!
//! Every section has defaults. A missing credential disables the feature it
//! belongs to instead of aborting startup.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Persistence backend configuration
    pub database: DatabaseConfig,

    /// Remote chat model configuration
    pub model: ModelConfig,

    /// Identity provider configuration
    pub identity: IdentityConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,

    /// Presentation settings passed through to view descriptors
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,

    /// Sessions untouched for this long are evicted and their usage recorded
    pub session_idle_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Backend kind: postgres, memory
    pub backend: String,

    /// Database URL; persistence is disabled when absent (postgres backend)
    pub url: Option<String>,

    /// Maximum number of connections
    pub max_connections: u32,

    /// Minimum number of connections
    pub min_connections: u32,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    pub idle_timeout_secs: u64,

    /// Create the users/usage tables on startup if missing
    pub ensure_schema: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Chat provider: gemini, mock
    pub provider: String,

    /// API key for the chat service
    pub api_key: Option<String>,

    /// API base URL
    pub api_base: String,

    /// Model to use
    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// System instruction override
    pub system_prompt: Option<String>,

    /// Refuse to start without an API key
    pub required: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Secret used to verify identity tokens; login is disabled when absent
    pub token_secret: Option<String>,

    /// Provider authorization endpoint the login action redirects to
    pub authorize_url: Option<String>,

    /// OAuth client id sent with the authorization request
    pub client_id: Option<String>,

    /// Where the provider sends the user back to
    pub redirect_uri: Option<String>,

    /// Expected `iss` claim
    pub issuer: Option<String>,

    /// Expected `aud` claim
    pub audience: Option<String>,

    /// Emails allowed to open the admin dashboard
    pub admin_emails: Vec<String>,

    /// Subject ids allowed to open the admin dashboard
    pub admin_subjects: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    pub log_level: String,

    /// Enable JSON logging
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    pub metrics_port: u16,

    /// Service name for tracing
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests per second (process wide)
    pub requests_per_second: u32,

    /// Burst capacity
    pub burst: u32,

    /// Enable rate limiting
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UiConfig {
    /// Banner image shown on the home and login screens
    pub banner_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 60,
            shutdown_timeout_secs: 30,
            session_idle_secs: 1800,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: "postgres".to_string(),
            url: None,
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 10,
            idle_timeout_secs: 300,
            ensure_schema: true,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            api_key: None,
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: crate::DEFAULT_MODEL.to_string(),
            timeout_secs: 30,
            system_prompt: None,
            required: false,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            token_secret: None,
            authorize_url: None,
            client_id: None,
            redirect_uri: None,
            issuer: None,
            audience: None,
            admin_emails: Vec::new(),
            admin_subjects: Vec::new(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: true,
            metrics_port: 9090,
            service_name: "linguachat".to_string(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 20,
            burst: 40,
            enabled: true,
        }
    }
}

fn env_source() -> Environment {
    // e.g., APP__SERVER__PORT=8081, APP__IDENTITY__ADMIN_EMAILS=a@x.org,b@x.org
    Environment::with_prefix("APP")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("identity.admin_emails")
        .with_list_parse_key("identity.admin_subjects")
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            .add_source(env_source())
            .build()?;

        let mut loaded: Self = config.try_deserialize()?;
        loaded.apply_legacy_env();
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject combinations the server cannot honour. A model call must finish
    /// inside the request timeout, otherwise the request is dropped mid-call.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.timeout_secs >= self.server.request_timeout_secs {
            return Err(ConfigError::Message(format!(
                "model.timeout_secs ({}) must be lower than server.request_timeout_secs ({})",
                self.model.timeout_secs, self.server.request_timeout_secs
            )));
        }
        if self.server.session_idle_secs == 0 {
            return Err(ConfigError::Message(
                "server.session_idle_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Honour the bare `GEMINI_API_KEY` secret name when the prefixed one is unset
    fn apply_legacy_env(&mut self) {
        if self.model.api_key.is_none() {
            self.model.api_key = std::env::var("GEMINI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty());
        }
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Get the session idle limit as Duration
    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.server.session_idle_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.model.model, "gemini-2.5-flash");
        assert!(config.model.api_key.is_none());
        assert!(!config.model.required);
    }

    #[test]
    fn test_model_timeout_must_fit_request_timeout() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        config.model.timeout_secs = config.server.request_timeout_secs;
        assert!(matches!(config.validate(), Err(ConfigError::Message(_))));

        config.model.timeout_secs = 90;
        config.server.request_timeout_secs = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_idle_limit_rejected() {
        let mut config = AppConfig::default();
        config.server.session_idle_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AppConfig = Config::builder()
            .set_override("server.port", 9000)
            .unwrap()
            .set_override("identity.admin_emails", vec!["admin@example.org"])
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.identity.admin_emails, vec!["admin@example.org"]);
        assert_eq!(config.rate_limit.burst, 40);
    }
}
