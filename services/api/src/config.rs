//! Service configuration.
//!
//! Settings come from environment variables (optionally through a `.env`
//! file) and are gathered into one struct at startup.

use photobooth_core::controller::FlowVariant;
use photobooth_core::dispatch::{DEFAULT_FCM_ENDPOINT, DEFAULT_TOPIC};
use photobooth_core::uploads::clients::DEFAULT_SHORTENER_ENDPOINT;
use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub prompts_path: PathBuf,
    pub photo_booth_id: String,
    pub flow: FlowVariant,
    pub command_topic: String,
    pub fcm_endpoint: String,
    pub fcm_server_key: SecretString,
    pub command_journal: Option<PathBuf>,
    pub shortener_endpoint: String,
    pub shortener_key: SecretString,
    pub database_url: String,
    pub database_secret: Option<SecretString>,
    pub twitter_bearer_token: Option<SecretString>,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// *   `BIND_ADDRESS`: Address to listen on. Defaults to "0.0.0.0:3000".
    /// *   `PROMPTS_PATH`: Prompt catalog file. Defaults to "prompts/responses.json".
    /// *   `PHOTO_BOOTH_ID`: User id of the booth's assistant account. Required.
    /// *   `FLOW_VARIANT`: "standard" or "share". Defaults to "standard".
    /// *   `COMMAND_TOPIC`: Push topic the booth listens on. Defaults to "io-photobooth".
    /// *   `FCM_ENDPOINT`, `FCM_SERVER_KEY`: Push endpoint and its key. The key is required.
    /// *   `COMMAND_JOURNAL`: (Optional) File for pending delayed commands.
    /// *   `URL_SHORTENER_ENDPOINT`, `URL_SHORTENER_KEY`: Shortener and its key.
    ///     The key is required.
    /// *   `DATABASE_URL`: Realtime database base URL. Required.
    /// *   `DATABASE_SECRET`: (Optional) Database auth token.
    /// *   `TWITTER_BEARER_TOKEN`: (Optional) Enables posting flagged photos.
    /// *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. This is useful for local development and is ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key → value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| ConfigError::MissingVar(key.to_string()))
        };

        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let flow = var_or("FLOW_VARIANT", "standard")
            .parse::<FlowVariant>()
            .map_err(|e| ConfigError::InvalidValue("FLOW_VARIANT".to_string(), e))?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            prompts_path: PathBuf::from(var_or("PROMPTS_PATH", "prompts/responses.json")),
            photo_booth_id: required("PHOTO_BOOTH_ID")?,
            flow,
            command_topic: var_or("COMMAND_TOPIC", DEFAULT_TOPIC),
            fcm_endpoint: var_or("FCM_ENDPOINT", DEFAULT_FCM_ENDPOINT),
            fcm_server_key: required("FCM_SERVER_KEY")?.into(),
            command_journal: lookup("COMMAND_JOURNAL").map(PathBuf::from),
            shortener_endpoint: var_or("URL_SHORTENER_ENDPOINT", DEFAULT_SHORTENER_ENDPOINT),
            shortener_key: required("URL_SHORTENER_KEY")?.into(),
            database_url: required("DATABASE_URL")?,
            database_secret: lookup("DATABASE_SECRET").map(SecretString::from),
            twitter_bearer_token: lookup("TWITTER_BEARER_TOKEN").map(SecretString::from),
            log_level,
        })
    }
}
