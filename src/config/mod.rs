//! Application configuration module
//!
//! Configuration is loaded from environment variables with the `TRACKBRIDGE`
//! prefix using the `config` and `dotenvy` crates. Nested values use double
//! underscores as separators. Every section has defaults, so an empty
//! environment yields a runnable configuration.
//!
//! # Example
//!
//! ```no_run
//! use trackbridge::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod error;
mod relay;
mod server;
mod storage;

pub use error::{ConfigError, ValidationError};
pub use relay::RelayConfig;
pub use server::{LogFormat, ServerConfig};
pub use storage::StorageConfig;

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Listener, logging and shutdown settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Project store location and versioning policy
    #[serde(default)]
    pub storage: StorageConfig,

    /// Websocket relay tuning
    #[serde(default)]
    pub relay: RelayConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// Loads `.env` if present, then reads variables such as
    /// `TRACKBRIDGE__SERVER__PORT=5000` (maps to `server.port`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("TRACKBRIDGE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.storage.validate()?;
        self.relay.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::path::PathBuf;
    use std::sync::Mutex;

    // Env vars are process-global
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "TRACKBRIDGE__SERVER__PORT",
        "TRACKBRIDGE__SERVER__LOG_FORMAT",
        "TRACKBRIDGE__STORAGE__ROOT",
        "TRACKBRIDGE__STORAGE__STRICT_VERSION_CHECK",
        "TRACKBRIDGE__RELAY__HANDSHAKE_TIMEOUT_SECS",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_load_with_empty_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let result = AppConfig::load();

        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.storage.root, PathBuf::from("./vault/projects"));
        assert!(config.relay.handshake_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_nested_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("TRACKBRIDGE__SERVER__PORT", "3000");
        env::set_var("TRACKBRIDGE__SERVER__LOG_FORMAT", "json");
        env::set_var("TRACKBRIDGE__STORAGE__ROOT", "/tmp/tb");
        env::set_var("TRACKBRIDGE__STORAGE__STRICT_VERSION_CHECK", "true");
        env::set_var("TRACKBRIDGE__RELAY__HANDSHAKE_TIMEOUT_SECS", "30");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.log_format, LogFormat::Json);
        assert_eq!(config.storage.root, PathBuf::from("/tmp/tb"));
        assert!(config.storage.strict_version_check);
        assert_eq!(config.relay.handshake_timeout_secs, Some(30));
    }

    #[test]
    fn test_unknown_log_format_fails_to_load() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("TRACKBRIDGE__SERVER__LOG_FORMAT", "xml");
        let result = AppConfig::load();
        clear_env();

        assert!(matches!(result, Err(ConfigError::LoadError(_))));
    }

    #[test]
    fn test_validate_reports_first_bad_section() {
        let config = AppConfig {
            relay: RelayConfig {
                outbound_buffer: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidOutboundBuffer)
        ));
    }
}
