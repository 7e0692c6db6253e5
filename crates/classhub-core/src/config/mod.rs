//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod api;
pub mod logging;
pub mod notifications;
pub mod session;
pub mod stream;

use serde::{Deserialize, Serialize};

use self::api::ApiConfig;
use self::logging::LoggingConfig;
use self::notifications::NotificationsConfig;
use self::session::SessionConfig;
use self::stream::StreamConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Live notification stream settings.
    #[serde(default)]
    pub stream: StreamConfig,
    /// REST collaborator settings.
    pub api: ApiConfig,
    /// Notification store settings.
    #[serde(default)]
    pub notifications: NotificationsConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Credentials used by the agent and the CLI.
    #[serde(default)]
    pub session: SessionConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `CLASSHUB__`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false));
        Self::finish(builder)
    }

    /// Load configuration from one explicit file, still honouring
    /// `CLASSHUB__` environment overrides.
    pub fn load_file(path: &str) -> Result<Self, AppError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(path).required(true));
        Self::finish(builder)
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, AppError> {
        let config = builder
            .add_source(
                config::Environment::with_prefix("CLASSHUB")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let parsed: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), AppError> {
        url::Url::parse(&self.api.base_url).map_err(|e| {
            AppError::configuration(format!("api.base_url '{}' is invalid: {e}", self.api.base_url))
        })?;

        if let Some(stream_url) = &self.stream.url {
            url::Url::parse(stream_url).map_err(|e| {
                AppError::configuration(format!("stream.url '{stream_url}' is invalid: {e}"))
            })?;
        }

        if self.stream.max_backoff_ms < self.stream.base_backoff_ms {
            return Err(AppError::configuration(format!(
                "stream.max_backoff_ms ({}) must be >= stream.base_backoff_ms ({})",
                self.stream.max_backoff_ms, self.stream.base_backoff_ms
            )));
        }

        if self.stream.heartbeat_timeout_ms == 0 {
            return Err(AppError::configuration(
                "stream.heartbeat_timeout_ms must be greater than zero",
            ));
        }

        if self.notifications.poll_interval_ms == 0 {
            return Err(AppError::configuration(
                "notifications.poll_interval_ms must be greater than zero",
            ));
        }

        Ok(())
    }
}
