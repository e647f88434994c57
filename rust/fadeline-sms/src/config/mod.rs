//! Application configuration loading and validation.
//!
//! Configuration is layered: built-in defaults, then an optional
//! `config/fadeline-sms.*` file, then `FADELINE__*` environment variables
//! (double underscore separates sections, e.g. `FADELINE__API__TIMEOUT_SECS`).
//! The flat `FADELINE_API_URL` and `FADELINE_ACCESS_TOKEN` variables are
//! also honored as direct overrides for the two settings everyone needs.

pub mod error;

pub use error::{ConfigResult, ConfigurationError};

use serde::{Deserialize, Serialize};

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Scheduling backend connection settings.
    #[serde(default)]
    pub api: ApiConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection settings for the scheduling backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the scheduling backend.
    pub base_url: Option<String>,
    /// Access token sent with every request.
    pub access_token: Option<String>,
    /// Request timeout for schedule operations, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Request timeout for content validation, in seconds. Validation runs
    /// a moderation pass on the backend and can take longer than a plain
    /// fetch, so it gets its own budget.
    #[serde(default = "default_verify_timeout_secs")]
    pub verify_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            access_token: None,
            timeout_secs: default_timeout_secs(),
            verify_timeout_secs: default_verify_timeout_secs(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit logs as JSON instead of human-readable lines.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_verify_timeout_secs() -> u64 {
    20
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from all sources and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration sources cannot be read or if
    /// validation fails.
    pub fn load() -> anyhow::Result<Self> {
        let config = Self::load_unchecked()?;
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration validation failed:\n\n{e}"))?;
        Ok(config)
    }

    /// Load configuration without validating it.
    ///
    /// Used by commands that only print diagnostics and should not refuse
    /// to start on an incomplete environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration source cannot be read.
    pub fn load_unchecked() -> anyhow::Result<Self> {
        // A missing .env file is not an error.
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .set_default("api.timeout_secs", 30)?
            .set_default("api.verify_timeout_secs", 20)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .add_source(config::File::with_name("config/fadeline-sms").required(false))
            .add_source(
                config::Environment::with_prefix("FADELINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app_config: AppConfig = config.try_deserialize().unwrap_or_default();

        // Flat aliases for the two settings every deployment must provide.
        if let Ok(url) = std::env::var("FADELINE_API_URL") {
            if !url.is_empty() {
                app_config.api.base_url = Some(url);
            }
        }
        if let Ok(token) = std::env::var("FADELINE_ACCESS_TOKEN") {
            if !token.is_empty() {
                app_config.api.access_token = Some(token);
            }
        }

        Ok(app_config)
    }

    /// Validate the configuration, collecting every problem found.
    ///
    /// # Errors
    ///
    /// Returns a single error, or [`ConfigurationError::Multiple`] when more
    /// than one setting is wrong.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        match self.api.base_url.as_deref() {
            None | Some("") => errors.push(ConfigurationError::missing_required(
                "api.base_url",
                "talking to the scheduling backend",
                "FADELINE_API_URL",
            )),
            Some(raw) => match url::Url::parse(raw) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                Ok(parsed) => errors.push(ConfigurationError::invalid(
                    format!("api.base_url has unsupported scheme '{}'", parsed.scheme()),
                    "Use an http:// or https:// URL in FADELINE_API_URL",
                )),
                Err(e) => errors.push(ConfigurationError::invalid(
                    format!("api.base_url '{raw}' is not a valid URL: {e}"),
                    "Set FADELINE_API_URL to the backend base URL, e.g. https://api.fadeline.app",
                )),
            },
        }

        if self.api.access_token.as_deref().unwrap_or("").is_empty() {
            errors.push(ConfigurationError::missing_required(
                "api.access_token",
                "authenticating to the scheduling backend",
                "FADELINE_ACCESS_TOKEN",
            ));
        }

        if self.api.timeout_secs == 0 {
            errors.push(ConfigurationError::invalid(
                "api.timeout_secs must be greater than zero",
                "Set FADELINE__API__TIMEOUT_SECS to a positive number of seconds",
            ));
        }

        if self.api.verify_timeout_secs == 0 {
            errors.push(ConfigurationError::invalid(
                "api.verify_timeout_secs must be greater than zero",
                "Set FADELINE__API__VERIFY_TIMEOUT_SECS to a positive number of seconds",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ConfigurationError::multiple(errors))
        }
    }
}

impl ApiConfig {
    /// Base URL and access token, available once validation has passed.
    ///
    /// # Errors
    ///
    /// Returns a missing-required error if either setting is absent.
    pub fn credentials(&self) -> ConfigResult<(String, String)> {
        let base_url = self.base_url.clone().ok_or_else(|| {
            ConfigurationError::missing_required(
                "api.base_url",
                "talking to the scheduling backend",
                "FADELINE_API_URL",
            )
        })?;
        let access_token = self.access_token.clone().ok_or_else(|| {
            ConfigurationError::missing_required(
                "api.access_token",
                "authenticating to the scheduling backend",
                "FADELINE_ACCESS_TOKEN",
            )
        })?;
        Ok((base_url, access_token))
    }
}
