//! Server configuration.
//!
//! Configuration is optional: without a file every setting takes its
//! default. A file is JSON, for example:
//!
//! ```json
//! {
//!   "logging": { "level": "debug", "format": "json" },
//!   "malformed_input": "reject",
//!   "request_timeout_ms": 30000,
//!   "progress_delay_ms": 50,
//!   "elicitation_timeout_ms": 120000
//! }
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// What to do when a line on stdin is not a well-formed envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedInputPolicy {
    /// Treat the stream as corrupt and exit with the data-error status.
    #[default]
    Exit,
    /// Answer with a parse error and keep reading.
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub malformed_input: MalformedInputPolicy,

    /// Upper bound on a single request's handler. `None` disables the limit.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,

    /// Default pause between progress steps of long-running tools.
    #[serde(default = "default_progress_delay_ms")]
    pub progress_delay_ms: u64,

    /// How long a tool waits for the client to answer an elicitation.
    #[serde(default = "default_elicitation_timeout_ms")]
    pub elicitation_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            malformed_input: MalformedInputPolicy::default(),
            request_timeout_ms: None,
            progress_delay_ms: default_progress_delay_ms(),
            elicitation_timeout_ms: default_elicitation_timeout_ms(),
        }
    }
}

const fn default_progress_delay_ms() -> u64 {
    100
}

const fn default_elicitation_timeout_ms() -> u64 {
    300_000
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "unknown log level '{}', expected one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }
        if self.request_timeout_ms == Some(0) {
            return Err(ConfigError::Validation(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.progress_delay_ms > 5_000 {
            return Err(ConfigError::Validation(
                "progress_delay_ms must not exceed 5000".to_string(),
            ));
        }
        if self.elicitation_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "elicitation_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads the configuration, falling back to defaults when `path` is `None`.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(ServerConfig::default());
    };

    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let config: ServerConfig =
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    config.validate()?;
    Ok(config)
}
