//! Configuration errors

use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors loading `configuration.yaml` and the files it pulls in
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `!secret` key missing from secrets.yaml
    #[error("secret '{key}' is not defined in secrets.yaml")]
    SecretNotFound { key: String },

    /// A file includes itself, directly or through other files
    #[error("include loop through {path}")]
    CircularInclude { path: PathBuf },

    /// Environment variable not found and no default given
    #[error("environment variable '{var}' not set")]
    EnvVarNotFound { var: String },

    /// A value has the wrong shape
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}
