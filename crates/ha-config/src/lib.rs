//! YAML configuration loading for the hub
//!
//! This crate loads `configuration.yaml` with support for the custom tags:
//!
//! - `!include path` - Include another YAML file
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR [default]` - Environment variable substitution
//!
//! and parses the result into a typed [`HubConfig`].
//!
//! # Example
//!
//! ```ignore
//! use ha_config::HubConfig;
//!
//! let config = HubConfig::load("/config")?;
//! println!("listening on {}", config.http.bind_address());
//! ```

mod error;
mod hub_config;
mod loader;
mod secrets;

pub use error::{ConfigError, ConfigResult};
pub use hub_config::{
    FlowSettings, HttpConfig, HubConfig, NestConfig, TivoPlatformConfig, CONFIG_FILE,
};
pub use loader::{load_yaml, load_yaml_string, YamlLoader};
pub use secrets::Secrets;

// Re-export serde_yaml::Value for convenience
pub use serde_yaml::Value;
