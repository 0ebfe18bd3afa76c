//! Typed hub configuration
//!
//! Parsed from `configuration.yaml` after tag resolution. Every section is
//! optional and falls back to its defaults.

use crate::error::{ConfigError, ConfigResult};
use crate::loader::YamlLoader;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Main configuration file name
pub const CONFIG_FILE: &str = "configuration.yaml";

/// Root of `configuration.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub http: HttpConfig,
    pub config_manager: FlowSettings,
    pub nest: Option<NestConfig>,
    pub media_player: Vec<TivoPlatformConfig>,
}

/// `http:` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub server_host: String,
    pub server_port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 8123,
        }
    }
}

impl HttpConfig {
    /// Address the API server binds to
    ///
    /// `server_host` may be an IPv4 or IPv6 address or a host name.
    pub fn bind_address(&self) -> ConfigResult<SocketAddr> {
        let invalid = |reason: String| ConfigError::InvalidValue {
            key: "http.server_host".to_string(),
            reason,
        };

        if let Ok(ip) = self.server_host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.server_port));
        }
        (self.server_host.as_str(), self.server_port)
            .to_socket_addrs()
            .map_err(|e| invalid(e.to_string()))?
            .next()
            .ok_or_else(|| invalid(format!("{} has no address", self.server_host)))
    }
}

/// `config_manager:` section, tuning of the flow engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSettings {
    /// Seconds an untouched flow survives; 0 keeps flows forever
    pub flow_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// Steps that cannot be requested when starting a flow over the API
    pub reserved_steps: Vec<String>,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            flow_ttl_secs: 3600,
            sweep_interval_secs: 60,
            reserved_steps: vec!["discovery".to_string()],
        }
    }
}

impl FlowSettings {
    pub fn flow_ttl(&self) -> Option<Duration> {
        (self.flow_ttl_secs > 0).then(|| Duration::from_secs(self.flow_ttl_secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// `nest:` section, OAuth client credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// One entry of the `media_player:` list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TivoPlatformConfig {
    pub platform: String,
    pub host: String,
    #[serde(default = "default_tivo_name")]
    pub name: String,
    #[serde(default = "default_tivo_port")]
    pub port: u16,
    /// Socket timeout in milliseconds
    #[serde(default = "default_tivo_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub mac: Option<String>,
}

fn default_tivo_name() -> String {
    "TiVo Remote".to_string()
}

fn default_tivo_port() -> u16 {
    31339
}

fn default_tivo_timeout() -> u64 {
    100
}

impl TivoPlatformConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            platform: "tivo".to_string(),
            host: host.into(),
            name: default_tivo_name(),
            port: default_tivo_port(),
            timeout: default_tivo_timeout(),
            mac: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }
}

impl HubConfig {
    /// Load `configuration.yaml` from the config directory
    ///
    /// A missing file yields the default configuration.
    pub fn load(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_dir = config_dir.as_ref();
        let path = config_dir.join(CONFIG_FILE);

        if !path.exists() {
            warn!("No {} in {:?}, using defaults", CONFIG_FILE, config_dir);
            return Ok(Self::default());
        }

        let value = YamlLoader::new(config_dir)?.load_file(&path)?;
        let config = Self::from_value(value)?;
        info!(
            "Loaded configuration: {} media player platform(s), nest {}",
            config.media_player.len(),
            if config.nest.is_some() { "configured" } else { "not configured" }
        );
        Ok(config)
    }

    /// Build from an already resolved YAML value
    pub fn from_value(value: serde_yaml::Value) -> ConfigResult<Self> {
        // An empty file parses as null
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_yaml::from_value(value).map_err(|e| ConfigError::InvalidValue {
            key: CONFIG_FILE.to_string(),
            reason: e.to_string(),
        })
    }

    /// Media player entries using the `tivo` platform
    pub fn tivo_platforms(&self) -> impl Iterator<Item = &TivoPlatformConfig> {
        self.media_player.iter().filter(|p| p.platform == "tivo")
    }
}
