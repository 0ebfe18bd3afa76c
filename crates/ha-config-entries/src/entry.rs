//! Config Entry types
//!
//! A ConfigEntry represents a single configured instance of an integration.

use chrono::{DateTime, Utc};
use ha_config_flow::{FlowEntry, FlowSource, UserInput};
use serde::{Deserialize, Serialize};

/// Source of the config entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntrySource {
    /// Configured via UI/API
    #[default]
    User,
    /// Found by discovery
    Discovery,
    /// Imported from YAML config
    Import,
}

impl From<FlowSource> for ConfigEntrySource {
    fn from(source: FlowSource) -> Self {
        match source {
            FlowSource::User => ConfigEntrySource::User,
            FlowSource::Discovery => ConfigEntrySource::Discovery,
            FlowSource::Import => ConfigEntrySource::Import,
        }
    }
}

/// A configuration entry for an integration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Unique identifier (ULID)
    pub entry_id: String,

    /// Integration domain (e.g., "nest")
    pub domain: String,

    /// Human-readable display name
    pub title: String,

    /// Configuration data produced by the flow
    #[serde(default)]
    pub data: UserInput,

    /// Schema version of `data`
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub source: ConfigEntrySource,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

impl ConfigEntry {
    /// Create a new config entry
    pub fn new(domain: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            entry_id: ulid::Ulid::new().to_string(),
            domain: domain.into(),
            title: title.into(),
            data: UserInput::new(),
            version: 1,
            source: ConfigEntrySource::User,
            created_at: now,
            modified_at: now,
        }
    }

    /// Set entry data
    pub fn with_data(mut self, data: UserInput) -> Self {
        self.data = data;
        self
    }

    /// Set source
    pub fn with_source(mut self, source: ConfigEntrySource) -> Self {
        self.source = source;
        self
    }

    /// Set version
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }
}

impl From<FlowEntry> for ConfigEntry {
    fn from(entry: FlowEntry) -> Self {
        ConfigEntry::new(entry.handler, entry.title)
            .with_data(entry.data)
            .with_version(entry.version)
            .with_source(entry.source.into())
    }
}
