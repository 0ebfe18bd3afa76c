//! Config Entries
//!
//! This crate stores the configuration entries produced by finished config
//! flows. Entries are persisted in `.storage/core.config_entries` with
//! version tracking.
//!
//! # Key Types
//!
//! - [`ConfigEntry`] - A single integration configuration
//! - [`ConfigEntries`] - Store for all config entries, and the
//!   [`EntrySink`](ha_config_flow::EntrySink) the flow manager hands entries to
//! - [`Storage`] - Versioned JSON files in the `.storage/` directory

pub mod entry;
pub mod manager;
pub mod storage;

pub use entry::{ConfigEntry, ConfigEntrySource};

pub use manager::{
    ConfigEntries, ConfigEntriesData, ConfigEntriesError, ConfigEntriesResult, STORAGE_KEY,
    STORAGE_MINOR_VERSION, STORAGE_VERSION,
};

pub use storage::{Storage, StorageError, StorageFile, StorageResult};
