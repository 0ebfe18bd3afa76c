//! Hand-off of finished flows
//!
//! The flow engine does not store configuration entries itself. When a flow
//! finishes with an entry it passes a [`FlowEntry`] to an [`EntrySink`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FlowResult;
use crate::handler::UserInput;

/// How a flow was started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowSource {
    /// Started by a user from the frontend
    #[default]
    User,
    /// Started by discovery of a device or service
    Discovery,
    /// Started from YAML configuration
    Import,
}

/// Entry produced by a finished flow
#[derive(Debug, Clone, PartialEq)]
pub struct FlowEntry {
    /// Integration domain
    pub handler: String,
    pub title: String,
    pub data: UserInput,
    /// Schema version reported by the handler
    pub version: u32,
    pub source: FlowSource,
}

/// Receiver of finished flow entries
#[async_trait]
pub trait EntrySink: Send + Sync {
    /// Store an entry produced by a finished flow
    async fn async_add_flow_entry(&self, entry: FlowEntry) -> FlowResult<()>;
}
