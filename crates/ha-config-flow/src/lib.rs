//! Config Flows
//!
//! This crate provides the configuration flow engine: resumable, multi-step
//! setup wizards that integrations register and the frontend drives.
//!
//! # Key Types
//!
//! - [`ConfigFlowHandler`] - Integration-supplied steps of a flow
//! - [`StepResult`] - Outcome of a step: form, entry or abort
//! - [`HandlerRegistry`] - Domain → handler factory mapping
//! - [`FlowManager`] - Creates, resumes and retires flows
//!
//! # Lifecycle
//!
//! ```text
//! Created → init → Form         → AwaitingInput(step) → configure → ...
//!                ↘ CreateEntry → Done (retired, entry handed to the sink)
//!                ↘ Abort       → Done (retired)
//! ```

pub mod entry;
pub mod error;
pub mod handler;
pub mod manager;
pub mod registry;
pub mod result;
pub mod schema;

pub use entry::{EntrySink, FlowEntry, FlowSource};
pub use error::{FlowError, FlowResult};
pub use handler::{ConfigFlowHandler, UserInput, STEP_INIT};
pub use manager::{spawn_expiry_sweep, FlowManager, FlowManagerConfig, FlowOutcome, FlowProgress};
pub use registry::{HandlerFactory, HandlerRegistry};
pub use result::StepResult;
pub use schema::{DataSchema, FieldType, SchemaError, SchemaField};

/// Step names clients may never address directly
pub const DEFAULT_RESERVED_STEPS: &[&str] = &["discovery"];
