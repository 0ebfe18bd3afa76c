//! Config flow errors

use thiserror::Error;

use crate::schema::SchemaError;

/// Result type for config flow operations
pub type FlowResult<T> = Result<T, FlowError>;

/// Errors raised by the flow engine and its handlers
///
/// These are scoped to a single operation. None of them leaves a flow
/// half-updated: a failed step keeps the flow at the step it was on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FlowError {
    /// No handler is registered for the domain
    #[error("unknown config flow handler: {0}")]
    UnknownHandler(String),

    /// The flow id does not name a live flow
    #[error("unknown flow: {0}")]
    UnknownFlow(String),

    /// The step is not part of the handler's step table
    #[error("handler {handler} has no step {step_id}")]
    UnknownStep { handler: String, step_id: String },

    /// The step may only be reached through an internal transition
    #[error("step {0} cannot be requested directly")]
    ReservedStep(String),

    /// The handler rejected the supplied user input
    #[error("invalid user input: {0}")]
    InvalidInput(String),

    /// A factory is already registered for the domain
    #[error("config flow handler already registered: {0}")]
    HandlerAlreadyRegistered(String),

    /// The step failed for a reason other than its input
    #[error("step failed: {0}")]
    StepFailed(String),

    /// The finished flow's entry could not be stored
    #[error("failed to store config entry: {0}")]
    EntryStorage(String),
}

impl From<SchemaError> for FlowError {
    fn from(err: SchemaError) -> Self {
        FlowError::InvalidInput(err.to_string())
    }
}
