//! API error responses
//!
//! The only place flow errors are translated to HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ha_config_flow::FlowError;
use serde_json::json;
use tracing::{error, warn};

use crate::validation::ValidationError;

/// Error returned by the config manager views
#[derive(Debug)]
pub enum ApiError {
    /// The request body failed validation
    Validation(ValidationError),
    /// Starting a flow failed
    Create(FlowError),
    /// Continuing or aborting a flow failed
    Progress(FlowError),
}

impl ApiError {
    /// Status code and `message` body for this error
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::Validation(err) => (
                StatusCode::BAD_REQUEST,
                format!("Message format incorrect: {}", err),
            ),
            ApiError::Create(err) => match err {
                FlowError::UnknownHandler(_) => {
                    (StatusCode::NOT_FOUND, "Invalid handler specified".into())
                }
                FlowError::UnknownStep { .. } => (
                    StatusCode::BAD_REQUEST,
                    "Handler does not support init".into(),
                ),
                other => flow_error(other),
            },
            ApiError::Progress(err) => match err {
                FlowError::UnknownStep { .. } => {
                    (StatusCode::BAD_REQUEST, "Invalid step specified".into())
                }
                other => flow_error(other),
            },
        }
    }
}

fn flow_error(err: &FlowError) -> (StatusCode, String) {
    match err {
        FlowError::UnknownHandler(_) => (StatusCode::NOT_FOUND, "Invalid handler specified".into()),
        FlowError::UnknownFlow(_) => (StatusCode::NOT_FOUND, "Invalid flow specified".into()),
        FlowError::UnknownStep { .. } => (StatusCode::BAD_REQUEST, "Invalid step specified".into()),
        FlowError::ReservedStep(_) => (StatusCode::BAD_REQUEST, "Step not allowed".into()),
        FlowError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "User input malformed".into()),
        FlowError::HandlerAlreadyRegistered(_)
        | FlowError::StepFailed(_)
        | FlowError::EntryStorage(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Config flow failed: {}", err),
        ),
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            error!("Config manager request failed: {:?}", self);
        } else {
            warn!("Config manager request rejected ({}): {}", status, message);
        }
        (status, Json(json!({ "message": message }))).into_response()
    }
}
