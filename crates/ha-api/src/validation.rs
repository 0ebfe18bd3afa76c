//! Request body validation
//!
//! Bodies are checked before any flow call is made. Failures are reported as
//! a [`ValidationError`] which the views turn into a 400.

use ha_config_flow::UserInput;
use serde_json::{Map, Value};
use thiserror::Error;

/// Why a request body was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("request body is empty")]
    EmptyBody,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("expected a JSON object")]
    NotAnObject,

    #[error("required key not provided: {0}")]
    MissingField(&'static str),

    #[error("expected {expected} for {field}")]
    InvalidType {
        field: String,
        expected: &'static str,
    },

    #[error("extra keys not allowed: {0}")]
    UnexpectedField(String),
}

/// Parse a body that must be a JSON object
///
/// With `allow_empty`, an empty body is accepted and yields `None`.
pub fn validate_body(body: &[u8], allow_empty: bool) -> Result<Option<Map<String, Value>>, ValidationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return if allow_empty {
            Ok(None)
        } else {
            Err(ValidationError::EmptyBody)
        };
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(_) => Err(ValidationError::NotAnObject),
        Err(e) => Err(ValidationError::InvalidJson(e.to_string())),
    }
}

/// Body of `POST /api/config/config_manager/flow`
///
/// Without `flow_id` a new flow is started for `domain`. With `flow_id` the
/// flow is continued with `user_input`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowRequest {
    pub domain: Option<String>,
    pub flow_id: Option<String>,
    pub step_id: Option<String>,
    pub user_input: Option<UserInput>,
}

impl FlowRequest {
    pub fn from_body(body: &[u8]) -> Result<Self, ValidationError> {
        let map = validate_body(body, false)?.unwrap_or_default();
        let mut request = FlowRequest::default();

        for (key, value) in map {
            match key.as_str() {
                "domain" => request.domain = optional_string(&key, value)?,
                "flow_id" => request.flow_id = optional_string(&key, value)?,
                "step_id" => request.step_id = optional_string(&key, value)?,
                "user_input" => {
                    request.user_input = match value {
                        Value::Null => None,
                        Value::Object(input) => Some(input),
                        _ => {
                            return Err(ValidationError::InvalidType {
                                field: key,
                                expected: "an object",
                            })
                        }
                    }
                }
                _ => return Err(ValidationError::UnexpectedField(key)),
            }
        }

        if request.flow_id.is_none() && request.domain.is_none() {
            return Err(ValidationError::MissingField("domain"));
        }
        Ok(request)
    }
}

fn optional_string(field: &str, value: Value) -> Result<Option<String>, ValidationError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        _ => Err(ValidationError::InvalidType {
            field: field.to_string(),
            expected: "a string",
        }),
    }
}
