//! Config manager views
//!
//! HTTP endpoints that drive config flows:
//! - `POST /api/config/config_manager/flow` - start a flow, or continue one when the body has a `flow_id`
//! - `POST /api/config/config_manager/flow/:flow_id` - continue a flow, the body is the user input
//! - `GET /api/config/config_manager/flow` - list flows in progress
//! - `DELETE /api/config/config_manager/flow/:flow_id` - abort a flow

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use ha_config_flow::{FlowOutcome, FlowProgress, StepResult};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::error::ApiError;
use crate::validation::{validate_body, FlowRequest, ValidationError};
use crate::AppState;

/// Step result as sent to the frontend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowResponse {
    pub flow_id: String,
    #[serde(rename = "type")]
    pub result_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Field list of the form, empty when the form takes no input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_schema: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<FlowOutcome> for FlowResponse {
    fn from(outcome: FlowOutcome) -> Self {
        let mut response = FlowResponse {
            flow_id: outcome.flow_id,
            result_type: outcome.result.type_name(),
            step_id: None,
            title: None,
            description: None,
            data_schema: None,
            errors: None,
            reason: None,
        };

        match outcome.result {
            StepResult::Form {
                step_id,
                title,
                description,
                data_schema,
                errors,
            } => {
                response.step_id = Some(step_id);
                response.title = title;
                response.description = description;
                response.data_schema = Some(
                    data_schema
                        .map(|schema| schema.to_field_list())
                        .unwrap_or_default(),
                );
                response.errors = errors;
            }
            // Entry data goes to the entry store, not back to the client
            StepResult::CreateEntry { title, .. } => response.title = Some(title),
            StepResult::Abort { reason } => response.reason = Some(reason),
        }

        response
    }
}

/// POST /api/config/config_manager/flow
pub async fn create_flow(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<FlowResponse>, ApiError> {
    let request = FlowRequest::from_body(&body)?;
    let manager = &state.flow_manager;

    let outcome = match request.flow_id {
        Some(flow_id) => {
            info!("HTTP POST continue config flow: {}", flow_id);
            if let Some(step_id) = request.step_id.as_deref() {
                manager
                    .check_step_access(step_id)
                    .map_err(ApiError::Progress)?;
            }
            manager
                .async_configure(&flow_id, request.user_input)
                .await
                .map_err(ApiError::Progress)?
        }
        None => {
            let domain = request
                .domain
                .ok_or(ValidationError::MissingField("domain"))?;
            info!("HTTP POST start config flow for handler: {}", domain);
            manager
                .async_init(&domain, request.step_id.as_deref())
                .await
                .map_err(ApiError::Create)?
        }
    };

    Ok(Json(outcome.into()))
}

/// POST /api/config/config_manager/flow/:flow_id
pub async fn progress_flow(
    State(state): State<AppState>,
    Path(flow_id): Path<String>,
    body: Bytes,
) -> Result<Json<FlowResponse>, ApiError> {
    info!("HTTP POST progress config flow: {}", flow_id);
    let user_input = validate_body(&body, true)?;

    let outcome = state
        .flow_manager
        .async_configure(&flow_id, user_input)
        .await
        .map_err(ApiError::Progress)?;

    Ok(Json(outcome.into()))
}

/// GET /api/config/config_manager/flow
pub async fn list_flows(State(state): State<AppState>) -> Json<Vec<FlowProgress>> {
    Json(state.flow_manager.async_progress())
}

/// DELETE /api/config/config_manager/flow/:flow_id
pub async fn abort_flow(
    State(state): State<AppState>,
    Path(flow_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    info!("HTTP DELETE config flow: {}", flow_id);
    state
        .flow_manager
        .async_abort(&flow_id)
        .await
        .map_err(ApiError::Progress)?;

    Ok(Json(serde_json::json!({ "message": "Flow aborted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_config_flow::{DataSchema, FieldType, UserInput};
    use serde_json::json;

    fn outcome(result: StepResult) -> FlowOutcome {
        FlowOutcome {
            flow_id: "flow1".to_string(),
            handler: "test".to_string(),
            result,
        }
    }

    #[test]
    fn test_form_without_schema_has_empty_field_list() {
        let response = FlowResponse::from(outcome(StepResult::form("init").with_title("test-title")));

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "flow_id": "flow1",
                "type": "form",
                "step_id": "init",
                "title": "test-title",
                "data_schema": []
            })
        );
    }

    #[test]
    fn test_form_with_schema_and_errors() {
        let schema = DataSchema::new().required("auth_code", FieldType::String);
        let result = StepResult::form("authorize")
            .with_schema(schema)
            .with_errors([("base", "invalid_code")]);

        let value = serde_json::to_value(FlowResponse::from(outcome(result))).unwrap();

        assert_eq!(
            value["data_schema"],
            json!([{"name": "auth_code", "type": "string", "required": true}])
        );
        assert_eq!(value["errors"], json!({"base": "invalid_code"}));
    }

    #[test]
    fn test_create_entry_hides_data() {
        let mut data = UserInput::new();
        data.insert("secret".to_string(), json!("account_token"));

        let response = FlowResponse::from(outcome(StepResult::create_entry("Test Entry", data)));

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"flow_id": "flow1", "type": "create_entry", "title": "Test Entry"})
        );
    }

    #[test]
    fn test_abort() {
        let response = FlowResponse::from(outcome(StepResult::abort("bla")));

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"flow_id": "flow1", "type": "abort", "reason": "bla"})
        );
    }
}
