//! Declarative form schemas
//!
//! A [`DataSchema`] describes the fields a form step expects. The engine
//! treats it as opaque; handlers use it to validate their input and the
//! HTTP layer turns it into the field list the frontend renders.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::handler::UserInput;

/// Primitive type of a form field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
}

impl FieldType {
    /// Wire name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            // Integers are valid floats
            FieldType::Float => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
        }
    }
}

/// A single field of a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Schema validation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("required key not provided: {0}")]
    MissingField(String),

    #[error("expected {expected} for {field}")]
    InvalidType {
        field: String,
        expected: &'static str,
    },

    #[error("extra keys not allowed: {0}")]
    UnexpectedField(String),
}

/// Ordered list of form fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSchema {
    fields: Vec<SchemaField>,
}

impl DataSchema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required field
    pub fn required(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(SchemaField {
            name: name.into(),
            field_type,
            required: true,
            default: None,
        });
        self
    }

    /// Add an optional field
    pub fn optional(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(SchemaField {
            name: name.into(),
            field_type,
            required: false,
            default: None,
        });
        self
    }

    /// Add an optional field that falls back to `default` when absent
    pub fn optional_with_default(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        default: Value,
    ) -> Self {
        self.fields.push(SchemaField {
            name: name.into(),
            field_type,
            required: false,
            default: Some(default),
        });
        self
    }

    /// Fields in declaration order
    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    /// Get a field by name
    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Convert into the JSON field list sent to the frontend
    pub fn to_field_list(&self) -> Vec<Value> {
        self.fields
            .iter()
            .map(|field| {
                let mut item = json!({
                    "name": field.name,
                    "type": field.field_type.as_str(),
                    "required": field.required,
                });
                if let Some(ref default) = field.default {
                    item["default"] = default.clone();
                }
                item
            })
            .collect()
    }

    /// Validate user input, returning it with defaults filled in
    pub fn validate(&self, input: &UserInput) -> Result<UserInput, SchemaError> {
        if let Some(key) = input.keys().find(|key| self.field(key).is_none()) {
            return Err(SchemaError::UnexpectedField(key.clone()));
        }

        let mut validated = UserInput::new();
        for field in &self.fields {
            match input.get(&field.name) {
                Some(value) if field.field_type.accepts(value) => {
                    validated.insert(field.name.clone(), value.clone());
                }
                Some(_) => {
                    return Err(SchemaError::InvalidType {
                        field: field.name.clone(),
                        expected: field.field_type.as_str(),
                    });
                }
                None if field.required => {
                    return Err(SchemaError::MissingField(field.name.clone()));
                }
                None => {
                    if let Some(ref default) = field.default {
                        validated.insert(field.name.clone(), default.clone());
                    }
                }
            }
        }

        Ok(validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(value: Value) -> UserInput {
        value.as_object().cloned().unwrap()
    }

    fn credentials_schema() -> DataSchema {
        DataSchema::new()
            .required("client_id", FieldType::String)
            .required("client_secret", FieldType::String)
            .optional_with_default("port", FieldType::Integer, json!(31339))
    }

    #[test]
    fn test_field_list() {
        let list = credentials_schema().to_field_list();

        assert_eq!(list.len(), 3);
        assert_eq!(
            list[0],
            json!({"name": "client_id", "type": "string", "required": true})
        );
        assert_eq!(list[2]["default"], json!(31339));
        assert_eq!(list[2]["required"], json!(false));
    }

    #[test]
    fn test_validate_fills_defaults() {
        let validated = credentials_schema()
            .validate(&input(json!({"client_id": "id", "client_secret": "secret"})))
            .unwrap();

        assert_eq!(validated["port"], json!(31339));
        assert_eq!(validated["client_id"], json!("id"));
    }

    #[test]
    fn test_validate_missing_field() {
        let result = credentials_schema().validate(&input(json!({"client_id": "id"})));

        assert_eq!(
            result,
            Err(SchemaError::MissingField("client_secret".to_string()))
        );
    }

    #[test]
    fn test_validate_wrong_type() {
        let result = credentials_schema().validate(&input(
            json!({"client_id": "id", "client_secret": "secret", "port": "high"}),
        ));

        assert!(matches!(result, Err(SchemaError::InvalidType { .. })));
    }

    #[test]
    fn test_validate_rejects_extra_keys() {
        let result = credentials_schema().validate(&input(
            json!({"client_id": "id", "client_secret": "secret", "pin": "1234"}),
        ));

        assert_eq!(result, Err(SchemaError::UnexpectedField("pin".to_string())));
    }

    #[test]
    fn test_float_accepts_integer() {
        let schema = DataSchema::new().required("temperature", FieldType::Float);

        assert!(schema.validate(&input(json!({"temperature": 21}))).is_ok());
        assert!(schema.validate(&input(json!({"temperature": 21.5}))).is_ok());
    }
}
