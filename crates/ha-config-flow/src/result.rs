//! Step results
//!
//! Every step of a flow returns one of three outcomes: show another form,
//! finish with a configuration entry, or abort.

use std::collections::HashMap;

use crate::handler::UserInput;
use crate::schema::DataSchema;

/// Outcome of invoking a flow step
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// The flow needs more input; `step_id` is the step the input goes to
    Form {
        step_id: String,
        title: Option<String>,
        description: Option<String>,
        data_schema: Option<DataSchema>,
        /// Field name (or "base") → error key from the previous submission
        errors: Option<HashMap<String, String>>,
    },
    /// The flow finished; `data` becomes the configuration entry
    CreateEntry { title: String, data: UserInput },
    /// The flow finished without an entry
    Abort { reason: String },
}

impl StepResult {
    /// Show a form that resumes at `step_id`
    pub fn form(step_id: impl Into<String>) -> Self {
        StepResult::Form {
            step_id: step_id.into(),
            title: None,
            description: None,
            data_schema: None,
            errors: None,
        }
    }

    /// Finish the flow with an entry
    pub fn create_entry(title: impl Into<String>, data: UserInput) -> Self {
        StepResult::CreateEntry {
            title: title.into(),
            data,
        }
    }

    /// Finish the flow without an entry
    pub fn abort(reason: impl Into<String>) -> Self {
        StepResult::Abort {
            reason: reason.into(),
        }
    }

    /// Set the form title
    pub fn with_title(mut self, value: impl Into<String>) -> Self {
        if let StepResult::Form { ref mut title, .. } = self {
            *title = Some(value.into());
        }
        self
    }

    /// Set the form description (markdown)
    pub fn with_description(mut self, value: impl Into<String>) -> Self {
        if let StepResult::Form {
            ref mut description,
            ..
        } = self
        {
            *description = Some(value.into());
        }
        self
    }

    /// Set the form schema
    pub fn with_schema(mut self, schema: DataSchema) -> Self {
        if let StepResult::Form {
            ref mut data_schema,
            ..
        } = self
        {
            *data_schema = Some(schema);
        }
        self
    }

    /// Attach errors from the previous submission
    pub fn with_errors<K, V>(mut self, values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        if let StepResult::Form { ref mut errors, .. } = self {
            *errors = Some(
                values
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            );
        }
        self
    }

    /// Wire name of the result type
    pub fn type_name(&self) -> &'static str {
        match self {
            StepResult::Form { .. } => "form",
            StepResult::CreateEntry { .. } => "create_entry",
            StepResult::Abort { .. } => "abort",
        }
    }

    /// Whether the flow ends with this result
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepResult::Form { .. })
    }

    /// Next step for a form result
    pub fn next_step(&self) -> Option<&str> {
        match self {
            StepResult::Form { step_id, .. } => Some(step_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;

    #[test]
    fn test_form_builders() {
        let result = StepResult::form("account")
            .with_title("Account")
            .with_schema(DataSchema::new().required("user_title", FieldType::String))
            .with_errors([("base", "invalid_auth")]);

        match result {
            StepResult::Form {
                step_id,
                title,
                data_schema,
                errors,
                description,
            } => {
                assert_eq!(step_id, "account");
                assert_eq!(title.as_deref(), Some("Account"));
                assert!(description.is_none());
                assert_eq!(data_schema.unwrap().fields().len(), 1);
                assert_eq!(errors.unwrap()["base"], "invalid_auth");
            }
            other => panic!("expected form, got {:?}", other),
        }
    }

    #[test]
    fn test_builders_ignore_terminal_results() {
        let result = StepResult::abort("bla").with_title("ignored");
        assert_eq!(result, StepResult::abort("bla"));
    }

    #[test]
    fn test_terminal() {
        assert!(!StepResult::form("init").is_terminal());
        assert!(StepResult::abort("bla").is_terminal());
        assert!(StepResult::create_entry("T", UserInput::new()).is_terminal());
        assert_eq!(StepResult::form("init").next_step(), Some("init"));
        assert_eq!(StepResult::abort("bla").type_name(), "abort");
    }
}
