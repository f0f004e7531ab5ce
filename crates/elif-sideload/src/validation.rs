//! Request validation errors for sideloading query parameters

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Individual validation error for a specific query parameter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationError {
    /// The parameter that failed validation
    pub field: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for programmatic handling
    pub code: String,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: "invalid".to_string(),
        }
    }

    /// Create a validation error with a specific code
    pub fn with_code(
        field: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: code.into(),
        }
    }

    /// The requested relation is not declared on the view
    pub fn invalid_choice(field: impl Into<String>, token: &str) -> Self {
        Self::with_code(
            field,
            format!("'{}' is not one of the available choices.", token),
            "invalid_choice",
        )
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Collection of validation errors keyed by parameter name
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ValidationErrors {
    pub errors: BTreeMap<String, Vec<ValidationError>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single validation error
    pub fn add(&mut self, error: ValidationError) {
        self.errors
            .entry(error.field.clone())
            .or_default()
            .push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// All messages recorded for a parameter, in insertion order
    pub fn messages(&self, field: &str) -> Vec<&str> {
        self.errors
            .get(field)
            .map(|errors| errors.iter().map(|e| e.message.as_str()).collect())
            .unwrap_or_default()
    }

    /// Render as the `{ "<param>": ["<message>", ...] }` response body
    pub fn to_json(&self) -> serde_json::Value {
        let body: serde_json::Map<String, serde_json::Value> = self
            .errors
            .iter()
            .map(|(field, errors)| {
                let messages = errors
                    .iter()
                    .map(|e| serde_json::Value::String(e.message.clone()))
                    .collect();
                (field.clone(), serde_json::Value::Array(messages))
            })
            .collect();
        serde_json::Value::Object(body)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return write!(f, "No validation errors");
        }
        write!(f, "Validation failed for {} parameter(s):", self.errors.len())?;
        for (field, field_errors) in &self.errors {
            for error in field_errors {
                write!(f, "\n  {}: {}", field, error.message)?;
            }
        }
        Ok(())
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        let mut errors = Self::new();
        errors.add(error);
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invalid_choice_message() {
        let error = ValidationError::invalid_choice("sideload", "unexisting");
        assert_eq!(error.message, "'unexisting' is not one of the available choices.");
        assert_eq!(error.code, "invalid_choice");
    }

    #[test]
    fn test_to_json_is_keyed_by_parameter() {
        let errors: ValidationErrors =
            ValidationError::invalid_choice("sideload", "unexisting").into();

        assert_eq!(
            errors.to_json(),
            json!({"sideload": ["'unexisting' is not one of the available choices."]})
        );
        assert_eq!(errors.messages("sideload").len(), 1);
        assert!(errors.messages("fields").is_empty());
    }
}
