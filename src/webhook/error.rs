//! # Validation Errors
//!
//! Field errors aggregated into one structured error, rendered the way the
//! API server reports invalid objects.

use serde::Serialize;
use thiserror::Error;

/// A single invalid field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{path}: Invalid value: \"{value}\": {detail}")]
pub struct FieldError {
    /// JSON path of the field, e.g. `spec.source`
    pub path: String,
    /// Name of the offending object
    pub value: String,
    pub detail: String,
}

impl FieldError {
    pub fn new(path: &str, value: &str, detail: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            value: value.to_string(),
            detail: detail.into(),
        }
    }
}

/// All field errors found on one Subscription
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Subscription.eventing.octopilot.io \"{name}\" is invalid: {}", join_field_errors(.errors))]
pub struct ValidationError {
    pub name: String,
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    #[must_use]
    pub fn new(name: String, errors: Vec<FieldError>) -> Self {
        Self { name, errors }
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Status body returned to the API server when admission is denied
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionStatus {
    pub status: &'static str,
    pub message: String,
    pub reason: &'static str,
    pub code: u16,
    pub details: AdmissionDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdmissionDetails {
    pub name: String,
    pub group: &'static str,
    pub kind: &'static str,
    pub causes: Vec<AdmissionCause>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdmissionCause {
    pub reason: &'static str,
    pub message: String,
    pub field: String,
}

/// Convert a validation error into the structured status surfaced to the caller
#[must_use]
pub fn to_admission_status(err: &ValidationError) -> AdmissionStatus {
    AdmissionStatus {
        status: "Failure",
        message: err.to_string(),
        reason: "Invalid",
        code: 422,
        details: AdmissionDetails {
            name: err.name.clone(),
            group: "eventing.octopilot.io",
            kind: "Subscription",
            causes: err
                .errors
                .iter()
                .map(|e| AdmissionCause {
                    reason: "FieldValueInvalid",
                    message: format!("Invalid value: \"{}\": {}", e.value, e.detail),
                    field: e.path.clone(),
                })
                .collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_joins_field_errors() {
        let err = ValidationError::new(
            "sub".to_string(),
            vec![
                FieldError::new("spec.source", "sub", "must not be empty"),
                FieldError::new("spec.types", "sub", "must not be empty"),
            ],
        );
        assert_eq!(
            err.to_string(),
            "Subscription.eventing.octopilot.io \"sub\" is invalid: \
             spec.source: Invalid value: \"sub\": must not be empty, \
             spec.types: Invalid value: \"sub\": must not be empty"
        );
    }

    #[test]
    fn test_validation_error_is_a_std_error() {
        let err = ValidationError::new(
            "sub".to_string(),
            vec![FieldError::new("spec.types", "sub", "must not be empty")],
        );
        let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(err.clone());
        assert_eq!(boxed.to_string(), err.to_string());
        assert_eq!(
            err.errors[0].to_string(),
            "spec.types: Invalid value: \"sub\": must not be empty"
        );
        let wrapped = anyhow::Error::new(err).context("admission denied");
        assert_eq!(wrapped.to_string(), "admission denied");
        assert!(wrapped.root_cause().to_string().ends_with("must not be empty"));
    }

    #[test]
    fn test_admission_status_lists_every_cause() {
        let err = ValidationError::new(
            "sub".to_string(),
            vec![FieldError::new("spec.sink", "sub", "must not be empty")],
        );
        let status = serde_json::to_value(to_admission_status(&err)).unwrap();
        assert_eq!(status["code"], 422);
        assert_eq!(status["details"]["causes"][0]["field"], "spec.sink");
    }
}
