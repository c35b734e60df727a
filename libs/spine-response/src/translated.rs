//! The result of translating a Spine response: an HTTP status and a FHIR
//! resource body.

use serde::Serialize;
use serde_json::{json, Value};

pub const SPINE_ERROR_OR_WARNING_CODE: &str = "https://fhir.nhs.uk/R4/CodeSystem/Spine-ErrorOrWarningCode";
const HTTP_ERROR_CODES: &str = "https://fhir.nhs.uk/R4/CodeSystem/http-error-codes";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslatedResponse {
    pub status_code: u16,
    pub body: Value,
}

impl TranslatedResponse {
    pub fn new(status_code: u16, body: Value) -> Self {
        Self { status_code, body }
    }

    /// Fixed response for anything that could not be translated.
    pub fn server_error() -> Self {
        Self::new(
            500,
            operation_outcome(vec![issue(
                "error",
                "exception",
                Some(coding(
                    HTTP_ERROR_CODES,
                    "SERVER_ERROR",
                    "500: The Server has encountered an error processing the request.",
                )),
            )]),
        )
    }

    pub fn bad_gateway(diagnostics: impl Into<String>) -> Self {
        let mut problem = issue(
            "error",
            "transient",
            Some(coding(HTTP_ERROR_CODES, "BAD_GATEWAY", "502: Spine could not be reached.")),
        );
        problem["diagnostics"] = Value::String(diagnostics.into());
        Self::new(502, operation_outcome(vec![problem]))
    }

    pub fn resource_type(&self) -> Option<&str> {
        self.body.get("resourceType").and_then(Value::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

pub fn operation_outcome(issues: Vec<Value>) -> Value {
    json!({
        "resourceType": "OperationOutcome",
        "issue": issues
    })
}

pub fn issue(severity: &str, code: &str, details: Option<Value>) -> Value {
    let mut issue = json!({
        "severity": severity,
        "code": code
    });
    if let Some(coding) = details {
        issue["details"] = json!({ "coding": [coding] });
    }
    issue
}

pub fn coding(system: &str, code: &str, display: &str) -> Value {
    json!({
        "system": system,
        "code": code,
        "display": display
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_is_an_operation_outcome() {
        let response = TranslatedResponse::server_error();
        assert_eq!(response.status_code, 500);
        assert_eq!(response.resource_type(), Some("OperationOutcome"));
        assert_eq!(response.body["issue"][0]["details"]["coding"][0]["code"], "SERVER_ERROR");
        assert!(!response.is_success());
    }

    #[test]
    fn issue_without_details_has_no_details_key() {
        let issue = issue("information", "informational", None);
        assert!(issue.get("details").is_none());
    }
}
