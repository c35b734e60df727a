//! Cancellation responses (`PORX_IN050101UK31`).
//!
//! The response code says what happened to the cancelled item. Codes that
//! mean the request itself failed become an OperationOutcome; the rest become
//! a message Bundle describing the item's new status.

use async_trait::async_trait;
use eps_xml::Element;
use serde_json::{json, Value};

use super::{ResponseHandler, CANCEL_RESPONSE};
use crate::fhir::{self, attribute_at, identifier, reference, resource_id, timestamp};
use crate::message::SpineMessage;
use crate::translated::{coding, issue, operation_outcome, TranslatedResponse};

pub const STATUS_HISTORY_EXTENSION: &str =
    "https://fhir.nhs.uk/R4/StructureDefinition/Extension-DM-PrescriptionStatusHistory";
pub const STATUS_HISTORY_SYSTEM: &str = "https://fhir.nhs.uk/CodeSystem/medicationrequest-status-history";

/// What a cancellation response code means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancellationOutcome {
    /// `R-xxxx` status-history code.
    pub status_code: String,
    pub display: String,
    pub medication_request_status: &'static str,
    /// HTTP status and issue code when the outcome is an error.
    pub failure: Option<(u16, &'static str)>,
}

impl CancellationOutcome {
    /// `None` for codes Spine is not known to send.
    pub fn from_response_code(code: &str, display_name: &str) -> Option<Self> {
        let (display, status, failure) = match code {
            "0001" => ("Prescription/item was cancelled", "cancelled", None),
            "0002" => ("Prescription/item was not cancelled – With dispenser", "active", None),
            "0003" => ("Prescription item was not cancelled – With dispenser active", "active", None),
            "0004" => ("Prescription/item was not cancelled – Dispensed to Patient", "completed", None),
            "0005" => ("Prescription item had expired", "stopped", None),
            "0006" => ("Prescription/item had already been cancelled", "cancelled", None),
            "0007" => ("Prescription/item cancellation requested by another prescriber", "unknown", None),
            "0008" => ("Prescription/item not found", "unknown", Some((404, "not-found"))),
            "0009" => ("Cancellation functionality disabled in Spine", "active", None),
            "0010" => ("Prescription/item was not cancelled. Prescription has been not dispensed", "active", None),
            "5000" => {
                let extra = display_name.split('-').nth(1).unwrap_or_default();
                return Some(Self {
                    status_code: "R-5000".to_string(),
                    display: format!("Unable to process message.{extra}"),
                    medication_request_status: "unknown",
                    failure: Some((500, "exception")),
                });
            }
            "5888" => ("Invalid message", "unknown", Some((400, "invalid"))),
            _ => return None,
        };
        Some(Self {
            status_code: format!("R-{code}"),
            display: display.to_string(),
            medication_request_status: status,
            failure,
        })
    }

    fn coding(&self) -> Value {
        coding(STATUS_HISTORY_SYSTEM, &self.status_code, &self.display)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CancellationHandler;

#[async_trait]
impl ResponseHandler for CancellationHandler {
    fn interaction_id(&self) -> &str {
        CANCEL_RESPONSE
    }

    async fn handle(&self, message: &SpineMessage) -> TranslatedResponse {
        let Ok(response) = message.require("ControlActEvent/subject/CancellationResponse") else {
            tracing::error!("Cancellation response has no CancellationResponse");
            return TranslatedResponse::server_error();
        };

        let code = attribute_at(response, "pertinentInformation3/pertinentResponse/value", "code").unwrap_or_default();
        let display_name =
            attribute_at(response, "pertinentInformation3/pertinentResponse/value", "displayName").unwrap_or_default();

        let Some(outcome) = CancellationOutcome::from_response_code(code, display_name) else {
            tracing::error!(response_code = code, "Unknown cancellation response code");
            return TranslatedResponse::server_error();
        };
        tracing::info!(response_code = code, status = %outcome.status_code, "Translated cancellation response");

        match outcome.failure {
            Some((status_code, issue_code)) => TranslatedResponse::new(
                status_code,
                operation_outcome(vec![issue("error", issue_code, Some(outcome.coding()))]),
            ),
            None => match cancellation_bundle(response, &outcome) {
                Some(bundle) => TranslatedResponse::new(200, bundle),
                None => {
                    tracing::error!("Cancellation response is missing identifiers");
                    TranslatedResponse::server_error()
                }
            },
        }
    }
}

fn cancellation_bundle(response: &Element, outcome: &CancellationOutcome) -> Option<Value> {
    let response_id = attribute_at(response, "id", "root")?;
    let effective_time = timestamp(attribute_at(response, "effectiveTime", "value")?);
    let patient = fhir::patient(response.find("recordTarget/Patient")?)?;
    let patient_id = patient["id"].as_str()?.to_string();

    let mut medication_request = json!({
        "resourceType": "MedicationRequest",
        "id": resource_id(),
        "extension": [{
            "url": STATUS_HISTORY_EXTENSION,
            "extension": [
                { "url": "status", "valueCoding": outcome.coding() },
                { "url": "statusDate", "valueDateTime": effective_time }
            ]
        }],
        "identifier": [identifier(
            fhir::PRESCRIPTION_ORDER_ITEM_NUMBER,
            &attribute_at(response, "pertinentInformation1/pertinentLineItemRef/id", "root")?.to_lowercase(),
        )],
        "status": outcome.medication_request_status,
        "intent": "order",
        "medicationCodeableConcept": {
            "coding": [{ "system": fhir::SNOMED, "code": "763158003", "display": "Medicinal product" }]
        },
        "subject": reference(&patient_id),
        "authoredOn": effective_time,
        "groupIdentifier": identifier(
            fhir::PRESCRIPTION_ORDER_NUMBER,
            attribute_at(response, "pertinentInformation2/pertinentPrescriptionID/value", "extension")?,
        )
    });
    if let Some(role_profile) = attribute_at(response, "author/AgentPerson/id", "extension") {
        medication_request["requester"] = json!({ "identifier": identifier(fhir::SDS_ROLE_PROFILE_ID, role_profile) });
    }
    let medication_request_id = medication_request["id"].as_str()?.to_string();

    let cancel_request_id = attribute_at(response, "pertinentInformation4/pertinentCancellationRequestRef/id", "root");
    let header = fhir::message_header(
        "prescription-order-response",
        "Prescription Order Response",
        &[patient_id.as_str(), medication_request_id.as_str()],
        cancel_request_id,
    );

    let mut bundle = fhir::bundle_of_type("message", response_id, vec![header, patient, medication_request]);
    bundle["timestamp"] = json!(effective_time);
    Some(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_have_failures() {
        let not_found = CancellationOutcome::from_response_code("0008", "").unwrap();
        assert_eq!(not_found.failure, Some((404, "not-found")));
        let invalid = CancellationOutcome::from_response_code("5888", "").unwrap();
        assert_eq!(invalid.failure, Some((400, "invalid")));
        assert!(CancellationOutcome::from_response_code("0001", "").unwrap().failure.is_none());
    }

    #[test]
    fn status_mapping() {
        let status = |code| CancellationOutcome::from_response_code(code, "").unwrap().medication_request_status;
        assert_eq!(status("0001"), "cancelled");
        assert_eq!(status("0006"), "cancelled");
        assert_eq!(status("0002"), "active");
        assert_eq!(status("0004"), "completed");
        assert_eq!(status("0005"), "stopped");
        assert_eq!(status("0007"), "unknown");
    }

    #[test]
    fn unable_to_process_keeps_spine_detail() {
        let outcome = CancellationOutcome::from_response_code("5000", "Unable to process message - missing author").unwrap();
        assert_eq!(outcome.display, "Unable to process message. missing author");
        assert_eq!(outcome.status_code, "R-5000");
        assert_eq!(outcome.failure, Some((500, "exception")));
    }

    #[test]
    fn unable_to_process_keeps_only_the_first_detail_segment() {
        let outcome =
            CancellationOutcome::from_response_code("5000", "Unable to process message - missing author - retry").unwrap();
        assert_eq!(outcome.display, "Unable to process message. missing author ");
    }

    #[test]
    fn unknown_code_is_none() {
        assert!(CancellationOutcome::from_response_code("9999", "").is_none());
    }
}
