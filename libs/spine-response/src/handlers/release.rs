//! Release responses (`PORX_IN070101UK31` nominated, `PORX_IN070103UK31`
//! patient).
//!
//! Every released prescription has its signature checked. The caller gets a
//! Parameters resource splitting them into passed and failed; each failure is
//! also handed back to Spine as a dispense proposal return.

use std::sync::Arc;

use async_trait::async_trait;
use eps_signature::SignatureVerifier;
use eps_xml::Element;
use serde_json::{json, Value};

use super::{ResponseHandler, NOMINATED_RELEASE_RESPONSE, PATIENT_RELEASE_RESPONSE};
use crate::dispense_return::{DispenseReturnSender, ReturnRequest};
use crate::fhir::{self, attribute_at, bundle_entry, identifier, reference, resource_id, timestamp};
use crate::message::SpineMessage;
use crate::translated::{issue, operation_outcome, TranslatedResponse};

/// Only components with this template carry a prescription we translate.
pub const SUPPORTED_MESSAGE_TYPE: &str = "PORX_MT122003UK32";

pub struct ReleaseResponseHandler {
    interaction_id: &'static str,
    verifier: Arc<SignatureVerifier>,
    returns: Arc<DispenseReturnSender>,
}

impl ReleaseResponseHandler {
    pub fn new(
        interaction_id: &'static str,
        verifier: Arc<SignatureVerifier>,
        returns: Arc<DispenseReturnSender>,
    ) -> Self {
        Self {
            interaction_id,
            verifier,
            returns,
        }
    }

    pub fn nominated(verifier: Arc<SignatureVerifier>, returns: Arc<DispenseReturnSender>) -> Self {
        Self::new(NOMINATED_RELEASE_RESPONSE, verifier, returns)
    }

    pub fn patient(verifier: Arc<SignatureVerifier>, returns: Arc<DispenseReturnSender>) -> Self {
        Self::new(PATIENT_RELEASE_RESPONSE, verifier, returns)
    }

    /// Sends the return. A failure here is logged and goes no further.
    async fn return_prescription(&self, release_id: &str, prescription: &Element) {
        let Some(prescription_id) = short_form_id(prescription) else {
            tracing::error!(release_id, "Cannot return prescription without a short-form id");
            return;
        };
        let request = ReturnRequest::invalid_signature(release_id, prescription_id);
        match self.returns.send(&request).await {
            Ok(response) => tracing::info!(
                prescription_id,
                status = response.status_code(),
                "Returned prescription with invalid signature"
            ),
            Err(e) => tracing::error!(prescription_id, error = %e, "Failed to return prescription"),
        }
    }
}

impl std::fmt::Debug for ReleaseResponseHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseResponseHandler")
            .field("interaction_id", &self.interaction_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ResponseHandler for ReleaseResponseHandler {
    fn interaction_id(&self) -> &str {
        self.interaction_id
    }

    async fn handle(&self, message: &SpineMessage) -> TranslatedResponse {
        let Ok(release) = message.require("ControlActEvent/subject/PrescriptionReleaseResponse") else {
            tracing::error!("Release response has no PrescriptionReleaseResponse");
            return TranslatedResponse::server_error();
        };
        let (Some(release_id), Some(effective_time)) = (
            attribute_at(release, "id", "root"),
            attribute_at(release, "effectiveTime", "value"),
        ) else {
            tracing::error!("Release response is missing its id or effective time");
            return TranslatedResponse::server_error();
        };
        let release_request_id = attribute_at(release, "inFulfillmentOf/priorDownloadRequestRef/id", "root");

        let mut passed = Vec::new();
        let mut failed = Vec::new();
        for prescription in released_prescriptions(release) {
            let bundle = prescription_bundle(prescription, release_request_id);
            match self.verifier.verify(prescription) {
                Ok(verified) => {
                    tracing::debug!(signer = %verified.signer_subject, "Prescription signature verified");
                    passed.push(bundle.unwrap_or_else(untranslatable));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Released prescription failed signature verification");
                    let mut bundle = bundle.unwrap_or_else(untranslatable);
                    push_entry(&mut bundle, verification_outcome(&e.to_string()));
                    failed.push(bundle);
                    self.return_prescription(release_id, prescription).await;
                }
            }
        }

        tracing::info!(
            interaction_id = self.interaction_id,
            passed = passed.len(),
            failed = failed.len(),
            "Translated release response"
        );

        TranslatedResponse::new(
            200,
            json!({
                "resourceType": "Parameters",
                "parameter": [
                    { "name": "passedPrescriptions", "resource": searchset(release_id, effective_time, passed) },
                    { "name": "failedPrescriptions", "resource": searchset(release_id, effective_time, failed) }
                ]
            }),
        )
    }
}

fn released_prescriptions(release: &Element) -> impl Iterator<Item = &Element> {
    release
        .children_named("component")
        .filter(|component| attribute_at(component, "templateId", "extension") == Some(SUPPORTED_MESSAGE_TYPE))
        .filter_map(|component| component.child("ParentPrescription"))
}

fn short_form_id(prescription: &Element) -> Option<&str> {
    prescription
        .find("pertinentInformation1/pertinentPrescription")?
        .children_named("id")
        .find_map(|id| id.attribute("extension"))
}

fn searchset(release_id: &str, effective_time: &str, bundles: Vec<Value>) -> Value {
    json!({
        "resourceType": "Bundle",
        "id": resource_id(),
        "meta": { "lastUpdated": timestamp(effective_time) },
        "identifier": identifier(fhir::RFC4122, &release_id.to_lowercase()),
        "type": "searchset",
        "total": bundles.len(),
        "entry": bundles.into_iter().map(bundle_entry).collect::<Vec<_>>()
    })
}

/// Message bundle for one ParentPrescription: header, patient, one
/// MedicationRequest per line item.
fn prescription_bundle(prescription: &Element, release_request_id: Option<&str>) -> Option<Value> {
    let prescription_id = attribute_at(prescription, "id", "root")?;
    let patient = fhir::patient(prescription.find("recordTarget/Patient")?)?;
    let patient_id = patient["id"].as_str()?.to_string();

    let pertinent = prescription.find("pertinentInformation1/pertinentPrescription")?;
    let authored_on = attribute_at(pertinent, "author/time", "value").map(timestamp);
    let requester = attribute_at(pertinent, "author/AgentPerson/id", "extension");
    let group_identifier = short_form_id(prescription);

    let medication_requests: Vec<Value> = pertinent
        .find_all("pertinentInformation2/pertinentLineItem")
        .into_iter()
        .filter_map(|line_item| {
            let mut request = json!({
                "resourceType": "MedicationRequest",
                "id": resource_id(),
                "identifier": [identifier(
                    fhir::PRESCRIPTION_ORDER_ITEM_NUMBER,
                    &attribute_at(line_item, "id", "root")?.to_lowercase(),
                )],
                "status": "active",
                "intent": "order",
                "subject": reference(&patient_id)
            });
            if let Some(code) = line_item.find("product/manufacturedProduct/manufacturedRequestedMaterial/code") {
                request["medicationCodeableConcept"] = json!({
                    "coding": [{
                        "system": fhir::SNOMED,
                        "code": code.attribute("code").unwrap_or_default(),
                        "display": code.attribute("displayName").unwrap_or_default()
                    }]
                });
            }
            if let Some(authored_on) = &authored_on {
                request["authoredOn"] = json!(authored_on);
            }
            if let Some(role_profile) = requester {
                request["requester"] = json!({ "identifier": identifier(fhir::SDS_ROLE_PROFILE_ID, role_profile) });
            }
            if let Some(group) = group_identifier {
                request["groupIdentifier"] = identifier(fhir::PRESCRIPTION_ORDER_NUMBER, group);
            }
            Some(request)
        })
        .collect();

    let mut focus = vec![patient_id.clone()];
    focus.extend(
        medication_requests
            .iter()
            .filter_map(|r| r["id"].as_str().map(str::to_string)),
    );
    let focus: Vec<&str> = focus.iter().map(String::as_str).collect();
    let header = fhir::message_header("prescription-order", "Prescription Order", &focus, release_request_id);

    let mut entries = vec![header, patient];
    entries.extend(medication_requests);
    let mut bundle = fhir::bundle_of_type("message", prescription_id, entries);
    if let Some(effective_time) = attribute_at(prescription, "effectiveTime", "value") {
        bundle["meta"] = json!({ "lastUpdated": timestamp(effective_time) });
    }
    Some(bundle)
}

fn untranslatable() -> Value {
    let mut problem = issue("error", "processing", None);
    problem["diagnostics"] = "Released prescription could not be translated".into();
    json!({
        "resourceType": "Bundle",
        "id": resource_id(),
        "type": "message",
        "entry": [bundle_entry(operation_outcome(vec![problem]))]
    })
}

fn verification_outcome(diagnostics: &str) -> Value {
    let mut problem = issue("error", "invalid", None);
    problem["diagnostics"] = format!("Signature is invalid: {diagnostics}").into();
    let mut outcome = operation_outcome(vec![problem]);
    outcome["id"] = json!(resource_id());
    outcome
}

fn push_entry(bundle: &mut Value, resource: Value) {
    if let Some(entries) = bundle["entry"].as_array_mut() {
        entries.push(bundle_entry(resource));
    }
}
