//! FHIR resources built from HL7v3 response content.
//!
//! Only the fields needed to identify the prescription, the patient and each
//! line item are carried across.

use eps_signature::hl7_timestamp_to_rfc3339;
use eps_xml::Element;
use serde_json::{json, Value};
use uuid::Uuid;

pub const RFC4122: &str = "https://tools.ietf.org/html/rfc4122";
pub const NHS_NUMBER: &str = "https://fhir.nhs.uk/Id/nhs-number";
pub const PRESCRIPTION_ORDER_NUMBER: &str = "https://fhir.nhs.uk/Id/prescription-order-number";
pub const PRESCRIPTION_ORDER_ITEM_NUMBER: &str = "https://fhir.nhs.uk/Id/prescription-order-item-number";
pub const SDS_ROLE_PROFILE_ID: &str = "https://fhir.nhs.uk/Id/sds-role-profile-id";
pub const MESSAGE_EVENT: &str = "https://fhir.nhs.uk/CodeSystem/message-event";
pub const SNOMED: &str = "http://snomed.info/sct";

pub fn resource_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn reference(id: &str) -> Value {
    json!({ "reference": format!("urn:uuid:{id}") })
}

pub fn identifier(system: &str, value: &str) -> Value {
    json!({ "system": system, "value": value })
}

pub fn bundle_entry(resource: Value) -> Value {
    let full_url = resource
        .get("id")
        .and_then(Value::as_str)
        .map(|id| format!("urn:uuid:{id}"));
    match full_url {
        Some(full_url) => json!({ "fullUrl": full_url, "resource": resource }),
        None => json!({ "resource": resource }),
    }
}

/// HL7 timestamp as RFC 3339, passing through values that don't parse.
pub fn timestamp(value: &str) -> String {
    hl7_timestamp_to_rfc3339(value).unwrap_or_else(|| value.to_string())
}

pub fn attribute_at<'a>(element: &'a Element, path: &str, attribute: &str) -> Option<&'a str> {
    element.find(path).and_then(|e| e.attribute(attribute))
}

/// Patient from an HL7 `Patient` element. Demographics are optional; the
/// NHS number is not.
pub fn patient(hl7_patient: &Element) -> Option<Value> {
    let nhs_number = attribute_at(hl7_patient, "id", "extension")?;
    let mut patient = json!({
        "resourceType": "Patient",
        "id": resource_id(),
        "identifier": [identifier(NHS_NUMBER, nhs_number)]
    });

    if let Some(gender) = attribute_at(hl7_patient, "patientPerson/administrativeGenderCode", "code")
        .and_then(gender)
    {
        patient["gender"] = json!(gender);
    }
    if let Some(birth_time) = attribute_at(hl7_patient, "patientPerson/birthTime", "value") {
        if let (Some(year), Some(month), Some(day)) =
            (birth_time.get(0..4), birth_time.get(4..6), birth_time.get(6..8))
        {
            patient["birthDate"] = json!(format!("{year}-{month}-{day}"));
        }
    }
    Some(patient)
}

fn gender(code: &str) -> Option<&'static str> {
    match code {
        "0" => Some("unknown"),
        "1" => Some("male"),
        "2" => Some("female"),
        "9" => Some("other"),
        _ => None,
    }
}

pub fn message_header(event_code: &str, event_display: &str, focus: &[&str], response_to: Option<&str>) -> Value {
    let mut header = json!({
        "resourceType": "MessageHeader",
        "id": resource_id(),
        "eventCoding": {
            "system": MESSAGE_EVENT,
            "code": event_code,
            "display": event_display
        },
        "focus": focus.iter().map(|id| reference(id)).collect::<Vec<_>>()
    });
    if let Some(request_id) = response_to {
        header["response"] = json!({
            "identifier": request_id.to_lowercase(),
            "code": "ok"
        });
    }
    header
}

pub fn bundle_of_type(bundle_type: &str, identifier_value: &str, entries: Vec<Value>) -> Value {
    json!({
        "resourceType": "Bundle",
        "id": resource_id(),
        "identifier": identifier(RFC4122, &identifier_value.to_lowercase()),
        "type": bundle_type,
        "entry": entries.into_iter().map(bundle_entry).collect::<Vec<_>>()
    })
}
