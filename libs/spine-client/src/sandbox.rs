//! Offline stand-in for the backbone.
//!
//! Answers a fixed set of interactions with canned bodies and rejects the
//! rest with an `INTERACTION_NOT_SUPPORTED_BY_SANDBOX` OperationOutcome.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;

use crate::envelope::OutboundMessage;
use crate::error::Result;
use crate::transport::{HealthStatus, SpineTransport, TerminalResponse, TransportResponse};

pub mod interactions {
    pub const PARENT_PRESCRIPTION: &str = "PORX_IN020101SM31";
    pub const CANCEL_REQUEST: &str = "PORX_IN030101SM32";
    pub const NOMINATED_RELEASE_REQUEST: &str = "PORX_IN060102SM30";
    pub const PATIENT_RELEASE_REQUEST: &str = "PORX_IN132004SM30";
    pub const DISPENSE_NOTIFICATION: &str = "PORX_IN080101SM31";
    pub const DISPENSE_CLAIM: &str = "PORX_IN090101SM31";
    pub const DISPENSER_WITHDRAW: &str = "PORX_IN510101SM31";
    pub const DISPENSE_PROPOSAL_RETURN: &str = "PORX_IN100101SM31";
}

const ACKNOWLEDGEMENT: &str = include_str!("sandbox/acknowledgement.xml");
const CANCELLATION: &str = include_str!("sandbox/cancellation.xml");
const RELEASE: &str = include_str!("sandbox/release.xml");

#[derive(Debug, Clone, Copy, Default)]
pub struct SandboxSpineClient;

impl SandboxSpineClient {
    pub fn new() -> Self {
        Self
    }

    fn canned_body(interaction_id: &str) -> Option<&'static str> {
        use interactions::*;
        match interaction_id {
            PARENT_PRESCRIPTION | DISPENSE_NOTIFICATION | DISPENSE_CLAIM | DISPENSER_WITHDRAW
            | DISPENSE_PROPOSAL_RETURN => Some(ACKNOWLEDGEMENT),
            CANCEL_REQUEST => Some(CANCELLATION),
            NOMINATED_RELEASE_REQUEST | PATIENT_RELEASE_REQUEST => Some(RELEASE),
            _ => None,
        }
    }
}

/// The body returned for anything the sandbox does not simulate.
pub fn not_supported_outcome() -> serde_json::Value {
    json!({
        "resourceType": "OperationOutcome",
        "issue": [{
            "code": "informational",
            "severity": "information",
            "details": {
                "coding": [{
                    "code": "INTERACTION_NOT_SUPPORTED_BY_SANDBOX",
                    "display": "Interaction not supported by sandbox",
                    "system": "https://fhir.nhs.uk/R4/CodeSystem/Spine-ErrorOrWarningCode",
                    "version": "1"
                }]
            }
        }]
    })
}

fn not_supported() -> TransportResponse {
    TransportResponse::Terminal(TerminalResponse {
        status_code: 400,
        body: Bytes::from(not_supported_outcome().to_string()),
    })
}

#[async_trait]
impl SpineTransport for SandboxSpineClient {
    async fn send(&self, message: &OutboundMessage) -> Result<TransportResponse> {
        let response = match Self::canned_body(&message.interaction_id) {
            Some(body) => TransportResponse::Terminal(TerminalResponse {
                status_code: 200,
                body: Bytes::from_static(body.as_bytes()),
            }),
            None => not_supported(),
        };
        tracing::info!(
            interaction_id = %message.interaction_id,
            status = response.status_code(),
            "Sandbox answered request"
        );
        Ok(response)
    }

    async fn poll(&self, _polling_url: &str) -> Result<TransportResponse> {
        Ok(not_supported())
    }

    async fn status(&self) -> Result<HealthStatus> {
        Ok(HealthStatus {
            pass: true,
            status_code: 200,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(interaction_id: &str) -> OutboundMessage {
        OutboundMessage {
            interaction_id: interaction_id.to_string(),
            message_id: "A7B86F8D-1D81-FC28-E050-D20AE3A215F0".to_string(),
            body: Bytes::new(),
        }
    }

    fn terminal(response: TransportResponse) -> TerminalResponse {
        match response {
            TransportResponse::Terminal(t) => t,
            other => panic!("expected terminal response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn parent_prescription_is_acknowledged() {
        let response = terminal(SandboxSpineClient::new().send(&message(interactions::PARENT_PRESCRIPTION)).await.unwrap());
        assert_eq!(response.status_code, 200);
        assert!(response.body_text().contains("MCCI_IN010000UK13"));
        assert!(response.body_text().contains(r#"typeCode="AA""#));
    }

    #[tokio::test]
    async fn cancel_and_release_get_their_own_bodies() {
        let client = SandboxSpineClient::new();
        let cancel = terminal(client.send(&message(interactions::CANCEL_REQUEST)).await.unwrap());
        assert!(cancel.body_text().contains("PORX_IN050101UK31"));

        for id in [interactions::NOMINATED_RELEASE_REQUEST, interactions::PATIENT_RELEASE_REQUEST] {
            let release = terminal(client.send(&message(id)).await.unwrap());
            assert!(release.body_text().contains("PORX_IN070101UK31"));
        }
    }

    #[tokio::test]
    async fn unsupported_interaction_is_a_400_outcome() {
        let response = terminal(SandboxSpineClient::new().send(&message("QURX_IN000005UK99")).await.unwrap());
        assert_eq!(response.status_code, 400);
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(
            body["issue"][0]["details"]["coding"][0]["code"],
            "INTERACTION_NOT_SUPPORTED_BY_SANDBOX"
        );
    }

    #[tokio::test]
    async fn poll_is_not_supported_and_status_passes() {
        let client = SandboxSpineClient::new();
        assert_eq!(client.poll("/_poll/abc").await.unwrap().status_code(), 400);
        assert_eq!(
            client.status().await.unwrap(),
            HealthStatus {
                pass: true,
                status_code: 200
            }
        );
    }
}
